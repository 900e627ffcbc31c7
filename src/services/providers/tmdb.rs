/// TMDB catalog provider
///
/// API Flow:
/// 1. Genres: /genre/movie/list → id + display name for every movie genre
/// 2. Candidates: /discover/movie?with_genres={id} → first page by popularity
///
/// Adult titles are excluded at the query level and, when configured, results
/// are restricted to one original language.
use crate::{
    error::{AppError, AppResult},
    models::{CatalogItem, GenreTag, TmdbGenreList, TmdbPage},
    services::providers::CatalogProvider,
};
use reqwest::Client as HttpClient;

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    language: Option<String>,
}

impl TmdbProvider {
    pub fn new(api_key: String, api_url: String, language: Option<String>) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            language: language.filter(|l| !l.trim().is_empty()),
        }
    }

    fn discover_params(&self, genre_id: u32, page: u32) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("with_genres", genre_id.to_string()),
            ("page", page.to_string()),
            ("sort_by", "popularity.desc".to_string()),
            ("include_adult", "false".to_string()),
        ];
        if let Some(language) = &self.language {
            params.push(("with_original_language", language.clone()));
        }
        params
    }

    async fn get(&self, path: &str, params: &[(&'static str, String)]) -> AppResult<reqwest::Response> {
        let url = format!("{}{}", self.api_url, path);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "TMDB API returned status {}: {}",
                status, body
            )));
        }

        Ok(response)
    }
}

#[async_trait::async_trait]
impl CatalogProvider for TmdbProvider {
    async fn query_by_genre(&self, genre_id: u32, page: u32) -> AppResult<Vec<CatalogItem>> {
        let params = self.discover_params(genre_id, page);
        let response = self.get("/discover/movie", &params).await?;

        let page_body: TmdbPage = response.json().await?;
        let items: Vec<CatalogItem> = page_body.results.into_iter().map(CatalogItem::from).collect();

        tracing::debug!(
            genre_id,
            page,
            results = items.len(),
            provider = "tmdb",
            "Genre query completed"
        );

        Ok(items)
    }

    async fn list_genres(&self) -> AppResult<Vec<GenreTag>> {
        let response = self.get("/genre/movie/list", &[]).await?;
        let list: TmdbGenreList = response.json().await?;

        tracing::info!(genres = list.genres.len(), provider = "tmdb", "Genre list fetched");

        Ok(list.genres)
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}
