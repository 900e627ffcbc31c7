/// Catalog data provider abstraction
///
/// The samplers only ever talk to the catalog through this trait, so the TMDB
/// adapter can be swapped for a fake in tests or another movie database later.
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{CatalogItem, GenreTag},
};

pub mod tmdb;

pub use tmdb::TmdbProvider;

/// Trait for movie catalog providers
///
/// Implementations are responsible for transport-level safety parameters
/// (excluding adult titles, language restriction). The content filter is
/// applied again to whatever they return.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {
    /// One page of movies tagged with the genre, most popular first
    async fn query_by_genre(&self, genre_id: u32, page: u32) -> AppResult<Vec<CatalogItem>>;

    /// The genre taxonomy
    async fn list_genres(&self) -> AppResult<Vec<GenreTag>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Queries several genres in parallel and waits for every query to settle
///
/// Results come back in the order of `genre_ids`. A failing genre does not
/// abort its siblings; callers decide what to do with each error.
pub async fn query_genres(
    provider: &Arc<dyn CatalogProvider>,
    genre_ids: &[u32],
    page: u32,
) -> Vec<(u32, AppResult<Vec<CatalogItem>>)> {
    let mut tasks = Vec::with_capacity(genre_ids.len());

    for &genre_id in genre_ids {
        let provider = Arc::clone(provider);
        let task = tokio::spawn(async move { provider.query_by_genre(genre_id, page).await });
        tasks.push((genre_id, task));
    }

    let mut results = Vec::with_capacity(tasks.len());
    let mut error_count = 0;

    for (genre_id, task) in tasks {
        let result = match task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(genre_id, error = %e, "Genre query task join error");
                Err(AppError::Internal(e.to_string()))
            }
        };

        if let Err(e) = &result {
            error_count += 1;
            tracing::warn!(
                genre_id,
                page,
                provider = provider.name(),
                error = %e,
                "Genre query failed, skipping"
            );
        }

        results.push((genre_id, result));
    }

    if error_count > 0 {
        tracing::warn!(
            success_count = results.len() - error_count,
            error_count,
            "Partial genre query failure"
        );
    }

    results
}
