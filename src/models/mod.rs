use serde::{Deserialize, Serialize};

pub mod study;

pub use study::{
    EventKind, EventRecord, Participant, PolicyVariant, SessionPhase, SurveyResponse,
};

/// Most titles a participant may pick in one session
pub const MAX_SELECTIONS: usize = 5;

/// Size of the grid shown to the participant
pub const DISPLAY_SIZE: usize = 20;

/// A recommendable movie, normalized from the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogItem {
    pub id: u64,
    pub title: String,
    pub release_year: Option<i32>,
    pub original_language: String,
    /// Maturity rating when the catalog supplies one
    pub certification: Option<String>,
    pub popularity: f64,
    pub vote_average: f64,
    pub vote_count: u32,
    /// Ordered genre ids, most significant first
    pub genre_ids: Vec<u32>,
    pub adult: bool,
    pub poster_path: Option<String>,
    pub overview: Option<String>,
}

impl CatalogItem {
    /// First three genres, used to seed relation sampling
    pub fn seed_genres(&self) -> &[u32] {
        let end = self.genre_ids.len().min(3);
        &self.genre_ids[..end]
    }
}

/// A catalog genre with its display name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GenreTag {
    pub id: u32,
    pub name: String,
}

/// Looks up a genre's display name, falling back to "Unknown"
pub fn genre_name(genre_id: u32, genres: &[GenreTag]) -> &str {
    genres
        .iter()
        .find(|g| g.id == genre_id)
        .map(|g| g.name.as_str())
        .unwrap_or("Unknown")
}

// ============================================================================
// TMDB API Types
// ============================================================================

/// Page envelope returned by /discover/movie
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbPage {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub results: Vec<TmdbMovie>,
}

/// Raw movie record from TMDB
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMovie {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub original_language: String,
    #[serde(default)]
    pub certification: Option<String>,
    #[serde(default)]
    pub popularity: f64,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub vote_count: u32,
    #[serde(default)]
    pub genre_ids: Vec<u32>,
    #[serde(default)]
    pub adult: bool,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
}

impl From<TmdbMovie> for CatalogItem {
    fn from(movie: TmdbMovie) -> Self {
        // release_date is "YYYY-MM-DD" or an empty string for unreleased titles
        let release_year = movie
            .release_date
            .as_deref()
            .and_then(|date| date.get(..4))
            .and_then(|year| year.parse::<i32>().ok());

        CatalogItem {
            id: movie.id,
            title: movie.title,
            release_year,
            original_language: movie.original_language,
            certification: movie.certification,
            popularity: movie.popularity,
            vote_average: movie.vote_average,
            vote_count: movie.vote_count,
            genre_ids: movie.genre_ids,
            adult: movie.adult,
            poster_path: movie.poster_path.filter(|p| !p.is_empty()),
            overview: movie.overview.filter(|o| !o.is_empty()),
        }
    }
}

/// Response from /genre/movie/list
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbGenreList {
    pub genres: Vec<GenreTag>,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tmdb_movie_to_catalog_item() {
        let json = r#"{
            "id": 27205,
            "title": "Inception",
            "release_date": "2010-07-15",
            "original_language": "en",
            "popularity": 83.9,
            "vote_average": 8.4,
            "vote_count": 35000,
            "genre_ids": [28, 878, 12],
            "adult": false,
            "poster_path": "/oYuLEt3zVCKq57qu2F8dT7NIa6f.jpg",
            "overview": "Cobb, a skilled thief..."
        }"#;

        let movie: TmdbMovie = serde_json::from_str(json).unwrap();
        let item: CatalogItem = movie.into();

        assert_eq!(item.id, 27205);
        assert_eq!(item.title, "Inception");
        assert_eq!(item.release_year, Some(2010));
        assert_eq!(item.genre_ids, vec![28, 878, 12]);
        assert_eq!(item.vote_count, 35000);
        assert_eq!(
            item.poster_path.as_deref(),
            Some("/oYuLEt3zVCKq57qu2F8dT7NIa6f.jpg")
        );
    }

    #[test]
    fn test_tmdb_movie_with_missing_fields() {
        let json = r#"{ "id": 1, "title": "Untitled", "release_date": "", "poster_path": null }"#;

        let movie: TmdbMovie = serde_json::from_str(json).unwrap();
        let item: CatalogItem = movie.into();

        assert_eq!(item.release_year, None);
        assert_eq!(item.poster_path, None);
        assert!(item.genre_ids.is_empty());
        assert!(!item.adult);
    }

    #[test]
    fn test_seed_genres_caps_at_three() {
        let item = fixtures::movie(1, &[28, 12, 16, 35]);
        assert_eq!(item.seed_genres(), &[28, 12, 16]);

        let item = fixtures::movie(2, &[16]);
        assert_eq!(item.seed_genres(), &[16]);
    }

    #[test]
    fn test_genre_name_lookup() {
        let genres = vec![
            GenreTag {
                id: 16,
                name: "Animation".to_string(),
            },
            GenreTag {
                id: 35,
                name: "Comedy".to_string(),
            },
        ];

        assert_eq!(genre_name(35, &genres), "Comedy");
        assert_eq!(genre_name(999, &genres), "Unknown");
    }
}
