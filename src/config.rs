use serde::{Deserialize, Deserializer};

use crate::models::MAX_SELECTIONS;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// TMDB v4 read access token
    #[serde(default)]
    pub tmdb_api_key: String,

    /// TMDB API base URL
    #[serde(default = "default_tmdb_api_url")]
    pub tmdb_api_url: String,

    /// TMDB image CDN base URL
    #[serde(default = "default_tmdb_image_url")]
    pub tmdb_image_url: String,

    /// Original-language constraint injected into catalog queries
    #[serde(default = "default_catalog_language", deserialize_with = "non_empty")]
    pub catalog_language: Option<String>,

    /// JSON endpoint receiving study events (sheet.best style)
    #[serde(default, deserialize_with = "non_empty")]
    pub results_logger_url: Option<String>,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Ordered genre roster used for diversity sampling
    #[serde(default = "default_genre_roster")]
    pub genre_roster: Vec<u32>,

    /// Genres the content filter rejects outright
    #[serde(default)]
    pub excluded_genres: Vec<u32>,

    /// Language the content filter requires, if any
    #[serde(default, deserialize_with = "non_empty")]
    pub filter_language: Option<String>,

    #[serde(default = "default_max_selections")]
    pub max_selections: usize,

    /// Minimum time the recomputing indicator stays raised
    #[serde(default = "default_min_recompute_ms")]
    pub min_recompute_ms: u64,

    /// Pause between the final selection and completion
    #[serde(default = "default_submit_delay_ms")]
    pub submit_delay_ms: u64,

    /// Sessions older than this are dropped from memory
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

/// Treats a blank optional setting as unset
fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

fn default_tmdb_api_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_tmdb_image_url() -> String {
    "https://image.tmdb.org/t/p".to_string()
}

fn default_catalog_language() -> Option<String> {
    Some("en".to_string())
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Action, Adventure, Animation, Comedy, Crime, Documentary, Drama, Family,
/// Fantasy, History, Horror, Music, Mystery, Romance, Science Fiction, Thriller
pub fn default_genre_roster() -> Vec<u32> {
    vec![
        28, 12, 16, 35, 80, 99, 18, 10751, 14, 36, 27, 10402, 9648, 10749, 878, 53,
    ]
}

fn default_max_selections() -> usize {
    MAX_SELECTIONS
}

fn default_min_recompute_ms() -> u64 {
    1000
}

fn default_submit_delay_ms() -> u64 {
    1500
}

fn default_session_ttl_secs() -> u64 {
    4 * 60 * 60
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Reports every missing or unusable setting in one error
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        if self.tmdb_api_key.trim().is_empty() {
            errors.push("TMDB_API_KEY is not configured");
        }
        if self.genre_roster.is_empty() {
            errors.push("GENRE_ROSTER must list at least one genre");
        }
        if self.session_ttl_secs == 0 {
            errors.push("SESSION_TTL_SECS must be greater than zero");
        }
        if self.max_selections == 0 {
            errors.push("MAX_SELECTIONS must be greater than zero");
        }
        if self.results_logger_url.is_none() {
            tracing::warn!("RESULTS_LOGGER_URL is not configured, study events will only be traced");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!("Invalid configuration: {}", errors.join("; ")))
        }
    }
}
