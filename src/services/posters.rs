/// Image shown for movies without artwork
pub const PLACEHOLDER_POSTER: &str = "/placeholder-movie.jpg";

pub const DEFAULT_POSTER_SIZE: &str = "w500";

/// Maps TMDB poster paths to displayable URLs
#[derive(Debug, Clone)]
pub struct PosterResolver {
    image_base_url: String,
}

impl PosterResolver {
    pub fn new(image_base_url: impl Into<String>) -> Self {
        Self {
            image_base_url: image_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `size` is a TMDB size token such as `w185`, `w500` or `original`
    pub fn url(&self, poster_path: Option<&str>, size: &str) -> String {
        match poster_path.filter(|path| !path.is_empty()) {
            Some(path) => format!("{}/{}{}", self.image_base_url, size, path),
            None => PLACEHOLDER_POSTER.to_string(),
        }
    }
}
