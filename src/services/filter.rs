use std::collections::HashSet;

use crate::models::CatalogItem;

pub const MIN_VOTE_AVERAGE: f64 = 5.0;
pub const MIN_VOTE_COUNT: u32 = 100;

/// Safety and quality predicates applied to every catalog batch
///
/// This is a second, independent layer on top of whatever the catalog adapter
/// already excludes at query time.
#[derive(Debug, Clone)]
pub struct ContentFilter {
    pub min_vote_average: f64,
    pub min_vote_count: u32,
    pub excluded_genres: HashSet<u32>,
    pub language: Option<String>,
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self {
            min_vote_average: MIN_VOTE_AVERAGE,
            min_vote_count: MIN_VOTE_COUNT,
            excluded_genres: HashSet::new(),
            language: None,
        }
    }
}

impl ContentFilter {
    pub fn new(excluded_genres: impl IntoIterator<Item = u32>, language: Option<String>) -> Self {
        Self {
            excluded_genres: excluded_genres.into_iter().collect(),
            language,
            ..Self::default()
        }
    }

    /// True when the item passes every predicate
    pub fn accepts(&self, item: &CatalogItem) -> bool {
        if item.vote_average < self.min_vote_average || item.vote_count < self.min_vote_count {
            return false;
        }
        if item.adult {
            return false;
        }
        if item.poster_path.as_deref().map_or(true, str::is_empty) {
            return false;
        }
        if item
            .genre_ids
            .iter()
            .any(|genre_id| self.excluded_genres.contains(genre_id))
        {
            return false;
        }
        match &self.language {
            Some(language) => item.original_language == *language,
            None => true,
        }
    }

    pub fn filter(&self, items: Vec<CatalogItem>) -> Vec<CatalogItem> {
        items.into_iter().filter(|item| self.accepts(item)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::movie;

    #[test]
    fn test_keeps_items_passing_all_predicates() {
        let filter = ContentFilter::default();
        let items = vec![movie(1, &[28]), movie(2, &[35])];

        assert_eq!(filter.filter(items.clone()), items);
    }

    #[test]
    fn test_quality_thresholds_are_inclusive() {
        let filter = ContentFilter::default();

        let mut borderline = movie(1, &[18]);
        borderline.vote_average = 5.0;
        borderline.vote_count = 100;
        assert!(filter.accepts(&borderline));

        let mut low_score = movie(2, &[18]);
        low_score.vote_average = 4.9;
        assert!(!filter.accepts(&low_score));

        let mut few_votes = movie(3, &[18]);
        few_votes.vote_count = 99;
        assert!(!filter.accepts(&few_votes));
    }

    #[test]
    fn test_rejects_adult_and_posterless() {
        let filter = ContentFilter::default();

        let mut adult = movie(1, &[18]);
        adult.adult = true;
        let mut no_poster = movie(2, &[18]);
        no_poster.poster_path = None;
        let mut empty_poster = movie(3, &[18]);
        empty_poster.poster_path = Some(String::new());

        assert!(filter.filter(vec![adult, no_poster, empty_poster]).is_empty());
    }

    #[test]
    fn test_excluded_genres_toggle() {
        let horror = movie(1, &[27, 53]);
        let comedy = movie(2, &[35]);

        let open = ContentFilter::default();
        assert_eq!(open.filter(vec![horror.clone(), comedy.clone()]).len(), 2);

        let strict = ContentFilter::new([27], None);
        let kept = strict.filter(vec![horror, comedy]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 2);
    }

    #[test]
    fn test_language_constraint_toggle() {
        let mut french = movie(1, &[18]);
        french.original_language = "fr".to_string();
        let english = movie(2, &[18]);

        let any_language = ContentFilter::default();
        assert_eq!(any_language.filter(vec![french.clone(), english.clone()]).len(), 2);

        let english_only = ContentFilter::new(std::iter::empty(), Some("en".to_string()));
        let kept = english_only.filter(vec![french, english]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].original_language, "en");
    }

    #[test]
    fn test_empty_input() {
        assert!(ContentFilter::default().filter(Vec::new()).is_empty());
    }
}
