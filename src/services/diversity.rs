use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::CatalogItem,
    services::{
        dedup::dedupe,
        filter::ContentFilter,
        providers::{query_genres, CatalogProvider},
        random::RandomSource,
    },
};

/// Builds candidate pools balanced across a fixed genre roster
///
/// Used for the initial grid, for "get new options" refreshes, and as the
/// top-up source for relation sampling.
pub struct DiversitySampler {
    provider: Arc<dyn CatalogProvider>,
    filter: Arc<ContentFilter>,
    roster: Vec<u32>,
    random: Arc<RandomSource>,
}

impl DiversitySampler {
    pub fn new(
        provider: Arc<dyn CatalogProvider>,
        filter: Arc<ContentFilter>,
        roster: Vec<u32>,
        random: Arc<RandomSource>,
    ) -> Self {
        Self {
            provider,
            filter,
            roster,
            random,
        }
    }

    pub fn roster(&self) -> &[u32] {
        &self.roster
    }

    /// How many items each genre may contribute to a pool of `target_count`
    pub fn per_genre_quota(&self, target_count: usize) -> usize {
        if self.roster.is_empty() {
            return 0;
        }
        target_count.div_ceil(self.roster.len())
    }

    /// Samples up to `target_count` distinct items from one page of every
    /// roster genre
    ///
    /// Failed genres are skipped. Fails with `PoolExhausted` only when no
    /// genre contributed anything.
    pub async fn sample(&self, target_count: usize, page: u32) -> AppResult<Vec<CatalogItem>> {
        if self.roster.is_empty() {
            return Err(AppError::PoolExhausted(
                "Genre roster is empty".to_string(),
            ));
        }

        let per_genre = self.per_genre_quota(target_count);
        let results = query_genres(&self.provider, &self.roster, page).await;

        let mut pool = Vec::with_capacity(per_genre * self.roster.len());
        for (genre_id, result) in results {
            let Ok(items) = result else {
                continue;
            };

            let accepted: Vec<CatalogItem> = self
                .filter
                .filter(items)
                .into_iter()
                .take(per_genre)
                .collect();

            tracing::debug!(genre_id, accepted = accepted.len(), "Genre contributed to pool");
            pool.extend(accepted);
        }

        let mut pool = dedupe(pool);
        self.random.shuffle(&mut pool);
        pool.truncate(target_count);

        if pool.is_empty() {
            tracing::error!(
                page,
                roster = self.roster.len(),
                "Diversity sampling produced no candidates"
            );
            return Err(AppError::PoolExhausted(format!(
                "No candidates from {} genres on page {}",
                self.roster.len(),
                page
            )));
        }

        tracing::info!(
            page,
            target = target_count,
            sampled = pool.len(),
            "Diversity pool sampled"
        );

        Ok(pool)
    }
}
