use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::CatalogItem,
    services::{
        diversity::DiversitySampler,
        filter::ContentFilter,
        providers::{query_genres, CatalogProvider},
        random::RandomSource,
    },
};

/// Seed genres beyond the third are ignored
pub const MAX_SEED_GENRES: usize = 3;

/// Diversity top-up rounds before settling for a short batch
const MAX_TOP_UP_ATTEMPTS: u32 = 3;

/// Splits `related_count` across up to three seed genres: 50% / 30% / rest
///
/// Primary and secondary shares round up; the tertiary share takes whatever
/// is left and never goes negative.
pub fn genre_quotas(genre_ids: &[u32], related_count: usize) -> Vec<(u32, usize)> {
    let primary = related_count.div_ceil(2);
    let secondary = (related_count * 3).div_ceil(10);
    let tertiary = related_count.saturating_sub(primary + secondary);

    genre_ids
        .iter()
        .take(MAX_SEED_GENRES)
        .copied()
        .zip([primary, secondary, tertiary])
        .collect()
}

/// Builds a candidate batch weighted towards the genres of a seed item
pub struct RelationSampler {
    provider: Arc<dyn CatalogProvider>,
    filter: Arc<ContentFilter>,
    diversity: Arc<DiversitySampler>,
    random: Arc<RandomSource>,
    /// Share of the batch reserved for seed genres, in percent
    related_percent: usize,
}

impl RelationSampler {
    pub fn new(
        provider: Arc<dyn CatalogProvider>,
        filter: Arc<ContentFilter>,
        diversity: Arc<DiversitySampler>,
        random: Arc<RandomSource>,
    ) -> Self {
        Self {
            provider,
            filter,
            diversity,
            random,
            related_percent: 100,
        }
    }

    /// Reserves only part of each batch for seed genres; diversity top-up
    /// fills the remainder
    pub fn with_related_percent(mut self, percent: usize) -> Self {
        self.related_percent = percent.min(100);
        self
    }

    pub fn related_count(&self, total_count: usize) -> usize {
        (total_count * self.related_percent).div_ceil(100)
    }

    /// Samples `total_count` items related to `seed_genres`, never returning
    /// an id from `exclude`
    ///
    /// Falls back to a plain diversity pool when no seed genre and no top-up
    /// round produced anything.
    pub async fn sample(
        &self,
        seed_genres: &[u32],
        exclude: &HashSet<u64>,
        total_count: usize,
    ) -> AppResult<Vec<CatalogItem>> {
        if total_count == 0 {
            return Ok(Vec::new());
        }

        let genres: Vec<u32> = seed_genres.iter().take(MAX_SEED_GENRES).copied().collect();
        let quotas = genre_quotas(&genres, self.related_count(total_count));

        let mut used = exclude.clone();
        let mut batch = Vec::with_capacity(total_count);

        if !genres.is_empty() {
            let results = query_genres(&self.provider, &genres, 1).await;

            for ((genre_id, result), (_, quota)) in results.into_iter().zip(quotas) {
                let Ok(items) = result else {
                    continue;
                };

                let mut taken = 0;
                for item in self.filter.filter(items) {
                    if taken >= quota || batch.len() >= total_count {
                        break;
                    }
                    if used.insert(item.id) {
                        batch.push(item);
                        taken += 1;
                    }
                }

                tracing::debug!(genre_id, quota, taken, "Seed genre contributed to batch");
            }
        }

        let related = batch.len();
        self.top_up(&mut batch, &mut used, total_count).await;

        if batch.is_empty() {
            return self.fallback(exclude, total_count).await;
        }

        self.random.shuffle(&mut batch);

        tracing::info!(
            seed_genres = ?genres,
            related,
            topped_up = batch.len() - related,
            total = batch.len(),
            "Relation batch sampled"
        );

        Ok(batch)
    }

    /// Fills the batch from diversity pools, asking for extra to make up for
    /// excluded ids and moving to a later page each round
    async fn top_up(&self, batch: &mut Vec<CatalogItem>, used: &mut HashSet<u64>, total_count: usize) {
        let mut page = 1;

        while batch.len() < total_count && page <= MAX_TOP_UP_ATTEMPTS {
            let missing = total_count - batch.len();
            let request = missing * 2 + used.len();

            match self.diversity.sample(request, page).await {
                Ok(pool) => {
                    for item in pool {
                        if batch.len() >= total_count {
                            break;
                        }
                        if used.insert(item.id) {
                            batch.push(item);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(page, error = %e, "Diversity top-up exhausted");
                    break;
                }
            }

            page += 1;
        }
    }

    async fn fallback(&self, exclude: &HashSet<u64>, total_count: usize) -> AppResult<Vec<CatalogItem>> {
        tracing::warn!(total = total_count, "Relation sampling failed, using diversity pool");

        let pool: Vec<CatalogItem> = self
            .diversity
            .sample(total_count + exclude.len(), 1)
            .await?
            .into_iter()
            .filter(|item| !exclude.contains(&item.id))
            .take(total_count)
            .collect();

        if pool.is_empty() {
            return Err(AppError::PoolExhausted(
                "Every candidate was already selected".to_string(),
            ));
        }

        Ok(pool)
    }
}
