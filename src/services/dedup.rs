use std::collections::HashSet;

use crate::models::CatalogItem;

/// Drops repeated ids, keeping the first occurrence and the original order
pub fn dedupe(items: Vec<CatalogItem>) -> Vec<CatalogItem> {
    let mut seen = HashSet::with_capacity(items.len());
    items.into_iter().filter(|item| seen.insert(item.id)).collect()
}
