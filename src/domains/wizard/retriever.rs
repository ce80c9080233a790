//! Two-pass candidate retrieval: a brand-biased pass, then a cross-brand pass, merged and
//! deduplicated by offer id.

use std::collections::HashMap;

use super::clock::Clock;
use super::error::WizardError;
use super::models::{CandidateOffer, ExpiredItem};
use super::search_client::{FuzzySearchClient, SearchFilters};
use crate::config::WizardConfig;

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Runs both passes for one expired item and returns a deduplicated, deterministically
/// ordered candidate set. Fails the whole operation on any search-collaborator error — no
/// partial candidate sets are returned (the caller, `startWizard`, relies on this).
pub async fn candidates(
    search: &dyn FuzzySearchClient,
    clock: &dyn Clock,
    item: &ExpiredItem,
    config: &WizardConfig,
) -> Result<Vec<CandidateOffer>, WizardError> {
    let normalized_name = normalize_name(&item.item.product_name);
    let filters = SearchFilters { valid_only: true, limit: config.candidates_per_item * 2 };

    let mut merged: HashMap<i64, CandidateOffer> = HashMap::new();

    // Pass 1: brand-biased, only when a brand is known.
    if let Some(brand) = &item.item.brand {
        let query = format!("{} {}", brand, normalized_name);
        let hits = search.search(&query, &filters).await?;
        for hit in hits {
            if hit.offer.price <= rust_decimal::Decimal::ZERO || hit.offer.valid_to <= clock.now() {
                continue;
            }
            merged.insert(
                hit.offer.id,
                CandidateOffer {
                    offer: hit.offer,
                    same_brand: true,
                    name_similarity: hit.name_similarity,
                    brand_similarity: hit.brand_similarity,
                },
            );
        }
    }

    // Pass 2: cross-brand, name only.
    let hits = search.search(&normalized_name, &filters).await?;
    for hit in hits {
        if hit.offer.price <= rust_decimal::Decimal::ZERO || hit.offer.valid_to <= clock.now() {
            continue;
        }

        let shares_brand = item
            .item
            .brand
            .as_deref()
            .zip(hit.offer.brand.as_deref())
            .map(|(a, b)| a.eq_ignore_ascii_case(b))
            .unwrap_or(false);

        merged
            .entry(hit.offer.id)
            .and_modify(|existing| {
                // Pass 1 already tagged this offer same-brand; keep that tag, refresh similarities.
                existing.name_similarity = existing.name_similarity.max(hit.name_similarity);
            })
            .or_insert(CandidateOffer {
                offer: hit.offer,
                same_brand: shares_brand,
                name_similarity: hit.name_similarity,
                brand_similarity: hit.brand_similarity,
            });
    }

    let mut result: Vec<CandidateOffer> = merged.into_values().collect();
    // Deterministic ordering independent of whatever order the search collaborator used.
    result.sort_by_key(|c| c.offer.id);
    result.truncate(config.candidates_per_item);

    Ok(result)
}
