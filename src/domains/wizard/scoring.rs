//! Pure, deterministic scoring of (expired item, candidate) pairs. No I/O, no clock reads —
//! identical inputs always produce identical `ScoreBreakdown`s.

use rust_decimal::prelude::ToPrimitive;
use std::collections::HashSet;

use super::models::{CandidateOffer, ExpiredItem, ScoreBreakdown};

const WEIGHT_BRAND: f64 = 3.0;
const WEIGHT_STORE: f64 = 2.0;
const WEIGHT_SIZE: f64 = 1.0;
const WEIGHT_PRICE: f64 = 1.0;

/// Sum of every factor's weight — the denominator for `confidence`.
pub const MAX_ACHIEVABLE_TOTAL: f64 = WEIGHT_BRAND + WEIGHT_STORE + WEIGHT_SIZE + WEIGHT_PRICE;

/// A candidate needs at least this total to be retained as a surfaced suggestion.
pub const RETENTION_THRESHOLD: f64 = 0.5;

/// Case-fold and diacritic-fold a string for brand/name comparison. Lithuanian/Baltic brand
/// names routinely carry diacritics (e.g. "Žemaitijos") that must not defeat an otherwise
/// exact match.
fn fold(s: &str) -> String {
    s.chars()
        .flat_map(|c| c.to_lowercase())
        .map(|c| match c {
            'ą' => 'a',
            'č' => 'c',
            'ę' => 'e',
            'ė' => 'e',
            'į' => 'i',
            'š' => 's',
            'ų' => 'u',
            'ū' => 'u',
            'ž' => 'z',
            other => other,
        })
        .collect()
}

fn brand_score(item: &ExpiredItem, candidate: &CandidateOffer) -> f64 {
    match (&item.item.brand, &candidate.offer.brand) {
        (Some(item_brand), Some(cand_brand)) if fold(item_brand) == fold(cand_brand) => WEIGHT_BRAND,
        _ => 0.0,
    }
}

fn store_score(candidate: &CandidateOffer, preferred_stores: &HashSet<i64>) -> f64 {
    if preferred_stores.contains(&candidate.offer.store_id) {
        WEIGHT_STORE
    } else {
        0.0
    }
}

fn size_score(item: &ExpiredItem, candidate: &CandidateOffer) -> f64 {
    let item_offer = &item.source_offer;
    let cand_offer = &candidate.offer;

    let unit_matches = match (&item_offer.size_unit, &cand_offer.size_unit) {
        (Some(a), Some(b)) => fold(a) == fold(b),
        _ => false,
    };

    if !unit_matches {
        return 0.0;
    }

    match (item_offer.size_value, cand_offer.size_value) {
        (Some(item_size), Some(cand_size)) if item_size > rust_decimal::Decimal::ZERO && cand_size > rust_decimal::Decimal::ZERO => {
            let (min, max) = if item_size < cand_size {
                (item_size, cand_size)
            } else {
                (cand_size, item_size)
            };
            let ratio = (min / max).to_f64().unwrap_or(0.0);
            WEIGHT_SIZE * ratio
        }
        // Unit matches but no size values to compare: full credit for the unit match alone.
        _ => WEIGHT_SIZE,
    }
}

fn price_score(item: &ExpiredItem, candidate: &CandidateOffer) -> f64 {
    let item_price = item.source_offer.price;
    let cand_price = candidate.offer.price;

    if item_price <= rust_decimal::Decimal::ZERO || cand_price >= item_price {
        return 0.0;
    }

    let savings_ratio = ((item_price - cand_price) / item_price).to_f64().unwrap_or(0.0);
    WEIGHT_PRICE * savings_ratio.min(1.0)
}

/// Score a single candidate against its expired item. `preferred_stores` is the user's
/// "preferred store" set, when known; empty when not provided.
pub fn score(item: &ExpiredItem, candidate: &CandidateOffer, preferred_stores: &HashSet<i64>) -> ScoreBreakdown {
    let brand = brand_score(item, candidate);
    let store = store_score(candidate, preferred_stores);
    let size = size_score(item, candidate);
    let price = price_score(item, candidate);

    ScoreBreakdown {
        brand,
        store,
        size,
        price,
        total: brand + store + size + price,
    }
}

pub fn confidence(breakdown: &ScoreBreakdown) -> f64 {
    (breakdown.total / MAX_ACHIEVABLE_TOTAL).clamp(0.0, 1.0)
}

pub fn is_retained(breakdown: &ScoreBreakdown) -> bool {
    breakdown.total >= RETENTION_THRESHOLD
}

/// The deterministic tie-break: same-brand first, then total descending, then price
/// ascending, then offer id ascending. Same-brand is the primary key so a store/size/price
/// weighted total can never push a brand-mismatched candidate ahead of a same-brand one —
/// required by the "same-brand first" invariant. Used to sort suggestions within one item.
pub fn rank_key(breakdown: &ScoreBreakdown, candidate: &CandidateOffer) -> (std::cmp::Reverse<bool>, std::cmp::Reverse<i64>, i64, i64) {
    // Total is compared at fixed precision (cents-of-a-point) to keep the ordering a total
    // order over floats without relying on float `Ord`.
    let total_key = (breakdown.total * 1_000_000.0).round() as i64;
    let price_key = (candidate.offer.price * rust_decimal::Decimal::from(100)).to_i64().unwrap_or(i64::MAX);
    (std::cmp::Reverse(candidate.same_brand), std::cmp::Reverse(total_key), price_key, candidate.offer.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::wizard::test_support::{expired_item, offer};
    use rust_decimal_macros::dec;

    #[test]
    fn same_brand_case_and_diacritic_folded_scores_full_brand_weight() {
        let item = expired_item(1, Some("Žemaitijos"), dec!(0.99), Some("ml"), Some(dec!(500)));
        let candidate = CandidateOffer {
            offer: offer(10, 1, Some("zemaitijos"), dec!(0.89), Some("ml"), Some(dec!(500))),
            same_brand: true,
            name_similarity: 1.0,
            brand_similarity: 1.0,
        };

        let breakdown = score(&item, &candidate, &HashSet::new());
        assert_eq!(breakdown.brand, WEIGHT_BRAND);
    }

    #[test]
    fn different_brand_scores_zero_brand_weight() {
        let item = expired_item(1, Some("Dvaro"), dec!(0.99), None, None);
        let candidate = CandidateOffer {
            offer: offer(10, 1, Some("Rokiskio"), dec!(0.89), None, None),
            same_brand: false,
            name_similarity: 0.6,
            brand_similarity: 0.0,
        };

        let breakdown = score(&item, &candidate, &HashSet::new());
        assert_eq!(breakdown.brand, 0.0);
    }

    #[test]
    fn preferred_store_adds_store_weight() {
        let item = expired_item(1, None, dec!(0.99), None, None);
        let candidate = CandidateOffer {
            offer: offer(10, 7, None, dec!(0.99), None, None),
            same_brand: false,
            name_similarity: 0.5,
            brand_similarity: 0.0,
        };

        let mut preferred = HashSet::new();
        preferred.insert(7);

        let breakdown = score(&item, &candidate, &preferred);
        assert_eq!(breakdown.store, WEIGHT_STORE);

        let breakdown_unpreferred = score(&item, &candidate, &HashSet::new());
        assert_eq!(breakdown_unpreferred.store, 0.0);
    }

    #[test]
    fn size_score_gives_partial_credit_for_ratio_when_unit_matches() {
        let item = expired_item(1, None, dec!(1.0), Some("g"), Some(dec!(1000)));
        let candidate = CandidateOffer {
            offer: offer(10, 1, None, dec!(1.0), Some("g"), Some(dec!(500))),
            same_brand: false,
            name_similarity: 0.5,
            brand_similarity: 0.0,
        };

        let breakdown = score(&item, &candidate, &HashSet::new());
        assert!((breakdown.size - 0.5).abs() < 1e-9);
    }

    #[test]
    fn size_score_zero_when_units_differ() {
        let item = expired_item(1, None, dec!(1.0), Some("g"), Some(dec!(1000)));
        let candidate = CandidateOffer {
            offer: offer(10, 1, None, dec!(1.0), Some("ml"), Some(dec!(1000))),
            same_brand: false,
            name_similarity: 0.5,
            brand_similarity: 0.0,
        };

        let breakdown = score(&item, &candidate, &HashSet::new());
        assert_eq!(breakdown.size, 0.0);
    }

    #[test]
    fn price_score_rewards_savings_and_caps_at_one() {
        let item = expired_item(1, None, dec!(10.00), None, None);

        let half_off = CandidateOffer {
            offer: offer(10, 1, None, dec!(5.00), None, None),
            same_brand: false,
            name_similarity: 0.5,
            brand_similarity: 0.0,
        };
        let breakdown = score(&item, &half_off, &HashSet::new());
        assert!((breakdown.price - 0.5).abs() < 1e-9);

        let free = CandidateOffer {
            offer: offer(11, 1, None, dec!(0.00), None, None),
            same_brand: false,
            name_similarity: 0.5,
            brand_similarity: 0.0,
        };
        let breakdown_free = score(&item, &free, &HashSet::new());
        assert_eq!(breakdown_free.price, WEIGHT_PRICE);
    }

    #[test]
    fn price_score_zero_when_candidate_not_cheaper() {
        let item = expired_item(1, None, dec!(10.00), None, None);
        let pricier = CandidateOffer {
            offer: offer(10, 1, None, dec!(11.00), None, None),
            same_brand: false,
            name_similarity: 0.5,
            brand_similarity: 0.0,
        };
        let breakdown = score(&item, &pricier, &HashSet::new());
        assert_eq!(breakdown.price, 0.0);
    }

    #[test]
    fn retention_threshold_excludes_weak_matches() {
        let item = expired_item(1, Some("BrandA"), dec!(10.00), None, None);
        let weak = CandidateOffer {
            offer: offer(10, 1, Some("BrandB"), dec!(9.99), None, None),
            same_brand: false,
            name_similarity: 0.1,
            brand_similarity: 0.0,
        };
        let breakdown = score(&item, &weak, &HashSet::new());
        assert!(!is_retained(&breakdown));
    }

    #[test]
    fn confidence_is_clamped_to_unit_interval() {
        let breakdown = ScoreBreakdown { brand: 3.0, store: 2.0, size: 1.0, price: 1.0, total: 7.0 };
        assert_eq!(confidence(&breakdown), 1.0);

        let zero = ScoreBreakdown { brand: 0.0, store: 0.0, size: 0.0, price: 0.0, total: 0.0 };
        assert_eq!(confidence(&zero), 0.0);
    }

    #[test]
    fn rank_key_orders_by_total_desc_then_price_asc_then_offer_id_asc() {
        let high_total = ScoreBreakdown { brand: 3.0, store: 0.0, size: 1.0, price: 0.0, total: 4.0 };
        let low_total = ScoreBreakdown { brand: 0.0, store: 0.0, size: 0.0, price: 0.5, total: 0.5 };

        let cand_a = CandidateOffer {
            offer: offer(1, 1, None, dec!(2.00), None, None),
            same_brand: false,
            name_similarity: 0.0,
            brand_similarity: 0.0,
        };
        let cand_b = CandidateOffer {
            offer: offer(2, 1, None, dec!(1.00), None, None),
            same_brand: false,
            name_similarity: 0.0,
            brand_similarity: 0.0,
        };

        assert!(rank_key(&high_total, &cand_a) < rank_key(&low_total, &cand_b));

        // Same total: cheaper price wins.
        assert!(rank_key(&low_total, &cand_b) < rank_key(&low_total, &cand_a));

        // Same total, same price: lower offer id wins.
        let cand_c = CandidateOffer {
            offer: offer(3, 1, None, dec!(1.00), None, None),
            same_brand: false,
            name_similarity: 0.0,
            brand_similarity: 0.0,
        };
        assert!(rank_key(&low_total, &cand_b) < rank_key(&low_total, &cand_c));
    }

    #[test]
    fn same_brand_candidate_ranks_first_even_with_a_strictly_lower_total() {
        // Brand-mismatched candidate scores higher on total (store + size + price) than the
        // same-brand candidate (brand weight alone), but same-brand must still win the rank.
        let mismatched_high_total =
            ScoreBreakdown { brand: 0.0, store: 2.0, size: 1.0, price: 1.0, total: 4.0 };
        let same_brand_low_total = ScoreBreakdown { brand: 3.0, store: 0.0, size: 0.0, price: 0.0, total: 3.0 };

        let mismatched = CandidateOffer {
            offer: offer(1, 1, Some("Rokiskio"), dec!(1.00), None, None),
            same_brand: false,
            name_similarity: 0.6,
            brand_similarity: 0.0,
        };
        let same_brand = CandidateOffer {
            offer: offer(2, 1, Some("Dvaro"), dec!(2.00), None, None),
            same_brand: true,
            name_similarity: 0.9,
            brand_similarity: 1.0,
        };

        assert!(rank_key(&same_brand_low_total, &same_brand) < rank_key(&mismatched_high_total, &mismatched));
    }
}
