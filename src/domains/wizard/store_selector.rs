//! Greedy set-cover store selection with a savings guard. Picks at most `max_stores` stores
//! covering the expired items' ranked suggestions, then restricts every item's suggestion
//! list to offers in the chosen stores.

use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

use super::models::{ExpiredItem, Suggestion};
use crate::config::WizardConfig;

pub struct StoreSelection {
    pub stores: Vec<i64>,
    pub suggestions_by_item: HashMap<i64, Vec<Suggestion>>,
}

/// Best price offered by `store` for `item_id`, if the store covers that item at all.
fn best_price_in_store(suggestions: &[Suggestion], store: i64) -> Option<Decimal> {
    suggestions
        .iter()
        .filter(|s| s.offer.store_id == store)
        .map(|s| s.offer.price)
        .min()
}

fn covered_items_for_store(ranked: &HashMap<i64, Vec<Suggestion>>, store: i64) -> Vec<i64> {
    ranked
        .iter()
        .filter(|(_, suggestions)| suggestions.iter().any(|s| s.offer.store_id == store))
        .map(|(item_id, _)| *item_id)
        .collect()
}

fn total_savings_for_store(
    ranked: &HashMap<i64, Vec<Suggestion>>,
    expired_by_id: &HashMap<i64, &ExpiredItem>,
    store: i64,
) -> Decimal {
    let mut savings = Decimal::ZERO;
    for (item_id, suggestions) in ranked {
        if let Some(price) = best_price_in_store(suggestions, store) {
            if let Some(expired) = expired_by_id.get(item_id) {
                let original = expired.source_offer.price;
                if original > price {
                    savings += original - price;
                }
            }
        }
    }
    savings
}

/// Greedy set-cover with a savings guard over §4.4's algorithm. `ranked` must already be
/// sorted within each item by the scoring module's deterministic tie-break.
pub fn select_stores(
    expired_items: &[ExpiredItem],
    ranked: &HashMap<i64, Vec<Suggestion>>,
    config: &WizardConfig,
) -> StoreSelection {
    let expired_by_id: HashMap<i64, &ExpiredItem> = expired_items.iter().map(|e| (e.item.id, e)).collect();

    let mut candidate_stores: Vec<i64> = ranked
        .values()
        .flat_map(|suggestions| suggestions.iter().map(|s| s.offer.store_id))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    candidate_stores.sort_unstable();

    if candidate_stores.is_empty() {
        return StoreSelection { stores: Vec::new(), suggestions_by_item: empty_suggestions(ranked) };
    }

    // Step 1-2: pick S1 maximising coverage, tie-break by savings then store id.
    let s1 = candidate_stores
        .iter()
        .copied()
        .max_by(|&a, &b| {
            let cov_a = covered_items_for_store(ranked, a).len();
            let cov_b = covered_items_for_store(ranked, b).len();
            cov_a
                .cmp(&cov_b)
                .then_with(|| total_savings_for_store(ranked, &expired_by_id, a).cmp(&total_savings_for_store(ranked, &expired_by_id, b)))
                .then_with(|| b.cmp(&a)) // smaller store id wins ties, so reverse here
        })
        .expect("candidate_stores is non-empty");

    let mut chosen = vec![s1];

    if config.max_stores >= 2 {
        let s1_covered: HashSet<i64> = covered_items_for_store(ranked, s1).into_iter().collect();

        let mut best_s2: Option<(i64, Decimal, usize)> = None;

        for &candidate in &candidate_stores {
            if candidate == s1 {
                continue;
            }

            let covered_with_s2: HashSet<i64> = covered_items_for_store(ranked, candidate).into_iter().collect();
            let additional_items: usize = covered_with_s2.difference(&s1_covered).count();

            let single_store_cost: Decimal = s1_covered
                .iter()
                .filter_map(|item_id| ranked.get(item_id).and_then(|s| best_price_in_store(s, s1)))
                .sum();

            let union_covered: HashSet<i64> = s1_covered.union(&covered_with_s2).copied().collect();
            let two_store_cost: Decimal = union_covered
                .iter()
                .filter_map(|item_id| {
                    ranked.get(item_id).map(|suggestions| {
                        let best_s1 = best_price_in_store(suggestions, s1);
                        let best_s2 = best_price_in_store(suggestions, candidate);
                        match (best_s1, best_s2) {
                            (Some(a), Some(b)) => a.min(b),
                            (Some(a), None) => a,
                            (None, Some(b)) => b,
                            (None, None) => Decimal::ZERO,
                        }
                    })
                })
                .sum();

            let marginal_savings = (single_store_cost - two_store_cost).max(Decimal::ZERO);

            let admitted =
                additional_items as u32 >= config.min_additional_items || marginal_savings >= config.min_savings_eur;

            if !admitted {
                continue;
            }

            let better = match &best_s2 {
                None => true,
                Some((_, best_savings, best_additional)) => {
                    marginal_savings > *best_savings
                        || (marginal_savings == *best_savings && additional_items > *best_additional)
                        || (marginal_savings == *best_savings
                            && additional_items == *best_additional
                            && candidate < best_s2.unwrap().0)
                }
            };

            if better {
                best_s2 = Some((candidate, marginal_savings, additional_items));
            }
        }

        if let Some((s2, _, _)) = best_s2 {
            chosen.push(s2);
        }
    }

    let chosen_set: HashSet<i64> = chosen.iter().copied().collect();
    let mut suggestions_by_item = HashMap::new();
    for (item_id, suggestions) in ranked {
        let filtered: Vec<Suggestion> = suggestions
            .iter()
            .filter(|s| chosen_set.contains(&s.offer.store_id))
            .cloned()
            .collect();
        suggestions_by_item.insert(*item_id, filtered);
    }

    StoreSelection { stores: chosen, suggestions_by_item }
}

fn empty_suggestions(ranked: &HashMap<i64, Vec<Suggestion>>) -> HashMap<i64, Vec<Suggestion>> {
    ranked.keys().map(|id| (*id, Vec::new())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::wizard::test_support::{expired_item, offer, suggestion};
    use rust_decimal_macros::dec;

    const STORE_S: i64 = 1;
    const STORE_T: i64 = 2;

    fn config_with_min_additional_items(min_additional_items: u32) -> WizardConfig {
        WizardConfig {
            max_stores: 2,
            min_additional_items,
            min_savings_eur: dec!(5.00),
            start_rate_limit_per_hour: 5,
            session_ttl: std::time::Duration::from_secs(1800),
            session_ttl_absolute_cap: std::time::Duration::from_secs(7200),
            idempotency_ttl: std::time::Duration::from_secs(86400),
            candidates_per_item: 10,
        }
    }

    /// Items A, B, C are only covered by store S; item D is only covered by store T.
    fn fixture() -> (Vec<ExpiredItem>, HashMap<i64, Vec<Suggestion>>) {
        let a = expired_item(1, None, dec!(10.00), None, None);
        let b = expired_item(2, None, dec!(10.00), None, None);
        let c = expired_item(3, None, dec!(10.00), None, None);
        let d = expired_item(4, None, dec!(10.00), None, None);

        let mut ranked = HashMap::new();
        ranked.insert(1, vec![suggestion("a", offer(101, STORE_S, None, dec!(8.00), None, None))]);
        ranked.insert(2, vec![suggestion("b", offer(102, STORE_S, None, dec!(8.00), None, None))]);
        ranked.insert(3, vec![suggestion("c", offer(103, STORE_S, None, dec!(8.00), None, None))]);
        ranked.insert(4, vec![suggestion("d", offer(104, STORE_T, None, dec!(8.00), None, None))]);

        (vec![a, b, c, d], ranked)
    }

    #[test]
    fn second_store_rejected_when_coverage_and_savings_both_below_threshold() {
        let (items, ranked) = fixture();
        let config = config_with_min_additional_items(2);

        let selection = select_stores(&items, &ranked, &config);

        assert_eq!(selection.stores, vec![STORE_S]);
        assert!(selection.suggestions_by_item.get(&4).unwrap().is_empty());
    }

    #[test]
    fn second_store_admitted_when_coverage_threshold_lowered() {
        let (items, ranked) = fixture();
        let config = config_with_min_additional_items(1);

        let selection = select_stores(&items, &ranked, &config);

        let mut stores = selection.stores.clone();
        stores.sort_unstable();
        assert_eq!(stores, vec![STORE_S, STORE_T]);
        assert!(!selection.suggestions_by_item.get(&4).unwrap().is_empty());
    }

    #[test]
    fn max_stores_one_never_admits_a_second_store() {
        let (items, ranked) = fixture();
        let mut config = config_with_min_additional_items(1);
        config.max_stores = 1;

        let selection = select_stores(&items, &ranked, &config);

        assert_eq!(selection.stores, vec![STORE_S]);
    }

    #[test]
    fn no_candidates_returns_empty_selection_with_empty_suggestion_lists() {
        let items = vec![expired_item(1, None, dec!(10.00), None, None)];
        let mut ranked = HashMap::new();
        ranked.insert(1, Vec::new());
        let config = config_with_min_additional_items(2);

        let selection = select_stores(&items, &ranked, &config);

        assert!(selection.stores.is_empty());
        assert!(selection.suggestions_by_item.get(&1).unwrap().is_empty());
    }

    #[test]
    fn suggestions_are_filtered_to_chosen_stores_only() {
        let (items, ranked) = fixture();
        let config = config_with_min_additional_items(2);

        let selection = select_stores(&items, &ranked, &config);

        for (_, suggestions) in &selection.suggestions_by_item {
            for s in suggestions {
                assert!(selection.stores.contains(&s.offer.store_id));
            }
        }
    }
}
