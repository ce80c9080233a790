//! Human-readable rationale for a surfaced suggestion. Advisory text only — never parsed
//! back by any other component.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::models::{ExpiredItem, Suggestion};

fn brand_relation(item: &ExpiredItem, suggestion_brand: &Option<String>) -> &'static str {
    match (&item.item.brand, suggestion_brand) {
        (Some(a), Some(b)) if a.eq_ignore_ascii_case(b) => "Same brand",
        (Some(_), Some(_)) => "Different brand",
        _ => "Similar product",
    }
}

fn size_relation(item: &ExpiredItem, candidate_size_unit: &Option<String>) -> &'static str {
    match (&item.source_offer.size_unit, candidate_size_unit) {
        (Some(a), Some(b)) if a.eq_ignore_ascii_case(b) => "similar size",
        _ => "different size",
    }
}

fn price_delta_phrase(original_price: Decimal, candidate_price: Decimal) -> String {
    let delta = candidate_price - original_price;
    let abs_delta = delta.abs();

    if abs_delta < Decimal::new(1, 2) {
        return "same price".to_string();
    }

    let delta_f64 = abs_delta.to_f64().unwrap_or(0.0);

    if delta < Decimal::ZERO {
        if abs_delta < Decimal::ONE {
            format!("€{:.2} cheaper", delta_f64)
        } else {
            let pct = percent_of(abs_delta, original_price);
            format!("{}% cheaper (€{:.2})", pct, delta_f64)
        }
    } else if delta > Decimal::ONE {
        let pct = percent_of(abs_delta, original_price);
        format!("{}% more expensive (€{:.2})", pct, delta_f64)
    } else {
        format!("€{:.2} more expensive", delta_f64)
    }
}

fn percent_of(part: Decimal, whole: Decimal) -> i64 {
    if whole <= Decimal::ZERO {
        return 0;
    }
    ((part / whole) * Decimal::from(100))
        .round()
        .to_i64()
        .unwrap_or(0)
}

/// Builds the explanation string for one suggestion against its source item.
pub fn explain(item: &ExpiredItem, suggestion_offer_brand: &Option<String>, suggestion_offer_size_unit: &Option<String>, original_price: Decimal, candidate_price: Decimal) -> String {
    let parts = [
        brand_relation(item, suggestion_offer_brand).to_string(),
        size_relation(item, suggestion_offer_size_unit).to_string(),
        price_delta_phrase(original_price, candidate_price),
    ];
    parts.join(", ")
}

/// Convenience wrapper used once a `Suggestion` already exists (confirm-time re-explain, or
/// for tests exercising the full pipeline).
pub fn explain_suggestion(item: &ExpiredItem, suggestion: &Suggestion) -> String {
    explain(
        item,
        &suggestion.offer.brand,
        &suggestion.offer.size_unit,
        item.source_offer.price,
        suggestion.offer.price,
    )
}

/// Maps a confidence scalar to the coarse label clients may want for a quick glance.
pub fn confidence_label(confidence: f64) -> &'static str {
    if confidence >= 0.8 {
        "high"
    } else if confidence >= 0.5 {
        "medium"
    } else {
        "low"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::wizard::test_support::expired_item;
    use rust_decimal_macros::dec;

    #[test]
    fn price_within_a_cent_reads_as_same_price() {
        assert_eq!(price_delta_phrase(dec!(10.00), dec!(10.00)), "same price");
        assert_eq!(price_delta_phrase(dec!(10.00), dec!(10.005)), "same price");
    }

    #[test]
    fn small_savings_reads_as_euro_amount() {
        assert_eq!(price_delta_phrase(dec!(10.00), dec!(9.50)), "€0.50 cheaper");
    }

    #[test]
    fn large_savings_reads_as_percentage_with_euro_amount() {
        assert_eq!(price_delta_phrase(dec!(10.00), dec!(7.00)), "30% cheaper (€3.00)");
    }

    #[test]
    fn small_price_increase_reads_as_euro_amount() {
        assert_eq!(price_delta_phrase(dec!(10.00), dec!(10.50)), "€0.50 more expensive");
    }

    #[test]
    fn large_price_increase_reads_as_percentage_with_euro_amount() {
        assert_eq!(price_delta_phrase(dec!(10.00), dec!(13.00)), "30% more expensive (€3.00)");
    }

    #[test]
    fn brand_relation_matches_case_insensitively() {
        let item = expired_item(1, Some("Dvaro"), dec!(10.00), None, None);
        assert_eq!(brand_relation(&item, &Some("dvaro".to_string())), "Same brand");
        assert_eq!(brand_relation(&item, &Some("Rokiskio".to_string())), "Different brand");
        assert_eq!(brand_relation(&item, &None), "Similar product");

        let brandless = expired_item(2, None, dec!(10.00), None, None);
        assert_eq!(brand_relation(&brandless, &Some("Dvaro".to_string())), "Similar product");
    }

    #[test]
    fn size_relation_matches_unit_case_insensitively() {
        let item = expired_item(1, None, dec!(10.00), Some("ml"), None);
        assert_eq!(size_relation(&item, &Some("ML".to_string())), "similar size");
        assert_eq!(size_relation(&item, &Some("g".to_string())), "different size");
        assert_eq!(size_relation(&item, &None), "different size");
    }

    #[test]
    fn confidence_label_boundaries() {
        assert_eq!(confidence_label(0.8), "high");
        assert_eq!(confidence_label(0.79), "medium");
        assert_eq!(confidence_label(0.5), "medium");
        assert_eq!(confidence_label(0.49), "low");
    }

    #[test]
    fn explain_joins_brand_size_and_price_segments() {
        let item = expired_item(1, Some("Dvaro"), dec!(10.00), Some("ml"), None);
        let text = explain(&item, &Some("Dvaro".to_string()), &Some("ml".to_string()), dec!(10.00), dec!(7.00));
        assert_eq!(text, "Same brand, similar size, 30% cheaper (€3.00)");
    }
}
