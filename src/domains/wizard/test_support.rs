//! Fixture builders shared by the wizard domain's unit tests. Not compiled outside `cfg(test)`.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use std::collections::HashMap;

use super::models::{ExpiredItem, FlyerOffer, ItemOrigin, ScoreBreakdown, SessionStatus, ShoppingListItem, Suggestion, WizardSession};
use crate::config::WizardConfig;

/// A `FlyerOffer` valid for the next 7 days, as a live candidate would be.
pub fn offer(id: i64, store_id: i64, brand: Option<&str>, price: Decimal, size_unit: Option<&str>, size_value: Option<Decimal>) -> FlyerOffer {
    let now = Utc::now();
    FlyerOffer {
        id,
        store_id,
        product_master_id: None,
        name: format!("Offer {id}"),
        brand: brand.map(str::to_string),
        price,
        size_value,
        size_unit: size_unit.map(str::to_string),
        unit: size_unit.map(str::to_string),
        valid_from: now - Duration::days(1),
        valid_to: now + Duration::days(7),
        updated_at: now,
    }
}

/// An offer that lapsed yesterday, as the source of an already-expired list item.
pub fn lapsed_offer(id: i64, store_id: i64, brand: Option<&str>, price: Decimal, size_unit: Option<&str>, size_value: Option<Decimal>) -> FlyerOffer {
    let now = Utc::now();
    FlyerOffer {
        valid_from: now - Duration::days(14),
        valid_to: now - Duration::days(1),
        updated_at: now - Duration::days(1),
        ..offer(id, store_id, brand, price, size_unit, size_value)
    }
}

/// An `ExpiredItem` whose source offer carries the given brand/price/size and lapsed yesterday.
pub fn expired_item(item_id: i64, brand: Option<&str>, price: Decimal, size_unit: Option<&str>, size_value: Option<Decimal>) -> ExpiredItem {
    let source_offer = lapsed_offer(9_000 + item_id, 1, brand, price, size_unit, size_value);
    ExpiredItem {
        item: ShoppingListItem {
            id: item_id,
            list_id: 1,
            product_name: format!("Item {item_id}"),
            brand: brand.map(str::to_string),
            quantity: Decimal::ONE,
            unit: size_unit.map(str::to_string),
            origin: ItemOrigin::Flyer,
            flyer_offer_id: Some(source_offer.id),
            is_expired_flag: true,
            sort_order: 0,
        },
        source_offer,
    }
}

/// Like `expired_item`, but with an explicit product name for retriever query assertions.
pub fn expired_item_named(
    item_id: i64,
    name: &str,
    brand: Option<&str>,
    price: Decimal,
    size_unit: Option<&str>,
    size_value: Option<Decimal>,
) -> ExpiredItem {
    let mut item = expired_item(item_id, brand, price, size_unit, size_value);
    item.item.product_name = name.to_string();
    item
}

/// A `WizardConfig` with deterministic policy defaults, independent of the process environment.
pub fn wizard_config(candidates_per_item: usize) -> WizardConfig {
    WizardConfig {
        max_stores: 2,
        min_additional_items: 2,
        min_savings_eur: Decimal::new(500, 2),
        start_rate_limit_per_hour: 5,
        session_ttl: std::time::Duration::from_secs(1800),
        session_ttl_absolute_cap: std::time::Duration::from_secs(7200),
        idempotency_ttl: std::time::Duration::from_secs(86400),
        candidates_per_item,
    }
}

/// A `Suggestion` wrapping the given offer, with an arbitrary but valid breakdown.
pub fn suggestion(tag: &str, offer: FlyerOffer) -> Suggestion {
    let breakdown = ScoreBreakdown { brand: 0.0, store: 0.0, size: 0.0, price: 1.0, total: 1.0 };
    Suggestion {
        suggestion_id: format!("sugg-{tag}-{}", offer.id),
        offer,
        breakdown,
        confidence: 0.25,
        explanation: "fixture suggestion".to_string(),
    }
}

/// A fresh `InProgress` session with a 30-minute TTL and no decisions recorded yet. Fields are
/// public on `WizardSession` so callers can mutate the result directly to suit each test.
pub fn wizard_session(session_id: &str, user_id: i64, list_id: i64, expired_items: Vec<ExpiredItem>) -> WizardSession {
    let now = Utc::now();
    WizardSession {
        session_id: session_id.to_string(),
        user_id,
        list_id,
        status: SessionStatus::InProgress,
        version: 1,
        dataset_version: now,
        expired_items,
        suggestions_by_item: HashMap::new(),
        selected_stores: Vec::new(),
        decisions_by_item: HashMap::new(),
        started_at: now,
        expires_at: now + Duration::minutes(30),
        last_updated_at: now,
    }
}
