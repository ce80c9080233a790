//! Core data shapes for the migration wizard. These are design types, not a literal mirror
//! of any single table — `ShoppingListItem` and `FlyerOffer` in particular are the wizard's
//! own read view over tables it does not own the full schema of.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ItemOrigin {
    Flyer,
    FreeText,
}

/// A shopping-list item as the wizard needs to see it. `flyer_offer_id`/`brand` etc. are only
/// meaningful when `origin == Flyer`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ShoppingListItem {
    pub id: i64,
    pub list_id: i64,
    pub product_name: String,
    pub brand: Option<String>,
    pub quantity: Decimal,
    pub unit: Option<String>,
    pub origin: ItemOrigin,
    pub flyer_offer_id: Option<i64>,
    pub is_expired_flag: bool,
    pub sort_order: i32,
}

/// A concrete priced offer, owned by the (out-of-scope) flyer ingestion pipeline. Never
/// mutated by the wizard.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FlyerOffer {
    pub id: i64,
    pub store_id: i64,
    pub product_master_id: Option<i64>,
    pub name: String,
    pub brand: Option<String>,
    pub price: Decimal,
    pub size_value: Option<Decimal>,
    pub size_unit: Option<String>,
    pub unit: Option<String>,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An expired list item joined with the offer that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiredItem {
    pub item: ShoppingListItem,
    pub source_offer: FlyerOffer,
}

/// A candidate pulled from the fuzzy search collaborator, before scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateOffer {
    pub offer: FlyerOffer,
    pub same_brand: bool,
    pub name_similarity: f64,
    pub brand_similarity: f64,
}

/// Per-factor score contribution, summing to `total`. Kept separate from `total` so clients
/// can render a breakdown if they want to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    pub brand: f64,
    pub store: f64,
    pub size: f64,
    pub price: f64,
    pub total: f64,
}

/// A scored, ranked candidate surfaced to the user as a possible replacement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub suggestion_id: String,
    pub offer: FlyerOffer,
    pub breakdown: ScoreBreakdown,
    pub confidence: f64,
    pub explanation: String,
}

/// A per-item decision recorded during the session. `REPLACE` carries the id of one of the
/// suggestions persisted for that item at the time of the decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    Replace { suggestion_id: String },
    Keep,
    Remove,
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Replace { .. } => "REPLACE",
            Decision::Keep => "KEEP",
            Decision::Remove => "REMOVE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Cancelled,
    Expired,
}

impl SessionStatus {
    pub fn as_metric_label(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "IN_PROGRESS",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Cancelled => "CANCELLED",
            SessionStatus::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::InProgress)
    }
}

/// The ephemeral wizard session, serialized whole into the session store. `version` is the
/// monotonic counter the CAS primitive guards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardSession {
    pub session_id: String,
    pub user_id: i64,
    pub list_id: i64,
    pub status: SessionStatus,
    pub version: u64,
    /// Max `updated_at` across every offer referenced by a suggestion at start time; used to
    /// detect dataset drift between `startWizard` and `confirmWizard`.
    pub dataset_version: DateTime<Utc>,
    pub expired_items: Vec<ExpiredItem>,
    pub suggestions_by_item: HashMap<i64, Vec<Suggestion>>,
    pub selected_stores: Vec<i64>,
    pub decisions_by_item: HashMap<i64, Decision>,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl WizardSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::InProgress && now >= self.expires_at
    }

    /// The status a reader should observe, folding TTL elapse into `EXPIRED` without
    /// requiring an explicit write.
    pub fn effective_status(&self, now: DateTime<Utc>) -> SessionStatus {
        if self.is_expired_at(now) {
            SessionStatus::Expired
        } else {
            self.status
        }
    }
}

/// Result of a successful `confirmWizard`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmResult {
    pub items_updated: u32,
    pub items_deleted: u32,
    pub store_count: u32,
    pub total_estimated: Decimal,
}
