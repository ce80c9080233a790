//! Wizard-specific policy configuration, layered on top of `shared::Config`.
//!
//! These are the knobs the spec leaves as "policy, not pinned in tests": store-selector
//! admission thresholds, session TTLs, and the rate limit on session starts.

use std::env;
use std::time::Duration;

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_decimal(key: &str, default: &str) -> rust_decimal::Decimal {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| default.parse().expect("default decimal literal must parse"))
}

#[derive(Debug, Clone)]
pub struct WizardConfig {
    /// Maximum distinct stores a single migration plan may span.
    pub max_stores: u32,
    /// Additional items a second store must cover to be admitted on its own.
    pub min_additional_items: u32,
    /// Additional savings (EUR) a second store must yield to be admitted on its own.
    pub min_savings_eur: rust_decimal::Decimal,
    /// Session start attempts allowed per user per rolling hour.
    pub start_rate_limit_per_hour: u32,
    /// Base TTL granted to a session on creation and refreshed on every mutation.
    pub session_ttl: Duration,
    /// Hard ceiling on how far repeated mutations may extend a session's TTL.
    pub session_ttl_absolute_cap: Duration,
    /// Retention window for idempotency records.
    pub idempotency_ttl: Duration,
    /// How many candidates the retriever keeps per expired item after merge+dedup.
    pub candidates_per_item: usize,
}

impl WizardConfig {
    pub fn from_env() -> Self {
        Self {
            max_stores: env_u32("WIZARD_MAX_STORES", 2),
            min_additional_items: env_u32("WIZARD_MIN_ADDITIONAL_ITEMS", 2),
            min_savings_eur: env_decimal("WIZARD_MIN_SAVINGS_EUR", "5.00"),
            start_rate_limit_per_hour: env_u32("WIZARD_START_RATE_LIMIT_PER_HOUR", 5),
            session_ttl: Duration::from_secs(env_u64("WIZARD_SESSION_TTL_SECONDS", 30 * 60)),
            session_ttl_absolute_cap: Duration::from_secs(env_u64(
                "WIZARD_SESSION_TTL_ABSOLUTE_CAP_SECONDS",
                2 * 60 * 60,
            )),
            idempotency_ttl: Duration::from_secs(env_u64("WIZARD_IDEMPOTENCY_TTL_SECONDS", 24 * 60 * 60)),
            candidates_per_item: env_u32("WIZARD_CANDIDATES_PER_ITEM", 10) as usize,
        }
    }
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
