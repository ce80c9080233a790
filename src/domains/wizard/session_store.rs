//! Ephemeral session persistence: TTLed key-value storage for the serialized `WizardSession`,
//! guarded by compare-and-swap, plus a write-once idempotency surface.
//!
//! Uses `redis`/`AsyncCommands` directly (no ORM over Redis), expressed as an explicit
//! lookup-then-execute-then-record sequence rather than a generic response-replay decorator.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;

use super::error::WizardError;
use super::models::WizardSession;

fn session_key(session_id: &str) -> String {
    format!("wizard:session:{session_id}")
}

fn idempotency_key(scope: &str, key: &str) -> String {
    format!("wizard:idem:{scope}:{key}")
}

#[derive(Debug, PartialEq)]
pub enum CasResult {
    Ok,
    Conflict,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn put(&self, session: &WizardSession, ttl: Duration) -> Result<(), WizardError>;
    async fn get(&self, session_id: &str) -> Result<Option<WizardSession>, WizardError>;
    async fn compare_and_swap(
        &self,
        session: &WizardSession,
        expected_version: u64,
        ttl: Duration,
    ) -> Result<CasResult, WizardError>;
    async fn delete(&self, session_id: &str) -> Result<(), WizardError>;

    /// `result` is pre-serialized by the caller so the trait stays object-safe (the
    /// orchestrator holds this behind `Arc<dyn SessionStore>`); callers round-trip through
    /// `serde_json::Value` themselves.
    async fn remember_idempotency(
        &self,
        scope: &str,
        key: &str,
        result: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), WizardError>;

    async fn lookup_idempotency(&self, scope: &str, key: &str) -> Result<Option<serde_json::Value>, WizardError>;
}

/// Redis-backed implementation. CAS is a single Lua script (`EVAL`) so the
/// check-version-then-set is indivisible over the multiplexed connection shared by every
/// concurrent request — the same technique `shared::RedisService::compare_and_swap` uses,
/// specialised here to operate on the already-deserialized `version` field.
#[derive(Clone)]
pub struct RedisSessionStore {
    redis: shared::RedisService,
}

impl RedisSessionStore {
    pub fn new(redis: shared::RedisService) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn put(&self, session: &WizardSession, ttl: Duration) -> Result<(), WizardError> {
        self.redis
            .set_ex(&session_key(&session.session_id), session, ttl.as_secs())
            .await
            .map_err(WizardError::from)
    }

    async fn get(&self, session_id: &str) -> Result<Option<WizardSession>, WizardError> {
        self.redis.get(&session_key(session_id)).await.map_err(WizardError::from)
    }

    async fn compare_and_swap(
        &self,
        session: &WizardSession,
        expected_version: u64,
        ttl: Duration,
    ) -> Result<CasResult, WizardError> {
        let serialized = serde_json::to_string(session)
            .map_err(|e| WizardError::internal(format!("failed to serialize session: {e}")))?;

        let ok = self
            .redis
            .compare_and_swap(&session_key(&session.session_id), expected_version, &serialized, ttl.as_secs())
            .await?;

        Ok(if ok { CasResult::Ok } else { CasResult::Conflict })
    }

    async fn delete(&self, session_id: &str) -> Result<(), WizardError> {
        self.redis.del(&session_key(session_id)).await.map(|_| ()).map_err(WizardError::from)
    }

    async fn remember_idempotency(
        &self,
        scope: &str,
        key: &str,
        result: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), WizardError> {
        self.redis
            .set_ex(&idempotency_key(scope, key), &result, ttl.as_secs())
            .await
            .map_err(WizardError::from)
    }

    async fn lookup_idempotency(&self, scope: &str, key: &str) -> Result<Option<serde_json::Value>, WizardError> {
        self.redis.get(&idempotency_key(scope, key)).await.map_err(WizardError::from)
    }
}
