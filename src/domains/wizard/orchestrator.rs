//! The state machine coordinating wizard session lifecycle. Constructed from capability
//! traits (repositories, search client, session store, clock) rather than concrete pools,
//! expressed as a struct of `Arc<dyn Trait>` handles so every collaborator is substitutable
//! in tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::clock::Clock;
use super::commit;
use super::detector;
use super::error::WizardError;
use super::explanation;
use super::models::{
    ConfirmResult, Decision, ExpiredItem, ScoreBreakdown, SessionStatus, Suggestion, WizardSession,
};
use super::repository::{CommitRepository, FlyerOfferRepository, ShoppingListRepository};
use super::retriever;
use super::scoring;
use super::search_client::FuzzySearchClient;
use super::session_store::{CasResult, SessionStore};
use super::store_selector;
use crate::config::WizardConfig;
use crate::observability::{record_revalidation_error, record_session_status, record_suggestion_returned};

pub struct WizardOrchestrator {
    lists: Arc<dyn ShoppingListRepository>,
    offers: Arc<dyn FlyerOfferRepository>,
    commits: Arc<dyn CommitRepository>,
    search: Arc<dyn FuzzySearchClient>,
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    config: WizardConfig,
}

/// How long a just-completed/cancelled session's key is kept around so a retried idempotent
/// request can still observe the terminal state instead of `NOT_FOUND`.
const TERMINAL_RETENTION: Duration = Duration::from_secs(300);

impl WizardOrchestrator {
    pub fn new(
        lists: Arc<dyn ShoppingListRepository>,
        offers: Arc<dyn FlyerOfferRepository>,
        commits: Arc<dyn CommitRepository>,
        search: Arc<dyn FuzzySearchClient>,
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        config: WizardConfig,
    ) -> Self {
        Self { lists, offers, commits, search, sessions, clock, config }
    }

    fn capped_ttl(&self, started_at: DateTime<Utc>) -> Duration {
        let now = self.clock.now();
        let elapsed_since_start = (now - started_at).to_std().unwrap_or(Duration::ZERO);
        let remaining_budget = self.config.session_ttl_absolute_cap.saturating_sub(elapsed_since_start);
        self.config.session_ttl.min(remaining_budget)
    }

    async fn load_live_session(&self, session_id: &str) -> Result<WizardSession, WizardError> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| WizardError::not_found("session"))?;

        if session.is_expired_at(self.clock.now()) {
            return Err(WizardError::Expired);
        }
        if session.status != SessionStatus::InProgress {
            return Err(WizardError::Expired);
        }

        Ok(session)
    }

    /// A session id is bearer-secret in transit but we still refuse cross-user access rather
    /// than trust opacity alone. Reported as `NOT_FOUND`, not `FORBIDDEN`: spec.md §6 does not
    /// list `FORBIDDEN` among this operation's errors, and "session belonging to someone else"
    /// should look indistinguishable from "session does not exist" to the caller.
    fn check_owner(session: &WizardSession, user_id: i64) -> Result<(), WizardError> {
        if session.user_id != user_id {
            return Err(WizardError::not_found("session"));
        }
        Ok(())
    }

    /// Writes `session` back via CAS, retrying once on conflict per §4.7's "concurrent writers
    /// observe Conflict and retry once; a second conflict surfaces CONFLICT" rule. `mutate`
    /// re-applies the caller's change to whatever the freshest copy turns out to be, so a
    /// retry never silently drops the in-flight decision.
    async fn write_with_retry(
        &self,
        session_id: &str,
        mut mutate: impl FnMut(&mut WizardSession),
    ) -> Result<WizardSession, WizardError> {
        for attempt in 0..2 {
            let mut current = self
                .sessions
                .get(session_id)
                .await?
                .ok_or_else(|| WizardError::not_found("session"))?;

            let expected_version = current.version;
            mutate(&mut current);
            current.version = expected_version + 1;
            current.last_updated_at = self.clock.now();
            current.expires_at = current.last_updated_at + chrono::Duration::from_std(self.capped_ttl(current.started_at)).unwrap();

            let ttl = self.capped_ttl(current.started_at);
            match self.sessions.compare_and_swap(&current, expected_version, ttl).await? {
                CasResult::Ok => return Ok(current),
                CasResult::Conflict if attempt == 0 => continue,
                CasResult::Conflict => return Err(WizardError::conflict("concurrent session update")),
            }
        }
        unreachable!("loop always returns within two attempts")
    }

    // ------------------------------------------------------------------
    // startWizard
    // ------------------------------------------------------------------

    pub async fn start_wizard(
        &self,
        user_id: i64,
        list_id: i64,
        preferred_stores: &HashSet<i64>,
        idempotency_key: Option<&str>,
    ) -> Result<WizardSession, WizardError> {
        if let Some(key) = idempotency_key {
            if let Some(cached) = self.sessions.lookup_idempotency("start_wizard", key).await? {
                let session: WizardSession = serde_json::from_value(cached)
                    .map_err(|e| WizardError::internal(format!("corrupt idempotency record: {e}")))?;
                return Ok(session);
            }
        }

        let owner = self
            .lists
            .owner_of(list_id)
            .await?
            .ok_or_else(|| WizardError::not_found("shopping list"))?;
        if owner != user_id {
            return Err(WizardError::forbidden("list does not belong to this user"));
        }

        let session_id = Uuid::new_v4().to_string();
        let now = self.clock.now();
        let lock_expires_at = now + chrono::Duration::from_std(self.config.session_ttl_absolute_cap).unwrap();

        let acquired = self.lists.try_acquire_lock(list_id, &session_id, lock_expires_at).await?;
        if !acquired {
            return Err(WizardError::conflict("migration in progress"));
        }

        let session = match self.build_session(user_id, list_id, &session_id, preferred_stores, now).await {
            Ok(session) => session,
            Err(e) => {
                // Retriever/search failures (or anything else mid-build) must not leave the
                // list silently locked forever; the caller can retry once the lock clears.
                self.lists.release_lock(list_id).await.ok();
                return Err(e);
            }
        };

        if session.expired_items.is_empty() {
            self.lists.release_lock(list_id).await?;
            // Stored briefly so a follow-up `wizardSession` query still observes `COMPLETED`
            // instead of `NOT_FOUND` right after the call returns.
            self.sessions.put(&session, TERMINAL_RETENTION).await?;
            record_session_status(session.status.as_metric_label());
            if let Some(key) = idempotency_key {
                self.remember(key, "start_wizard", &session).await?;
            }
            return Ok(session);
        }

        self.sessions.put(&session, self.capped_ttl(session.started_at)).await?;
        record_session_status(session.status.as_metric_label());

        if let Some(key) = idempotency_key {
            self.remember(key, "start_wizard", &session).await?;
        }

        Ok(session)
    }

    async fn remember(&self, key: &str, scope: &str, session: &WizardSession) -> Result<(), WizardError> {
        let value = serde_json::to_value(session)
            .map_err(|e| WizardError::internal(format!("failed to serialize session: {e}")))?;
        self.sessions.remember_idempotency(scope, key, value, self.config.idempotency_ttl).await
    }

    async fn build_session(
        &self,
        user_id: i64,
        list_id: i64,
        session_id: &str,
        preferred_stores: &HashSet<i64>,
        now: DateTime<Utc>,
    ) -> Result<WizardSession, WizardError> {
        let expired_items = detector::detect(self.lists.as_ref(), list_id, now).await?;

        if expired_items.is_empty() {
            return Ok(WizardSession {
                session_id: session_id.to_string(),
                user_id,
                list_id,
                status: SessionStatus::Completed,
                version: 0,
                dataset_version: now,
                expired_items: Vec::new(),
                suggestions_by_item: HashMap::new(),
                selected_stores: Vec::new(),
                decisions_by_item: HashMap::new(),
                started_at: now,
                expires_at: now,
                last_updated_at: now,
            });
        }

        let mut ranked: HashMap<i64, Vec<Suggestion>> = HashMap::new();
        let mut max_updated_at = expired_items
            .iter()
            .map(|e| e.source_offer.updated_at)
            .max()
            .unwrap_or(now);

        for item in &expired_items {
            let suggestions = self.rank_suggestions(item, preferred_stores).await?;
            for s in &suggestions {
                max_updated_at = max_updated_at.max(s.offer.updated_at);
                record_suggestion_returned(s.breakdown.brand > 0.0);
            }
            ranked.insert(item.item.id, suggestions);
        }

        let selection = store_selector::select_stores(&expired_items, &ranked, &self.config);

        Ok(WizardSession {
            session_id: session_id.to_string(),
            user_id,
            list_id,
            status: SessionStatus::InProgress,
            version: 0,
            dataset_version: max_updated_at,
            expired_items,
            suggestions_by_item: selection.suggestions_by_item,
            selected_stores: selection.stores,
            decisions_by_item: HashMap::new(),
            started_at: now,
            expires_at: now + chrono::Duration::from_std(self.capped_ttl(now)).unwrap(),
            last_updated_at: now,
        })
    }

    async fn rank_suggestions(
        &self,
        item: &ExpiredItem,
        preferred_stores: &HashSet<i64>,
    ) -> Result<Vec<Suggestion>, WizardError> {
        let candidates = retriever::candidates(self.search.as_ref(), self.clock.as_ref(), item, &self.config).await?;

        let mut scored: Vec<(ScoreBreakdown, _)> = candidates
            .into_iter()
            .map(|candidate| (scoring::score(item, &candidate, preferred_stores), candidate))
            .filter(|(breakdown, _)| scoring::is_retained(breakdown))
            .collect();

        scored.sort_by_key(|(breakdown, candidate)| scoring::rank_key(breakdown, candidate));

        Ok(scored
            .into_iter()
            .map(|(breakdown, candidate)| {
                let confidence = scoring::confidence(&breakdown);
                let explanation = explanation::explain(
                    item,
                    &candidate.offer.brand,
                    &candidate.offer.size_unit,
                    item.source_offer.price,
                    candidate.offer.price,
                );
                Suggestion {
                    suggestion_id: Uuid::new_v4().to_string(),
                    offer: candidate.offer,
                    breakdown,
                    confidence,
                    explanation,
                }
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // decideItem
    // ------------------------------------------------------------------

    pub async fn decide_item(
        &self,
        user_id: i64,
        session_id: &str,
        item_id: i64,
        decision: Decision,
        idempotency_key: Option<&str>,
    ) -> Result<WizardSession, WizardError> {
        if let Some(key) = idempotency_key {
            if let Some(cached) = self.sessions.lookup_idempotency("decide_item", key).await? {
                return serde_json::from_value(cached)
                    .map_err(|e| WizardError::internal(format!("corrupt idempotency record: {e}")));
            }
        }

        // Validate against a freshly loaded snapshot before entering the CAS loop, so
        // validation errors don't masquerade as CAS conflicts.
        let snapshot = self.load_live_session(session_id).await?;
        Self::check_owner(&snapshot, user_id)?;
        self.validate_decision(&snapshot, item_id, &decision)?;

        let updated = self
            .write_with_retry(session_id, |session| {
                session.decisions_by_item.insert(item_id, decision.clone());
            })
            .await?;

        if let Some(key) = idempotency_key {
            self.remember(key, "decide_item", &updated).await?;
        }

        Ok(updated)
    }

    fn validate_decision(&self, session: &WizardSession, item_id: i64, decision: &Decision) -> Result<(), WizardError> {
        if !session.expired_items.iter().any(|e| e.item.id == item_id) {
            return Err(WizardError::validation(format!("item {item_id} is not part of this session")));
        }

        if let Decision::Replace { suggestion_id } = decision {
            let known = session
                .suggestions_by_item
                .get(&item_id)
                .map(|suggestions| suggestions.iter().any(|s| &s.suggestion_id == suggestion_id))
                .unwrap_or(false);
            if !known {
                return Err(WizardError::validation(format!(
                    "suggestion {suggestion_id} is not a persisted suggestion for item {item_id}"
                )));
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // applyBulkDecisions
    // ------------------------------------------------------------------

    pub async fn apply_bulk_decisions(
        &self,
        user_id: i64,
        session_id: &str,
        idempotency_key: Option<&str>,
    ) -> Result<WizardSession, WizardError> {
        if let Some(key) = idempotency_key {
            if let Some(cached) = self.sessions.lookup_idempotency("apply_bulk", key).await? {
                return serde_json::from_value(cached)
                    .map_err(|e| WizardError::internal(format!("corrupt idempotency record: {e}")));
            }
        }

        let snapshot = self.load_live_session(session_id).await?;
        Self::check_owner(&snapshot, user_id)?;

        let updated = self
            .write_with_retry(session_id, |session| {
                for item in &session.expired_items {
                    if session.decisions_by_item.contains_key(&item.item.id) {
                        continue;
                    }
                    if let Some(top) = session.suggestions_by_item.get(&item.item.id).and_then(|s| s.first()) {
                        session
                            .decisions_by_item
                            .insert(item.item.id, Decision::Replace { suggestion_id: top.suggestion_id.clone() });
                    }
                }

                self.reconcile_bulk_store_cap(session);
            })
            .await?;

        if let Some(key) = idempotency_key {
            self.remember(key, "apply_bulk", &updated).await?;
        }

        Ok(updated)
    }

    /// If bulk-filling decisions pushed the union of chosen stores past `max_stores`, re-run
    /// the selector constrained to the suggestions currently on offer, and revert to
    /// no-decision (not `REPLACE`) any item whose chosen suggestion fell outside the new set —
    /// per §4.7's explicit instruction not to silently force a `REPLACE` that no longer fits.
    fn reconcile_bulk_store_cap(&self, session: &mut WizardSession) {
        let chosen_stores: HashSet<i64> = session
            .decisions_by_item
            .iter()
            .filter_map(|(item_id, decision)| match decision {
                Decision::Replace { suggestion_id } => session
                    .suggestions_by_item
                    .get(item_id)
                    .and_then(|suggestions| suggestions.iter().find(|s| &s.suggestion_id == suggestion_id))
                    .map(|s| s.offer.store_id),
                _ => None,
            })
            .collect();

        if chosen_stores.len() as u32 <= self.config.max_stores {
            return;
        }

        let selection = store_selector::select_stores(&session.expired_items, &session.suggestions_by_item, &self.config);
        session.selected_stores = selection.stores;
        session.suggestions_by_item = selection.suggestions_by_item;

        let still_allowed: HashSet<String> = session
            .suggestions_by_item
            .values()
            .flatten()
            .map(|s| s.suggestion_id.clone())
            .collect();

        session.decisions_by_item.retain(|_, decision| match decision {
            Decision::Replace { suggestion_id } => still_allowed.contains(suggestion_id),
            _ => true,
        });
    }

    // ------------------------------------------------------------------
    // confirmWizard
    // ------------------------------------------------------------------

    pub async fn confirm_wizard(
        &self,
        user_id: i64,
        session_id: &str,
        idempotency_key: Option<&str>,
    ) -> Result<ConfirmResult, WizardError> {
        if let Some(key) = idempotency_key {
            if let Some(cached) = self.sessions.lookup_idempotency("confirm", key).await? {
                return serde_json::from_value(cached)
                    .map_err(|e| WizardError::internal(format!("corrupt idempotency record: {e}")));
            }
        }

        let session = self.load_live_session(session_id).await?;
        Self::check_owner(&session, user_id)?;

        self.revalidate(&session).await?;

        let result = commit::commit(self.commits.as_ref(), &session).await?;

        self.write_with_retry(session_id, |session| {
            session.status = SessionStatus::Completed;
        })
        .await?;

        record_session_status(SessionStatus::Completed.as_metric_label());

        if let Some(key) = idempotency_key {
            let value = serde_json::to_value(&result)
                .map_err(|e| WizardError::internal(format!("failed to serialize result: {e}")))?;
            self.sessions.remember_idempotency("confirm", key, value, self.config.idempotency_ttl).await?;
        }

        let sessions = self.sessions.clone();
        let sid = session_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(TERMINAL_RETENTION).await;
            let _ = sessions.delete(&sid).await;
        });

        Ok(result)
    }

    /// §4.7's revalidation pass: every `REPLACE` decision's referenced offer must still be
    /// valid, unchanged in price, and the dataset must not have drifted since session start.
    async fn revalidate(&self, session: &WizardSession) -> Result<(), WizardError> {
        let targets = commit::replace_targets(session);
        if targets.is_empty() {
            return Ok(());
        }

        let now = self.clock.now();
        let mut stale_items = Vec::new();

        for (item_id, (suggestion_id, offer_id)) in &targets {
            let suggestion = session
                .suggestions_by_item
                .get(item_id)
                .and_then(|suggestions| suggestions.iter().find(|s| &s.suggestion_id == suggestion_id));

            let Some(suggestion) = suggestion else {
                stale_items.push(*item_id);
                continue;
            };

            match self.offers.get(*offer_id).await? {
                Some(offer) if offer.valid_to > now && prices_match(offer.price, suggestion.offer.price) => {}
                _ => stale_items.push(*item_id),
            }
        }

        let current_offer_ids: Vec<i64> = targets.values().map(|(_, offer_id)| *offer_id).collect();
        let current_offers = self.offers.get_many(&current_offer_ids).await?;
        let current_max_updated_at = current_offers.iter().map(|o| o.updated_at).max();
        if let Some(current_max) = current_max_updated_at {
            if current_max > session.dataset_version && stale_items.is_empty() {
                // Dataset drifted but no individual offer failed validity/price checks we
                // already ran; still a staleness condition per §4.7's dataset_version clause.
                // Surface every replaced item as offending, since we cannot attribute the
                // drift to one specific item.
                stale_items.extend(targets.keys().copied());
            }
        }

        if !stale_items.is_empty() {
            stale_items.sort_unstable();
            stale_items.dedup();
            record_revalidation_error("stale_data");
            return Err(WizardError::StaleData { item_ids: stale_items });
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // cancelWizard
    // ------------------------------------------------------------------

    pub async fn cancel_wizard(
        &self,
        user_id: i64,
        session_id: &str,
        idempotency_key: Option<&str>,
    ) -> Result<(), WizardError> {
        if let Some(key) = idempotency_key {
            if self.sessions.lookup_idempotency("cancel", key).await?.is_some() {
                return Ok(());
            }
        }

        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| WizardError::not_found("session"))?;
        Self::check_owner(&session, user_id)?;

        if session.status == SessionStatus::InProgress {
            self.lists.release_lock(session.list_id).await?;
        }

        self.write_with_retry(session_id, |session| {
            session.status = SessionStatus::Cancelled;
        })
        .await?;

        record_session_status(SessionStatus::Cancelled.as_metric_label());

        if let Some(key) = idempotency_key {
            self.sessions
                .remember_idempotency("cancel", key, serde_json::json!({ "ok": true }), self.config.idempotency_ttl)
                .await?;
        }

        let sessions = self.sessions.clone();
        let sid = session_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(TERMINAL_RETENTION).await;
            let _ = sessions.delete(&sid).await;
        });

        Ok(())
    }

    // ------------------------------------------------------------------
    // wizardSession (query)
    // ------------------------------------------------------------------

    pub async fn wizard_session(&self, user_id: i64, session_id: &str) -> Result<WizardSession, WizardError> {
        let mut session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| WizardError::not_found("session"))?;
        Self::check_owner(&session, user_id)?;

        session.status = session.effective_status(self.clock.now());
        Ok(session)
    }

    pub async fn expired_item_count(&self, list_id: i64) -> Result<i64, WizardError> {
        detector::expired_item_count(self.lists.as_ref(), list_id, self.clock.now()).await
    }
}

fn prices_match(a: rust_decimal::Decimal, b: rust_decimal::Decimal) -> bool {
    (a - b).abs() <= rust_decimal::Decimal::new(1, 3)
}

/// Integration-style tests wiring the real orchestrator against in-memory collaborators.
/// Each test plays out one of the end-to-end scenarios the session lifecycle is meant to
/// support; unlike the per-module unit tests elsewhere in this domain, these exercise the
/// whole `start -> decide -> confirm`/`cancel` sequence through the public API.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::wizard::clock::FixedClock;
    use crate::domains::wizard::models::FlyerOffer;
    use crate::domains::wizard::repository::mock::{MockCommitRepository, MockFlyerOfferRepository, MockShoppingListRepository};
    use crate::domains::wizard::search_client::mock::MockFuzzySearchClient;
    use crate::domains::wizard::search_client::SearchHit;
    use crate::domains::wizard::session_store::mock::MockSessionStore;
    use crate::domains::wizard::test_support::{expired_item_named, offer, wizard_config, wizard_session};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn hit(o: FlyerOffer, name_similarity: f64, brand_similarity: f64) -> SearchHit {
        SearchHit { offer: o, name_similarity, brand_similarity, combined_similarity: name_similarity }
    }

    /// Bundles one set of in-memory collaborators so a test can construct orchestrators that
    /// share state but observe different points in time, by handing each its own `FixedClock`.
    struct Harness {
        lists: Arc<MockShoppingListRepository>,
        offers: Arc<MockFlyerOfferRepository>,
        commits: Arc<MockCommitRepository>,
        search: Arc<MockFuzzySearchClient>,
        sessions: Arc<MockSessionStore>,
        config: WizardConfig,
    }

    impl Harness {
        fn new(lists: MockShoppingListRepository, offers: MockFlyerOfferRepository, config: WizardConfig) -> Self {
            Self {
                lists: Arc::new(lists),
                offers: Arc::new(offers),
                commits: Arc::new(MockCommitRepository::new(1, 0, Decimal::ZERO)),
                search: Arc::new(MockFuzzySearchClient::new()),
                sessions: Arc::new(MockSessionStore::new()),
                config,
            }
        }

        fn at(&self, now: DateTime<Utc>) -> WizardOrchestrator {
            WizardOrchestrator::new(
                self.lists.clone(),
                self.offers.clone(),
                self.commits.clone(),
                self.search.clone(),
                self.sessions.clone(),
                Arc::new(FixedClock(now)),
                self.config.clone(),
            )
        }
    }

    // Scenario 1: happy path, single-store migration.
    #[tokio::test]
    async fn scenario_happy_path_single_store_migration() {
        let now = Utc::now();
        let item = expired_item_named(1, "Pieno Gerimas", Some("Dvaro"), dec!(2.50), None, None);
        let lists = MockShoppingListRepository::new().with_owner(1, 42).with_expired_items(1, vec![item]);
        let offer_10 = offer(10, 1, Some("Dvaro"), dec!(2.00), None, None);
        let offers = MockFlyerOfferRepository::new(vec![offer_10.clone()]);

        let harness = Harness::new(lists, offers, wizard_config(10));
        harness.search.set_hits("Dvaro pieno gerimas", vec![hit(offer_10.clone(), 0.9, 1.0)]).await;
        harness.search.set_hits("pieno gerimas", vec![hit(offer_10, 0.9, 1.0)]).await;

        let orchestrator = harness.at(now);

        let session = orchestrator.start_wizard(42, 1, &HashSet::new(), None).await.unwrap();
        assert_eq!(session.status, SessionStatus::InProgress);
        assert_eq!(session.expired_items.len(), 1);
        let suggestions = session.suggestions_by_item.get(&1).expect("item 1 should have suggestions");
        assert!(!suggestions.is_empty());
        let suggestion_id = suggestions[0].suggestion_id.clone();

        let after_decide = orchestrator
            .decide_item(42, &session.session_id, 1, Decision::Replace { suggestion_id }, None)
            .await
            .unwrap();
        assert!(matches!(after_decide.decisions_by_item.get(&1), Some(Decision::Replace { .. })));

        let result = orchestrator.confirm_wizard(42, &session.session_id, None).await.unwrap();
        assert_eq!(result.store_count, 1);

        let calls = harness.commits.calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].list_id, 1);
    }

    // Scenario 2: two-store split, gated by the store selector's admission threshold.
    #[tokio::test]
    async fn scenario_two_store_split_depends_on_admission_threshold() {
        const STORE_S: i64 = 1;
        const STORE_T: i64 = 2;

        let setup = |min_additional_items: u32| {
            let items = vec![
                expired_item_named(1, "Pienas", None, dec!(10.00), None, None),
                expired_item_named(2, "Duona", None, dec!(10.00), None, None),
            ];
            let lists = MockShoppingListRepository::new().with_owner(1, 42).with_expired_items(1, items);
            let offers = MockFlyerOfferRepository::new(vec![]);
            let mut config = wizard_config(10);
            config.min_additional_items = min_additional_items;

            let harness = Harness::new(lists, offers, config);
            (harness, STORE_S, STORE_T)
        };

        // Restrictive threshold: the second store's one extra item isn't enough, single store wins.
        let (harness, store_s, _) = setup(2);
        harness.search.set_hits("pienas", vec![hit(offer(101, STORE_S, None, dec!(8.00), None, None), 0.9, 0.0)]).await;
        harness.search.set_hits("duona", vec![hit(offer(201, STORE_T, None, dec!(8.00), None, None), 0.9, 0.0)]).await;
        let orchestrator = harness.at(Utc::now());
        let session = orchestrator.start_wizard(42, 1, &HashSet::new(), None).await.unwrap();
        assert_eq!(session.selected_stores, vec![store_s]);

        // Lowered threshold: one extra item is enough, both stores are admitted.
        let (harness, _, _) = setup(1);
        harness.search.set_hits("pienas", vec![hit(offer(102, STORE_S, None, dec!(8.00), None, None), 0.9, 0.0)]).await;
        harness.search.set_hits("duona", vec![hit(offer(202, STORE_T, None, dec!(8.00), None, None), 0.9, 0.0)]).await;
        let orchestrator = harness.at(Utc::now());
        let session = orchestrator.start_wizard(42, 1, &HashSet::new(), None).await.unwrap();
        let mut stores = session.selected_stores.clone();
        stores.sort_unstable();
        assert_eq!(stores, vec![STORE_S, STORE_T]);
    }

    // Scenario 3: confirming after the chosen offer's price drifted must fail with STALE_DATA
    // and must never reach the commit collaborator.
    #[tokio::test]
    async fn scenario_stale_confirm_rejects_price_drift_without_committing() {
        let now = Utc::now();
        let item = expired_item_named(1, "Pieno Gerimas", Some("Dvaro"), dec!(2.50), None, None);
        let lists = MockShoppingListRepository::new().with_owner(1, 42).with_expired_items(1, vec![item]);
        // The offer repository (consulted at confirm time) now disagrees with the price the
        // suggestion was built from at start time.
        let drifted_offer = offer(10, 1, Some("Dvaro"), dec!(2.90), None, None);
        let offers = MockFlyerOfferRepository::new(vec![drifted_offer]);

        let harness = Harness::new(lists, offers, wizard_config(10));
        let search_offer = offer(10, 1, Some("Dvaro"), dec!(2.00), None, None);
        harness.search.set_hits("Dvaro pieno gerimas", vec![hit(search_offer.clone(), 0.9, 1.0)]).await;
        harness.search.set_hits("pieno gerimas", vec![hit(search_offer, 0.9, 1.0)]).await;

        let orchestrator = harness.at(now);
        let session = orchestrator.start_wizard(42, 1, &HashSet::new(), None).await.unwrap();
        let suggestion_id = session.suggestions_by_item.get(&1).unwrap()[0].suggestion_id.clone();
        orchestrator.decide_item(42, &session.session_id, 1, Decision::Replace { suggestion_id }, None).await.unwrap();

        let err = orchestrator.confirm_wizard(42, &session.session_id, None).await.unwrap_err();
        match err {
            WizardError::StaleData { item_ids } => assert_eq!(item_ids, vec![1]),
            other => panic!("expected StaleData, got {other:?}"),
        }

        assert!(harness.commits.calls.lock().await.is_empty());
        let reloaded = orchestrator.wizard_session(42, &session.session_id).await.unwrap();
        assert_eq!(reloaded.status, SessionStatus::InProgress);
    }

    // Scenario 4: repeating startWizard with the same idempotency key must return the exact
    // same session rather than building a new one or re-acquiring the lock.
    #[tokio::test]
    async fn scenario_idempotent_start_returns_the_same_session() {
        let now = Utc::now();
        let item = expired_item_named(1, "Duona", None, dec!(2.00), None, None);
        let lists = MockShoppingListRepository::new().with_owner(1, 42).with_expired_items(1, vec![item]);
        let offers = MockFlyerOfferRepository::new(vec![]);
        let harness = Harness::new(lists, offers, wizard_config(10));
        harness.search.set_hits("duona", vec![hit(offer(30, 1, None, dec!(1.50), None, None), 0.9, 0.0)]).await;

        let orchestrator = harness.at(now);
        let first = orchestrator.start_wizard(42, 1, &HashSet::new(), Some("idem-key-1")).await.unwrap();
        let second = orchestrator.start_wizard(42, 1, &HashSet::new(), Some("idem-key-1")).await.unwrap();

        assert_eq!(first.session_id, second.session_id);
        assert_eq!(first.expires_at, second.expires_at);
        assert!(harness.lists.is_locked(1).await);
    }

    // Scenario 5: a second startWizard call while the first session is still in progress must
    // be rejected with CONFLICT; cancelling the first session frees the list for a new one.
    #[tokio::test]
    async fn scenario_concurrent_start_conflicts_until_the_holder_cancels() {
        let now = Utc::now();
        let item = expired_item_named(1, "Duona", None, dec!(2.00), None, None);
        let lists = MockShoppingListRepository::new().with_owner(5, 42).with_expired_items(5, vec![item]);
        let offers = MockFlyerOfferRepository::new(vec![]);
        let harness = Harness::new(lists, offers, wizard_config(10));
        harness.search.set_hits("duona", vec![hit(offer(40, 1, None, dec!(1.50), None, None), 0.9, 0.0)]).await;

        let orchestrator = harness.at(now);
        let first = orchestrator.start_wizard(42, 5, &HashSet::new(), None).await.unwrap();

        let conflict = orchestrator.start_wizard(42, 5, &HashSet::new(), None).await.unwrap_err();
        assert!(matches!(conflict, WizardError::Conflict { .. }));

        orchestrator.cancel_wizard(42, &first.session_id, None).await.unwrap();
        assert!(!harness.lists.is_locked(5).await);

        let third = orchestrator.start_wizard(42, 5, &HashSet::new(), None).await.unwrap();
        assert_ne!(first.session_id, third.session_id);
    }

    // Scenario 6: a session left untouched past its TTL reads back as EXPIRED, confirming it
    // is rejected, but cancelling it still releases the list lock.
    #[tokio::test]
    async fn scenario_ttl_expiry_blocks_confirm_but_cancel_still_releases_the_lock() {
        let started_at = Utc::now() - chrono::Duration::minutes(40);
        let item = expired_item_named(1, "Duona", None, dec!(2.00), None, None);
        let mut session = wizard_session("sess-ttl", 42, 9, vec![item]);
        session.started_at = started_at;
        session.expires_at = started_at + chrono::Duration::minutes(30);

        let lists = MockShoppingListRepository::new().with_owner(9, 42);
        let offers = MockFlyerOfferRepository::new(vec![]);
        let harness = Harness::new(lists, offers, wizard_config(10));
        harness.lists.try_acquire_lock(9, &session.session_id, session.expires_at).await.unwrap();
        harness.sessions.put(&session, std::time::Duration::from_secs(1800)).await.unwrap();

        // Observed well after expiry.
        let later = started_at + chrono::Duration::minutes(35);
        let orchestrator = harness.at(later);

        let read_back = orchestrator.wizard_session(42, &session.session_id).await.unwrap();
        assert_eq!(read_back.status, SessionStatus::Expired);

        let confirm_err = orchestrator.confirm_wizard(42, &session.session_id, None).await.unwrap_err();
        assert!(matches!(confirm_err, WizardError::Expired));

        orchestrator.cancel_wizard(42, &session.session_id, None).await.unwrap();
        assert!(!harness.lists.is_locked(9).await);
    }
}
