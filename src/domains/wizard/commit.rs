//! Translates a session's recorded decisions into the single-transaction write (snapshot
//! inserts, item mutations, lock release) and reports the aggregate result.
//!
//! The transaction itself lives in `PgCommitRepository::commit` (repository.rs), kept as one
//! trait call so the transaction boundary never leaks across an `.await` point the orchestrator
//! controls. This module is the thin translation and observability layer on top of that call.

use rust_decimal::Decimal;
use std::collections::HashMap;

use super::error::WizardError;
use super::models::{ConfirmResult, Decision, WizardSession};
use super::repository::{CommitInput, CommitItem, CommitRepository};
use crate::observability::{record_decision, record_selected_store_count};

/// Builds the `CommitItem` list from a session's decisions. An unset decision at confirm
/// time means the user is leaving the item as-is, so it is treated as `Keep`.
fn build_commit_items(session: &WizardSession) -> Vec<CommitItem> {
    session
        .expired_items
        .iter()
        .map(|expired| {
            let item_id = expired.item.id;
            match session.decisions_by_item.get(&item_id) {
                Some(Decision::Replace { suggestion_id }) => {
                    let suggestion = session
                        .suggestions_by_item
                        .get(&item_id)
                        .and_then(|suggestions| suggestions.iter().find(|s| &s.suggestion_id == suggestion_id));

                    match suggestion {
                        Some(suggestion) => CommitItem::Replace {
                            item_id,
                            offer_id: suggestion.offer.id,
                            quantity: expired.item.quantity,
                            unit: suggestion.offer.unit.clone(),
                        },
                        // Revalidation in the orchestrator should already catch a missing
                        // suggestion; this is a last-resort fallback, never the expected path.
                        None => CommitItem::Keep { item_id },
                    }
                }
                Some(Decision::Remove) => CommitItem::Remove { item_id },
                Some(Decision::Keep) | None => CommitItem::Keep { item_id },
            }
        })
        .collect()
}

fn decision_label(session: &WizardSession, item_id: i64) -> &'static str {
    match session.decisions_by_item.get(&item_id) {
        Some(d) => d.label(),
        None => "KEEP",
    }
}

/// Runs the commit transaction and folds the outcome into the API-facing `ConfirmResult`.
/// Also records the per-item decision counters and the selected-store-count histogram, since
/// those are only knowable once a session actually reaches commit.
pub async fn commit(repo: &dyn CommitRepository, session: &WizardSession) -> Result<ConfirmResult, WizardError> {
    let items = build_commit_items(session);

    for expired in &session.expired_items {
        record_decision(decision_label(session, expired.item.id));
    }
    record_selected_store_count("COMPLETED", session.selected_stores.len());

    let input = CommitInput { list_id: session.list_id, session_id: session.session_id.clone(), items };

    let outcome = repo.commit(input).await?;

    let total_estimated: Decimal = outcome.total_estimated;

    Ok(ConfirmResult {
        items_updated: outcome.items_updated,
        items_deleted: outcome.items_deleted,
        store_count: session.selected_stores.len() as u32,
        total_estimated,
    })
}

/// Re-validation support data: for every `REPLACE` decision, the suggestion it refers to and
/// the offer id to re-read. Pulled out of `commit` so the orchestrator can run a revalidation
/// pass before handing off to `commit` itself.
pub fn replace_targets(session: &WizardSession) -> HashMap<i64, (String, i64)> {
    session
        .decisions_by_item
        .iter()
        .filter_map(|(item_id, decision)| match decision {
            Decision::Replace { suggestion_id } => {
                let offer_id = session
                    .suggestions_by_item
                    .get(item_id)
                    .and_then(|suggestions| suggestions.iter().find(|s| &s.suggestion_id == suggestion_id))
                    .map(|s| s.offer.id)?;
                Some((*item_id, (suggestion_id.clone(), offer_id)))
            }
            _ => None,
        })
        .collect()
}
