//! Background Expirer: a periodic pass that flags list items whose source offer has expired
//! and reclaims list locks left behind by sessions whose TTL elapsed mid-flight.
//!
//! Mirrors the teacher's scheduler shape (`tokio_cron_scheduler`, `Arc`-wrapped pool clones
//! captured by `Job::new_async` closures) but replaces the single daily cache-refresh pass
//! with two wizard-domain passes on their own cadences.

use sqlx::PgPool;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::observability::record_item_flagged;

/// Starts the scheduler and registers both wizard maintenance jobs. Runs for the lifetime
/// of the process; safe to run on multiple nodes since every write is a conditional `UPDATE`.
pub async fn start_wizard_expirer_scheduler(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
    let scheduler = JobScheduler::new().await?;
    let pool = Arc::new(pool);

    // Daily at 03:00 UTC: flag items whose source flyer offer has expired. Advisory only —
    // does not touch the item itself beyond the flag, per the detector's contract.
    let flag_job = {
        let pool = Arc::clone(&pool);
        Job::new_async("0 0 3 * * *", move |_uuid, _lock| {
            let pool = Arc::clone(&pool);
            Box::pin(async move {
                if let Err(e) = flag_expired_items(&pool).await {
                    tracing::error!("wizard expirer: flagging pass failed: {}", e);
                }
            })
        })?
    };

    // Every 5 minutes: reclaim list locks left by sessions whose Redis-side TTL already
    // lapsed. The session key itself is gone by then (Redis expired it); the list row is
    // the only durable trace of the lock, so release is driven entirely from there.
    let lock_sweep_job = {
        let pool = Arc::clone(&pool);
        Job::new_async("0 */5 * * * *", move |_uuid, _lock| {
            let pool = Arc::clone(&pool);
            Box::pin(async move {
                if let Err(e) = sweep_stale_locks(&pool).await {
                    tracing::error!("wizard expirer: lock sweep failed: {}", e);
                }
            })
        })?
    };

    scheduler.add(flag_job).await?;
    scheduler.add(lock_sweep_job).await?;
    scheduler.start().await?;

    tracing::info!("wizard expirer scheduler started (daily flag pass, 5-minute lock sweep)");

    Ok(())
}

async fn flag_expired_items(pool: &PgPool) -> Result<(), sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE shopping_list_items sli
        SET is_expired_flag = true
        FROM flyer_offers fo
        WHERE sli.origin = 'flyer'
          AND sli.flyer_offer_id = fo.id
          AND fo.valid_to <= now()
          AND sli.is_expired_flag = false
        "#,
    )
    .execute(pool)
    .await?;

    let flagged = result.rows_affected();
    if flagged > 0 {
        for _ in 0..flagged {
            record_item_flagged("past_validity");
        }
        tracing::info!(flagged, "wizard expirer: flagged expired list items");
    }

    Ok(())
}

async fn sweep_stale_locks(pool: &PgPool) -> Result<(), sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE shopping_lists
        SET is_locked = false, wizard_session_id = NULL, wizard_lock_expires_at = NULL
        WHERE is_locked = true
          AND wizard_lock_expires_at IS NOT NULL
          AND wizard_lock_expires_at <= now()
        "#,
    )
    .execute(pool)
    .await?;

    let released = result.rows_affected();
    if released > 0 {
        tracing::info!(released, "wizard expirer: released stale list locks");
    }

    Ok(())
}
