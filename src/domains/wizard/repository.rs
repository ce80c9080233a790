//! Database-backed collaborators. Traits here are the "capability records" the orchestrator
//! is constructed with — substitutable for tests, never reached for through a global pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use super::error::WizardError;
use super::models::{ExpiredItem, FlyerOffer, ItemOrigin, ShoppingListItem};

#[async_trait]
pub trait ShoppingListRepository: Send + Sync {
    /// `None` if the list does not exist at all.
    async fn owner_of(&self, list_id: i64) -> Result<Option<i64>, WizardError>;

    /// Expired items for a list, joined to their source offer, ordered by `sort_order`.
    async fn detect_expired(&self, list_id: i64, now: DateTime<Utc>) -> Result<Vec<ExpiredItem>, WizardError>;

    async fn expired_item_count(&self, list_id: i64, now: DateTime<Utc>) -> Result<i64, WizardError>;

    /// `UPDATE shopping_lists SET is_locked = true ... WHERE is_locked = false`. Returns
    /// `true` iff this call acquired the lock.
    async fn try_acquire_lock(
        &self,
        list_id: i64,
        session_id: &str,
        lock_expires_at: DateTime<Utc>,
    ) -> Result<bool, WizardError>;

    async fn release_lock(&self, list_id: i64) -> Result<(), WizardError>;
}

#[async_trait]
pub trait FlyerOfferRepository: Send + Sync {
    async fn get(&self, offer_id: i64) -> Result<Option<FlyerOffer>, WizardError>;
    async fn get_many(&self, offer_ids: &[i64]) -> Result<Vec<FlyerOffer>, WizardError>;
}

/// One item's disposition as handed to the Commit Engine.
#[derive(Debug, Clone)]
pub enum CommitItem {
    Replace { item_id: i64, offer_id: i64, quantity: Decimal, unit: Option<String> },
    Remove { item_id: i64 },
    Keep { item_id: i64 },
}

pub struct CommitInput {
    pub list_id: i64,
    pub session_id: String,
    pub items: Vec<CommitItem>,
}

/// The Commit Engine's persistence surface: a single transaction doing snapshot inserts,
/// item mutations, and the lock release together. Modelled as one call rather than
/// per-statement trait methods so the transaction boundary cannot leak across calls.
#[async_trait]
pub trait CommitRepository: Send + Sync {
    async fn commit(&self, input: CommitInput) -> Result<CommitOutcome, WizardError>;
}

pub struct CommitOutcome {
    pub items_updated: u32,
    pub items_deleted: u32,
    pub total_estimated: Decimal,
}

#[derive(Clone)]
pub struct PgShoppingListRepository {
    pool: PgPool,
}

impl PgShoppingListRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShoppingListRepository for PgShoppingListRepository {
    async fn owner_of(&self, list_id: i64) -> Result<Option<i64>, WizardError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT user_id FROM shopping_lists WHERE id = $1")
            .bind(list_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(user_id,)| user_id))
    }

    async fn detect_expired(&self, list_id: i64, now: DateTime<Utc>) -> Result<Vec<ExpiredItem>, WizardError> {
        let rows: Vec<ExpiredItemRow> = sqlx::query_as(
            r#"
            SELECT
                sli.id AS item_id, sli.list_id AS item_list_id, sli.product_name AS item_product_name,
                sli.brand AS item_brand, sli.quantity AS item_quantity, sli.unit AS item_unit,
                sli.origin AS item_origin, sli.flyer_offer_id AS item_flyer_offer_id,
                sli.is_expired_flag AS item_is_expired_flag, sli.sort_order AS item_sort_order,
                fo.id AS offer_id, fo.store_id AS offer_store_id, fo.product_master_id AS offer_product_master_id,
                fo.name AS offer_name, fo.brand AS offer_brand, fo.price AS offer_price,
                fo.size_value AS offer_size_value, fo.size_unit AS offer_size_unit, fo.unit AS offer_unit,
                fo.valid_from AS offer_valid_from, fo.valid_to AS offer_valid_to, fo.updated_at AS offer_updated_at
            FROM shopping_list_items sli
            JOIN flyer_offers fo ON fo.id = sli.flyer_offer_id
            WHERE sli.list_id = $1 AND sli.origin = 'flyer' AND fo.valid_to <= $2
            ORDER BY sli.sort_order ASC
            "#,
        )
        .bind(list_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ExpiredItem::from).collect())
    }

    async fn expired_item_count(&self, list_id: i64, now: DateTime<Utc>) -> Result<i64, WizardError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM shopping_list_items sli
            JOIN flyer_offers fo ON fo.id = sli.flyer_offer_id
            WHERE sli.list_id = $1 AND sli.origin = 'flyer' AND fo.valid_to <= $2
            "#,
        )
        .bind(list_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn try_acquire_lock(
        &self,
        list_id: i64,
        session_id: &str,
        lock_expires_at: DateTime<Utc>,
    ) -> Result<bool, WizardError> {
        let result = sqlx::query(
            r#"
            UPDATE shopping_lists
            SET is_locked = true, wizard_session_id = $2, wizard_lock_expires_at = $3
            WHERE id = $1 AND is_locked = false
            "#,
        )
        .bind(list_id)
        .bind(session_id)
        .bind(lock_expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_lock(&self, list_id: i64) -> Result<(), WizardError> {
        sqlx::query(
            r#"
            UPDATE shopping_lists
            SET is_locked = false, wizard_session_id = NULL, wizard_lock_expires_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(list_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgFlyerOfferRepository {
    pool: PgPool,
}

impl PgFlyerOfferRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FlyerOfferRepository for PgFlyerOfferRepository {
    async fn get(&self, offer_id: i64) -> Result<Option<FlyerOffer>, WizardError> {
        let row: Option<FlyerOfferRow> = sqlx::query_as(
            r#"
            SELECT id, store_id, product_master_id, name, brand, price, size_value, size_unit,
                   unit, valid_from, valid_to, updated_at
            FROM flyer_offers WHERE id = $1
            "#,
        )
        .bind(offer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn get_many(&self, offer_ids: &[i64]) -> Result<Vec<FlyerOffer>, WizardError> {
        let rows: Vec<FlyerOfferRow> = sqlx::query_as(
            r#"
            SELECT id, store_id, product_master_id, name, brand, price, size_value, size_unit,
                   unit, valid_from, valid_to, updated_at
            FROM flyer_offers WHERE id = ANY($1)
            "#,
        )
        .bind(offer_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(Clone)]
pub struct PgCommitRepository {
    pool: PgPool,
}

impl PgCommitRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommitRepository for PgCommitRepository {
    async fn commit(&self, input: CommitInput) -> Result<CommitOutcome, WizardError> {
        let mut tx = self.pool.begin().await?;

        // Re-assert the lock is held by this session before touching anything.
        let locked: Option<(Option<String>,)> =
            sqlx::query_as("SELECT wizard_session_id FROM shopping_lists WHERE id = $1 FOR UPDATE")
                .bind(input.list_id)
                .fetch_optional(&mut *tx)
                .await?;

        match locked {
            Some((Some(ref held_by),)) if held_by == &input.session_id => {}
            _ => {
                tx.rollback().await.ok();
                return Err(WizardError::conflict("list lock is no longer held by this session"));
            }
        }

        let mut items_updated = 0u32;
        let mut items_deleted = 0u32;
        let mut total_estimated = Decimal::ZERO;

        for item in &input.items {
            match item {
                CommitItem::Replace { item_id, offer_id, quantity, unit } => {
                    let offer: FlyerOfferRow = sqlx::query_as(
                        r#"
                        SELECT id, store_id, product_master_id, name, brand, price, size_value,
                               size_unit, unit, valid_from, valid_to, updated_at
                        FROM flyer_offers WHERE id = $1
                        "#,
                    )
                    .bind(offer_id)
                    .fetch_one(&mut *tx)
                    .await?;

                    sqlx::query(
                        r#"
                        INSERT INTO offer_snapshots
                            (shopping_list_item_id, flyer_product_id, product_master_id, store_id,
                             product_name, brand, price, unit, size_value, size_unit, valid_from,
                             valid_to, estimated, snapshot_reason, created_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, false, 'wizard_migration', now())
                        "#,
                    )
                    .bind(item_id)
                    .bind(offer.id)
                    .bind(offer.product_master_id)
                    .bind(offer.store_id)
                    .bind(&offer.name)
                    .bind(&offer.brand)
                    .bind(offer.price)
                    .bind(&offer.unit)
                    .bind(offer.size_value)
                    .bind(&offer.size_unit)
                    .bind(offer.valid_from)
                    .bind(offer.valid_to)
                    .execute(&mut *tx)
                    .await?;

                    sqlx::query(
                        r#"
                        UPDATE shopping_list_items
                        SET flyer_offer_id = $2, origin = 'flyer', quantity = $3, unit = $4,
                            is_expired_flag = false
                        WHERE id = $1
                        "#,
                    )
                    .bind(item_id)
                    .bind(offer_id)
                    .bind(quantity)
                    .bind(unit)
                    .execute(&mut *tx)
                    .await?;

                    total_estimated += offer.price * quantity;
                    items_updated += 1;
                }
                CommitItem::Remove { item_id } => {
                    sqlx::query("DELETE FROM shopping_list_items WHERE id = $1")
                        .bind(item_id)
                        .execute(&mut *tx)
                        .await?;
                    items_deleted += 1;
                }
                CommitItem::Keep { .. } => {}
            }
        }

        sqlx::query(
            "UPDATE shopping_lists SET is_locked = false, wizard_session_id = NULL, wizard_lock_expires_at = NULL WHERE id = $1",
        )
        .bind(input.list_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(CommitOutcome { items_updated, items_deleted, total_estimated })
    }
}

// --- sqlx row shapes kept separate from the domain structs so column order/nullability can
// drift slightly from the in-memory model without touching every call site. ---

#[derive(sqlx::FromRow)]
struct FlyerOfferRow {
    id: i64,
    store_id: i64,
    product_master_id: Option<i64>,
    name: String,
    brand: Option<String>,
    price: Decimal,
    size_value: Option<Decimal>,
    size_unit: Option<String>,
    unit: Option<String>,
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

// --- in-memory test doubles ---


impl From<FlyerOfferRow> for FlyerOffer {
    fn from(row: FlyerOfferRow) -> Self {
        FlyerOffer {
            id: row.id,
            store_id: row.store_id,
            product_master_id: row.product_master_id,
            name: row.name,
            brand: row.brand,
            price: row.price,
            size_value: row.size_value,
            size_unit: row.size_unit,
            unit: row.unit,
            valid_from: row.valid_from,
            valid_to: row.valid_to,
            updated_at: row.updated_at,
        }
    }
}

/// Flattened projection of the `detect_expired` join — one row per (item, source offer) pair,
/// column-prefixed to avoid name clashes between the two joined tables.
#[derive(sqlx::FromRow)]
struct ExpiredItemRow {
    item_id: i64,
    item_list_id: i64,
    item_product_name: String,
    item_brand: Option<String>,
    item_quantity: Decimal,
    item_unit: Option<String>,
    item_origin: ItemOrigin,
    item_flyer_offer_id: Option<i64>,
    item_is_expired_flag: bool,
    item_sort_order: i32,
    offer_id: i64,
    offer_store_id: i64,
    offer_product_master_id: Option<i64>,
    offer_name: String,
    offer_brand: Option<String>,
    offer_price: Decimal,
    offer_size_value: Option<Decimal>,
    offer_size_unit: Option<String>,
    offer_unit: Option<String>,
    offer_valid_from: DateTime<Utc>,
    offer_valid_to: DateTime<Utc>,
    offer_updated_at: DateTime<Utc>,
}

impl From<ExpiredItemRow> for ExpiredItem {
    fn from(row: ExpiredItemRow) -> Self {
        ExpiredItem {
            item: ShoppingListItem {
                id: row.item_id,
                list_id: row.item_list_id,
                product_name: row.item_product_name,
                brand: row.item_brand,
                quantity: row.item_quantity,
                unit: row.item_unit,
                origin: row.item_origin,
                flyer_offer_id: row.item_flyer_offer_id,
                is_expired_flag: row.item_is_expired_flag,
                sort_order: row.item_sort_order,
            },
            source_offer: FlyerOffer {
                id: row.offer_id,
                store_id: row.offer_store_id,
                product_master_id: row.offer_product_master_id,
                name: row.offer_name,
                brand: row.offer_brand,
                price: row.offer_price,
                size_value: row.offer_size_value,
                size_unit: row.offer_size_unit,
                unit: row.offer_unit,
                valid_from: row.offer_valid_from,
                valid_to: row.offer_valid_to,
                updated_at: row.offer_updated_at,
            },
        }
    }
}
