//! Thin wrapper over `ShoppingListRepository` exposing the two read operations the rest of
//! the wizard (and the plain shopping-list query path) need. No I/O of its own: everything is
//! delegated to the repository so this stays trivially testable against a mock.

use chrono::{DateTime, Utc};

use super::error::WizardError;
use super::models::ExpiredItem;
use super::repository::ShoppingListRepository;

/// Items whose source offer has expired, ordered by `sort_order` for presentation stability.
/// An empty result is valid and must not fail.
pub async fn detect(
    repo: &dyn ShoppingListRepository,
    list_id: i64,
    now: DateTime<Utc>,
) -> Result<Vec<ExpiredItem>, WizardError> {
    repo.detect_expired(list_id, now).await
}

/// Reusable beyond the wizard itself — the shopping-list item query path surfaces this count
/// without needing to start a wizard session.
pub async fn expired_item_count(
    repo: &dyn ShoppingListRepository,
    list_id: i64,
    now: DateTime<Utc>,
) -> Result<i64, WizardError> {
    repo.expired_item_count(list_id, now).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::wizard::repository::mock::MockShoppingListRepository;
    use crate::domains::wizard::test_support::expired_item;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn detect_returns_empty_vec_for_a_list_with_no_expired_items() {
        let repo = MockShoppingListRepository::new().with_owner(1, 42);
        let result = detect(&repo, 1, Utc::now()).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn detect_delegates_straight_through_to_the_repository() {
        let items = vec![expired_item(1, Some("Dvaro"), dec!(2.00), None, None)];
        let repo = MockShoppingListRepository::new().with_expired_items(1, items.clone());

        let result = detect(&repo, 1, Utc::now()).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].item.id, items[0].item.id);
    }

    #[tokio::test]
    async fn expired_item_count_matches_detect_length() {
        let items = vec![
            expired_item(1, None, dec!(2.00), None, None),
            expired_item(2, None, dec!(3.00), None, None),
        ];
        let repo = MockShoppingListRepository::new().with_expired_items(7, items);

        let count = expired_item_count(&repo, 7, Utc::now()).await.unwrap();
        assert_eq!(count, 2);
    }
}
