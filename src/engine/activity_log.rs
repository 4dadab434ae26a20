// Activity log data access
// Validates activity log input and delegates to the storage backend

use std::sync::Arc;

use tracing::debug;

use crate::engine::storage::TerritoryStorage;
use crate::models::{ActivityLog, ActivityLogDraft};
use crate::{Result, TerritoryError};

/// How many activity logs a single checkout/address pair may hold
pub const DEFAULT_LOGS_PER_ADDRESS: usize = 3;

/// Data-access object for the `activitylog` table
///
/// Every method validates its input first; a draft that fails validation
/// never reaches the storage.
#[derive(Clone)]
pub struct ActivityLogs {
    storage: Arc<dyn TerritoryStorage>,
    per_address_limit: Option<usize>,
}

impl ActivityLogs {
    pub fn new(storage: Arc<dyn TerritoryStorage>) -> Self {
        Self {
            storage,
            per_address_limit: Some(DEFAULT_LOGS_PER_ADDRESS),
        }
    }

    /// Change the per checkout/address limit; `None` disables it
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.per_address_limit = limit;
        self
    }

    /// Insert a new activity log and return its id
    ///
    /// The limit check and the insert are two statements, so two concurrent
    /// creates for the same pair can both pass the check.
    pub async fn create(&self, draft: ActivityLogDraft) -> Result<i64> {
        let new_log = draft.validate_for_create()?;

        if let Some(limit) = self.per_address_limit {
            let existing = self
                .storage
                .count_activity_logs(new_log.checkout_id, new_log.address_id)
                .await?;
            if existing >= limit as i64 {
                return Err(TerritoryError::LimitReached(format!(
                    "checkout {} already has {} activity logs for address {}",
                    new_log.checkout_id, existing, new_log.address_id
                )));
            }
        }

        let id = self.storage.insert_activity_log(&new_log).await?;
        debug!(
            "Created activity log {} for checkout {} address {}",
            id, new_log.checkout_id, new_log.address_id
        );
        Ok(id)
    }

    /// Activity logs of a checkout, narrowed to one address when given
    pub async fn read(&self, checkout_id: i64, address_id: Option<i64>) -> Result<Vec<ActivityLog>> {
        if checkout_id <= 0 {
            return Err(TerritoryError::Validation("checkout id is required".to_string()));
        }
        self.storage
            .activity_logs(checkout_id, address_id.filter(|id| *id > 0))
            .await
    }

    /// A single activity log, `None` when no row has this id
    pub async fn read_one(&self, id: i64) -> Result<Option<ActivityLog>> {
        if id <= 0 {
            return Err(TerritoryError::Validation("activity log id is required".to_string()));
        }
        self.storage.activity_log(id).await
    }

    /// Overwrite every column of an existing activity log
    ///
    /// Moving a log to another checkout/address pair is held to the same
    /// limit as `create`, with the same race between check and write.
    pub async fn update(&self, draft: ActivityLogDraft) -> Result<()> {
        let log = draft.validate_for_update()?;
        let current = self
            .storage
            .activity_log(log.id)
            .await?
            .ok_or_else(|| TerritoryError::NotFound(format!("activity log {}", log.id)))?;

        let moves = (current.checkout_id, current.address_id) != (log.checkout_id, log.address_id);
        if let (true, Some(limit)) = (moves, self.per_address_limit) {
            // the row is not yet counted under its new pair
            let existing = self
                .storage
                .count_activity_logs(log.checkout_id, log.address_id)
                .await?;
            if existing >= limit as i64 {
                return Err(TerritoryError::LimitReached(format!(
                    "checkout {} already has {} activity logs for address {}",
                    log.checkout_id, existing, log.address_id
                )));
            }
        }

        let affected = self.storage.update_activity_log(&log).await?;
        debug!("Updated activity log {} ({} rows)", log.id, affected);
        Ok(())
    }

    /// Remove an activity log and report how many rows went away
    pub async fn delete(&self, id: i64) -> Result<u64> {
        if id <= 0 {
            return Err(TerritoryError::Validation("activity log id is required".to_string()));
        }
        self.storage.delete_activity_log(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::storage::testing::CountingStorage;
    use crate::engine::storage::InMemoryStorage;

    fn draft(checkout_id: i64, address_id: i64) -> ActivityLogDraft {
        ActivityLogDraft {
            checkout_id: Some(checkout_id),
            address_id: Some(address_id),
            value: Some("NH".to_string()),
            publisher_id: Some(3),
            ..Default::default()
        }
    }

    fn logs() -> ActivityLogs {
        ActivityLogs::new(Arc::new(InMemoryStorage::new()))
    }

    #[tokio::test]
    async fn test_create_then_read_one_round_trip() {
        let logs = logs();
        let input = ActivityLogDraft {
            timestamp: Some(1_525_132_800),
            notes: Some("come back Saturday".to_string()),
            ..draft(1, 10)
        };

        let id = logs.create(input.clone()).await.unwrap();
        let row = logs.read_one(id).await.unwrap().expect("row exists");

        assert_eq!(row.id, id);
        assert_eq!(Some(row.checkout_id), input.checkout_id);
        assert_eq!(Some(row.address_id), input.address_id);
        assert_eq!(Some(row.value), input.value);
        assert_eq!(row.publisher_id, input.publisher_id);
        assert_eq!(row.timestamp, input.timestamp);
        assert_eq!(Some(row.notes), input.notes);
    }

    #[tokio::test]
    async fn test_notes_default_to_empty_string() {
        let logs = logs();
        let id = logs.create(draft(1, 10)).await.unwrap();
        let row = logs.read_one(id).await.unwrap().unwrap();
        assert_eq!(row.notes, "");
    }

    #[tokio::test]
    async fn test_read_by_checkout_and_address() {
        let logs = logs();
        logs.create(draft(1, 10)).await.unwrap();
        logs.create(draft(1, 11)).await.unwrap();
        logs.create(draft(2, 10)).await.unwrap();

        let both = logs.read(1, Some(10)).await.unwrap();
        assert_eq!(both.len(), 1);
        assert!(both.iter().all(|l| l.checkout_id == 1 && l.address_id == 10));

        let checkout_only = logs.read(1, None).await.unwrap();
        assert_eq!(checkout_only.len(), 2);
        assert!(checkout_only.iter().all(|l| l.checkout_id == 1));

        assert!(logs.read(99, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_one_missing_is_none() {
        assert_eq!(logs().read_one(404).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_limit_per_checkout_and_address() {
        let logs = logs();
        for _ in 0..DEFAULT_LOGS_PER_ADDRESS {
            logs.create(draft(1, 10)).await.unwrap();
        }

        let fourth = logs.create(draft(1, 10)).await;
        assert!(matches!(fourth, Err(TerritoryError::LimitReached(_))));

        // A different address on the same checkout is unaffected
        assert!(logs.create(draft(1, 11)).await.is_ok());
    }

    #[tokio::test]
    async fn test_limit_can_be_disabled() {
        let logs = logs().with_limit(None);
        for _ in 0..5 {
            logs.create(draft(1, 10)).await.unwrap();
        }
        assert_eq!(logs.read(1, Some(10)).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_update_overwrites_every_column() {
        let logs = logs();
        let id = logs
            .create(ActivityLogDraft {
                notes: Some("first".to_string()),
                ..draft(1, 10)
            })
            .await
            .unwrap();

        logs.update(ActivityLogDraft {
            id: Some(id),
            value: Some("CA".to_string()),
            territory_id: Some(8),
            publisher_id: None,
            ..draft(1, 10)
        })
        .await
        .unwrap();

        let row = logs.read_one(id).await.unwrap().unwrap();
        assert_eq!(row.value, "CA");
        assert_eq!(row.territory_id, Some(8));
        assert_eq!(row.publisher_id, None);
        assert_eq!(row.notes, "");
        assert_eq!(row.timestamp, None);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let logs = logs();
        let id = logs.create(draft(1, 10)).await.unwrap();
        assert_eq!(logs.delete(id).await.unwrap(), 1);
        assert_eq!(logs.delete(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_of_missing_row_is_not_found() {
        let logs = logs();
        let missing = ActivityLogDraft {
            id: Some(404),
            ..draft(1, 10)
        };
        assert!(matches!(logs.update(missing).await, Err(TerritoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_cannot_move_a_log_into_a_full_pair() {
        let logs = logs();
        for _ in 0..DEFAULT_LOGS_PER_ADDRESS {
            logs.create(draft(1, 10)).await.unwrap();
        }
        let id = logs.create(draft(1, 11)).await.unwrap();

        let moved = logs
            .update(ActivityLogDraft {
                id: Some(id),
                ..draft(1, 10)
            })
            .await;
        assert!(matches!(moved, Err(TerritoryError::LimitReached(_))));

        assert_eq!(logs.read(1, Some(10)).await.unwrap().len(), DEFAULT_LOGS_PER_ADDRESS);
        let kept = logs.read_one(id).await.unwrap().unwrap();
        assert_eq!(kept.address_id, 11);
    }

    #[tokio::test]
    async fn test_update_within_a_full_pair_is_allowed() {
        let logs = logs();
        let mut ids = Vec::new();
        for _ in 0..DEFAULT_LOGS_PER_ADDRESS {
            ids.push(logs.create(draft(1, 10)).await.unwrap());
        }

        logs.update(ActivityLogDraft {
            id: Some(ids[0]),
            value: Some("CA".to_string()),
            ..draft(1, 10)
        })
        .await
        .unwrap();
        assert_eq!(logs.read_one(ids[0]).await.unwrap().unwrap().value, "CA");

        // Moving into a pair with room left is fine too
        logs.update(ActivityLogDraft {
            id: Some(ids[1]),
            ..draft(1, 12)
        })
        .await
        .unwrap();
        assert_eq!(logs.read(1, Some(12)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_input_issues_no_query() {
        let storage = Arc::new(CountingStorage::new());
        let logs = ActivityLogs::new(storage.clone());

        let no_value = ActivityLogDraft {
            value: None,
            ..draft(1, 10)
        };
        assert!(matches!(logs.create(no_value).await, Err(TerritoryError::Validation(_))));
        assert!(matches!(logs.update(draft(1, 10)).await, Err(TerritoryError::Validation(_))));
        assert!(matches!(logs.read(0, None).await, Err(TerritoryError::Validation(_))));
        assert!(matches!(logs.delete(-1).await, Err(TerritoryError::Validation(_))));

        assert_eq!(storage.calls(), 0);
    }

    #[tokio::test]
    async fn test_metacharacters_stored_verbatim() {
        let logs = logs();
        let tricky = "it's '); DELETE FROM activitylog; --".to_string();
        let id = logs
            .create(ActivityLogDraft {
                value: Some(tricky.clone()),
                notes: Some(tricky.clone()),
                ..draft(1, 10)
            })
            .await
            .unwrap();

        let row = logs.read_one(id).await.unwrap().unwrap();
        assert_eq!(row.value, tricky);
        assert_eq!(row.notes, tricky);
    }
}
