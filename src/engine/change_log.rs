// Address change-log data access (read only)

use std::sync::Arc;

use crate::engine::storage::TerritoryStorage;
use crate::models::{AddressChangeLog, ChangeLogFilter};
use crate::Result;

/// Data-access object for address rows of the `changelog` table
#[derive(Clone)]
pub struct ChangeLogs {
    storage: Arc<dyn TerritoryStorage>,
}

impl ChangeLogs {
    pub fn new(storage: Arc<dyn TerritoryStorage>) -> Self {
        Self { storage }
    }

    /// Changes to the addresses of a congregation, oldest first
    ///
    /// `min_date` accepts a date or a date-time; see
    /// [`crate::models::change_log::parse_min_date`].
    pub async fn address_change_logs(
        &self,
        congregation_id: Option<i64>,
        record_id: Option<i64>,
        min_date: Option<&str>,
    ) -> Result<Vec<AddressChangeLog>> {
        let filter = ChangeLogFilter::from_parts(congregation_id, record_id, min_date)?;
        self.storage.address_change_logs(&filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::storage::testing::CountingStorage;
    use crate::engine::storage::InMemoryStorage;
    use crate::models::change_log::parse_min_date;
    use crate::TerritoryError;

    fn seeded() -> Arc<InMemoryStorage> {
        let storage = Arc::new(InMemoryStorage::new());
        storage.register_address(100, 1).unwrap();
        storage.register_address(101, 1).unwrap();
        storage.register_address(200, 2).unwrap();

        for (record_id, date) in [(100, "2018-01-10"), (101, "2018-03-01"), (100, "2018-04-02"), (200, "2018-04-03")] {
            storage
                .record_address_change(Some(7), parse_min_date(date).unwrap(), record_id, r#"{"status":["Active","DNC"]}"#)
                .unwrap();
        }
        storage
    }

    #[tokio::test]
    async fn test_congregation_record_and_date_filters() {
        let change_logs = ChangeLogs::new(seeded());

        let all = change_logs.address_change_logs(Some(1), None, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|pair| pair[0].date <= pair[1].date));

        let one_address = change_logs.address_change_logs(Some(1), Some(100), None).await.unwrap();
        assert_eq!(one_address.len(), 2);

        let recent = change_logs
            .address_change_logs(Some(1), Some(100), Some("2018-02-01"))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].changes, r#"{"status":["Active","DNC"]}"#);
    }

    #[tokio::test]
    async fn test_bad_arguments_issue_no_query() {
        let storage = Arc::new(CountingStorage::new());
        let change_logs = ChangeLogs::new(storage.clone());

        assert!(matches!(
            change_logs.address_change_logs(None, None, None).await,
            Err(TerritoryError::Validation(_))
        ));
        assert!(matches!(
            change_logs.address_change_logs(Some(1), None, Some("soon")).await,
            Err(TerritoryError::Validation(_))
        ));
        assert_eq!(storage.calls(), 0);
    }
}
