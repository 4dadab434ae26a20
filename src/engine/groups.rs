// Group data access
// Validates group input and delegates to the storage backend

use std::sync::Arc;

use tracing::debug;

use crate::engine::storage::TerritoryStorage;
use crate::models::{Group, GroupDraft, GroupKey};
use crate::{Result, TerritoryError};

/// Data-access object for the `groups` table
#[derive(Clone)]
pub struct Groups {
    storage: Arc<dyn TerritoryStorage>,
}

impl Groups {
    pub fn new(storage: Arc<dyn TerritoryStorage>) -> Self {
        Self { storage }
    }

    /// Look up one group by id, or by congregation and code
    pub async fn get(
        &self,
        id: Option<i64>,
        congregation_id: Option<i64>,
        code: Option<String>,
    ) -> Result<Option<Group>> {
        let key = GroupKey::from_parts(id, congregation_id, code)?;
        self.storage.group(&key).await
    }

    /// Codes of every group in a congregation
    pub async fn codes(&self, congregation_id: i64) -> Result<Vec<String>> {
        if congregation_id <= 0 {
            return Err(TerritoryError::Validation("congregation id required".to_string()));
        }
        self.storage.group_codes(congregation_id).await
    }

    /// Insert a group and return its id
    pub async fn create(&self, draft: GroupDraft) -> Result<i64> {
        let group = draft.validate_for_create()?;
        let id = self.storage.insert_group(&group).await?;
        debug!(
            "Created group {} ({}) in congregation {}",
            id, group.code, group.congregation_id
        );
        Ok(id)
    }

    /// Overwrite every column of an existing group
    pub async fn update(&self, draft: GroupDraft) -> Result<()> {
        let group = draft.validate_for_update()?;
        let affected = self.storage.update_group(&group).await?;
        if affected == 0
            && self
                .storage
                .group(&GroupKey::Id(group.id))
                .await?
                .is_none()
        {
            return Err(TerritoryError::NotFound(format!("group {}", group.id)));
        }
        debug!("Updated group {} ({} rows)", group.id, affected);
        Ok(())
    }
}
