// Storage abstraction for the territory engine
// This defines the interface for persisting activity logs, groups and change logs

//! # Storage Abstraction Layer
//!
//! [`TerritoryStorage`] is the row-level interface every backend implements.
//! It performs no validation: the data-access modules in this crate check
//! their inputs before calling it.
//!
//! - [`InMemoryStorage`]: development runs and unit tests
//! - [`crate::engine::MySqlStorage`]: production, one sqlx pool per worker
//!
//! All operations are async and the trait is `Send + Sync` so a single
//! `Arc<dyn TerritoryStorage>` can be shared by every request task.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::{
    ActivityLog, AddressChangeLog, ChangeLogFilter, Group, GroupKey, NewActivityLog, NewGroup,
    ADDRESS_TABLE,
};
use crate::{Result, TerritoryError};

/// Storage trait for territory rows
///
/// Reads return `Ok(None)` or an empty `Vec` when nothing matches; only a
/// failing backend produces `Err`. Writes return the generated id (inserts)
/// or the number of affected rows (updates, deletes).
#[async_trait::async_trait]
pub trait TerritoryStorage: Send + Sync {
    /// Insert an activity log and return its generated id
    async fn insert_activity_log(&self, log: &NewActivityLog) -> Result<i64>;

    /// Activity logs of a checkout, optionally narrowed to one address
    async fn activity_logs(
        &self,
        checkout_id: i64,
        address_id: Option<i64>,
    ) -> Result<Vec<ActivityLog>>;

    /// A single activity log by id
    async fn activity_log(&self, id: i64) -> Result<Option<ActivityLog>>;

    /// Number of activity logs recorded for a checkout/address pair
    async fn count_activity_logs(&self, checkout_id: i64, address_id: i64) -> Result<i64>;

    /// Overwrite every column of the activity log with `log.id`
    async fn update_activity_log(&self, log: &ActivityLog) -> Result<u64>;

    /// Remove an activity log; zero affected rows is not an error
    async fn delete_activity_log(&self, id: i64) -> Result<u64>;

    /// A single group by id or by congregation and code
    async fn group(&self, key: &GroupKey) -> Result<Option<Group>>;

    /// Codes of every group in a congregation
    async fn group_codes(&self, congregation_id: i64) -> Result<Vec<String>>;

    /// Insert a group and return its generated id
    ///
    /// ## Errors
    /// - `Conflict` when the congregation already has a group with that code
    async fn insert_group(&self, group: &NewGroup) -> Result<i64>;

    /// Overwrite every column of the group with `group.id`
    async fn update_group(&self, group: &Group) -> Result<u64>;

    /// Address change logs matching the filter, oldest first
    async fn address_change_logs(&self, filter: &ChangeLogFilter)
        -> Result<Vec<AddressChangeLog>>;
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    activity_logs: Vec<ActivityLog>,
    groups: Vec<Group>,
    change_logs: Vec<AddressChangeLog>,
    /// address id -> congregation id, standing in for the `address` table
    addresses: HashMap<i64, i64>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory storage implementation for development and testing
///
/// Data lives only as long as the process, and every worker process gets its
/// own copy, so this backend is only useful with a single worker.
#[derive(Default)]
pub struct InMemoryStorage {
    tables: RwLock<Tables>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an address as belonging to a congregation
    pub fn register_address(&self, address_id: i64, congregation_id: i64) -> Result<()> {
        let mut tables = self.write()?;
        tables.addresses.insert(address_id, congregation_id);
        Ok(())
    }

    /// Append a change-log row for an address
    ///
    /// The API never writes change logs; this exists to seed development data.
    pub fn record_address_change(
        &self,
        publisher_id: Option<i64>,
        date: chrono::NaiveDateTime,
        record_id: i64,
        changes: impl Into<String>,
    ) -> Result<i64> {
        let mut tables = self.write()?;
        let id = tables.allocate_id();
        tables.change_logs.push(AddressChangeLog {
            id,
            publisher_id,
            date,
            table_name: ADDRESS_TABLE.to_string(),
            record_id,
            changes: changes.into(),
        });
        Ok(id)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| TerritoryError::Internal("in-memory storage lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| TerritoryError::Internal("in-memory storage lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl TerritoryStorage for InMemoryStorage {
    async fn insert_activity_log(&self, log: &NewActivityLog) -> Result<i64> {
        let mut tables = self.write()?;
        let id = tables.allocate_id();
        tables.activity_logs.push(log.clone().into_row(id));
        Ok(id)
    }

    async fn activity_logs(
        &self,
        checkout_id: i64,
        address_id: Option<i64>,
    ) -> Result<Vec<ActivityLog>> {
        let tables = self.read()?;
        Ok(tables
            .activity_logs
            .iter()
            .filter(|log| log.checkout_id == checkout_id)
            .filter(|log| address_id.map_or(true, |address| log.address_id == address))
            .cloned()
            .collect())
    }

    async fn activity_log(&self, id: i64) -> Result<Option<ActivityLog>> {
        let tables = self.read()?;
        Ok(tables.activity_logs.iter().find(|log| log.id == id).cloned())
    }

    async fn count_activity_logs(&self, checkout_id: i64, address_id: i64) -> Result<i64> {
        let tables = self.read()?;
        let count = tables
            .activity_logs
            .iter()
            .filter(|log| log.checkout_id == checkout_id && log.address_id == address_id)
            .count();
        Ok(count as i64)
    }

    async fn update_activity_log(&self, log: &ActivityLog) -> Result<u64> {
        let mut tables = self.write()?;
        match tables.activity_logs.iter_mut().find(|row| row.id == log.id) {
            Some(row) => {
                *row = log.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_activity_log(&self, id: i64) -> Result<u64> {
        let mut tables = self.write()?;
        let before = tables.activity_logs.len();
        tables.activity_logs.retain(|log| log.id != id);
        Ok((before - tables.activity_logs.len()) as u64)
    }

    async fn group(&self, key: &GroupKey) -> Result<Option<Group>> {
        let tables = self.read()?;
        Ok(tables.groups.iter().find(|group| key.matches(group)).cloned())
    }

    async fn group_codes(&self, congregation_id: i64) -> Result<Vec<String>> {
        let tables = self.read()?;
        Ok(tables
            .groups
            .iter()
            .filter(|group| group.congregation_id == congregation_id)
            .map(|group| group.code.clone())
            .collect())
    }

    async fn insert_group(&self, group: &NewGroup) -> Result<i64> {
        let mut tables = self.write()?;
        let taken = tables
            .groups
            .iter()
            .any(|g| g.congregation_id == group.congregation_id && g.code == group.code);
        if taken {
            return Err(TerritoryError::Conflict(format!(
                "group code {} already exists in congregation {}",
                group.code, group.congregation_id
            )));
        }

        let id = tables.allocate_id();
        tables.groups.push(group.clone().into_row(id));
        Ok(id)
    }

    async fn update_group(&self, group: &Group) -> Result<u64> {
        let mut tables = self.write()?;
        let taken = tables.groups.iter().any(|g| {
            g.id != group.id && g.congregation_id == group.congregation_id && g.code == group.code
        });
        if taken {
            return Err(TerritoryError::Conflict(format!(
                "group code {} already exists in congregation {}",
                group.code, group.congregation_id
            )));
        }

        match tables.groups.iter_mut().find(|row| row.id == group.id) {
            Some(row) => {
                *row = group.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn address_change_logs(
        &self,
        filter: &ChangeLogFilter,
    ) -> Result<Vec<AddressChangeLog>> {
        let tables = self.read()?;
        let mut entries: Vec<AddressChangeLog> = tables
            .change_logs
            .iter()
            .filter(|entry| {
                tables.addresses.get(&entry.record_id) == Some(&filter.congregation_id)
            })
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        Ok(entries)
    }
}

/// Test helpers shared by the engine and GraphQL tests
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    /// Wraps a storage and counts every call that reaches it
    pub(crate) struct CountingStorage {
        inner: InMemoryStorage,
        calls: Arc<AtomicUsize>,
    }

    impl CountingStorage {
        pub(crate) fn new() -> Self {
            Self {
                inner: InMemoryStorage::new(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn hit(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl TerritoryStorage for CountingStorage {
        async fn insert_activity_log(&self, log: &NewActivityLog) -> Result<i64> {
            self.hit();
            self.inner.insert_activity_log(log).await
        }

        async fn activity_logs(
            &self,
            checkout_id: i64,
            address_id: Option<i64>,
        ) -> Result<Vec<ActivityLog>> {
            self.hit();
            self.inner.activity_logs(checkout_id, address_id).await
        }

        async fn activity_log(&self, id: i64) -> Result<Option<ActivityLog>> {
            self.hit();
            self.inner.activity_log(id).await
        }

        async fn count_activity_logs(&self, checkout_id: i64, address_id: i64) -> Result<i64> {
            self.hit();
            self.inner.count_activity_logs(checkout_id, address_id).await
        }

        async fn update_activity_log(&self, log: &ActivityLog) -> Result<u64> {
            self.hit();
            self.inner.update_activity_log(log).await
        }

        async fn delete_activity_log(&self, id: i64) -> Result<u64> {
            self.hit();
            self.inner.delete_activity_log(id).await
        }

        async fn group(&self, key: &GroupKey) -> Result<Option<Group>> {
            self.hit();
            self.inner.group(key).await
        }

        async fn group_codes(&self, congregation_id: i64) -> Result<Vec<String>> {
            self.hit();
            self.inner.group_codes(congregation_id).await
        }

        async fn insert_group(&self, group: &NewGroup) -> Result<i64> {
            self.hit();
            self.inner.insert_group(group).await
        }

        async fn update_group(&self, group: &Group) -> Result<u64> {
            self.hit();
            self.inner.update_group(group).await
        }

        async fn address_change_logs(
            &self,
            filter: &ChangeLogFilter,
        ) -> Result<Vec<AddressChangeLog>> {
            self.hit();
            self.inner.address_change_logs(filter).await
        }
    }
}
