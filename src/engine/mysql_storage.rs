// MySQL storage backend for the territory engine
// Every statement is a fixed string with `?` placeholders; values are always bound

//! # MySQL Storage
//!
//! [`MySqlStorage`] implements [`TerritoryStorage`] over a sqlx `MySqlPool`.
//!
//! ## Pool Sizing
//!
//! Each worker process builds its own pool, so the server as a whole may
//! open `max_connections × workers` connections. Requests beyond the pool
//! cap wait for a free connection for up to `acquire_timeout` and then fail
//! with `PoolTimedOut`.
//!
//! ## Query Safety
//!
//! All SQL lives in the constants below. Caller-supplied values only ever
//! reach the database through `.bind(...)`, so a `notes` or `description`
//! containing quotes or other SQL metacharacters is stored verbatim and can
//! never change the statement's structure.

use std::fmt;
use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlSslMode};
use tracing::{debug, info};

use crate::engine::storage::TerritoryStorage;
use crate::models::{
    ActivityLog, AddressChangeLog, ChangeLogFilter, Group, GroupKey, NewActivityLog, NewGroup,
    ADDRESS_TABLE,
};
use crate::{Result, TerritoryError};

const INSERT_ACTIVITY_LOG: &str = "INSERT INTO activitylog \
    (checkout_id, address_id, value, publisher_id, `timestamp`, notes) \
    VALUES (?, ?, ?, ?, ?, ?)";

const SELECT_ACTIVITY_LOGS_BY_CHECKOUT: &str = "SELECT id, checkout_id, address_id, value, \
    publisher_id, territory_id, `timestamp`, COALESCE(notes, '') AS notes \
    FROM activitylog WHERE checkout_id = ? ORDER BY id";

const SELECT_ACTIVITY_LOGS_BY_CHECKOUT_AND_ADDRESS: &str = "SELECT id, checkout_id, address_id, \
    value, publisher_id, territory_id, `timestamp`, COALESCE(notes, '') AS notes \
    FROM activitylog WHERE checkout_id = ? AND address_id = ? ORDER BY id";

const SELECT_ACTIVITY_LOG_BY_ID: &str = "SELECT id, checkout_id, address_id, value, \
    publisher_id, territory_id, `timestamp`, COALESCE(notes, '') AS notes \
    FROM activitylog WHERE id = ?";

const COUNT_ACTIVITY_LOGS: &str =
    "SELECT COUNT(*) FROM activitylog WHERE checkout_id = ? AND address_id = ?";

const UPDATE_ACTIVITY_LOG: &str = "UPDATE activitylog SET \
    checkout_id = ?, address_id = ?, territory_id = ?, value = ?, \
    `timestamp` = ?, publisher_id = ?, notes = ? \
    WHERE id = ?";

const DELETE_ACTIVITY_LOG: &str = "DELETE FROM activitylog WHERE id = ?";

const SELECT_GROUP_BY_ID: &str =
    "SELECT id, congregation_id, code, description, overseer FROM `groups` WHERE id = ?";

const SELECT_GROUP_BY_CODE: &str = "SELECT id, congregation_id, code, description, overseer \
    FROM `groups` WHERE congregation_id = ? AND code = ?";

const SELECT_GROUP_CODES: &str =
    "SELECT code FROM `groups` WHERE congregation_id = ? ORDER BY code";

const INSERT_GROUP: &str = "INSERT INTO `groups` (congregation_id, code, description, overseer) \
    VALUES (?, ?, ?, ?)";

const UPDATE_GROUP: &str = "UPDATE `groups` SET \
    congregation_id = ?, code = ?, description = ?, overseer = ? \
    WHERE id = ?";

const SELECT_ADDRESS_CHANGE_LOGS: &str = "SELECT c.id, c.publisher_id, c.date, c.table_name, \
    c.record_id, c.changes \
    FROM changelog c JOIN address a ON a.id = c.record_id \
    WHERE c.table_name = ? AND a.congregation_id = ? \
    AND (? IS NULL OR c.record_id = ?) \
    AND (? IS NULL OR c.date >= ?) \
    ORDER BY c.date, c.id";

/// Connection settings for the MySQL pool
#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Pool capacity of a single worker process
    pub max_connections: u32,
    /// How long a request waits for a free connection
    pub acquire_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            database: "territory".to_string(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

impl DatabaseConfig {
    /// Connection options; TLS is used when the server offers it but the
    /// certificate is not verified
    pub fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .ssl_mode(MySqlSslMode::Preferred)
    }

    pub fn pool_options(&self) -> MySqlPoolOptions {
        MySqlPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
    }
}

/// MySQL implementation of [`TerritoryStorage`]
#[derive(Clone)]
pub struct MySqlStorage {
    pool: MySqlPool,
}

impl MySqlStorage {
    /// Build a pool that opens connections on first use
    ///
    /// A worker can therefore start and serve `/health` while the database
    /// is still unreachable; queries fail individually until it comes back.
    pub fn connect_lazy(config: &DatabaseConfig) -> Self {
        info!(
            "🗄️  MySQL pool for {}@{}:{}/{} (max {} connections)",
            config.user, config.host, config.port, config.database, config.max_connections
        );
        let pool = config.pool_options().connect_lazy_with(config.connect_options());
        Self { pool }
    }

    /// Build a pool and open a first connection right away
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = config
            .pool_options()
            .connect_with(config.connect_options())
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("✅ Database migrations applied");
        Ok(())
    }
}

fn to_row_id(raw: u64) -> Result<i64> {
    i64::try_from(raw)
        .map_err(|_| TerritoryError::Internal(format!("insert id {} out of range", raw)))
}

fn map_group_write_error(err: sqlx::Error, group_code: &str, congregation_id: i64) -> TerritoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => TerritoryError::Conflict(format!(
            "group code {} already exists in congregation {}",
            group_code, congregation_id
        )),
        _ => TerritoryError::Database(err),
    }
}

#[async_trait::async_trait]
impl TerritoryStorage for MySqlStorage {
    async fn insert_activity_log(&self, log: &NewActivityLog) -> Result<i64> {
        let result = sqlx::query(INSERT_ACTIVITY_LOG)
            .bind(log.checkout_id)
            .bind(log.address_id)
            .bind(&log.value)
            .bind(log.publisher_id)
            .bind(log.timestamp)
            .bind(&log.notes)
            .execute(&self.pool)
            .await?;
        let id = to_row_id(result.last_insert_id())?;
        debug!("Inserted activity log {}", id);
        Ok(id)
    }

    async fn activity_logs(
        &self,
        checkout_id: i64,
        address_id: Option<i64>,
    ) -> Result<Vec<ActivityLog>> {
        let rows = match address_id {
            Some(address_id) => {
                sqlx::query_as::<_, ActivityLog>(SELECT_ACTIVITY_LOGS_BY_CHECKOUT_AND_ADDRESS)
                    .bind(checkout_id)
                    .bind(address_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as::<_, ActivityLog>(SELECT_ACTIVITY_LOGS_BY_CHECKOUT)
                    .bind(checkout_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows)
    }

    async fn activity_log(&self, id: i64) -> Result<Option<ActivityLog>> {
        let row = sqlx::query_as::<_, ActivityLog>(SELECT_ACTIVITY_LOG_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn count_activity_logs(&self, checkout_id: i64, address_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(COUNT_ACTIVITY_LOGS)
            .bind(checkout_id)
            .bind(address_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn update_activity_log(&self, log: &ActivityLog) -> Result<u64> {
        let result = sqlx::query(UPDATE_ACTIVITY_LOG)
            .bind(log.checkout_id)
            .bind(log.address_id)
            .bind(log.territory_id)
            .bind(&log.value)
            .bind(log.timestamp)
            .bind(log.publisher_id)
            .bind(&log.notes)
            .bind(log.id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_activity_log(&self, id: i64) -> Result<u64> {
        let result = sqlx::query(DELETE_ACTIVITY_LOG)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn group(&self, key: &GroupKey) -> Result<Option<Group>> {
        let row = match key {
            GroupKey::Id(id) => {
                sqlx::query_as::<_, Group>(SELECT_GROUP_BY_ID)
                    .bind(*id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            GroupKey::Code { congregation_id, code } => {
                sqlx::query_as::<_, Group>(SELECT_GROUP_BY_CODE)
                    .bind(*congregation_id)
                    .bind(code)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        Ok(row)
    }

    async fn group_codes(&self, congregation_id: i64) -> Result<Vec<String>> {
        let codes = sqlx::query_scalar::<_, String>(SELECT_GROUP_CODES)
            .bind(congregation_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(codes)
    }

    async fn insert_group(&self, group: &NewGroup) -> Result<i64> {
        let result = sqlx::query(INSERT_GROUP)
            .bind(group.congregation_id)
            .bind(&group.code)
            .bind(&group.description)
            .bind(group.overseer)
            .execute(&self.pool)
            .await
            .map_err(|e| map_group_write_error(e, &group.code, group.congregation_id))?;
        to_row_id(result.last_insert_id())
    }

    async fn update_group(&self, group: &Group) -> Result<u64> {
        let result = sqlx::query(UPDATE_GROUP)
            .bind(group.congregation_id)
            .bind(&group.code)
            .bind(&group.description)
            .bind(group.overseer)
            .bind(group.id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_group_write_error(e, &group.code, group.congregation_id))?;
        Ok(result.rows_affected())
    }

    async fn address_change_logs(
        &self,
        filter: &ChangeLogFilter,
    ) -> Result<Vec<AddressChangeLog>> {
        let rows = sqlx::query_as::<_, AddressChangeLog>(SELECT_ADDRESS_CHANGE_LOGS)
            .bind(ADDRESS_TABLE)
            .bind(filter.congregation_id)
            .bind(filter.record_id)
            .bind(filter.record_id)
            .bind(filter.min_date)
            .bind(filter.min_date)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
