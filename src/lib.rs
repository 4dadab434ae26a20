// Territory Service - Rust Edition
// A GraphQL API over the territory database: activity logs, groups and address change logs

//! # Territory Service Library
//!
//! This is the library crate behind the `server` binary. It exposes the domain
//! rows, the storage abstraction, the data-access modules, the GraphQL schema
//! and the HTTP/process plumbing that serves it.
//!
//! ## Core Components
//!
//! ### Domain Models
//! - [`ActivityLog`]: one field-service visit recorded against a checkout and address
//! - [`Group`]: a territory group belonging to a congregation
//! - [`AddressChangeLog`]: an audit-trail row describing a change to an address
//!
//! ### Storage Layer
//! [`TerritoryStorage`] abstracts row-level persistence. [`MySqlStorage`] is the
//! production backend (every value is bound, never interpolated) and
//! [`InMemoryStorage`] backs development runs and tests.
//!
//! ### Data-Access Modules
//! [`ActivityLogs`], [`Groups`] and [`ChangeLogs`] validate input before any
//! query is issued and then delegate to the storage.
//!
//! ### GraphQL Engine
//! Per-entity query and mutation roots merged into one [`TerritorySchema`].
//!
//! ### Server Layer
//! - [`GraphQLServer`]: axum router with `/graphql`, `/graphiql` and `/health`,
//!   plain HTTP plus HTTPS in production mode
//! - [`Supervisor`]: the master process that keeps one worker per CPU core alive
//!
//! ## Request Flow
//!
//! ```text
//! Supervisor ── spawns ──> worker process
//!                            ↓ builds
//!                          GraphQLServer (axum)
//!                            ↓ executes
//!                          TerritorySchema (async-graphql)
//!                            ↓ resolves via
//!                          ActivityLogs / Groups / ChangeLogs
//!                            ↓ persists through
//!                          TerritoryStorage (MySQL pool)
//! ```

// Core domain rows and validated inputs
pub mod models;

// Storage, data-access modules and the GraphQL schema
pub mod engine;

// HTTP server, worker bootstrap and the process supervisor
pub mod server;

// Re-export core domain types for easy access
pub use models::{
    ActivityLog,        // Row of the activitylog table
    ActivityLogDraft,   // Unvalidated activity log input
    AddressChangeLog,   // Row of the changelog table scoped to addresses
    ChangeLogFilter,    // Congregation/record/date filter for change logs
    Group,              // Row of the groups table
    GroupDraft,         // Unvalidated group input
    GroupKey,           // Lookup key for a single group
    NewActivityLog,     // Validated activity log ready for insert
    NewGroup,           // Validated group ready for insert
};

// Re-export engine types for convenience
pub use engine::{
    activity_log::ActivityLogs,
    change_log::ChangeLogs,
    graphql::{create_schema, SchemaOptions, TerritorySchema},
    groups::Groups,
    mysql_storage::{DatabaseConfig, MySqlStorage},
    storage::{InMemoryStorage, TerritoryStorage},
};

// Re-export server types for convenience
pub use server::{
    graphql::{GraphQLServer, GraphQLServerConfig, TlsConfig},
    supervisor::{ProcessLauncher, RestartPolicy, Supervisor, SupervisorStatus, WorkerLauncher},
};

use thiserror::Error;

/// Errors produced anywhere in the territory service
///
/// The first four variants are client faults and are reported to GraphQL
/// callers with their message. The remaining variants are server faults; the
/// GraphQL layer replaces their message with a generic one and only the log
/// carries the detail.
#[derive(Error, Debug)]
pub enum TerritoryError {
    /// A required field is missing or malformed; raised before any query runs
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The row addressed by an update does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A unique key (for example a group code within a congregation) is taken
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The per checkout/address activity log limit is already used up
    #[error("Limit reached: {0}")]
    LimitReached(String),

    /// Connectivity, syntax or constraint failure reported by the database
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failure
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Invalid or incomplete startup configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Anything else that went wrong on the server side
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TerritoryError {
    /// Machine-readable code surfaced in GraphQL `extensions.code`
    pub fn code(&self) -> &'static str {
        match self {
            TerritoryError::Validation(_) => "VALIDATION",
            TerritoryError::NotFound(_) => "NOT_FOUND",
            TerritoryError::Conflict(_) => "CONFLICT",
            TerritoryError::LimitReached(_) => "LIMIT_REACHED",
            TerritoryError::Database(_)
            | TerritoryError::Migration(_)
            | TerritoryError::Config(_)
            | TerritoryError::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the caller caused the error (as opposed to the server)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TerritoryError::Validation(_)
                | TerritoryError::NotFound(_)
                | TerritoryError::Conflict(_)
                | TerritoryError::LimitReached(_)
        )
    }
}

impl From<std::io::Error> for TerritoryError {
    fn from(err: std::io::Error) -> Self {
        TerritoryError::Internal(err.to_string())
    }
}

/// Type alias for Results that use our custom error type
pub type Result<T> = std::result::Result<T, TerritoryError>;
