// Territory Engine
// Storage backends, data-access modules and the GraphQL schema

//! # Territory Engine Module
//!
//! The engine sits between the domain rows (`models/`) and the network
//! (`server/`).
//!
//! ```text
//! graphql        resolvers, merged Query/Mutation roots
//!    ↓
//! activity_log   groups   change_log     validation, then delegation
//!    ↓
//! storage (trait) ── mysql_storage       parameterized SQL over a MySqlPool
//!                └── InMemoryStorage     development and tests
//! ```

/// Storage abstraction and the in-memory backend
pub mod storage;

/// MySQL backend built on a sqlx connection pool
pub mod mysql_storage;

/// Activity log data access
pub mod activity_log;

/// Group data access
pub mod groups;

/// Address change-log data access
pub mod change_log;

/// GraphQL schema, resolvers and error mapping
pub mod graphql;

pub use activity_log::ActivityLogs;
pub use change_log::ChangeLogs;
pub use groups::Groups;
pub use mysql_storage::{DatabaseConfig, MySqlStorage};
pub use storage::{InMemoryStorage, TerritoryStorage};
