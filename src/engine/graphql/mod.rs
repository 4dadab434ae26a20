// GraphQL API for the territory service
// Per-entity query and mutation roots merged into a single schema

//! # GraphQL Engine
//!
//! Each entity contributes its own query root and (where writable) mutation
//! root. [`Query`] and [`Mutation`] merge them with `MergedObject`, so adding
//! an entity means adding one module and one tuple field here.
//!
//! ## Error Reporting
//!
//! Resolvers never swallow failures. Every error is logged and returned
//! through the GraphQL `errors` array with an `extensions.code` the client
//! can switch on:
//!
//! | code            | meaning                                        |
//! |-----------------|------------------------------------------------|
//! | `VALIDATION`    | a required argument is missing or malformed    |
//! | `NOT_FOUND`     | the addressed row does not exist               |
//! | `CONFLICT`      | a unique key is already taken                  |
//! | `LIMIT_REACHED` | the activity log limit for the pair is used up |
//! | `INTERNAL`      | database or server failure (detail only logged)|

use std::sync::Arc;

use async_graphql::{EmptySubscription, ErrorExtensions, MergedObject, Schema};
use tracing::{error, warn};

use crate::engine::{ActivityLogs, ChangeLogs, Groups, TerritoryStorage};
use crate::TerritoryError;

mod activity_log;
mod change_log;
mod groups;

pub use activity_log::{ActivityLogGQL, ActivityLogInput, ActivityLogMutation, ActivityLogQuery};
pub use change_log::{AddressChangeLogGQL, ChangeLogQuery};
pub use groups::{GroupGQL, GroupInput, GroupMutation, GroupQuery};

/// GraphQL Query root
#[derive(MergedObject, Default)]
pub struct Query(ActivityLogQuery, GroupQuery, ChangeLogQuery);

/// GraphQL Mutation root
#[derive(MergedObject, Default)]
pub struct Mutation(ActivityLogMutation, GroupMutation);

pub type TerritorySchema = Schema<Query, Mutation, EmptySubscription>;

/// Knobs that shape the data-access modules behind the schema
#[derive(Debug, Clone)]
pub struct SchemaOptions {
    /// Activity logs allowed per checkout/address pair; `None` disables the check
    pub activity_log_limit: Option<usize>,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            activity_log_limit: Some(crate::engine::activity_log::DEFAULT_LOGS_PER_ADDRESS),
        }
    }
}

/// Build the executable schema over a storage backend
pub fn create_schema(storage: Arc<dyn TerritoryStorage>, options: SchemaOptions) -> TerritorySchema {
    Schema::build(Query::default(), Mutation::default(), EmptySubscription)
        .data(ActivityLogs::new(storage.clone()).with_limit(options.activity_log_limit))
        .data(Groups::new(storage.clone()))
        .data(ChangeLogs::new(storage))
        .finish()
}

impl ErrorExtensions for TerritoryError {
    fn extend(&self) -> async_graphql::Error {
        let message = if self.is_client_error() {
            self.to_string()
        } else {
            "internal server error".to_string()
        };
        let code = self.code();
        async_graphql::Error::new(message).extend_with(|_, e| e.set("code", code))
    }
}

/// Log a failed resolver call and turn it into a GraphQL error
pub(crate) fn reject(operation: &str, err: TerritoryError) -> async_graphql::Error {
    if err.is_client_error() {
        warn!("{} rejected: {}", operation, err);
    } else {
        error!("{} failed: {}", operation, err);
    }
    err.extend()
}

#[cfg(test)]
mod tests;
