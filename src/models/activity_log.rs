// Activity log rows - what happened at an address during a checkout

//! # Activity Logs
//!
//! An activity log records one field-service visit: which checkout it
//! belongs to, which address was visited, the outcome (`value`), who made
//! the visit and free-text notes.
//!
//! Rows are keyed by an auto-increment `id` but are usually looked up by
//! `(checkout_id, address_id)`.

use chrono::Utc;

use super::{require_id, require_text};
use crate::Result;

/// A row of the `activitylog` table
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ActivityLog {
    pub id: i64,
    pub checkout_id: i64,
    pub address_id: i64,
    /// Visit outcome as entered by the publisher (free text)
    pub value: String,
    pub publisher_id: Option<i64>,
    /// Only written by updates
    pub territory_id: Option<i64>,
    /// Unix timestamp in seconds
    pub timestamp: Option<i64>,
    pub notes: String,
}

/// A validated activity log ready to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewActivityLog {
    pub checkout_id: i64,
    pub address_id: i64,
    pub value: String,
    pub publisher_id: Option<i64>,
    pub timestamp: i64,
    pub notes: String,
}

/// Client-supplied activity log fields, all optional until validated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityLogDraft {
    pub id: Option<i64>,
    pub checkout_id: Option<i64>,
    pub address_id: Option<i64>,
    pub value: Option<String>,
    pub publisher_id: Option<i64>,
    pub territory_id: Option<i64>,
    pub timestamp: Option<i64>,
    pub notes: Option<String>,
}

impl ActivityLogDraft {
    /// Check the fields an insert needs
    ///
    /// `notes` defaults to the empty string and `timestamp` to the current
    /// time. `id` and `territory_id` are ignored on create.
    pub fn validate_for_create(self) -> Result<NewActivityLog> {
        let checkout_id = require_id(self.checkout_id, "checkout id is required")?;
        let address_id = require_id(self.address_id, "address id is required")?;
        let value = require_text(self.value, "activity log value is required")?;

        Ok(NewActivityLog {
            checkout_id,
            address_id,
            value,
            publisher_id: self.publisher_id,
            timestamp: self.timestamp.unwrap_or_else(|| Utc::now().timestamp()),
            notes: self.notes.unwrap_or_default(),
        })
    }

    /// Check the fields a full-row update needs
    ///
    /// Updates overwrite every column, so optional columns that are absent
    /// from the draft become NULL (or the empty string for `notes`).
    pub fn validate_for_update(self) -> Result<ActivityLog> {
        let id = require_id(self.id, "activity log id is required")?;
        let checkout_id = require_id(self.checkout_id, "checkout id is required")?;
        let address_id = require_id(self.address_id, "address id is required")?;
        let value = require_text(self.value, "activity log value is required")?;

        Ok(ActivityLog {
            id,
            checkout_id,
            address_id,
            value,
            publisher_id: self.publisher_id,
            territory_id: self.territory_id,
            timestamp: self.timestamp,
            notes: self.notes.unwrap_or_default(),
        })
    }
}

impl NewActivityLog {
    /// The row this insert produces once the storage assigns `id`
    pub fn into_row(self, id: i64) -> ActivityLog {
        ActivityLog {
            id,
            checkout_id: self.checkout_id,
            address_id: self.address_id,
            value: self.value,
            publisher_id: self.publisher_id,
            territory_id: None,
            timestamp: Some(self.timestamp),
            notes: self.notes,
        }
    }
}
