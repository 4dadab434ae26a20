// Core domain models for the territory service
// These are the database rows and the validated inputs that write them

//! # Domain Models Module
//!
//! Every entity here is a plain database row. The process never holds an
//! authoritative copy; the database is the single source of truth and each
//! operation is an independent round trip.
//!
//! Each writable entity comes in three shapes:
//! - a **draft** (`ActivityLogDraft`, `GroupDraft`) where every field is
//!   optional, mirroring what a client may send
//! - a **new** row (`NewActivityLog`, `NewGroup`) produced by
//!   `validate_for_create`, carrying no id
//! - the full **row** (`ActivityLog`, `Group`) produced by
//!   `validate_for_update` or read back from storage
//!
//! Validation never touches the database, so a draft that fails it is
//! guaranteed to issue no query.

/// Activity log rows: visits recorded per checkout and address
pub mod activity_log;

/// Territory groups within a congregation
pub mod group;

/// Address change-log rows (read-only audit trail)
pub mod change_log;

pub use activity_log::{ActivityLog, ActivityLogDraft, NewActivityLog};
pub use change_log::{AddressChangeLog, ChangeLogFilter, ADDRESS_TABLE};
pub use group::{Group, GroupDraft, GroupKey, NewGroup};

use crate::{Result, TerritoryError};

/// Require an identifier to be present and positive
///
/// Zero is treated as missing: identifiers are database auto-increment keys
/// and never start at zero.
pub(crate) fn require_id(value: Option<i64>, message: &str) -> Result<i64> {
    match value {
        Some(id) if id > 0 => Ok(id),
        _ => Err(TerritoryError::Validation(message.to_string())),
    }
}

/// Require a text field to be present and not blank
///
/// The value is returned exactly as given (no trimming) so that what the
/// client sent is what gets stored.
pub(crate) fn require_text(value: Option<String>, message: &str) -> Result<String> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(TerritoryError::Validation(message.to_string())),
    }
}
