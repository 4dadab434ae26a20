// Address change log - audit trail rows for changes made to addresses

//! # Change Logs
//!
//! The `changelog` table is a generic audit trail: each row names the table
//! it describes (`table_name`) and the changed row (`record_id`), plus the
//! publisher who made the change and an opaque serialized diff (`changes`).
//!
//! The API only reads the rows describing addresses, so the types here are
//! scoped to that case.

use chrono::{NaiveDate, NaiveDateTime};

use super::require_id;
use crate::{Result, TerritoryError};

/// `table_name` value of change-log rows that describe addresses
pub const ADDRESS_TABLE: &str = "address";

/// A row of the `changelog` table
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AddressChangeLog {
    pub id: i64,
    pub publisher_id: Option<i64>,
    pub date: NaiveDateTime,
    pub table_name: String,
    pub record_id: i64,
    /// Serialized diff; stored and returned untouched
    pub changes: String,
}

/// Which address change logs to read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeLogFilter {
    /// Only addresses belonging to this congregation
    pub congregation_id: i64,
    /// Only this address
    pub record_id: Option<i64>,
    /// Only changes at or after this moment
    pub min_date: Option<NaiveDateTime>,
}

impl ChangeLogFilter {
    /// Build a filter from the loose query arguments
    pub fn from_parts(
        congregation_id: Option<i64>,
        record_id: Option<i64>,
        min_date: Option<&str>,
    ) -> Result<Self> {
        let congregation_id = require_id(congregation_id, "congregation id required")?;
        let min_date = min_date
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(parse_min_date)
            .transpose()?;

        Ok(Self {
            congregation_id,
            record_id,
            min_date,
        })
    }

    pub fn matches(&self, entry: &AddressChangeLog) -> bool {
        entry.table_name == ADDRESS_TABLE
            && self.record_id.map_or(true, |id| entry.record_id == id)
            && self.min_date.map_or(true, |min| entry.date >= min)
    }
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` and RFC 3339
pub fn parse_min_date(raw: &str) -> Result<NaiveDateTime> {
    if let Ok(moment) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(moment.naive_utc());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(moment) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(moment);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .ok_or_else(|| TerritoryError::Validation(format!("invalid minDate: {}", raw)))
}

/// Render a change-log date the way MySQL prints DATETIME values
pub fn format_date(date: &NaiveDateTime) -> String {
    date.format("%Y-%m-%d %H:%M:%S").to_string()
}
