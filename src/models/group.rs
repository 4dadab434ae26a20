// Territory groups - subdivisions of a congregation

use super::{require_id, require_text};
use crate::{Result, TerritoryError};

/// A row of the `groups` table
///
/// `code` is unique within a congregation.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Group {
    pub id: i64,
    pub congregation_id: i64,
    pub code: String,
    pub description: Option<String>,
    /// Publisher id of the group overseer
    pub overseer: Option<i64>,
}

/// A validated group ready to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroup {
    pub congregation_id: i64,
    pub code: String,
    pub description: Option<String>,
    pub overseer: Option<i64>,
}

impl NewGroup {
    pub fn into_row(self, id: i64) -> Group {
        Group {
            id,
            congregation_id: self.congregation_id,
            code: self.code,
            description: self.description,
            overseer: self.overseer,
        }
    }
}

/// Client-supplied group fields, all optional until validated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDraft {
    pub id: Option<i64>,
    pub congregation_id: Option<i64>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub overseer: Option<i64>,
}

impl GroupDraft {
    pub fn validate_for_create(self) -> Result<NewGroup> {
        let code = require_text(self.code, "group code is required")?;
        let congregation_id = require_id(self.congregation_id, "cong id is required")?;

        Ok(NewGroup {
            congregation_id,
            code,
            description: self.description,
            overseer: self.overseer,
        })
    }

    /// Updates overwrite every column, absent optional fields become NULL
    pub fn validate_for_update(self) -> Result<Group> {
        let id = require_id(self.id, "group id is required")?;
        let code = require_text(self.code, "group code is required")?;
        let congregation_id = require_id(self.congregation_id, "cong id is required")?;

        Ok(Group {
            id,
            congregation_id,
            code,
            description: self.description,
            overseer: self.overseer,
        })
    }
}

/// How a single group is addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKey {
    Id(i64),
    Code { congregation_id: i64, code: String },
}

impl GroupKey {
    /// Pick a key from the loose lookup arguments
    ///
    /// An id wins when present; otherwise both the congregation id and the
    /// group code are needed.
    pub fn from_parts(
        id: Option<i64>,
        congregation_id: Option<i64>,
        code: Option<String>,
    ) -> Result<Self> {
        if let Some(id) = id.filter(|id| *id > 0) {
            return Ok(GroupKey::Id(id));
        }

        match (congregation_id.filter(|c| *c > 0), code) {
            (Some(congregation_id), Some(code)) if !code.trim().is_empty() => {
                Ok(GroupKey::Code { congregation_id, code })
            }
            _ => Err(TerritoryError::Validation(
                "group id or congId and group code required".to_string(),
            )),
        }
    }

    pub fn matches(&self, group: &Group) -> bool {
        match self {
            GroupKey::Id(id) => group.id == *id,
            GroupKey::Code { congregation_id, code } => {
                group.congregation_id == *congregation_id && group.code == *code
            }
        }
    }
}
