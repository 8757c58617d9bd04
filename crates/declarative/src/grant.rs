//! Grant model: one permission binding a subject to an access level.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Built-in role names the remote accepts as a grant subject.
pub const BUILT_IN_ROLES: &[&str] = &["Viewer", "Editor", "Admin"];

/// Access level of a grant.
///
/// `NoAccess` is the historical wire level `0`. The remote may still report
/// it, but it never parses from configuration, so such grants are only ever
/// removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    /// May query the data source.
    Query,
    /// May query and edit the data source.
    Edit,
    /// Legacy level reported by older servers.
    NoAccess,
}

impl Permission {
    /// Numeric value used by the remote API.
    #[must_use]
    pub fn wire_value(&self) -> i64 {
        match self {
            Self::NoAccess => 0,
            Self::Query => 1,
            Self::Edit => 2,
        }
    }

    /// Decode a numeric permission reported by the remote API.
    pub fn from_wire(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Self::NoAccess),
            1 => Ok(Self::Query),
            2 => Ok(Self::Edit),
            other => Err(Error::InvalidResponse(format!(
                "unknown permission type: {other}"
            ))),
        }
    }

    /// Configuration spelling of this level.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "Query",
            Self::Edit => "Edit",
            Self::NoAccess => "NoAccess",
        }
    }
}

impl FromStr for Permission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Query" => Ok(Self::Query),
            "Edit" => Ok(Self::Edit),
            other => Err(Error::UnknownPermission(other.to_string())),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a grant applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    /// A team, by numeric id.
    Team(i64),
    /// A user, by numeric id.
    User(i64),
    /// A built-in role such as `Viewer`.
    BuiltInRole(String),
    /// No subject populated. Passed through to the remote unchanged.
    Unset,
}

impl Subject {
    /// Build a subject from the three optional fields of a permission item.
    ///
    /// Ids `<= 0` and empty role names count as unset, mirroring the zero
    /// sentinels the remote uses. At most one field may remain populated.
    pub fn from_fields(team_id: Option<i64>, user_id: Option<i64>, role: Option<&str>) -> Result<Self> {
        let team_id = team_id.filter(|id| *id > 0);
        let user_id = user_id.filter(|id| *id > 0);
        let role = role.filter(|r| !r.is_empty());

        match (team_id, user_id, role) {
            (None, None, None) => Ok(Self::Unset),
            (Some(id), None, None) => Ok(Self::Team(id)),
            (None, Some(id), None) => Ok(Self::User(id)),
            (None, None, Some(role)) => Ok(Self::BuiltInRole(role.to_string())),
            _ => Err(Error::InvalidGrant(format!(
                "more than one subject set (team_id={}, user_id={}, built_in_role={})",
                team_id.unwrap_or(0),
                user_id.unwrap_or(0),
                role.unwrap_or("")
            ))),
        }
    }

    /// Team id, if this is a team subject.
    #[must_use]
    pub fn team_id(&self) -> Option<i64> {
        match self {
            Self::Team(id) => Some(*id),
            _ => None,
        }
    }

    /// User id, if this is a user subject.
    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Self::User(id) => Some(*id),
            _ => None,
        }
    }

    /// Role name, if this is a built-in role subject.
    #[must_use]
    pub fn built_in_role(&self) -> Option<&str> {
        match self {
            Self::BuiltInRole(role) => Some(role),
            _ => None,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Team(id) => write!(f, "team {id}"),
            Self::User(id) => write!(f, "user {id}"),
            Self::BuiltInRole(role) => write!(f, "role {role}"),
            Self::Unset => f.write_str("(no subject)"),
        }
    }
}

/// One permission item as declared in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantItem {
    /// ID of the team to manage permissions for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<i64>,
    /// ID of the user to manage permissions for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    /// Name of the built-in role to manage permissions for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub built_in_role: Option<String>,
    /// `Query` or `Edit`.
    pub permission: String,
}

/// A permission grant on a data source.
///
/// Equality is structural: subject and permission must match, the
/// remote-assigned `id` is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
    /// Remote identifier, only present once the grant exists on the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub subject: Subject,
    pub permission: Permission,
}

impl Grant {
    /// Create a desired grant (no remote id).
    pub fn new(subject: Subject, permission: Permission) -> Self {
        Self {
            id: None,
            subject,
            permission,
        }
    }

    /// Attach the remote identifier.
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Build a desired grant from a configuration item.
    pub fn from_item(item: &GrantItem) -> Result<Self> {
        let permission = item.permission.parse::<Permission>()?;
        let subject = Subject::from_fields(
            item.team_id,
            item.user_id,
            item.built_in_role.as_deref(),
        )?;

        if let Subject::BuiltInRole(role) = &subject
            && !BUILT_IN_ROLES.contains(&role.as_str())
        {
            return Err(Error::InvalidGrant(format!(
                "unknown built-in role {role} (expected one of {})",
                BUILT_IN_ROLES.join(", ")
            )));
        }

        Ok(Self::new(subject, permission))
    }

    /// Convert back into the configuration shape.
    pub fn to_item(&self) -> GrantItem {
        GrantItem {
            team_id: self.subject.team_id(),
            user_id: self.subject.user_id(),
            built_in_role: self.subject.built_in_role().map(str::to_string),
            permission: self.permission.to_string(),
        }
    }
}

impl PartialEq for Grant {
    fn eq(&self, other: &Self) -> bool {
        self.permission == other.permission && self.subject == other.subject
    }
}

impl Eq for Grant {}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.subject, self.permission)
    }
}

/// Build desired grants from configuration items.
///
/// Stops at the first invalid item so nothing is sent to the remote.
pub fn grants_from_items(items: &[GrantItem]) -> Result<Vec<Grant>> {
    items.iter().map(Grant::from_item).collect()
}
