use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamId(pub String);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TeamId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Organization-wide role. Team leadership is expressed by [`TeamRole`], not here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalRole {
    User,
    Admin,
    Hr,
    Superadmin,
    Extern,
}

impl GlobalRole {
    pub const ALL: [GlobalRole; 5] =
        [Self::User, Self::Admin, Self::Hr, Self::Superadmin, Self::Extern];

    /// Requests from these roles may only be decided by a superadmin.
    pub const fn is_privileged(self) -> bool {
        matches!(self, Self::Hr | Self::Superadmin)
    }

    /// Ordering used to rank teamlead candidates; lower ranks sort first.
    pub const fn candidate_rank(self) -> u8 {
        match self {
            Self::Admin => 0,
            Self::Hr => 1,
            Self::Superadmin => 2,
            Self::User | Self::Extern => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::Hr => "hr",
            Self::Superadmin => "superadmin",
            Self::Extern => "extern",
        }
    }
}

impl fmt::Display for GlobalRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GlobalRole {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            "hr" => Ok(Self::Hr),
            "superadmin" => Ok(Self::Superadmin),
            "extern" => Ok(Self::Extern),
            other => Err(DomainError::UnknownValue { kind: "global role", value: other.to_owned() }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    Member,
    Teamlead,
}

impl TeamRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Teamlead => "teamlead",
        }
    }
}

impl fmt::Display for TeamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TeamRole {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "member" => Ok(Self::Member),
            "teamlead" => Ok(Self::Teamlead),
            other => Err(DomainError::UnknownValue { kind: "team role", value: other.to_owned() }),
        }
    }
}

/// Explicit ranking between several teamleads of the same team.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTag {
    Primary,
    Backup,
    BackupBackup,
    #[default]
    None,
}

impl PriorityTag {
    pub const fn rank(self) -> u8 {
        match self {
            Self::Primary => 0,
            Self::Backup => 1,
            Self::BackupBackup => 2,
            Self::None => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Backup => "backup",
            Self::BackupBackup => "backup_backup",
            Self::None => "none",
        }
    }
}

impl fmt::Display for PriorityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorityTag {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(Self::Primary),
            "backup" => Ok(Self::Backup),
            "backup_backup" => Ok(Self::BackupBackup),
            "" | "none" => Ok(Self::None),
            other => {
                Err(DomainError::UnknownValue { kind: "priority tag", value: other.to_owned() })
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub global_role: GlobalRole,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMembership {
    pub team_id: TeamId,
    pub user_id: UserId,
    pub team_role: TeamRole,
    pub priority_tag: PriorityTag,
}

impl TeamMembership {
    /// The tag only carries meaning for teamleads; members always read as untagged.
    pub fn effective_priority(&self) -> PriorityTag {
        match self.team_role {
            TeamRole::Teamlead => self.priority_tag,
            TeamRole::Member => PriorityTag::None,
        }
    }
}

/// A teamlead membership joined with the lead's global role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamleadMembership {
    pub user_id: UserId,
    pub team_id: TeamId,
    pub team_role: TeamRole,
    pub priority_tag: PriorityTag,
    pub global_role: GlobalRole,
}
