use serde::{Deserialize, Serialize};

use crate::ids::UserId;
use crate::model::{Operation, Transition};

/// Closed set of roles an actor can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Technologist,
    /// Floor-level responsible party. May only drive operations assigned to them.
    Master,
    Observer,
}

impl Role {
    /// Roles allowed to create and edit orders, operations and chain links.
    pub fn can_plan(self) -> bool {
        matches!(self, Self::Admin | Self::Technologist)
    }

    /// Roles allowed to drive lifecycle transitions at all.
    pub fn can_execute(self) -> bool {
        !matches!(self, Self::Observer)
    }

    /// Restricted roles are bound to their own assignments and leave a
    /// deviation trail on every transition.
    pub fn is_restricted(self) -> bool {
        matches!(self, Self::Master)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Technologist => write!(f, "technologist"),
            Self::Master => write!(f, "master"),
            Self::Observer => write!(f, "observer"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "technologist" => Ok(Self::Technologist),
            "master" => Ok(Self::Master),
            "observer" => Ok(Self::Observer),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// An acting party.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub role: Role,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    #[error("role {role} may not {action}")]
    RoleNotPermitted { role: Role, action: &'static str },

    #[error("{username} is not the master assigned to operation {operation}")]
    NotAssigned { username: String, operation: String },
}

impl User {
    /// Capability check for a lifecycle transition on `operation`.
    pub fn authorize_transition(
        &self,
        operation: &Operation,
        transition: Transition,
    ) -> Result<(), AccessDenied> {
        if !self.role.can_execute() {
            return Err(AccessDenied::RoleNotPermitted {
                role: self.role,
                action: match transition {
                    Transition::Start => "start operations",
                    Transition::End => "end operations",
                },
            });
        }
        if self.role.is_restricted() && operation.master.as_ref() != Some(&self.id) {
            return Err(AccessDenied::NotAssigned {
                username: self.username.clone(),
                operation: operation.id.to_string(),
            });
        }
        Ok(())
    }

    /// Capability check for planning edits.
    pub fn authorize_planning(&self) -> Result<(), AccessDenied> {
        if self.role.can_plan() {
            Ok(())
        } else {
            Err(AccessDenied::RoleNotPermitted {
                role: self.role,
                action: "edit plans",
            })
        }
    }

    /// Whether transitions by this actor leave a deviation entry.
    pub fn records_deviations(&self) -> bool {
        self.role.is_restricted()
    }
}
