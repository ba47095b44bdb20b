use serde::{Deserialize, Serialize};

use super::identity::UserId;

/// Role granted to a collaborator on a learning path.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Viewer,
    Editor,
    Admin,
}

impl Role {
    /// Whether this role is sufficient for the given capability.
    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::View => true,
            Capability::Edit => matches!(self, Role::Editor | Role::Admin),
            Capability::ManageCollaborators => matches!(self, Role::Admin),
        }
    }
}

/// The permission being checked, distinct from the role that grants it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    View,
    Edit,
    ManageCollaborators,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::View => write!(f, "VIEW"),
            Capability::Edit => write!(f, "EDIT"),
            Capability::ManageCollaborators => write!(f, "MANAGE_COLLABORATORS"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub user_id: UserId,
    pub role: Role,
}

/// Authorization facts of a learning path, as read from storage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessFacts {
    pub owner_id: UserId,
    pub is_public: bool,
    pub collaborators: Vec<Collaborator>,
}

impl AccessFacts {
    pub fn collaborator_role(&self, user_id: &str) -> Option<Role> {
        self.collaborators
            .iter()
            .find(|c| c.user_id == user_id)
            .map(|c| c.role)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted(Role),
    Denied,
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted(_))
    }
}
