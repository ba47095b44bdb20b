use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type ConnectionId = uuid::Uuid;
pub type UserId = String;
pub type PathId = String;
pub type NodeId = String;

/// Identity established by a verified bearer token.
#[derive(Clone, Debug, PartialEq)]
pub struct UserIdentity {
    pub id: UserId,
    pub name: String,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            issued_at: None,
            expires_at: None,
        }
    }

    /// The `{id, name}` pair peers see in presence and edit events.
    pub fn user_ref(&self) -> UserRef {
        UserRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct UserRef {
    pub id: String,
    pub name: String,
}
