use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::identity::{NodeId, PathId};
use super::error::SyncError;

const TITLE_MIN_LEN: usize = 3;
const TITLE_MAX_LEN: usize = 50;
const DESCRIPTION_MAX_LEN: usize = 500;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Blocked,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::NotStarted => "NOT_STARTED",
            NodeStatus::InProgress => "IN_PROGRESS",
            NodeStatus::Completed => "COMPLETED",
            NodeStatus::Blocked => "BLOCKED",
        }
    }

    pub fn parse(value: &str) -> Option<NodeStatus> {
        match value {
            "NOT_STARTED" => Some(NodeStatus::NotStarted),
            "IN_PROGRESS" => Some(NodeStatus::InProgress),
            "COMPLETED" => Some(NodeStatus::Completed),
            "BLOCKED" => Some(NodeStatus::Blocked),
            _ => None,
        }
    }
}

/// A node of a learning path tree as stored.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub path_id: PathId,
    pub parent_id: Option<NodeId>,
    pub title: String,
    pub description: Option<String>,
    pub status: NodeStatus,
    pub color: Option<String>,
    pub order: i32,
    pub position_x: Option<f64>,
    pub position_y: Option<f64>,
    pub estimated_time: Option<i32>,
    pub notification_date: Option<DateTime<Utc>>,
}

impl Node {
    /// Apply every field present in the patch.
    pub fn apply(&mut self, patch: &NodePatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(color) = &patch.color {
            self.color = Some(color.clone());
        }
        if let Some(order) = patch.order {
            self.order = order;
        }
        if let Some(parent_id) = &patch.parent_id {
            self.parent_id = parent_id.clone();
        }
        if let Some(x) = patch.position_x {
            self.position_x = Some(x);
        }
        if let Some(y) = patch.position_y {
            self.position_y = Some(y);
        }
        if let Some(estimated_time) = patch.estimated_time {
            self.estimated_time = Some(estimated_time);
        }
        if let Some(date) = patch.notification_date {
            self.notification_date = Some(date);
        }
    }
}

/// Distinguishes an absent field from an explicit `null`.
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Partial update of a node. Every present field is one last-writer-wins
/// register; `parentId: null` moves the node to the root.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
    #[serde(
        default,
        deserialize_with = "deserialize_some",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<Option<NodeId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_date: Option<DateTime<Utc>>,
}

impl NodePatch {
    pub const FIELDS: [&'static str; 10] = [
        "title",
        "description",
        "status",
        "color",
        "order",
        "parentId",
        "positionX",
        "positionY",
        "estimatedTime",
        "notificationDate",
    ];

    /// Names of the fields this patch changes.
    pub fn fields(&self) -> Vec<&'static str> {
        Self::FIELDS
            .iter()
            .copied()
            .filter(|field| self.has_field(field))
            .collect()
    }

    pub fn has_field(&self, field: &str) -> bool {
        match field {
            "title" => self.title.is_some(),
            "description" => self.description.is_some(),
            "status" => self.status.is_some(),
            "color" => self.color.is_some(),
            "order" => self.order.is_some(),
            "parentId" => self.parent_id.is_some(),
            "positionX" => self.position_x.is_some(),
            "positionY" => self.position_y.is_some(),
            "estimatedTime" => self.estimated_time.is_some(),
            "notificationDate" => self.notification_date.is_some(),
            _ => false,
        }
    }

    pub fn clear_field(&mut self, field: &str) {
        match field {
            "title" => self.title = None,
            "description" => self.description = None,
            "status" => self.status = None,
            "color" => self.color = None,
            "order" => self.order = None,
            "parentId" => self.parent_id = None,
            "positionX" => self.position_x = None,
            "positionY" => self.position_y = None,
            "estimatedTime" => self.estimated_time = None,
            "notificationDate" => self.notification_date = None,
            _ => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Trim text fields and check them against the node validators.
    pub fn normalize(mut self) -> Result<Self, SyncError> {
        if self.is_empty() {
            return Err(SyncError::Validation("No node fields to update".to_string()));
        }
        if let Some(title) = self.title.take() {
            self.title = Some(validate_title(&title)?);
        }
        if let Some(description) = self.description.take() {
            self.description = Some(validate_description(&description)?);
        }
        if let Some(color) = self.color.take() {
            self.color = Some(validate_color(&color)?);
        }
        if let Some(estimated_time) = self.estimated_time {
            if estimated_time < 0 {
                return Err(SyncError::Validation(
                    "Estimated time cannot be negative".to_string(),
                ));
            }
        }
        if let Some(Some(parent_id)) = &self.parent_id {
            if parent_id.trim().is_empty() {
                return Err(SyncError::Validation(
                    "Parent node ID cannot be empty".to_string(),
                ));
            }
        }
        Ok(self)
    }
}

/// Fields of a node to be created.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeDraft {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<i32>,
}

impl NodeDraft {
    pub fn normalize(mut self) -> Result<Self, SyncError> {
        self.title = validate_title(&self.title)?;
        if let Some(description) = self.description.take() {
            self.description = Some(validate_description(&description)?);
        }
        if let Some(color) = self.color.take() {
            self.color = Some(validate_color(&color)?);
        }
        Ok(self)
    }
}

fn validate_title(title: &str) -> Result<String, SyncError> {
    let title = title.trim();
    let len = title.chars().count();
    if !(TITLE_MIN_LEN..=TITLE_MAX_LEN).contains(&len) {
        return Err(SyncError::Validation(format!(
            "Title must be between {} and {} characters",
            TITLE_MIN_LEN, TITLE_MAX_LEN
        )));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || c.is_whitespace() || "-_.,!?".contains(c);
    if !title.chars().all(allowed) {
        return Err(SyncError::Validation(
            "Title can only contain letters, numbers, spaces, and basic punctuation".to_string(),
        ));
    }
    Ok(title.to_string())
}

fn validate_description(description: &str) -> Result<String, SyncError> {
    let description = description.trim();
    if description.chars().count() > DESCRIPTION_MAX_LEN {
        return Err(SyncError::Validation(format!(
            "Description cannot exceed {} characters",
            DESCRIPTION_MAX_LEN
        )));
    }
    Ok(description.to_string())
}

fn validate_color(color: &str) -> Result<String, SyncError> {
    let color = color.trim();
    if color.is_empty() {
        return Err(SyncError::Validation(
            "Color should not be empty if provided".to_string(),
        ));
    }
    Ok(color.to_string())
}
