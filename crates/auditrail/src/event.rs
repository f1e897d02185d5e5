//! Activity records and their classification dimensions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Functional area an action belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Authentication,
    Authorization,
    UserManagement,
    DataModification,
    System,
    Security,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Category; 6] = [
        Category::Authentication,
        Category::Authorization,
        Category::UserManagement,
        Category::DataModification,
        Category::System,
        Category::Security,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Authentication => "authentication",
            Category::Authorization => "authorization",
            Category::UserManagement => "user_management",
            Category::DataModification => "data_modification",
            Category::System => "system",
            Category::Security => "security",
        }
    }

    /// Exact, case-sensitive parse of the wire name.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity level, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the recorded action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Success,
    Failure,
    Error,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Success, Status::Failure, Status::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Failure => "failure",
            Status::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    /// `failure` and `error` both count towards failure streaks.
    pub fn is_failure(&self) -> bool {
        matches!(self, Status::Failure | Status::Error)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The user an activity is attributed to, attached when a query asks for the join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Actor {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: None,
        }
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// An activity as supplied by a producer, before validation and enrichment.
///
/// Classification fields are optional: anything left unset is derived from
/// the action by the categorization engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewActivity {
    /// Acting user; `None` for system events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub action: String,
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_uuid: Option<String>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_values: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_values: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl NewActivity {
    pub fn new(
        action: impl Into<String>,
        resource_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            resource_type: resource_type.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    /// An activity without a resource type, for the logger's convenience
    /// entry points which fill one in.
    pub fn event(action: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(action, String::new(), description)
    }

    pub fn user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn resource_id(mut self, resource_id: i64) -> Self {
        self.resource_id = Some(resource_id);
        self
    }

    pub fn resource_uuid(mut self, resource_uuid: impl Into<String>) -> Self {
        self.resource_uuid = Some(resource_uuid.into());
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Record before/after values of a change.
    pub fn changes(mut self, old_values: Value, new_values: Value) -> Self {
        self.old_values = Some(old_values);
        self.new_values = Some(new_values);
        self
    }

    /// Add a single metadata entry.
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }
}

/// A validated, fully classified activity ready for insertion.
///
/// The store assigns `id` and `created_at` when it turns this into an
/// [`ActivityLog`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub user_id: Option<i64>,
    pub session_id: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<i64>,
    pub resource_uuid: Option<String>,
    pub description: String,
    pub category: Category,
    pub severity: Severity,
    pub status: Status,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub metadata: Option<Map<String, Value>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// A persisted, immutable audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLog {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub action: String,
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_uuid: Option<String>,
    pub description: String,
    pub category: Category,
    pub severity: Severity,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_values: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_values: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Joined actor, present only when the query requested it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Actor>,
}

impl ActivityLog {
    /// Materialize a stored entry from a record and the store-assigned identity.
    pub fn from_record(id: i64, created_at: DateTime<Utc>, record: ActivityRecord) -> Self {
        Self {
            id,
            user_id: record.user_id,
            session_id: record.session_id,
            action: record.action,
            resource_type: record.resource_type,
            resource_id: record.resource_id,
            resource_uuid: record.resource_uuid,
            description: record.description,
            category: record.category,
            severity: record.severity,
            status: record.status,
            old_values: record.old_values,
            new_values: record.new_values,
            metadata: record.metadata,
            ip_address: record.ip_address,
            user_agent: record.user_agent,
            created_at,
            user: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
