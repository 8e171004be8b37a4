use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Success,
    Failed,
}

impl AuditStatus {
    pub fn as_wire(&self) -> &'static str {
        match self {
            AuditStatus::Success => "SUCCESS",
            AuditStatus::Failed => "FAILED",
        }
    }
}

/// Immutable record of one privileged action. Rows are append-only;
/// the application has no update or delete path for this table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLogEntry {
    pub id: Uuid,
    /// Nullable: e.g. a failed login before identity is resolved.
    pub actor_user_id: Option<Uuid>,
    pub action: String,
    pub module: String,
    pub before_state: Option<Value>,
    pub after_state: Option<Value>,
    pub reason: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub batch_id: Option<Uuid>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Builder-style input for one audit append. Snapshots are opaque JSON;
/// the sink never interprets them.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor_user_id: Option<Uuid>,
    pub action: String,
    pub module: String,
    pub before_state: Option<Value>,
    pub after_state: Option<Value>,
    pub reason: Option<String>,
    pub status: AuditStatus,
    pub error_message: Option<String>,
    pub batch_id: Option<Uuid>,
    pub metadata: Option<Value>,
}

impl NewAuditEntry {
    pub fn success(action: impl Into<String>, module: impl Into<String>) -> Self {
        Self::with_status(action, module, AuditStatus::Success)
    }

    pub fn failure(
        action: impl Into<String>,
        module: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let mut entry = Self::with_status(action, module, AuditStatus::Failed);
        entry.error_message = Some(error.into());
        entry
    }

    fn with_status(action: impl Into<String>, module: impl Into<String>, status: AuditStatus) -> Self {
        Self {
            actor_user_id: None,
            action: action.into(),
            module: module.into(),
            before_state: None,
            after_state: None,
            reason: None,
            status,
            error_message: None,
            batch_id: None,
            metadata: None,
        }
    }

    pub fn actor(mut self, actor_user_id: Uuid) -> Self {
        self.actor_user_id = Some(actor_user_id);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn before(mut self, snapshot: Value) -> Self {
        self.before_state = Some(snapshot);
        self
    }

    pub fn after(mut self, snapshot: Value) -> Self {
        self.after_state = Some(snapshot);
        self
    }

    pub fn batch(mut self, batch_id: Uuid) -> Self {
        self.batch_id = Some(batch_id);
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_entry_carries_error_and_status() {
        let entry = NewAuditEntry::failure("break_glass.activate", "break_glass", "forbidden")
            .actor(Uuid::new_v4())
            .reason("power outage");
        assert_eq!(entry.status, AuditStatus::Failed);
        assert_eq!(entry.error_message.as_deref(), Some("forbidden"));
        assert!(entry.actor_user_id.is_some());
    }

    #[test]
    fn builder_attaches_snapshots_and_batch() {
        let batch = Uuid::new_v4();
        let entry = NewAuditEntry::success("users.set_roles", "users")
            .before(json!({"roles": ["FACULTY"]}))
            .after(json!({"roles": ["ACADEMIC_HEAD"]}))
            .batch(batch);
        assert_eq!(entry.batch_id, Some(batch));
        assert_eq!(entry.before_state.unwrap()["roles"][0], "FACULTY");
    }
}
