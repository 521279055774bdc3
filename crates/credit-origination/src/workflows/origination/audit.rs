use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::{Actor, AuditEventId, EntityKind, InitialApplicationId};

/// Action code stored with every history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Approve,
    Reject,
    Pend,
    Block,
    Expire,
    LimitIncrease,
    CascadeReject,
    ContractGenerated,
    NotificationFailed,
    Info,
    Error,
}

impl AuditAction {
    pub const fn label(self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Approve => "APPROVE",
            AuditAction::Reject => "REJECT",
            AuditAction::Pend => "PEND",
            AuditAction::Block => "BLOCK",
            AuditAction::Expire => "EXPIRE",
            AuditAction::LimitIncrease => "LIMIT_INCREASE",
            AuditAction::CascadeReject => "CASCADE_REJECT",
            AuditAction::ContractGenerated => "CONTRACT_GENERATED",
            AuditAction::NotificationFailed => "NOTIFICATION_FAILED",
            AuditAction::Info => "INFO",
            AuditAction::Error => "ERROR",
        }
    }
}

/// The record an event is about. The id is absent when the failure happened before it existed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Option<String>,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl ToString) -> Self {
        Self {
            kind,
            id: Some(id.to_string()),
        }
    }

    pub fn unsaved(kind: EntityKind) -> Self {
        Self { kind, id: None }
    }
}

/// Append-only history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: AuditEventId,
    pub actor: Actor,
    pub action: AuditAction,
    pub entity: EntityRef,
    pub detail: Value,
    pub initial_application_id: Option<InitialApplicationId>,
    pub at: DateTime<Utc>,
}

/// Event contents before the trail stamps an id and a timestamp on it.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub actor: Actor,
    pub action: AuditAction,
    pub entity: EntityRef,
    pub detail: Value,
    pub initial_application_id: Option<InitialApplicationId>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, entity: EntityRef) -> Self {
        Self {
            actor: Actor::System,
            action,
            entity,
            detail: Value::Null,
            initial_application_id: None,
        }
    }

    pub fn by(mut self, actor: Actor) -> Self {
        self.actor = actor;
        self
    }

    pub fn detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }

    pub fn correlated(mut self, initial_application_id: Option<InitialApplicationId>) -> Self {
        self.initial_application_id = initial_application_id;
        self
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), AuditError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    #[error("audit log unavailable: {0}")]
    Unavailable(String),
}
