use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ApplicationCreated,
    ApplicationFailed,
    ApplicationNeedsReview,
    ApplicationExpired,
    PurchaseCreated,
    PurchaseFailed,
    PurchaseApproved,
    PurchaseRejected,
    LimitIncreaseRequested,
    ContractGenerated,
}

impl NotificationKind {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationKind::ApplicationCreated => "application_created",
            NotificationKind::ApplicationFailed => "application_failed",
            NotificationKind::ApplicationNeedsReview => "application_needs_review",
            NotificationKind::ApplicationExpired => "application_expired",
            NotificationKind::PurchaseCreated => "purchase_created",
            NotificationKind::PurchaseFailed => "purchase_failed",
            NotificationKind::PurchaseApproved => "purchase_approved",
            NotificationKind::PurchaseRejected => "purchase_rejected",
            NotificationKind::LimitIncreaseRequested => "limit_increase_requested",
            NotificationKind::ContractGenerated => "contract_generated",
        }
    }
}

/// Fire-and-forget message addressed to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub message: String,
    pub metadata: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(user_id: UserId, kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            user_id,
            kind,
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, notification: Notification) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
