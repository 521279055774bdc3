use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use super::audit::{AuditAction, AuditEntry, AuditEvent, AuditSink, EntityRef};
use super::clock::{Clock, IdSource, AUDIT_PREFIX};
use super::domain::{AuditEventId, EntityKind, InitialApplicationId};
use super::notification::{Notification, NotificationKind, NotificationSink};
use super::repository::{Stores, UserDirectory};

/// Every collaborator the origination services reach through a port.
#[derive(Clone)]
pub struct OriginationPorts {
    pub stores: Stores,
    pub users: Arc<dyn UserDirectory>,
    pub audit: Arc<dyn AuditSink>,
    pub notifications: Arc<dyn NotificationSink>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdSource>,
}

impl OriginationPorts {
    pub(crate) fn effects(&self) -> Effects {
        Effects {
            audit: self.audit.clone(),
            notifications: self.notifications.clone(),
            users: self.users.clone(),
            clock: self.clock.clone(),
            ids: self.ids.clone(),
        }
    }
}

/// Audit and notification side flows. Neither ever fails the calling operation: sink errors are
/// logged, and notification errors are additionally written to the audit trail.
#[derive(Clone)]
pub(crate) struct Effects {
    audit: Arc<dyn AuditSink>,
    notifications: Arc<dyn NotificationSink>,
    users: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
}

impl Effects {
    pub(crate) async fn record(&self, entry: AuditEntry) {
        let event = AuditEvent {
            id: AuditEventId(self.ids.next_id(AUDIT_PREFIX)),
            actor: entry.actor,
            action: entry.action,
            entity: entry.entity,
            detail: entry.detail,
            initial_application_id: entry.initial_application_id,
            at: self.clock.now(),
        };
        let action = event.action;

        if let Err(error) = self.audit.append(event).await {
            warn!(action = action.label(), %error, "audit event dropped");
        }
    }

    pub(crate) async fn notify(
        &self,
        notification: Notification,
        correlation: Option<InitialApplicationId>,
    ) {
        let user_id = notification.user_id.clone();
        let kind = notification.kind;

        if let Err(error) = self.notifications.publish(notification).await {
            warn!(%user_id, kind = kind.label(), %error, "notification failed");
            self.record(
                AuditEntry::new(AuditAction::NotificationFailed, application_ref(&correlation))
                    .detail(json!({
                        "user_id": user_id,
                        "kind": kind.label(),
                        "error": error.to_string(),
                    }))
                    .correlated(correlation),
            )
            .await;
        }
    }

    /// Fan a message out to every active analyst.
    pub(crate) async fn notify_analysts(
        &self,
        kind: NotificationKind,
        message: &str,
        metadata: &[(&str, String)],
        correlation: Option<InitialApplicationId>,
    ) {
        let analysts = match self.users.active_analysts().await {
            Ok(analysts) => analysts,
            Err(error) => {
                warn!(%error, "could not load analysts to notify");
                self.record(
                    AuditEntry::new(AuditAction::NotificationFailed, application_ref(&correlation))
                        .detail(json!({
                            "kind": kind.label(),
                            "error": error.to_string(),
                        }))
                        .correlated(correlation),
                )
                .await;
                return;
            }
        };

        for analyst in analysts {
            let mut notification = Notification::new(analyst.id, kind, message);
            for (key, value) in metadata {
                notification = notification.with(key, value);
            }
            self.notify(notification, correlation.clone()).await;
        }
    }
}

fn application_ref(correlation: &Option<InitialApplicationId>) -> EntityRef {
    match correlation {
        Some(id) => EntityRef::new(EntityKind::InitialApplication, id),
        None => EntityRef::unsaved(EntityKind::InitialApplication),
    }
}
