use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::audit::{AuditAction, AuditEntry, EntityRef};
use super::domain::{
    Actor, Audience, EntityKind, FormalApplicationState, InitialApplicationState, Purchase, UserId,
};
use super::error::{OriginationError, StateConflict};
use super::ports::{Effects, OriginationPorts};

/// What a purchase rejection changed upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CascadeOutcome {
    pub formal_rejected: bool,
    pub initial_rejected: bool,
}

/// Propagates a purchase rejection to its formal and initial applications while they are still
/// open. Records that already reached a decision are never touched.
#[derive(Clone)]
pub struct CascadeRejection {
    ports: OriginationPorts,
    effects: Effects,
}

impl CascadeRejection {
    pub fn new(ports: &OriginationPorts) -> Self {
        Self {
            ports: ports.clone(),
            effects: ports.effects(),
        }
    }

    pub async fn propagate(
        &self,
        purchase: &Purchase,
        analyst: &UserId,
    ) -> Result<CascadeOutcome, OriginationError> {
        let stores = &self.ports.stores;
        let mut outcome = CascadeOutcome::default();
        let purchase_reason = purchase.rejection_reason.as_deref().unwrap_or_default();
        let reason = format!("Compra {} rechazada: {}", purchase.id, purchase_reason);

        let mut formal = stores
            .formal_applications
            .get(&purchase.formal_application_id)
            .await?
            .ok_or_else(|| {
                StateConflict::not_found(
                    EntityKind::FormalApplication,
                    &purchase.formal_application_id,
                )
            })?;
        let initial_id = formal.initial_application_id.clone();
        let correlation = Some(initial_id.clone());
        let formal_ref = EntityRef::new(EntityKind::FormalApplication, &formal.id);

        match formal.state {
            FormalApplicationState::Pending | FormalApplicationState::PendingIncrease => {
                let previous = formal.state;
                formal.state = FormalApplicationState::Rejected;
                formal.rejection_reason = Some(reason.clone());
                formal.analyst_id = Some(analyst.clone());
                formal
                    .comments
                    .push(Audience::Analyst, reason.clone(), self.ports.clock.now());
                let formal = stores.formal_applications.update(formal).await?;

                self.effects
                    .record(
                        AuditEntry::new(AuditAction::CascadeReject, formal_ref)
                            .by(Actor::User(analyst.clone()))
                            .detail(json!({
                                "purchase_id": purchase.id,
                                "previous_state": previous.label(),
                                "reason": reason,
                            }))
                            .correlated(correlation.clone()),
                    )
                    .await;
                info!(
                    formal_application_id = %formal.id,
                    purchase_id = %purchase.id,
                    "formal application rejected by cascade"
                );
                outcome.formal_rejected = true;
            }
            state => {
                self.effects
                    .record(
                        AuditEntry::new(AuditAction::Info, formal_ref)
                            .by(Actor::User(analyst.clone()))
                            .detail(json!({
                                "purchase_id": purchase.id,
                                "state": state.label(),
                                "message": "solicitud formal sin cambios tras el rechazo de la compra",
                            }))
                            .correlated(correlation.clone()),
                    )
                    .await;
            }
        }

        let mut initial = stores
            .applications
            .get(&initial_id)
            .await?
            .ok_or_else(|| StateConflict::not_found(EntityKind::InitialApplication, &initial_id))?;

        if initial.state != InitialApplicationState::Pending {
            return Ok(outcome);
        }

        // The application is only rewritten while its client still resolves.
        if stores.clients.get(&initial.client_id).await?.is_none() {
            return Err(StateConflict::not_found(EntityKind::Client, &initial.client_id).into());
        }

        initial.state = InitialApplicationState::Rejected;
        initial.rejection_reason = Some(reason.clone());
        initial
            .comments
            .push(Audience::Analyst, reason.clone(), self.ports.clock.now());
        stores.applications.update(initial).await?;

        self.effects
            .record(
                AuditEntry::new(
                    AuditAction::CascadeReject,
                    EntityRef::new(EntityKind::InitialApplication, &initial_id),
                )
                .by(Actor::User(analyst.clone()))
                .detail(json!({
                    "purchase_id": purchase.id,
                    "formal_application_id": purchase.formal_application_id,
                    "reason": reason,
                }))
                .correlated(correlation),
            )
            .await;
        info!(
            application_id = %initial_id,
            purchase_id = %purchase.id,
            "initial application rejected by cascade"
        );
        outcome.initial_rejected = true;

        Ok(outcome)
    }
}
