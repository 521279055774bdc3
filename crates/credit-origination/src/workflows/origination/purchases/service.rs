use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::super::audit::{AuditAction, AuditEntry, EntityRef};
use super::super::cascade::CascadeRejection;
use super::super::clock::PURCHASE_PREFIX;
use super::super::domain::{
    Actor, EntityKind, FormalApplication, FormalApplicationId, FormalApplicationState,
    InitialApplicationId, Purchase, PurchaseDraft, PurchaseId, PurchaseState, UserId,
};
use super::super::error::{OriginationError, StateConflict};
use super::super::notification::{Notification, NotificationKind};
use super::super::ports::{Effects, OriginationPorts};
use super::validation::{check_limit, LimitCheck, PaymentInstrument, PurchasePolicy};

/// Purchase creation, approval and rejection against approved formal applications.
pub struct PurchaseService {
    ports: OriginationPorts,
    effects: Effects,
    policy: PurchasePolicy,
    cascade: CascadeRejection,
}

impl PurchaseService {
    pub fn new(ports: OriginationPorts, policy: PurchasePolicy) -> Self {
        let effects = ports.effects();
        let cascade = CascadeRejection::new(&ports);
        Self {
            ports,
            effects,
            policy,
            cascade,
        }
    }

    pub fn policy(&self) -> &PurchasePolicy {
        &self.policy
    }

    /// Validate and persist a new pending purchase. When the weighted amount exceeds the limit of
    /// a formal application that asked for an increase, the requested limit is stored on it.
    pub async fn create(&self, draft: PurchaseDraft) -> Result<Purchase, OriginationError> {
        let merchant = draft.merchant_id.clone();
        let formal_id = draft.formal_application_id.clone();

        match self.try_create(draft).await {
            Ok(purchase) => Ok(purchase),
            Err(error) => {
                let correlation = self.correlation_for_formal(&formal_id).await;
                self.record_failure(
                    "create",
                    EntityRef::unsaved(EntityKind::Purchase),
                    Actor::User(merchant.clone()),
                    json!({ "formal_application_id": formal_id }),
                    &error,
                    correlation.clone(),
                )
                .await;
                self.effects
                    .notify(
                        Notification::new(
                            merchant,
                            NotificationKind::PurchaseFailed,
                            format!("No se pudo registrar la compra: {error}"),
                        )
                        .with("formal_application_id", &formal_id),
                        correlation,
                    )
                    .await;
                Err(error)
            }
        }
    }

    async fn try_create(&self, draft: PurchaseDraft) -> Result<Purchase, OriginationError> {
        let stores = &self.ports.stores;
        self.policy.check_draft(&draft)?;

        let mut formal = self.load_formal(&draft.formal_application_id).await?;
        require_approved(&formal)?;
        if draft.merchant_id != formal.merchant_id {
            return Err(StateConflict::ForeignMerchant {
                id: formal.id.to_string(),
                merchant_id: draft.merchant_id,
            }
            .into());
        }

        let purchase = Purchase::open(
            PurchaseId(self.ports.ids.next_id(PURCHASE_PREFIX)),
            formal.client_id.clone(),
            draft,
            self.ports.clock.now(),
        )?;
        let correlation = Some(formal.initial_application_id.clone());

        let increase = match check_limit(&formal, purchase.weighted_total())? {
            LimitCheck::WithinLimit => None,
            LimitCheck::IncreaseRequested { requested } => {
                let previous = formal.requested_limit;
                formal.requested_limit = Some(requested);
                let formal = stores.formal_applications.update(formal).await?;
                Some((formal, previous, requested))
            }
        };

        let purchase = match stores.purchases.insert(purchase).await {
            Ok(purchase) => purchase,
            Err(error) => {
                if let Some((formal, previous, _)) = increase {
                    self.restore_requested_limit(formal, previous).await;
                }
                return Err(error.into());
            }
        };

        if let Some((formal, previous, requested)) = increase {
            self.effects
                .record(
                    AuditEntry::new(
                        AuditAction::LimitIncrease,
                        EntityRef::new(EntityKind::FormalApplication, &formal.id),
                    )
                    .by(Actor::User(purchase.merchant_id.clone()))
                    .detail(json!({
                        "purchase_id": purchase.id,
                        "credit_limit": formal.credit_limit,
                        "previous_requested_limit": previous,
                        "requested_limit": requested,
                        "approved": false,
                    }))
                    .correlated(correlation.clone()),
                )
                .await;

            self.effects
                .notify_analysts(
                    NotificationKind::LimitIncreaseRequested,
                    &format!(
                        "La solicitud formal {} requiere ampliar el límite a {}",
                        formal.id, requested
                    ),
                    &[
                        ("formal_application_id", formal.id.to_string()),
                        ("requested_limit", requested.to_string()),
                    ],
                    correlation.clone(),
                )
                .await;
        }

        self.effects
            .record(
                AuditEntry::new(
                    AuditAction::Create,
                    EntityRef::new(EntityKind::Purchase, &purchase.id),
                )
                .by(Actor::User(purchase.merchant_id.clone()))
                .detail(amounts(&purchase))
                .correlated(correlation.clone()),
            )
            .await;

        self.effects
            .notify_analysts(
                NotificationKind::PurchaseCreated,
                &format!("Nueva compra {} pendiente de aprobación", purchase.id),
                &[("purchase_id", purchase.id.to_string())],
                correlation,
            )
            .await;

        info!(
            purchase_id = %purchase.id,
            formal_application_id = %purchase.formal_application_id,
            weighted_total = %purchase.weighted_total(),
            "purchase created"
        );

        Ok(purchase)
    }

    /// Approve a pending purchase. The limit is re-checked against the current formal
    /// application; on the increase branch the limit is raised to the weighted amount.
    pub async fn approve(
        &self,
        purchase_id: &PurchaseId,
        analyst: &UserId,
        instrument: PaymentInstrument,
    ) -> Result<Purchase, OriginationError> {
        match self.try_approve(purchase_id, analyst, instrument).await {
            Ok(purchase) => Ok(purchase),
            Err(error) => {
                let correlation = self.correlation_for_purchase(purchase_id).await;
                self.record_failure(
                    "approve",
                    EntityRef::new(EntityKind::Purchase, purchase_id),
                    Actor::User(analyst.clone()),
                    Value::Null,
                    &error,
                    correlation,
                )
                .await;
                Err(error)
            }
        }
    }

    async fn try_approve(
        &self,
        purchase_id: &PurchaseId,
        analyst: &UserId,
        instrument: PaymentInstrument,
    ) -> Result<Purchase, OriginationError> {
        let stores = &self.ports.stores;
        instrument.validate()?;

        let mut purchase = self.load_purchase(purchase_id).await?;
        if purchase.state != PurchaseState::Pending {
            return Err(StateConflict::invalid_state(
                EntityKind::Purchase,
                purchase_id,
                purchase.state.label(),
                PurchaseState::Pending.label(),
            )
            .into());
        }

        let mut formal = self.load_formal(&purchase.formal_application_id).await?;
        require_approved(&formal)?;
        let correlation = Some(formal.initial_application_id.clone());
        let limit_check = check_limit(&formal, purchase.weighted_total())?;

        // Purchase first: a stale purchase must not leave a raised limit behind.
        let pending = purchase.clone();
        purchase.state = PurchaseState::Approved;
        purchase.analyst_id = Some(analyst.clone());
        purchase.card_number = Some(instrument.card_number);
        purchase.account_number = Some(instrument.account_number);
        let purchase = stores.purchases.update(purchase).await?;

        let raised_from = match limit_check {
            LimitCheck::WithinLimit => None,
            LimitCheck::IncreaseRequested { requested } => {
                let previous = formal.credit_limit;
                formal.credit_limit = requested;
                formal.requested_limit = Some(requested);
                formal = match stores.formal_applications.update(formal).await {
                    Ok(formal) => formal,
                    Err(error) => {
                        self.restore_purchase(pending, &purchase).await;
                        return Err(error.into());
                    }
                };
                Some(previous)
            }
        };

        if let Some(previous) = raised_from {
            self.effects
                .record(
                    AuditEntry::new(
                        AuditAction::LimitIncrease,
                        EntityRef::new(EntityKind::FormalApplication, &formal.id),
                    )
                    .by(Actor::User(analyst.clone()))
                    .detail(json!({
                        "purchase_id": purchase.id,
                        "previous_limit": previous,
                        "credit_limit": formal.credit_limit,
                        "approved": true,
                    }))
                    .correlated(correlation.clone()),
                )
                .await;
        }

        let mut detail = amounts(&purchase);
        detail["limit_raised"] = json!(raised_from.is_some());
        self.effects
            .record(
                AuditEntry::new(
                    AuditAction::Approve,
                    EntityRef::new(EntityKind::Purchase, &purchase.id),
                )
                .by(Actor::User(analyst.clone()))
                .detail(detail)
                .correlated(correlation.clone()),
            )
            .await;

        self.effects
            .notify(
                Notification::new(
                    purchase.merchant_id.clone(),
                    NotificationKind::PurchaseApproved,
                    format!("La compra {} fue aprobada", purchase.id),
                )
                .with("purchase_id", &purchase.id),
                correlation,
            )
            .await;

        info!(purchase_id = %purchase.id, %analyst, "purchase approved");
        Ok(purchase)
    }

    /// Reject a pending or approved purchase, then cascade the rejection upstream. Cascade
    /// failures are logged and audited but never returned.
    pub async fn reject(
        &self,
        purchase_id: &PurchaseId,
        analyst: &UserId,
        reason: &str,
    ) -> Result<Purchase, OriginationError> {
        let purchase = match self.try_reject(purchase_id, analyst, reason).await {
            Ok(purchase) => purchase,
            Err(error) => {
                let correlation = self.correlation_for_purchase(purchase_id).await;
                self.record_failure(
                    "reject",
                    EntityRef::new(EntityKind::Purchase, purchase_id),
                    Actor::User(analyst.clone()),
                    json!({ "reason": reason }),
                    &error,
                    correlation,
                )
                .await;
                return Err(error);
            }
        };

        if let Err(error) = self.cascade.propagate(&purchase, analyst).await {
            let correlation = self.correlation_for_purchase(purchase_id).await;
            warn!(purchase_id = %purchase.id, %error, "rejection cascade failed");
            self.record_failure(
                "cascade",
                EntityRef::new(EntityKind::Purchase, &purchase.id),
                Actor::User(analyst.clone()),
                json!({ "formal_application_id": purchase.formal_application_id }),
                &error,
                correlation,
            )
            .await;
        }

        Ok(purchase)
    }

    async fn try_reject(
        &self,
        purchase_id: &PurchaseId,
        analyst: &UserId,
        reason: &str,
    ) -> Result<Purchase, OriginationError> {
        let reason = self.policy.check_reason(reason)?;

        let mut purchase = self.load_purchase(purchase_id).await?;
        if !matches!(
            purchase.state,
            PurchaseState::Pending | PurchaseState::Approved
        ) {
            return Err(StateConflict::invalid_state(
                EntityKind::Purchase,
                purchase_id,
                purchase.state.label(),
                "pendiente o aprobada",
            )
            .into());
        }

        let previous = purchase.state;
        purchase.state = PurchaseState::Rejected;
        purchase.analyst_id = Some(analyst.clone());
        purchase.rejection_reason = Some(reason.clone());
        let purchase = self.ports.stores.purchases.update(purchase).await?;

        let correlation = self.correlation_for_formal(&purchase.formal_application_id).await;
        self.effects
            .record(
                AuditEntry::new(
                    AuditAction::Reject,
                    EntityRef::new(EntityKind::Purchase, &purchase.id),
                )
                .by(Actor::User(analyst.clone()))
                .detail(json!({
                    "previous_state": previous.label(),
                    "reason": reason,
                }))
                .correlated(correlation.clone()),
            )
            .await;

        self.effects
            .notify(
                Notification::new(
                    purchase.merchant_id.clone(),
                    NotificationKind::PurchaseRejected,
                    format!("La compra {} fue rechazada: {}", purchase.id, reason),
                )
                .with("purchase_id", &purchase.id),
                correlation,
            )
            .await;

        info!(purchase_id = %purchase.id, %analyst, "purchase rejected");
        Ok(purchase)
    }

    pub async fn get(&self, id: &PurchaseId) -> Result<Purchase, OriginationError> {
        self.load_purchase(id).await
    }

    pub async fn list_for_formal_application(
        &self,
        id: &FormalApplicationId,
    ) -> Result<Vec<Purchase>, OriginationError> {
        Ok(self.ports.stores.purchases.by_formal_application(id).await?)
    }

    pub async fn list_for_merchant(
        &self,
        merchant: &UserId,
    ) -> Result<Vec<Purchase>, OriginationError> {
        Ok(self.ports.stores.purchases.by_merchant(merchant).await?)
    }

    pub async fn list_by_state(
        &self,
        state: PurchaseState,
    ) -> Result<Vec<Purchase>, OriginationError> {
        Ok(self.ports.stores.purchases.by_state(state).await?)
    }

    async fn load_purchase(&self, id: &PurchaseId) -> Result<Purchase, OriginationError> {
        self.ports
            .stores
            .purchases
            .get(id)
            .await?
            .ok_or_else(|| StateConflict::not_found(EntityKind::Purchase, id).into())
    }

    async fn load_formal(
        &self,
        id: &FormalApplicationId,
    ) -> Result<FormalApplication, OriginationError> {
        self.ports
            .stores
            .formal_applications
            .get(id)
            .await?
            .ok_or_else(|| StateConflict::not_found(EntityKind::FormalApplication, id).into())
    }

    async fn correlation_for_formal(
        &self,
        id: &FormalApplicationId,
    ) -> Option<InitialApplicationId> {
        match self.ports.stores.formal_applications.get(id).await {
            Ok(Some(formal)) => Some(formal.initial_application_id),
            _ => None,
        }
    }

    /// Purchase → formal application → initial application, without loading the purchase.
    async fn correlation_for_purchase(&self, id: &PurchaseId) -> Option<InitialApplicationId> {
        match self.ports.stores.purchases.formal_application_of(id).await {
            Ok(Some(formal_id)) => self.correlation_for_formal(&formal_id).await,
            _ => None,
        }
    }

    /// Undo a requested limit written for a purchase that was never stored.
    async fn restore_requested_limit(
        &self,
        mut formal: FormalApplication,
        previous: Option<Decimal>,
    ) {
        let formal_id = formal.id.clone();
        formal.requested_limit = previous;
        if let Err(error) = self.ports.stores.formal_applications.update(formal).await {
            warn!(formal_application_id = %formal_id, %error, "requested limit not restored");
        }
    }

    /// Put an approved purchase back to the state it had before approval.
    async fn restore_purchase(&self, mut pending: Purchase, stored: &Purchase) {
        pending.version = stored.version;
        if let Err(error) = self.ports.stores.purchases.update(pending).await {
            warn!(purchase_id = %stored.id, %error, "approval not rolled back");
        }
    }

    async fn record_failure(
        &self,
        operation: &str,
        entity: EntityRef,
        actor: Actor,
        context: Value,
        error: &OriginationError,
        correlation: Option<InitialApplicationId>,
    ) {
        warn!(operation, %error, "purchase operation failed");
        self.effects
            .record(
                AuditEntry::new(AuditAction::Error, entity)
                    .by(actor)
                    .detail(json!({
                        "operation": operation,
                        "category": error.category(),
                        "retryable": error.is_retryable(),
                        "error": error.to_string(),
                        "context": context,
                    }))
                    .correlated(correlation),
            )
            .await;
    }
}

fn require_approved(formal: &FormalApplication) -> Result<(), StateConflict> {
    if formal.state == FormalApplicationState::Approved {
        return Ok(());
    }
    Err(StateConflict::invalid_state(
        EntityKind::FormalApplication,
        &formal.id,
        formal.state.label(),
        FormalApplicationState::Approved.label(),
    ))
}

fn amounts(purchase: &Purchase) -> Value {
    json!({
        "formal_application_id": purchase.formal_application_id,
        "state": purchase.state.label(),
        "installments": purchase.installments(),
        "total": purchase.total(),
        "weighting": purchase.weighting(),
        "weighted_total": purchase.weighted_total(),
        "installment_value": purchase.installment_value(),
    })
}
