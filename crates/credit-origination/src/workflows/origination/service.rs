use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::audit::{AuditAction, AuditEntry, EntityRef};
use super::blocking::DuplicateResolver;
use super::bureau::{Bureau, Bureaus};
use super::clock::{CLIENT_PREFIX, INITIAL_APPLICATION_PREFIX};
use super::credit_check::has_active_credit;
use super::domain::{
    Actor, Audience, Client, ClientId, CommentLog, EntityKind, InitialApplication,
    InitialApplicationId, InitialApplicationState, TaxId, UserId,
};
use super::error::{ErrorCategory, OriginationError, StateConflict};
use super::evaluation::{
    EvaluationStatus, UnderwritingConfig, UnderwritingEngine, UnderwritingVerdict,
};
use super::notification::{Notification, NotificationKind};
use super::ports::{Effects, OriginationPorts};
use super::repository::RepositoryError;

/// Merchant-submitted credit inquiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRequest {
    /// CUIT/CUIL as typed by the merchant, with or without separators.
    pub tax_id: String,
    pub merchant_id: UserId,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// The persisted application together with the verdict that decided it.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationOutcome {
    pub application: InitialApplication,
    pub client: Client,
    pub verdict: UnderwritingVerdict,
}

/// Stage of the creation sequence, reported in failure audits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CreationStep {
    TaxId,
    Duplicate,
    ActiveCredit,
    Bureaus,
    Client,
    Persist,
}

impl CreationStep {
    const fn label(self) -> &'static str {
        match self {
            CreationStep::TaxId => "tax_id",
            CreationStep::Duplicate => "duplicate_check",
            CreationStep::ActiveCredit => "active_credit",
            CreationStep::Bureaus => "bureau_verification",
            CreationStep::Client => "client_upsert",
            CreationStep::Persist => "persist",
        }
    }
}

struct StepFailure {
    step: CreationStep,
    error: OriginationError,
    bureau_flags: Option<(bool, bool)>,
    application_id: Option<InitialApplicationId>,
}

fn at<E>(step: CreationStep) -> impl FnOnce(E) -> StepFailure
where
    E: Into<OriginationError>,
{
    move |error| StepFailure {
        step,
        error: error.into(),
        bureau_flags: None,
        application_id: None,
    }
}

/// Orchestrates initial application creation, from duplicate check to merchant notification.
pub struct ApplicationLifecycleService {
    ports: OriginationPorts,
    effects: Effects,
    resolver: DuplicateResolver,
    bureaus: Bureaus,
    engine: Arc<UnderwritingEngine>,
}

impl ApplicationLifecycleService {
    pub fn new(ports: OriginationPorts, bureaus: Bureaus, config: UnderwritingConfig) -> Self {
        let effects = ports.effects();
        let resolver = DuplicateResolver::new(ports.stores.clone(), ports.users.clone());
        Self {
            ports,
            effects,
            resolver,
            bureaus,
            engine: Arc::new(UnderwritingEngine::new(config)),
        }
    }

    pub fn engine(&self) -> &UnderwritingEngine {
        &self.engine
    }

    /// Run the full creation sequence. Every failure is audited and reported to the merchant
    /// before it is returned.
    pub async fn create(
        &self,
        request: ApplicationRequest,
    ) -> Result<ApplicationOutcome, OriginationError> {
        let merchant = request.merchant_id.clone();

        let result = match TaxId::parse(&request.tax_id) {
            Ok(tax_id) => self.run_creation(&tax_id, &request).await,
            Err(error) => Err(at(CreationStep::TaxId)(error)),
        };

        match result {
            Ok(outcome) => Ok(outcome),
            Err(failure) => {
                self.record_failure(&merchant, &request.tax_id, &failure).await;
                Err(failure.error)
            }
        }
    }

    async fn run_creation(
        &self,
        tax_id: &TaxId,
        request: &ApplicationRequest,
    ) -> Result<ApplicationOutcome, StepFailure> {
        let merchant = &request.merchant_id;
        let stores = &self.ports.stores;

        self.resolver
            .resolve(tax_id, merchant)
            .await
            .map_err(at(CreationStep::Duplicate))?
            .into_result()
            .map_err(at(CreationStep::Duplicate))?;

        if has_active_credit(stores, tax_id)
            .await
            .map_err(at(CreationStep::ActiveCredit))?
        {
            return Err(at(CreationStep::ActiveCredit)(StateConflict::ActiveCredit));
        }

        let outcomes = self.bureaus.verify(tax_id).await;
        let flags = (outcomes.profile_ok(), outcomes.situation_ok());
        let report = outcomes.into_report().map_err(|failure| StepFailure {
            step: CreationStep::Bureaus,
            error: failure.into(),
            bureau_flags: Some(flags),
            application_id: None,
        })?;

        let verdict = self.engine.evaluate(&report.profile, &report.situation);

        let mut client = self
            .upsert_client(tax_id, request)
            .await
            .map_err(at(CreationStep::Client))?;

        let now = self.ports.clock.now();
        let mut application = InitialApplication {
            id: InitialApplicationId(self.ports.ids.next_id(INITIAL_APPLICATION_PREFIX)),
            created_at: now,
            state: InitialApplicationState::Pending,
            client_id: client.id.clone(),
            tax_id: tax_id.clone(),
            merchant_id: merchant.clone(),
            rejection_reason: None,
            comments: CommentLog::default(),
        };

        if report.profile.backfill(&mut client) {
            stores
                .clients
                .update(client.clone())
                .await
                .map_err(at(CreationStep::Client))?;
        }

        application = stores
            .applications
            .insert(application)
            .await
            .map_err(at(CreationStep::Persist))?;

        let correlation = Some(application.id.clone());
        let failed_at_decision = |error: RepositoryError| StepFailure {
            step: CreationStep::Persist,
            error: OriginationError::from(error),
            bureau_flags: Some(flags),
            application_id: correlation.clone(),
        };

        let decision_action = match verdict.status {
            EvaluationStatus::Approve => {
                application.state = InitialApplicationState::Approved;
                AuditAction::Approve
            }
            EvaluationStatus::Reject => {
                application.state = InitialApplicationState::Rejected;
                application.rejection_reason = Some(verdict.reason.clone());
                AuditAction::Reject
            }
            EvaluationStatus::Pend | EvaluationStatus::Inconclusive => AuditAction::Pend,
        };
        application
            .comments
            .push(Audience::Merchant, verdict.merchant_comment(), now);
        application
            .comments
            .push(Audience::Analyst, verdict.analyst_comment(), now);

        stores
            .applications
            .update(application.clone())
            .await
            .map_err(failed_at_decision)?;

        self.effects
            .record(
                AuditEntry::new(
                    decision_action,
                    EntityRef::new(EntityKind::InitialApplication, &application.id),
                )
                .detail(serde_json::to_value(&verdict).unwrap_or_default())
                .correlated(correlation.clone()),
            )
            .await;

        if decision_action == AuditAction::Pend {
            self.effects
                .notify_analysts(
                    NotificationKind::ApplicationNeedsReview,
                    &format!(
                        "La solicitud {} de {} requiere revisión manual",
                        application.id, tax_id
                    ),
                    &[
                        ("application_id", application.id.to_string()),
                        ("merchant_id", merchant.to_string()),
                    ],
                    correlation.clone(),
                )
                .await;
        }

        self.effects
            .record(
                AuditEntry::new(
                    AuditAction::Create,
                    EntityRef::new(EntityKind::InitialApplication, &application.id),
                )
                .by(Actor::User(merchant.clone()))
                .detail(json!({
                    "tax_id": tax_id.to_string(),
                    "nosis_ok": flags.0,
                    "eureka_ok": flags.1,
                    "bureaus": [Bureau::Nosis.label(), Bureau::Eureka.label()],
                    "status": verdict.status,
                    "state": application.state.label(),
                }))
                .correlated(correlation.clone()),
            )
            .await;

        self.effects
            .notify(
                Notification::new(
                    merchant.clone(),
                    NotificationKind::ApplicationCreated,
                    format!(
                        "Solicitud {} registrada: {}",
                        application.id,
                        verdict.merchant_comment()
                    ),
                )
                .with("application_id", &application.id)
                .with("state", application.state.label()),
                correlation,
            )
            .await;

        info!(
            application_id = %application.id,
            %tax_id,
            %merchant,
            state = application.state.label(),
            score = verdict.score,
            "initial application created"
        );

        Ok(ApplicationOutcome {
            application,
            client,
            verdict,
        })
    }

    async fn upsert_client(
        &self,
        tax_id: &TaxId,
        request: &ApplicationRequest,
    ) -> Result<Client, OriginationError> {
        let clients = &self.ports.stores.clients;

        if let Some(mut client) = clients.by_tax_id(tax_id).await? {
            let mut changed = false;
            if client.email.is_none() && request.email.is_some() {
                client.email = request.email.clone();
                changed = true;
            }
            if client.phone.is_none() && request.phone.is_some() {
                client.phone = request.phone.clone();
                changed = true;
            }
            if changed {
                clients.update(client.clone()).await?;
            }
            return Ok(client);
        }

        let mut client = Client::placeholder(
            ClientId(self.ports.ids.next_id(CLIENT_PREFIX)),
            tax_id.clone(),
            self.ports.clock.now(),
        );
        client.email = request.email.clone();
        client.phone = request.phone.clone();
        Ok(clients.insert(client).await?)
    }

    async fn record_failure(&self, merchant: &UserId, raw_tax_id: &str, failure: &StepFailure) {
        let error = &failure.error;
        let action = match error.category() {
            ErrorCategory::StateConflict
                if matches!(
                    failure.step,
                    CreationStep::Duplicate | CreationStep::ActiveCredit
                ) =>
            {
                AuditAction::Block
            }
            _ => AuditAction::Error,
        };

        let entity = match &failure.application_id {
            Some(id) => EntityRef::new(EntityKind::InitialApplication, id),
            None => EntityRef::unsaved(EntityKind::InitialApplication),
        };

        let mut detail = json!({
            "step": failure.step.label(),
            "tax_id": raw_tax_id,
            "category": error.category(),
            "retryable": error.is_retryable(),
            "error": error.to_string(),
        });
        if let Some((nosis_ok, eureka_ok)) = failure.bureau_flags {
            detail["nosis_ok"] = json!(nosis_ok);
            detail["eureka_ok"] = json!(eureka_ok);
        }
        if let OriginationError::Bureau(bureau_failure) = error {
            detail["bureau"] = json!(bureau_failure.bureau.label());
            detail["bureau_error"] = json!(bureau_failure.error.kind.label());
        }

        warn!(
            step = failure.step.label(),
            tax_id = raw_tax_id,
            %merchant,
            %error,
            "initial application creation failed"
        );

        self.effects
            .record(
                AuditEntry::new(action, entity)
                    .by(Actor::User(merchant.clone()))
                    .detail(detail)
                    .correlated(failure.application_id.clone()),
            )
            .await;

        self.effects
            .notify(
                Notification::new(
                    merchant.clone(),
                    NotificationKind::ApplicationFailed,
                    format!("No se pudo registrar la solicitud: {error}"),
                )
                .with("tax_id", raw_tax_id)
                .with("step", failure.step.label()),
                failure.application_id.clone(),
            )
            .await;
    }

    pub async fn get(
        &self,
        id: &InitialApplicationId,
    ) -> Result<InitialApplication, OriginationError> {
        self.ports
            .stores
            .applications
            .get(id)
            .await?
            .ok_or_else(|| StateConflict::not_found(EntityKind::InitialApplication, id).into())
    }

    pub async fn list_for_merchant(
        &self,
        merchant: &UserId,
        state: Option<InitialApplicationState>,
    ) -> Result<Vec<InitialApplication>, OriginationError> {
        Ok(self
            .ports
            .stores
            .applications
            .by_merchant(merchant, state)
            .await?)
    }

    /// Expire pending applications older than `max_age`. Returns the ids that were expired; a
    /// record that fails to persist is logged, audited and skipped.
    pub async fn expire_stale(
        &self,
        max_age: Duration,
    ) -> Result<Vec<InitialApplicationId>, OriginationError> {
        let now = self.ports.clock.now();
        let cutoff = now - max_age;
        let stale = self
            .ports
            .stores
            .applications
            .pending_created_before(cutoff)
            .await?;

        let mut expired = Vec::with_capacity(stale.len());
        for mut application in stale {
            if application.state != InitialApplicationState::Pending {
                continue;
            }
            application.state = InitialApplicationState::Expired;
            let entity = EntityRef::new(EntityKind::InitialApplication, &application.id);
            let correlation = Some(application.id.clone());

            if let Err(error) = self
                .ports
                .stores
                .applications
                .update(application.clone())
                .await
            {
                warn!(application_id = %application.id, %error, "could not expire application");
                self.effects
                    .record(
                        AuditEntry::new(AuditAction::Error, entity)
                            .detail(json!({ "step": "expire", "error": error.to_string() }))
                            .correlated(correlation),
                    )
                    .await;
                continue;
            }

            self.effects
                .record(
                    AuditEntry::new(AuditAction::Expire, entity)
                        .by(Actor::System)
                        .detail(json!({
                            "created_at": application.created_at,
                            "cutoff": cutoff,
                        }))
                        .correlated(correlation.clone()),
                )
                .await;

            self.effects
                .notify(
                    Notification::new(
                        application.merchant_id.clone(),
                        NotificationKind::ApplicationExpired,
                        format!("La solicitud {} venció sin resolución", application.id),
                    )
                    .with("application_id", &application.id),
                    correlation,
                )
                .await;

            expired.push(application.id);
        }

        if !expired.is_empty() {
            info!(count = expired.len(), %cutoff, "stale applications expired");
        }

        Ok(expired)
    }
}
