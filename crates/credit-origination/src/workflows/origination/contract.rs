use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};

use super::audit::{AuditAction, AuditEntry, EntityRef};
use super::clock::CONTRACT_PREFIX;
use super::domain::{
    Actor, Contract, ContractData, ContractId, ContractState, EntityKind, FormalApplication,
    FormalApplicationId, FormalApplicationState, PurchaseState, RateSet,
};
use super::error::{OriginationError, RenderError, StateConflict};
use super::notification::{Notification, NotificationKind};
use super::ports::{Effects, OriginationPorts};
use super::repository::RepositoryError;

/// Source of the interest rates printed on a contract.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn active_rates(&self) -> Result<RateSet, RepositoryError>;
    async fn rate(&self, name: &str) -> Result<Option<Decimal>, RepositoryError>;
}

/// Turns assembled contract data into the document bytes handed to the client.
pub trait ContractRenderer: Send + Sync {
    fn render(&self, data: &ContractData) -> Result<Vec<u8>, RenderError>;
}

/// Renders the contract data as pretty-printed JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonContractRenderer;

impl ContractRenderer for JsonContractRenderer {
    fn render(&self, data: &ContractData) -> Result<Vec<u8>, RenderError> {
        serde_json::to_vec_pretty(data).map_err(|error| RenderError(error.to_string()))
    }
}

/// Generates the single contract of an approved formal application.
pub struct ContractService {
    ports: OriginationPorts,
    effects: Effects,
    rates: Arc<dyn RateProvider>,
    renderer: Arc<dyn ContractRenderer>,
}

impl ContractService {
    pub fn new(
        ports: OriginationPorts,
        rates: Arc<dyn RateProvider>,
        renderer: Arc<dyn ContractRenderer>,
    ) -> Self {
        let effects = ports.effects();
        Self {
            ports,
            effects,
            rates,
            renderer,
        }
    }

    /// Return the existing contract for the formal application, or generate, persist and audit
    /// a new one.
    pub async fn generate(
        &self,
        formal_id: &FormalApplicationId,
        actor: Actor,
    ) -> Result<Contract, OriginationError> {
        let existing = self
            .ports
            .stores
            .contracts
            .by_formal_application(formal_id)
            .await?;
        if let Some(contract) = existing.into_iter().next() {
            return Ok(contract);
        }

        match self.assemble(formal_id, &actor).await {
            Ok(contract) => Ok(contract),
            Err(error) => {
                let correlation = match self.ports.stores.formal_applications.get(formal_id).await
                {
                    Ok(Some(formal)) => Some(formal.initial_application_id),
                    _ => None,
                };
                warn!(formal_application_id = %formal_id, %error, "contract generation failed");
                self.effects
                    .record(
                        AuditEntry::new(
                            AuditAction::Error,
                            EntityRef::new(EntityKind::FormalApplication, formal_id),
                        )
                        .by(actor)
                        .detail(json!({
                            "operation": "generate_contract",
                            "category": error.category(),
                            "error": error.to_string(),
                        }))
                        .correlated(correlation),
                    )
                    .await;
                Err(error)
            }
        }
    }

    pub async fn rate(&self, name: &str) -> Result<Option<Decimal>, OriginationError> {
        Ok(self.rates.rate(name).await?)
    }

    async fn assemble(
        &self,
        formal_id: &FormalApplicationId,
        actor: &Actor,
    ) -> Result<Contract, OriginationError> {
        let stores = &self.ports.stores;

        let formal = stores
            .formal_applications
            .get(formal_id)
            .await?
            .ok_or_else(|| StateConflict::not_found(EntityKind::FormalApplication, formal_id))?;
        if formal.state != FormalApplicationState::Approved {
            return Err(StateConflict::invalid_state(
                EntityKind::FormalApplication,
                formal_id,
                formal.state.label(),
                FormalApplicationState::Approved.label(),
            )
            .into());
        }

        let purchases = stores.purchases.by_formal_application(formal_id).await?;
        if !purchases
            .iter()
            .any(|purchase| purchase.state != PurchaseState::Rejected)
        {
            return Err(StateConflict::NoActivePurchase {
                id: formal_id.to_string(),
            }
            .into());
        }

        let data = self.contract_data(&formal).await?;
        let payload = self.renderer.render(&data)?;
        let now = self.ports.clock.now();

        let contract = stores
            .contracts
            .insert(Contract {
                id: ContractId(self.ports.ids.next_id(CONTRACT_PREFIX)),
                formal_application_id: formal.id.clone(),
                state: ContractState::Generated,
                data,
                payload,
                created_at: now,
            })
            .await?;

        let correlation = Some(formal.initial_application_id.clone());
        self.effects
            .record(
                AuditEntry::new(
                    AuditAction::ContractGenerated,
                    EntityRef::new(EntityKind::Contract, &contract.id),
                )
                .by(actor.clone())
                .detail(json!({
                    "formal_application_id": formal.id,
                    "credit_limit": contract.data.credit_limit,
                    "rate_set": contract.data.rates.name,
                    "bytes": contract.payload.len(),
                }))
                .correlated(correlation.clone()),
            )
            .await;

        self.effects
            .notify(
                Notification::new(
                    formal.merchant_id.clone(),
                    NotificationKind::ContractGenerated,
                    format!("Contrato {} generado", contract.id),
                )
                .with("contract_id", &contract.id)
                .with("formal_application_id", &formal.id),
                correlation,
            )
            .await;

        info!(contract_id = %contract.id, formal_application_id = %formal.id, "contract generated");
        Ok(contract)
    }

    async fn contract_data(
        &self,
        formal: &FormalApplication,
    ) -> Result<ContractData, OriginationError> {
        let client = self
            .ports
            .stores
            .clients
            .get(&formal.client_id)
            .await?
            .ok_or_else(|| StateConflict::not_found(EntityKind::Client, &formal.client_id))?;

        let merchant = self.ports.users.get(&formal.merchant_id).await?;
        let (merchant_name, merchant_tax_id) = match &merchant {
            Some(user) => (
                user.display_name().to_string(),
                user.merchant.as_ref().and_then(|profile| profile.tax_id.clone()),
            ),
            None => (formal.merchant_id.to_string(), None),
        };

        let rates = self.rates.active_rates().await?;

        Ok(ContractData {
            client_name: client.full_name(),
            client_tax_id: client.tax_id.to_string(),
            client_national_id: client.national_id.clone(),
            client_address: client.address.as_ref().map(|address| address.single_line()),
            employer_name: client.employer.as_ref().map(|employer| employer.name.clone()),
            employer_tax_id: client
                .employer
                .as_ref()
                .and_then(|employer| employer.tax_id.clone()),
            merchant_name,
            merchant_tax_id,
            credit_limit: formal.credit_limit,
            rates,
            issued_on: self.ports.clock.now().date_naive(),
        })
    }
}
