use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::domain::{
    Client, ClientId, Contract, FormalApplication, FormalApplicationId, FormalApplicationState,
    InitialApplication, InitialApplicationId, InitialApplicationState, Purchase, PurchaseId,
    PurchaseState, TaxId, User, UserId,
};

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("stale write: expected version {expected}, stored version is {found}")]
    StaleVersion { expected: u64, found: u64 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn insert(
        &self,
        application: InitialApplication,
    ) -> Result<InitialApplication, RepositoryError>;
    async fn get(
        &self,
        id: &InitialApplicationId,
    ) -> Result<Option<InitialApplication>, RepositoryError>;
    async fn update(&self, application: InitialApplication) -> Result<(), RepositoryError>;
    async fn by_tax_id(&self, tax_id: &TaxId) -> Result<Vec<InitialApplication>, RepositoryError>;
    async fn by_merchant(
        &self,
        merchant: &UserId,
        state: Option<InitialApplicationState>,
    ) -> Result<Vec<InitialApplication>, RepositoryError>;
    /// Pending applications created strictly before `cutoff`.
    async fn pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<InitialApplication>, RepositoryError>;
}

/// Formal application storage. `update` is compare-and-set on `version` and returns the stored
/// record with its new version.
#[async_trait]
pub trait FormalApplicationStore: Send + Sync {
    async fn insert(
        &self,
        application: FormalApplication,
    ) -> Result<FormalApplication, RepositoryError>;
    async fn get(
        &self,
        id: &FormalApplicationId,
    ) -> Result<Option<FormalApplication>, RepositoryError>;
    async fn update(
        &self,
        application: FormalApplication,
    ) -> Result<FormalApplication, RepositoryError>;
    async fn by_initial_application(
        &self,
        id: &InitialApplicationId,
    ) -> Result<Option<FormalApplication>, RepositoryError>;
    async fn by_tax_id(&self, tax_id: &TaxId) -> Result<Vec<FormalApplication>, RepositoryError>;
    async fn by_state(
        &self,
        state: FormalApplicationState,
    ) -> Result<Vec<FormalApplication>, RepositoryError>;
}

/// Purchase storage. `update` is compare-and-set on `version`.
#[async_trait]
pub trait PurchaseStore: Send + Sync {
    async fn insert(&self, purchase: Purchase) -> Result<Purchase, RepositoryError>;
    async fn get(&self, id: &PurchaseId) -> Result<Option<Purchase>, RepositoryError>;
    async fn update(&self, purchase: Purchase) -> Result<Purchase, RepositoryError>;
    async fn by_formal_application(
        &self,
        id: &FormalApplicationId,
    ) -> Result<Vec<Purchase>, RepositoryError>;
    async fn by_merchant(&self, merchant: &UserId) -> Result<Vec<Purchase>, RepositoryError>;
    async fn by_state(&self, state: PurchaseState) -> Result<Vec<Purchase>, RepositoryError>;
    /// Parent lookup that avoids loading the full purchase.
    async fn formal_application_of(
        &self,
        id: &PurchaseId,
    ) -> Result<Option<FormalApplicationId>, RepositoryError>;
}

#[async_trait]
pub trait ContractStore: Send + Sync {
    async fn insert(&self, contract: Contract) -> Result<Contract, RepositoryError>;
    async fn by_formal_application(
        &self,
        id: &FormalApplicationId,
    ) -> Result<Vec<Contract>, RepositoryError>;
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn by_tax_id(&self, tax_id: &TaxId) -> Result<Option<Client>, RepositoryError>;
    async fn get(&self, id: &ClientId) -> Result<Option<Client>, RepositoryError>;
    async fn insert(&self, client: Client) -> Result<Client, RepositoryError>;
    async fn update(&self, client: Client) -> Result<(), RepositoryError>;
}

/// Read access to administrator, analyst and merchant accounts.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn active_analysts(&self) -> Result<Vec<User>, RepositoryError>;
}

/// Bundle of every entity store the lifecycle operations touch.
#[derive(Clone)]
pub struct Stores {
    pub applications: Arc<dyn ApplicationStore>,
    pub formal_applications: Arc<dyn FormalApplicationStore>,
    pub purchases: Arc<dyn PurchaseStore>,
    pub contracts: Arc<dyn ContractStore>,
    pub clients: Arc<dyn ClientStore>,
}
