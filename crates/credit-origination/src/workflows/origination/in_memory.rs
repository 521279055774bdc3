//! Process-local adapters for every origination port. Used by the console demo and the tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use super::audit::{AuditError, AuditEvent, AuditSink};
use super::clock::{Clock, IdSource, SequentialIds, SystemClock};
use super::contract::RateProvider;
use super::domain::{
    Client, ClientId, Contract, FormalApplication, FormalApplicationId, FormalApplicationState,
    InitialApplication, InitialApplicationId, InitialApplicationState, Purchase, PurchaseId,
    PurchaseState, RateSet, Role, TaxId, User, UserId,
};
use super::notification::{Notification, NotificationError, NotificationSink};
use super::ports::OriginationPorts;
use super::repository::{
    ApplicationStore, ClientStore, ContractStore, FormalApplicationStore, PurchaseStore,
    RepositoryError, Stores, UserDirectory,
};

fn check_version(stored: u64, incoming: u64) -> Result<(), RepositoryError> {
    if stored == incoming {
        Ok(())
    } else {
        Err(RepositoryError::StaleVersion {
            expected: incoming,
            found: stored,
        })
    }
}

#[derive(Default, Clone)]
pub struct InMemoryApplicationStore {
    records: Arc<RwLock<BTreeMap<InitialApplicationId, InitialApplication>>>,
}

#[async_trait]
impl ApplicationStore for InMemoryApplicationStore {
    async fn insert(
        &self,
        application: InitialApplication,
    ) -> Result<InitialApplication, RepositoryError> {
        let mut records = self.records.write().await;
        if records.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        records.insert(application.id.clone(), application.clone());
        Ok(application)
    }

    async fn get(
        &self,
        id: &InitialApplicationId,
    ) -> Result<Option<InitialApplication>, RepositoryError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn update(&self, application: InitialApplication) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        match records.get_mut(&application.id) {
            Some(slot) => {
                *slot = application;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn by_tax_id(&self, tax_id: &TaxId) -> Result<Vec<InitialApplication>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|application| &application.tax_id == tax_id)
            .cloned()
            .collect())
    }

    async fn by_merchant(
        &self,
        merchant: &UserId,
        state: Option<InitialApplicationState>,
    ) -> Result<Vec<InitialApplication>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|application| &application.merchant_id == merchant)
            .filter(|application| state.map_or(true, |state| application.state == state))
            .cloned()
            .collect())
    }

    async fn pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<InitialApplication>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|application| {
                application.state == InitialApplicationState::Pending
                    && application.created_at < cutoff
            })
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryFormalApplicationStore {
    records: Arc<RwLock<BTreeMap<FormalApplicationId, FormalApplication>>>,
}

#[async_trait]
impl FormalApplicationStore for InMemoryFormalApplicationStore {
    async fn insert(
        &self,
        application: FormalApplication,
    ) -> Result<FormalApplication, RepositoryError> {
        let mut records = self.records.write().await;
        if records.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        records.insert(application.id.clone(), application.clone());
        Ok(application)
    }

    async fn get(
        &self,
        id: &FormalApplicationId,
    ) -> Result<Option<FormalApplication>, RepositoryError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn update(
        &self,
        mut application: FormalApplication,
    ) -> Result<FormalApplication, RepositoryError> {
        let mut records = self.records.write().await;
        let slot = records
            .get_mut(&application.id)
            .ok_or(RepositoryError::NotFound)?;
        check_version(slot.version, application.version)?;
        application.version += 1;
        *slot = application.clone();
        Ok(application)
    }

    async fn by_initial_application(
        &self,
        id: &InitialApplicationId,
    ) -> Result<Option<FormalApplication>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|application| &application.initial_application_id == id)
            .cloned())
    }

    async fn by_tax_id(&self, tax_id: &TaxId) -> Result<Vec<FormalApplication>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|application| &application.tax_id == tax_id)
            .cloned()
            .collect())
    }

    async fn by_state(
        &self,
        state: FormalApplicationState,
    ) -> Result<Vec<FormalApplication>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|application| application.state == state)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPurchaseStore {
    records: Arc<RwLock<BTreeMap<PurchaseId, Purchase>>>,
}

impl InMemoryPurchaseStore {
    async fn filtered(&self, keep: impl Fn(&Purchase) -> bool) -> Vec<Purchase> {
        let records = self.records.read().await;
        records
            .values()
            .filter(|purchase| keep(purchase))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PurchaseStore for InMemoryPurchaseStore {
    async fn insert(&self, purchase: Purchase) -> Result<Purchase, RepositoryError> {
        let mut records = self.records.write().await;
        if records.contains_key(&purchase.id) {
            return Err(RepositoryError::Conflict);
        }
        records.insert(purchase.id.clone(), purchase.clone());
        Ok(purchase)
    }

    async fn get(&self, id: &PurchaseId) -> Result<Option<Purchase>, RepositoryError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn update(&self, mut purchase: Purchase) -> Result<Purchase, RepositoryError> {
        let mut records = self.records.write().await;
        let slot = records
            .get_mut(&purchase.id)
            .ok_or(RepositoryError::NotFound)?;
        check_version(slot.version, purchase.version)?;
        purchase.version += 1;
        *slot = purchase.clone();
        Ok(purchase)
    }

    async fn by_formal_application(
        &self,
        id: &FormalApplicationId,
    ) -> Result<Vec<Purchase>, RepositoryError> {
        Ok(self
            .filtered(|purchase| &purchase.formal_application_id == id)
            .await)
    }

    async fn by_merchant(&self, merchant: &UserId) -> Result<Vec<Purchase>, RepositoryError> {
        Ok(self.filtered(|purchase| &purchase.merchant_id == merchant).await)
    }

    async fn by_state(&self, state: PurchaseState) -> Result<Vec<Purchase>, RepositoryError> {
        Ok(self.filtered(|purchase| purchase.state == state).await)
    }

    async fn formal_application_of(
        &self,
        id: &PurchaseId,
    ) -> Result<Option<FormalApplicationId>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .get(id)
            .map(|purchase| purchase.formal_application_id.clone()))
    }
}

/// Contract rows; a second contract for the same formal application is a conflict.
#[derive(Default, Clone)]
pub struct InMemoryContractStore {
    records: Arc<RwLock<Vec<Contract>>>,
}

#[async_trait]
impl ContractStore for InMemoryContractStore {
    async fn insert(&self, contract: Contract) -> Result<Contract, RepositoryError> {
        let mut records = self.records.write().await;
        if records.iter().any(|stored| {
            stored.id == contract.id
                || stored.formal_application_id == contract.formal_application_id
        }) {
            return Err(RepositoryError::Conflict);
        }
        records.push(contract.clone());
        Ok(contract)
    }

    async fn by_formal_application(
        &self,
        id: &FormalApplicationId,
    ) -> Result<Vec<Contract>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|contract| &contract.formal_application_id == id)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryClientStore {
    records: Arc<RwLock<BTreeMap<ClientId, Client>>>,
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn by_tax_id(&self, tax_id: &TaxId) -> Result<Option<Client>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|client| &client.tax_id == tax_id)
            .cloned())
    }

    async fn get(&self, id: &ClientId) -> Result<Option<Client>, RepositoryError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn insert(&self, client: Client) -> Result<Client, RepositoryError> {
        let mut records = self.records.write().await;
        if records.contains_key(&client.id)
            || records.values().any(|stored| stored.tax_id == client.tax_id)
        {
            return Err(RepositoryError::Conflict);
        }
        records.insert(client.id.clone(), client.clone());
        Ok(client)
    }

    async fn update(&self, client: Client) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        match records.get_mut(&client.id) {
            Some(slot) => {
                *slot = client;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }
}

impl InMemoryClientStore {
    /// Drop a client record, leaving any applications that reference it dangling.
    pub async fn remove(&self, id: &ClientId) -> Option<Client> {
        self.records.write().await.remove(id)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<BTreeMap<UserId, User>>>,
}

impl InMemoryUserDirectory {
    pub async fn add(&self, user: User) {
        self.users.write().await.insert(user.id.clone(), user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn active_analysts(&self) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .filter(|user| user.active && user.role == Role::Analyst)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct RecordingAuditSink {
    events: Arc<RwLock<Vec<AuditEvent>>>,
}

impl RecordingAuditSink {
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn append(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events.write().await.push(event);
        Ok(())
    }
}

/// Keeps published notifications; can be switched into a failing transport.
#[derive(Default, Clone)]
pub struct RecordingNotificationSink {
    events: Arc<RwLock<Vec<Notification>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotificationSink {
    pub async fn events(&self) -> Vec<Notification> {
        self.events.read().await.clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn publish(&self, notification: Notification) -> Result<(), NotificationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport("sink offline".to_string()));
        }
        self.events.write().await.push(notification);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryRateProvider {
    rates: RateSet,
}

impl InMemoryRateProvider {
    pub fn new(rates: RateSet) -> Self {
        Self { rates }
    }
}

#[async_trait]
impl RateProvider for InMemoryRateProvider {
    async fn active_rates(&self) -> Result<RateSet, RepositoryError> {
        Ok(self.rates.clone())
    }

    async fn rate(&self, name: &str) -> Result<Option<Decimal>, RepositoryError> {
        Ok(self.rates.rates.get(name).copied())
    }
}

/// Every in-memory adapter wired together, with typed handles kept for inspection.
#[derive(Clone)]
pub struct InMemoryBackend {
    pub applications: Arc<InMemoryApplicationStore>,
    pub formal_applications: Arc<InMemoryFormalApplicationStore>,
    pub purchases: Arc<InMemoryPurchaseStore>,
    pub contracts: Arc<InMemoryContractStore>,
    pub clients: Arc<InMemoryClientStore>,
    pub users: Arc<InMemoryUserDirectory>,
    pub audit: Arc<RecordingAuditSink>,
    pub notifications: Arc<RecordingNotificationSink>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdSource>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl InMemoryBackend {
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            applications: Arc::default(),
            formal_applications: Arc::default(),
            purchases: Arc::default(),
            contracts: Arc::default(),
            clients: Arc::default(),
            users: Arc::default(),
            audit: Arc::default(),
            notifications: Arc::default(),
            clock,
            ids: Arc::new(SequentialIds::new()),
        }
    }

    pub fn stores(&self) -> Stores {
        Stores {
            applications: self.applications.clone(),
            formal_applications: self.formal_applications.clone(),
            purchases: self.purchases.clone(),
            contracts: self.contracts.clone(),
            clients: self.clients.clone(),
        }
    }

    pub fn ports(&self) -> OriginationPorts {
        OriginationPorts {
            stores: self.stores(),
            users: self.users.clone(),
            audit: self.audit.clone(),
            notifications: self.notifications.clone(),
            clock: self.clock.clone(),
            ids: self.ids.clone(),
        }
    }
}
