use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::workflows::origination::audit::{AuditAction, AuditEvent};
use crate::workflows::origination::bureau::{
    BureauError, BureauSituation, BureauTimeouts, Bureaus, CommercialReference,
    CreditEntityReport, EmploymentStatus, PersonalProfile, ProfileBureau, SituationBureau,
};
use crate::workflows::origination::clock::FixedClock;
use crate::workflows::origination::contract::{ContractService, JsonContractRenderer};
use crate::workflows::origination::domain::{
    Address, Client, ClientId, CommentLog, Employer, FormalApplication, FormalApplicationId,
    FormalApplicationState, InitialApplication, InitialApplicationId, InitialApplicationState,
    MerchantProfile, Purchase, PurchaseDraft, PurchaseId, PurchaseItem, PurchaseState, RateSet,
    Role, TaxId, User, UserId,
};
use crate::workflows::origination::in_memory::{InMemoryBackend, InMemoryRateProvider};
use crate::workflows::origination::purchases::{PurchasePolicy, PurchaseService};
use crate::workflows::origination::repository::{
    ApplicationStore, ClientStore, FormalApplicationStore, PurchaseStore,
};
use crate::workflows::origination::service::{ApplicationLifecycleService, ApplicationRequest};
use crate::workflows::origination::UnderwritingConfig;

pub(super) const TAX_ID: &str = "20-12345678-3";

pub(super) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
}

pub(super) fn merchant() -> UserId {
    UserId::from("com-electro")
}

pub(super) fn other_merchant() -> UserId {
    UserId::from("com-hogar")
}

pub(super) fn analyst() -> UserId {
    UserId::from("ana-1")
}

pub(super) fn tax_id() -> TaxId {
    TaxId::parse(TAX_ID).expect("valid tax id")
}

pub(super) fn request() -> ApplicationRequest {
    ApplicationRequest {
        tax_id: TAX_ID.to_string(),
        merchant_id: merchant(),
        email: Some("juan.perez@example.com".to_string()),
        phone: None,
    }
}

fn entity(code: &str, situation: u8, debt: Decimal) -> CreditEntityReport {
    CreditEntityReport {
        entity_code: code.to_string(),
        entity_name: None,
        situation,
        debt,
    }
}

pub(super) fn clean_profile() -> PersonalProfile {
    PersonalProfile {
        first_name: Some("Juan".to_string()),
        last_name: Some("Pérez".to_string()),
        national_id: Some("12345678".to_string()),
        birth_date: NaiveDate::from_ymd_opt(1985, 6, 14),
        sex: Some("M".to_string()),
        address: Some(Address {
            street: "Av. Colón".to_string(),
            number: Some("1200".to_string()),
            city: Some("Córdoba".to_string()),
            province: Some("Córdoba".to_string()),
            postal_code: Some("5000".to_string()),
        }),
        employer: Some(Employer {
            name: "Metalúrgica Centro SA".to_string(),
            tax_id: Some("30-71234567-1".to_string()),
            phone: None,
            address: None,
            monthly_income: Some(dec!(850000)),
        }),
        employment: EmploymentStatus::Employee,
        score: Some(720),
        credit_entities: vec![entity("00011", 1, dec!(15000))],
        commercial_references: vec![
            CommercialReference {
                name: "Tarjeta Naranja".to_string(),
                valid: true,
            },
            CommercialReference {
                name: "Cooperativa Obrera".to_string(),
                valid: true,
            },
        ],
        message: Some("sin observaciones".to_string()),
    }
}

/// Passes every rule except the debt-entity count.
pub(super) fn indebted_profile() -> PersonalProfile {
    PersonalProfile {
        credit_entities: vec![
            entity("00011", 1, dec!(15000)),
            entity("00007", 1, dec!(42000)),
            entity("00285", 1, dec!(9800)),
        ],
        ..clean_profile()
    }
}

/// One entity in situation 2 leaves the verdict pending.
pub(super) fn watchlist_profile() -> PersonalProfile {
    PersonalProfile {
        credit_entities: vec![entity("00011", 2, dec!(15000))],
        ..clean_profile()
    }
}

pub(super) fn normal_situation() -> BureauSituation {
    BureauSituation {
        code: Some("NORMAL".to_string()),
        analyst_message: Some("consulta sin alertas".to_string()),
        merchant_message: None,
        observations: Vec::new(),
    }
}

pub(super) struct StubProfileBureau {
    response: Mutex<Result<PersonalProfile, BureauError>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl StubProfileBureau {
    pub(super) fn answering(profile: PersonalProfile) -> Self {
        Self {
            response: Mutex::new(Ok(profile)),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn respond(&self, response: Result<PersonalProfile, BureauError>) {
        *self.response.lock().expect("stub mutex poisoned") = response;
    }

    pub(super) fn delay_by(&self, delay: Duration) {
        *self.delay.lock().expect("stub mutex poisoned") = delay;
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileBureau for StubProfileBureau {
    async fn fetch_profile(&self, _tax_id: &TaxId) -> Result<PersonalProfile, BureauError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().expect("stub mutex poisoned");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.response.lock().expect("stub mutex poisoned").clone()
    }
}

pub(super) struct StubSituationBureau {
    response: Mutex<Result<BureauSituation, BureauError>>,
    calls: AtomicUsize,
}

impl StubSituationBureau {
    pub(super) fn answering(situation: BureauSituation) -> Self {
        Self {
            response: Mutex::new(Ok(situation)),
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn respond(&self, response: Result<BureauSituation, BureauError>) {
        *self.response.lock().expect("stub mutex poisoned") = response;
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SituationBureau for StubSituationBureau {
    async fn fetch_situation(&self, _tax_id: &TaxId) -> Result<BureauSituation, BureauError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.lock().expect("stub mutex poisoned").clone()
    }
}

fn user(id: UserId, name: &str, role: Role, active: bool) -> User {
    User {
        id,
        name: name.to_string(),
        email: format!("{name}@example.com").to_lowercase().replace(' ', "."),
        role,
        active,
        permissions: BTreeSet::new(),
        merchant: None,
    }
}

fn merchant_user(id: UserId, store: &str) -> User {
    User {
        merchant: Some(MerchantProfile {
            store_name: store.to_string(),
            tax_id: Some("30-70000000-7".to_string()),
            address: None,
        }),
        ..user(id, "Titular Comercio", Role::Merchant, true)
    }
}

pub(super) fn rate_set() -> RateSet {
    RateSet {
        name: "tasas-2026-03".to_string(),
        rates: BTreeMap::from([
            ("tna".to_string(), dec!(0.89)),
            ("tem".to_string(), dec!(0.0742)),
        ]),
    }
}

pub(super) struct Harness {
    pub(super) backend: InMemoryBackend,
    pub(super) clock: Arc<FixedClock>,
    pub(super) profile: Arc<StubProfileBureau>,
    pub(super) situation: Arc<StubSituationBureau>,
}

impl Harness {
    pub(super) async fn new() -> Self {
        let clock = Arc::new(FixedClock::new(start()));
        let backend = InMemoryBackend::with_clock(clock.clone());

        backend.users.add(merchant_user(merchant(), "Electro Sur")).await;
        backend.users.add(merchant_user(other_merchant(), "Hogar Norte")).await;
        backend
            .users
            .add(user(analyst(), "Laura Gómez", Role::Analyst, true))
            .await;
        backend
            .users
            .add(user("ana-2".into(), "Pedro Ruiz", Role::Analyst, false))
            .await;

        Self {
            backend,
            clock,
            profile: Arc::new(StubProfileBureau::answering(clean_profile())),
            situation: Arc::new(StubSituationBureau::answering(normal_situation())),
        }
    }

    pub(super) fn bureaus(&self) -> Bureaus {
        Bureaus {
            profile: self.profile.clone(),
            situation: self.situation.clone(),
            timeouts: BureauTimeouts {
                profile: Duration::from_millis(100),
                situation: Duration::from_millis(100),
            },
        }
    }

    pub(super) fn lifecycle(&self) -> ApplicationLifecycleService {
        ApplicationLifecycleService::new(
            self.backend.ports(),
            self.bureaus(),
            UnderwritingConfig::default(),
        )
    }

    pub(super) fn purchases(&self) -> PurchaseService {
        PurchaseService::new(self.backend.ports(), PurchasePolicy::default())
    }

    pub(super) fn contracts(&self) -> ContractService {
        ContractService::new(
            self.backend.ports(),
            Arc::new(InMemoryRateProvider::new(rate_set())),
            Arc::new(JsonContractRenderer),
        )
    }

    /// Client for the default tax id, created on first use.
    pub(super) async fn client(&self) -> Client {
        if let Some(client) = self
            .backend
            .clients
            .by_tax_id(&tax_id())
            .await
            .expect("client lookup")
        {
            return client;
        }
        let mut client = Client::placeholder(ClientId::from("cli-seed"), tax_id(), start());
        clean_profile().backfill(&mut client);
        self.backend
            .clients
            .insert(client)
            .await
            .expect("client inserted")
    }

    pub(super) async fn seed_application(
        &self,
        id: &str,
        merchant: UserId,
        state: InitialApplicationState,
        created_at: DateTime<Utc>,
    ) -> InitialApplication {
        let client = self.client().await;
        self.backend
            .applications
            .insert(InitialApplication {
                id: InitialApplicationId::from(id),
                created_at,
                state,
                client_id: client.id,
                tax_id: tax_id(),
                merchant_id: merchant,
                rejection_reason: None,
                comments: CommentLog::default(),
            })
            .await
            .expect("application inserted")
    }

    pub(super) async fn seed_formal(
        &self,
        initial: &InitialApplication,
        state: FormalApplicationState,
        credit_limit: Decimal,
        requests_limit_increase: bool,
    ) -> FormalApplication {
        self.backend
            .formal_applications
            .insert(FormalApplication {
                id: FormalApplicationId(format!("sf-{}", initial.id)),
                initial_application_id: initial.id.clone(),
                client_id: initial.client_id.clone(),
                tax_id: initial.tax_id.clone(),
                merchant_id: initial.merchant_id.clone(),
                state,
                credit_limit,
                requests_limit_increase,
                requested_limit: None,
                comments: CommentLog::default(),
                analyst_id: None,
                rejection_reason: None,
                created_at: initial.created_at,
                version: 0,
            })
            .await
            .expect("formal application inserted")
    }

    /// Stores a purchase directly, bypassing the creation checks.
    pub(super) async fn seed_purchase(
        &self,
        id: &str,
        formal: &FormalApplication,
        state: PurchaseState,
        unit_price: Decimal,
    ) -> Purchase {
        let mut purchase = Purchase::open(
            PurchaseId::from(id),
            formal.client_id.clone(),
            draft(&formal.id, 6, unit_price),
            start(),
        )
        .expect("amounts in range");
        purchase.state = state;
        self.backend
            .purchases
            .insert(purchase)
            .await
            .expect("purchase inserted")
    }

    pub(super) async fn audit(&self) -> Vec<AuditEvent> {
        self.backend.audit.events().await
    }

    pub(super) async fn audit_actions(&self) -> Vec<AuditAction> {
        self.audit().await.into_iter().map(|event| event.action).collect()
    }
}

/// One item at `unit_price`, weighted by 1.20.
pub(super) fn draft(
    formal: &FormalApplicationId,
    installments: u8,
    unit_price: Decimal,
) -> PurchaseDraft {
    PurchaseDraft {
        formal_application_id: formal.clone(),
        merchant_id: merchant(),
        description: "Heladera no frost".to_string(),
        items: vec![PurchaseItem {
            name: "Heladera 360L".to_string(),
            unit_price,
            quantity: 1,
        }],
        installments,
        weighting: dec!(1.20),
    }
}
