use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{NaiveDate, NaiveTime, Utc};
use clap::Args;
use credit_origination::config::OriginationConfig;
use credit_origination::error::AppError;
use credit_origination::workflows::origination::in_memory::{
    InMemoryBackend, InMemoryRateProvider,
};
use credit_origination::workflows::origination::{
    Actor, ApplicationLifecycleService, ApplicationOutcome, ApplicationRequest, Bureau,
    BureauFailure, BureauSituation, Bureaus, Clock, CommentLog, ContractService, EntityKind,
    FixedClock, FormalApplication, FormalApplicationId, FormalApplicationState,
    FormalApplicationStore, JsonContractRenderer, OriginationError, PaymentInstrument,
    PersonalProfile, PurchaseDraft, PurchaseItem, PurchaseService, RateSet, StateConflict,
    UnderwritingEngine, UserId, VerifiedSituation,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::info;

use crate::infra::{
    analyst, clean_profile, indebted_profile, merchant, write_audit_csv, ScriptedProfileBureau,
    ScriptedSituationBureau,
};

const APPROVED_APPLICANT: &str = "27-30111222-4";
const REJECTED_APPLICANT: &str = "20-25999888-1";
const PENDING_APPLICANT: &str = "23-33444555-9";
const INCREASE_APPLICANT: &str = "27-35666777-2";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Business date the demo starts on (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Write the resulting audit trail to this CSV file.
    #[arg(long)]
    pub(crate) audit_csv: Option<PathBuf>,
    /// Simulated profile bureau latency in milliseconds.
    #[arg(long, default_value_t = 0)]
    pub(crate) bureau_latency_ms: u64,
}

#[derive(Args, Debug)]
pub(crate) struct EvaluateArgs {
    /// JSON file holding `profile` and `situation` bureau payloads.
    #[arg(long)]
    pub(crate) input: PathBuf,
}

#[derive(Debug, Deserialize)]
struct EvaluationInput {
    profile: PersonalProfile,
    situation: BureauSituation,
}

/// Score a stored pair of bureau payloads without touching any store.
pub(crate) fn run_evaluate(
    args: EvaluateArgs,
    config: &OriginationConfig,
) -> Result<(), AppError> {
    let raw = std::fs::read_to_string(&args.input)?;
    let input: EvaluationInput = serde_json::from_str(&raw)?;
    let situation = VerifiedSituation::try_from(input.situation).map_err(|error| {
        OriginationError::from(BureauFailure {
            bureau: Bureau::Eureka,
            error,
        })
    })?;

    let verdict =
        UnderwritingEngine::new(config.underwriting.clone()).evaluate(&input.profile, &situation);
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

struct Demo {
    backend: InMemoryBackend,
    clock: Arc<FixedClock>,
    lifecycle: ApplicationLifecycleService,
    purchases: PurchaseService,
    contracts: ContractService,
}

impl Demo {
    async fn new(args: &DemoArgs, config: &OriginationConfig) -> Self {
        let today = args.today.unwrap_or_else(|| Utc::now().date_naive());
        let opening = today
            .and_time(NaiveTime::from_hms_opt(10, 0, 0).unwrap_or_default())
            .and_utc();
        let clock = Arc::new(FixedClock::new(opening));
        let backend = InMemoryBackend::with_clock(clock.clone());

        backend
            .users
            .add(merchant("com-centro", "Electro Centro", "30-71555111-2"))
            .await;
        backend
            .users
            .add(merchant("com-norte", "Hogar Norte", "30-71555222-8"))
            .await;
        backend.users.add(analyst("ana-1", "Lucía Díaz")).await;

        let profiles = ScriptedProfileBureau::default()
            .with(APPROVED_APPLICANT, clean_profile("Valeria", "Suárez", "30111222"))
            .with(REJECTED_APPLICANT, indebted_profile("Martín", "Ledesma"))
            .with(PENDING_APPLICANT, clean_profile("Jorge", "Acosta", "33444555"))
            .with(INCREASE_APPLICANT, clean_profile("Camila", "Ríos", "35666777"))
            .with_latency(StdDuration::from_millis(args.bureau_latency_ms));
        let situations = ScriptedSituationBureau::default()
            .with(APPROVED_APPLICANT, "APROBADO", "Cliente apto para crédito")
            .with(REJECTED_APPLICANT, "RECHAZADO", "No es posible otorgar crédito")
            .with(PENDING_APPLICANT, "OBSERVADO", "Requiere revisión de un analista")
            .with(INCREASE_APPLICANT, "NORMAL", "Cliente apto para crédito");

        let bureaus = Bureaus {
            profile: Arc::new(profiles),
            situation: Arc::new(situations),
            timeouts: config.bureau_timeouts,
        };

        Self {
            lifecycle: ApplicationLifecycleService::new(
                backend.ports(),
                bureaus,
                config.underwriting.clone(),
            ),
            purchases: PurchaseService::new(backend.ports(), config.purchases.clone()),
            contracts: ContractService::new(
                backend.ports(),
                Arc::new(InMemoryRateProvider::new(RateSet {
                    name: "vigentes".to_string(),
                    rates: BTreeMap::from([
                        ("tna".to_string(), dec!(0.89)),
                        ("tem".to_string(), dec!(0.0742)),
                        ("punitorio".to_string(), dec!(0.5)),
                    ]),
                })),
                Arc::new(JsonContractRenderer),
            ),
            backend,
            clock,
        }
    }

    async fn apply(&self, tax_id: &str, merchant_id: &str) -> Option<ApplicationOutcome> {
        let request = ApplicationRequest {
            tax_id: tax_id.to_string(),
            merchant_id: UserId::from(merchant_id),
            email: None,
            phone: Some("+54 351 555 0199".to_string()),
        };
        match self.lifecycle.create(request).await {
            Ok(outcome) => {
                println!(
                    "  {} {} -> {} (score {}, {})",
                    outcome.application.id,
                    outcome.client.full_name(),
                    outcome.application.state.label(),
                    outcome.verdict.score,
                    outcome.verdict.reason
                );
                Some(outcome)
            }
            Err(err) => {
                println!("  {tax_id} via {merchant_id} refused: {err}");
                None
            }
        }
    }

    /// Formal applications are opened by the back office; the demo seeds them directly.
    async fn open_formal(
        &self,
        id: &str,
        outcome: &ApplicationOutcome,
        credit_limit: Decimal,
        requests_limit_increase: bool,
    ) -> Result<FormalApplication, AppError> {
        let application = &outcome.application;
        let formal = self
            .backend
            .formal_applications
            .insert(FormalApplication {
                id: FormalApplicationId::from(id),
                initial_application_id: application.id.clone(),
                client_id: application.client_id.clone(),
                tax_id: application.tax_id.clone(),
                merchant_id: application.merchant_id.clone(),
                state: FormalApplicationState::Approved,
                credit_limit,
                requests_limit_increase,
                requested_limit: None,
                comments: CommentLog::default(),
                analyst_id: Some(UserId::from("ana-1")),
                rejection_reason: None,
                created_at: self.clock.now(),
                version: 0,
            })
            .await
            .map_err(OriginationError::from)?;
        println!(
            "  {} opened for {} with limit {}",
            formal.id, application.id, formal.credit_limit
        );
        Ok(formal)
    }

    async fn reload_formal(&self, id: &FormalApplicationId) -> Result<FormalApplication, AppError> {
        self.backend
            .formal_applications
            .get(id)
            .await
            .map_err(OriginationError::from)?
            .ok_or_else(|| {
                OriginationError::from(StateConflict::not_found(EntityKind::FormalApplication, id))
                    .into()
            })
    }
}

fn draft(
    formal: &FormalApplication,
    description: &str,
    items: &[(&str, Decimal, u32)],
) -> PurchaseDraft {
    PurchaseDraft {
        formal_application_id: formal.id.clone(),
        merchant_id: formal.merchant_id.clone(),
        description: description.to_string(),
        items: items
            .iter()
            .map(|(name, unit_price, quantity)| PurchaseItem {
                name: name.to_string(),
                unit_price: *unit_price,
                quantity: *quantity,
            })
            .collect(),
        installments: 12,
        weighting: dec!(1.25),
    }
}

fn instrument() -> PaymentInstrument {
    PaymentInstrument {
        card_number: "5031 7557 3453 0604".to_string(),
        account_number: "0285-000123-4".to_string(),
    }
}

pub(crate) async fn run_demo(args: DemoArgs, config: &OriginationConfig) -> Result<(), AppError> {
    let demo = Demo::new(&args, config).await;
    let analyst_id = UserId::from("ana-1");

    println!("Credit origination demo");
    println!("\nInitial applications");
    let approved = demo.apply(APPROVED_APPLICANT, "com-centro").await;
    demo.apply(REJECTED_APPLICANT, "com-centro").await;
    demo.apply(PENDING_APPLICANT, "com-norte").await;
    let increase = demo.apply(INCREASE_APPLICANT, "com-norte").await;

    if let Some(outcome) = &approved {
        println!("\nPurchase within the credit limit");
        let formal = demo.open_formal("sf-centro-1", outcome, dec!(400000), false).await?;
        let purchase = demo
            .purchases
            .create(draft(
                &formal,
                "Heladera y lavarropas",
                &[
                    ("Heladera no frost", dec!(150000), 1),
                    ("Lavarropas 8kg", dec!(95000), 1),
                ],
            ))
            .await?;
        println!(
            "  {} total {} weighted {} in {} installments of {}",
            purchase.id,
            purchase.total(),
            purchase.weighted_total(),
            purchase.installments(),
            purchase.installment_value()
        );
        let purchase = demo
            .purchases
            .approve(&purchase.id, &analyst_id, instrument())
            .await?;
        println!("  {} -> {}", purchase.id, purchase.state.label());

        let contract = demo
            .contracts
            .generate(&formal.id, Actor::User(analyst_id.clone()))
            .await?;
        println!(
            "  contract {} for {} at {} ({} bytes)",
            contract.id,
            contract.data.client_name,
            contract.data.merchant_name,
            contract.payload.len()
        );

        println!("\nSame applicant through another merchant");
        demo.apply(APPROVED_APPLICANT, "com-norte").await;
    }

    if let Some(outcome) = &increase {
        println!("\nPurchase above the credit limit");
        let formal = demo.open_formal("sf-norte-1", outcome, dec!(150000), true).await?;
        let purchase = demo
            .purchases
            .create(draft(
                &formal,
                "Living completo",
                &[
                    ("Sillón esquinero", dec!(140000), 1),
                    ("Mesa ratona", dec!(20000), 1),
                ],
            ))
            .await?;
        println!(
            "  {} weighted {} against limit {}",
            purchase.id,
            purchase.weighted_total(),
            formal.credit_limit
        );
        match demo
            .purchases
            .reject(&purchase.id, &analyst_id, "el ingreso declarado no cubre la cuota")
            .await
        {
            Ok(rejected) => println!(
                "  {} -> {} ({})",
                rejected.id,
                rejected.state.label(),
                rejected.rejection_reason.as_deref().unwrap_or_default()
            ),
            Err(err) => println!("  rejection failed: {err}"),
        }
        let formal = demo.reload_formal(&formal.id).await?;
        println!(
            "  {} now {} (requested limit {})",
            formal.id,
            formal.state.label(),
            formal
                .requested_limit
                .map(|limit| limit.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }

    println!("\nExpiration sweep");
    demo.clock
        .advance(config.application_expiry + chrono::Duration::days(1));
    let expired = demo.lifecycle.expire_stale(config.application_expiry).await?;
    if expired.is_empty() {
        println!("  no pending applications were old enough");
    }
    for id in &expired {
        println!("  {id} expired");
    }

    let events = demo.backend.audit.events().await;
    let mut tally: BTreeMap<&'static str, usize> = BTreeMap::new();
    for event in &events {
        *tally.entry(event.action.label()).or_default() += 1;
    }
    println!("\nAudit trail: {} events", events.len());
    for (action, count) in &tally {
        println!("  {action:<20} {count}");
    }

    let notified: BTreeSet<String> = demo
        .backend
        .notifications
        .events()
        .await
        .into_iter()
        .map(|notification| notification.user_id.to_string())
        .collect();
    println!(
        "Notified users: {}",
        notified.into_iter().collect::<Vec<_>>().join(", ")
    );

    if let Some(path) = args.audit_csv {
        let file = File::create(&path)?;
        write_audit_csv(file, &events).map_err(std::io::Error::from)?;
        info!(path = %path.display(), rows = events.len(), "audit trail exported");
        println!("Audit trail written to {}", path.display());
    }

    Ok(())
}
