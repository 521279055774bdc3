use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::ValidationError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier wrapper for credit inquiries.
    InitialApplicationId
);
string_id!(
    /// Identifier wrapper for underwriting-complete applications.
    FormalApplicationId
);
string_id!(PurchaseId);
string_id!(ContractId);
string_id!(ClientId);
string_id!(
    /// Identifier of an administrator, analyst or merchant account.
    UserId
);
string_id!(AuditEventId);

/// Argentine CUIT/CUIL, stored as its eleven digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaxId(String);

impl TaxId {
    pub fn parse(raw: &str) -> Result<Self, InvalidTaxId> {
        let digits: String = raw.chars().filter(|c| !matches!(c, '-' | ' ' | '.')).collect();
        if digits.len() != 11 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(InvalidTaxId(raw.to_string()));
        }
        Ok(Self(digits))
    }

    pub fn digits(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", &self.0[..2], &self.0[2..10], &self.0[10..])
    }
}

impl TryFrom<String> for TaxId {
    type Error = InvalidTaxId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TaxId> for String {
    fn from(value: TaxId) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("CUIT/CUIL inválido: {0}")]
pub struct InvalidTaxId(pub String);

/// Kinds of records the core reads and writes, used for audit references and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Client,
    InitialApplication,
    FormalApplication,
    Purchase,
    Contract,
}

impl EntityKind {
    pub const fn label(self) -> &'static str {
        match self {
            EntityKind::Client => "cliente",
            EntityKind::InitialApplication => "solicitud inicial",
            EntityKind::FormalApplication => "solicitud formal",
            EntityKind::Purchase => "compra",
            EntityKind::Contract => "contrato",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Name used for client fields that are unknown until bureau data arrives.
pub const PLACEHOLDER_NAME: &str = "A DEFINIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub number: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
}

impl Address {
    pub fn single_line(&self) -> String {
        let mut line = self.street.clone();
        if let Some(number) = &self.number {
            line.push(' ');
            line.push_str(number);
        }
        for part in [&self.city, &self.province, &self.postal_code]
            .into_iter()
            .flatten()
        {
            line.push_str(", ");
            line.push_str(part);
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employer {
    pub name: String,
    pub tax_id: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub monthly_income: Option<Decimal>,
}

/// Identity record of a credit applicant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub tax_id: TaxId,
    pub first_name: String,
    pub last_name: String,
    pub national_id: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub employer: Option<Employer>,
    pub created_at: DateTime<Utc>,
}

impl Client {
    /// Minimal record created before the client's identity has been confirmed.
    pub fn placeholder(id: ClientId, tax_id: TaxId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            tax_id,
            first_name: PLACEHOLDER_NAME.to_string(),
            last_name: PLACEHOLDER_NAME.to_string(),
            national_id: None,
            birth_date: None,
            sex: None,
            email: None,
            phone: None,
            address: None,
            employer: None,
            created_at,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Who a comment is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Merchant,
    Analyst,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub audience: Audience,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Ordered, audience-tagged comments attached to an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentLog(Vec<Comment>);

impl CommentLog {
    pub fn push(&mut self, audience: Audience, text: impl Into<String>, at: DateTime<Utc>) {
        self.0.push(Comment {
            audience,
            text: text.into(),
            at,
        });
    }

    pub fn all(&self) -> &[Comment] {
        &self.0
    }

    pub fn for_merchant(&self) -> impl Iterator<Item = &Comment> {
        self.for_audience(Audience::Merchant)
    }

    pub fn for_analyst(&self) -> impl Iterator<Item = &Comment> {
        self.for_audience(Audience::Analyst)
    }

    fn for_audience(&self, audience: Audience) -> impl Iterator<Item = &Comment> {
        self.0
            .iter()
            .filter(move |comment| comment.audience == audience)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialApplicationState {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl InitialApplicationState {
    pub const fn label(self) -> &'static str {
        match self {
            InitialApplicationState::Pending => "pending",
            InitialApplicationState::Approved => "approved",
            InitialApplicationState::Rejected => "rejected",
            InitialApplicationState::Expired => "expired",
        }
    }
}

/// A merchant-initiated credit inquiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialApplication {
    pub id: InitialApplicationId,
    pub created_at: DateTime<Utc>,
    pub state: InitialApplicationState,
    pub client_id: ClientId,
    pub tax_id: TaxId,
    pub merchant_id: UserId,
    pub rejection_reason: Option<String>,
    pub comments: CommentLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormalApplicationState {
    #[serde(rename = "pendiente")]
    Pending,
    #[serde(rename = "pendiente_ampliacion")]
    PendingIncrease,
    #[serde(rename = "aprobada")]
    Approved,
    #[serde(rename = "rechazada")]
    Rejected,
}

impl FormalApplicationState {
    pub const fn label(self) -> &'static str {
        match self {
            FormalApplicationState::Pending => "pendiente",
            FormalApplicationState::PendingIncrease => "pendiente_ampliacion",
            FormalApplicationState::Approved => "aprobada",
            FormalApplicationState::Rejected => "rechazada",
        }
    }
}

/// Underwriting-complete expansion of an approved initial application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormalApplication {
    pub id: FormalApplicationId,
    pub initial_application_id: InitialApplicationId,
    pub client_id: ClientId,
    pub tax_id: TaxId,
    pub merchant_id: UserId,
    pub state: FormalApplicationState,
    pub credit_limit: Decimal,
    pub requests_limit_increase: bool,
    pub requested_limit: Option<Decimal>,
    pub comments: CommentLog,
    pub analyst_id: Option<UserId>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Compare-and-set token; stores reject updates carrying a stale value.
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurchaseState {
    #[serde(rename = "pendiente")]
    Pending,
    #[serde(rename = "aprobada")]
    Approved,
    #[serde(rename = "rechazada")]
    Rejected,
}

impl PurchaseState {
    pub const fn label(self) -> &'static str {
        match self {
            PurchaseState::Pending => "pendiente",
            PurchaseState::Approved => "aprobada",
            PurchaseState::Rejected => "rechazada",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseItem {
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl PurchaseItem {
    /// `None` when `unit_price * quantity` does not fit in a `Decimal`.
    pub fn checked_subtotal(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

/// Monetary fields derived from a purchase's items, weighting and installment count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseAmounts {
    pub total: Decimal,
    pub weighted_total: Decimal,
    pub installment_value: Decimal,
}

impl PurchaseAmounts {
    pub fn derive(
        items: &[PurchaseItem],
        weighting: Decimal,
        installments: u8,
    ) -> Result<Self, ValidationError> {
        let total = items
            .iter()
            .try_fold(Decimal::ZERO, |sum, item| {
                sum.checked_add(item.checked_subtotal()?)
            })
            .ok_or(ValidationError::AmountOutOfRange)?;
        let weighted_total = total
            .checked_mul(weighting)
            .ok_or(ValidationError::AmountOutOfRange)?;
        let installment_value = weighted_total
            .checked_div(Decimal::from(installments))
            .unwrap_or(weighted_total);
        Ok(Self {
            total,
            weighted_total,
            installment_value,
        })
    }
}

/// A credit draw against an approved formal application.
///
/// The monetary fields are derived from the items, installment count and weighting factor and
/// are recomputed by every mutator, so `weighted_total == total * weighting` and
/// `installment_value == weighted_total / installments` always hold. A mutation whose amounts
/// would overflow is refused and leaves the purchase unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: PurchaseId,
    pub formal_application_id: FormalApplicationId,
    pub client_id: ClientId,
    pub merchant_id: UserId,
    pub description: String,
    items: Vec<PurchaseItem>,
    installments: u8,
    weighting: Decimal,
    total: Decimal,
    weighted_total: Decimal,
    installment_value: Decimal,
    pub state: PurchaseState,
    pub card_number: Option<String>,
    pub account_number: Option<String>,
    pub analyst_id: Option<UserId>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

/// Fields needed to open a purchase; amounts are derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseDraft {
    pub formal_application_id: FormalApplicationId,
    pub merchant_id: UserId,
    pub description: String,
    pub items: Vec<PurchaseItem>,
    pub installments: u8,
    pub weighting: Decimal,
}

impl Purchase {
    pub fn open(
        id: PurchaseId,
        client_id: ClientId,
        draft: PurchaseDraft,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let amounts = PurchaseAmounts::derive(&draft.items, draft.weighting, draft.installments)?;
        Ok(Self {
            id,
            formal_application_id: draft.formal_application_id,
            client_id,
            merchant_id: draft.merchant_id,
            description: draft.description,
            items: draft.items,
            installments: draft.installments,
            weighting: draft.weighting,
            total: amounts.total,
            weighted_total: amounts.weighted_total,
            installment_value: amounts.installment_value,
            state: PurchaseState::Pending,
            card_number: None,
            account_number: None,
            analyst_id: None,
            rejection_reason: None,
            created_at,
            version: 0,
        })
    }

    pub fn items(&self) -> &[PurchaseItem] {
        &self.items
    }

    pub fn installments(&self) -> u8 {
        self.installments
    }

    pub fn weighting(&self) -> Decimal {
        self.weighting
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn weighted_total(&self) -> Decimal {
        self.weighted_total
    }

    pub fn installment_value(&self) -> Decimal {
        self.installment_value
    }

    pub fn add_item(&mut self, item: PurchaseItem) -> Result<(), ValidationError> {
        self.items.push(item);
        self.recompute().inspect_err(|_| {
            self.items.pop();
        })
    }

    pub fn set_installments(&mut self, installments: u8) -> Result<(), ValidationError> {
        let previous = std::mem::replace(&mut self.installments, installments);
        self.recompute().inspect_err(|_| self.installments = previous)
    }

    pub fn set_weighting(&mut self, weighting: Decimal) -> Result<(), ValidationError> {
        let previous = std::mem::replace(&mut self.weighting, weighting);
        self.recompute().inspect_err(|_| self.weighting = previous)
    }

    fn recompute(&mut self) -> Result<(), ValidationError> {
        let amounts = PurchaseAmounts::derive(&self.items, self.weighting, self.installments)?;
        self.total = amounts.total;
        self.weighted_total = amounts.weighted_total;
        self.installment_value = amounts.installment_value;
        Ok(())
    }
}

/// Persisted as its Spanish label; reading accepts any letter case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ContractState {
    Generated,
    Voided,
    Draft,
}

impl ContractState {
    pub const fn label(self) -> &'static str {
        match self {
            ContractState::Generated => "generado",
            ContractState::Voided => "anulado",
            ContractState::Draft => "borrador",
        }
    }

    /// Case-insensitive parse of the persisted state label.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        [
            ContractState::Generated,
            ContractState::Voided,
            ContractState::Draft,
        ]
        .into_iter()
        .find(|state| state.label() == normalized)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("estado de contrato desconocido: {0}")]
pub struct UnknownContractState(pub String);

impl TryFrom<String> for ContractState {
    type Error = UnknownContractState;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or(UnknownContractState(value))
    }
}

impl From<ContractState> for String {
    fn from(value: ContractState) -> Self {
        value.label().to_string()
    }
}

/// Named set of interest rates in force when a contract is generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSet {
    pub name: String,
    pub rates: BTreeMap<String, Decimal>,
}

/// Client, merchant, employer and rate fields copied into the contract at generation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractData {
    pub client_name: String,
    pub client_tax_id: String,
    pub client_national_id: Option<String>,
    pub client_address: Option<String>,
    pub employer_name: Option<String>,
    pub employer_tax_id: Option<String>,
    pub merchant_name: String,
    pub merchant_tax_id: Option<String>,
    pub credit_limit: Decimal,
    pub rates: RateSet,
    pub issued_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub formal_application_id: FormalApplicationId,
    pub state: ContractState,
    pub data: ContractData,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// The merchant's commercial data, present only on merchant accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantProfile {
    pub store_name: String,
    pub tax_id: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Administrator,
    Analyst,
    Merchant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub active: bool,
    pub permissions: BTreeSet<String>,
    pub merchant: Option<MerchantProfile>,
}

impl User {
    /// Store name for merchants, personal name otherwise.
    pub fn display_name(&self) -> &str {
        match (&self.role, &self.merchant) {
            (Role::Merchant, Some(profile)) => &profile.store_name,
            _ => &self.name,
        }
    }
}

/// Originator of an audited action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    System,
    User(UserId),
}

impl Actor {
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Actor::System => None,
            Actor::User(id) => Some(id),
        }
    }
}
