//! Ports and classification for the two external credit bureaus.
//!
//! The profile bureau (Nosis) returns identity, employment and per-entity credit data. The
//! situation bureau (Eureka) returns a single situation code plus role-specific messages. Both
//! are queried concurrently, each under its own deadline, and a failure always names the bureau
//! that produced it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::domain::{Address, Client, Employer, TaxId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bureau {
    Nosis,
    Eureka,
}

impl Bureau {
    pub const fn label(self) -> &'static str {
        match self {
            Bureau::Nosis => "nosis",
            Bureau::Eureka => "eureka",
        }
    }
}

impl fmt::Display for Bureau {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Stable failure taxonomy shared by both bureaus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BureauErrorKind {
    Timeout,
    Connection,
    InvalidResponse,
    InvalidId,
    Unknown,
}

impl BureauErrorKind {
    pub const fn label(self) -> &'static str {
        match self {
            BureauErrorKind::Timeout => "timeout",
            BureauErrorKind::Connection => "connection",
            BureauErrorKind::InvalidResponse => "invalid_response",
            BureauErrorKind::InvalidId => "invalid_id",
            BureauErrorKind::Unknown => "unknown",
        }
    }

    /// Network failures may succeed on retry; the rest are permanent for the same input.
    pub const fn is_retryable(self) -> bool {
        matches!(self, BureauErrorKind::Timeout | BureauErrorKind::Connection)
    }
}

impl fmt::Display for BureauErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned by a bureau adapter, already classified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BureauError {
    pub kind: BureauErrorKind,
    pub message: String,
}

impl BureauError {
    pub fn new(kind: BureauErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(BureauErrorKind::Timeout, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(BureauErrorKind::Connection, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(BureauErrorKind::InvalidResponse, message)
    }

    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::new(BureauErrorKind::InvalidId, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(BureauErrorKind::Unknown, message)
    }
}

/// Bureau error tagged with its origin, so callers can tell it apart from business-rule failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("falló la verificación en {bureau} ({error})")]
pub struct BureauFailure {
    pub bureau: Bureau,
    pub error: BureauError,
}

impl BureauFailure {
    pub fn is_retryable(&self) -> bool {
        self.error.kind.is_retryable()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentStatus {
    Employee,
    /// Monotributista.
    SelfEmployed,
    /// Jubilado.
    Retired,
    Unemployed,
    #[default]
    Unknown,
}

impl EmploymentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            EmploymentStatus::Employee => "relación de dependencia",
            EmploymentStatus::SelfEmployed => "monotributista",
            EmploymentStatus::Retired => "jubilado",
            EmploymentStatus::Unemployed => "sin empleo",
            EmploymentStatus::Unknown => "desconocida",
        }
    }
}

/// Credit situation reported by one financial entity (BCRA scale, 1 = normal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditEntityReport {
    pub entity_code: String,
    #[serde(default)]
    pub entity_name: Option<String>,
    pub situation: u8,
    #[serde(default)]
    pub debt: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommercialReference {
    pub name: String,
    pub valid: bool,
}

/// Personal and credit profile returned by the profile bureau.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub national_id: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<String>,
    pub address: Option<Address>,
    pub employer: Option<Employer>,
    pub employment: EmploymentStatus,
    pub score: Option<u16>,
    pub credit_entities: Vec<CreditEntityReport>,
    pub commercial_references: Vec<CommercialReference>,
    pub message: Option<String>,
}

impl PersonalProfile {
    /// True when the bureau returned nothing the underwriting rules can score.
    pub fn lacks_credit_history(&self) -> bool {
        self.score.is_none()
            && self.credit_entities.is_empty()
            && self.commercial_references.is_empty()
    }

    /// Copy every populated identity field onto the client. Absent or blank fields leave the
    /// client untouched. Returns whether anything changed.
    pub fn backfill(&self, client: &mut Client) -> bool {
        let mut changed = false;

        if let Some(first_name) = non_blank(&self.first_name) {
            changed |= replace(&mut client.first_name, first_name.to_string());
        }
        if let Some(last_name) = non_blank(&self.last_name) {
            changed |= replace(&mut client.last_name, last_name.to_string());
        }
        if let Some(national_id) = non_blank(&self.national_id) {
            changed |= replace_option(&mut client.national_id, national_id.to_string());
        }
        if let Some(sex) = non_blank(&self.sex) {
            changed |= replace_option(&mut client.sex, sex.to_string());
        }
        if let Some(birth_date) = self.birth_date {
            changed |= replace_option(&mut client.birth_date, birth_date);
        }
        if let Some(address) = self.address.as_ref().filter(|a| !a.street.trim().is_empty()) {
            changed |= replace_option(&mut client.address, address.clone());
        }
        if let Some(employer) = self.employer.as_ref().filter(|e| !e.name.trim().is_empty()) {
            changed |= replace_option(&mut client.employer, employer.clone());
        }

        changed
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

fn replace_option<T: PartialEq>(slot: &mut Option<T>, value: T) -> bool {
    if slot.as_ref() == Some(&value) {
        false
    } else {
        *slot = Some(value);
        true
    }
}

/// Raw payload of the situation bureau. A missing `code` is a hard failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BureauSituation {
    pub code: Option<String>,
    pub analyst_message: Option<String>,
    pub merchant_message: Option<String>,
    /// Additional observation codes reported alongside the situation.
    pub observations: Vec<String>,
}

/// Situation payload after the mandatory code has been checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedSituation {
    pub code: String,
    pub analyst_message: Option<String>,
    pub merchant_message: Option<String>,
    pub observations: Vec<String>,
}

impl TryFrom<BureauSituation> for VerifiedSituation {
    type Error = BureauError;

    fn try_from(raw: BureauSituation) -> Result<Self, Self::Error> {
        let code = raw
            .code
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty())
            .ok_or_else(|| BureauError::invalid_response("la respuesta no informa situación"))?;

        Ok(Self {
            code,
            analyst_message: raw.analyst_message,
            merchant_message: raw.merchant_message,
            observations: raw.observations,
        })
    }
}

#[async_trait]
pub trait ProfileBureau: Send + Sync {
    async fn fetch_profile(&self, tax_id: &TaxId) -> Result<PersonalProfile, BureauError>;
}

#[async_trait]
pub trait SituationBureau: Send + Sync {
    async fn fetch_situation(&self, tax_id: &TaxId) -> Result<BureauSituation, BureauError>;
}

/// Independent deadlines so one slow bureau cannot consume the other's budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BureauTimeouts {
    pub profile: Duration,
    pub situation: Duration,
}

impl Default for BureauTimeouts {
    fn default() -> Self {
        Self {
            profile: Duration::from_secs(10),
            situation: Duration::from_secs(10),
        }
    }
}

#[derive(Clone)]
pub struct Bureaus {
    pub profile: Arc<dyn ProfileBureau>,
    pub situation: Arc<dyn SituationBureau>,
    pub timeouts: BureauTimeouts,
}

/// Both verified bureau payloads, ready for underwriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BureauReport {
    pub profile: PersonalProfile,
    pub situation: VerifiedSituation,
}

/// Per-bureau outcome of a verification round.
#[derive(Debug, Clone)]
pub struct BureauOutcomes {
    pub profile: Result<PersonalProfile, BureauError>,
    pub situation: Result<VerifiedSituation, BureauError>,
}

impl BureauOutcomes {
    pub fn profile_ok(&self) -> bool {
        self.profile.is_ok()
    }

    pub fn situation_ok(&self) -> bool {
        self.situation.is_ok()
    }

    /// The profile bureau's failure takes precedence when both fail.
    pub fn into_report(self) -> Result<BureauReport, BureauFailure> {
        let profile = self.profile.map_err(|error| BureauFailure {
            bureau: Bureau::Nosis,
            error,
        })?;
        let situation = self.situation.map_err(|error| BureauFailure {
            bureau: Bureau::Eureka,
            error,
        })?;
        Ok(BureauReport { profile, situation })
    }
}

impl Bureaus {
    pub async fn verify(&self, tax_id: &TaxId) -> BureauOutcomes {
        let profile_call = async {
            match tokio::time::timeout(self.timeouts.profile, self.profile.fetch_profile(tax_id))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(BureauError::timeout(format!(
                    "sin respuesta en {} ms",
                    self.timeouts.profile.as_millis()
                ))),
            }
        };

        let situation_call = async {
            match tokio::time::timeout(
                self.timeouts.situation,
                self.situation.fetch_situation(tax_id),
            )
            .await
            {
                Ok(Ok(raw)) => VerifiedSituation::try_from(raw),
                Ok(Err(error)) => Err(error),
                Err(_) => Err(BureauError::timeout(format!(
                    "sin respuesta en {} ms",
                    self.timeouts.situation.as_millis()
                ))),
            }
        };

        let (profile, situation) = tokio::join!(profile_call, situation_call);

        match (&profile, &situation) {
            (Ok(_), Ok(_)) => debug!(%tax_id, "both bureaus answered"),
            _ => warn!(
                %tax_id,
                profile_error = ?profile.as_ref().err().map(|e| e.kind),
                situation_error = ?situation.as_ref().err().map(|e| e.kind),
                "bureau verification incomplete"
            ),
        }

        BureauOutcomes { profile, situation }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::origination::domain::PLACEHOLDER_NAME;
    use chrono::Utc;

    #[test]
    fn missing_situation_code_is_an_invalid_response() {
        let raw = BureauSituation {
            code: Some("   ".to_string()),
            ..BureauSituation::default()
        };
        let error = VerifiedSituation::try_from(raw).expect_err("blank code rejected");
        assert_eq!(error.kind, BureauErrorKind::InvalidResponse);
        assert!(!error.kind.is_retryable());
    }

    #[test]
    fn backfill_never_clears_existing_fields() {
        let tax_id = TaxId::parse("20-12345678-3").expect("valid tax id");
        let mut client = Client::placeholder("cli-1".into(), tax_id, Utc::now());
        client.sex = Some("F".to_string());

        let profile = PersonalProfile {
            first_name: Some("Ana".to_string()),
            last_name: Some("  ".to_string()),
            sex: None,
            ..PersonalProfile::default()
        };

        assert!(profile.backfill(&mut client));
        assert_eq!(client.first_name, "Ana");
        assert_eq!(client.last_name, PLACEHOLDER_NAME);
        assert_eq!(client.sex.as_deref(), Some("F"));
        assert!(!profile.backfill(&mut client), "second pass is a no-op");
    }

    #[test]
    fn profile_failure_wins_when_both_bureaus_fail() {
        let outcomes = BureauOutcomes {
            profile: Err(BureauError::connection("reset")),
            situation: Err(BureauError::timeout("slow")),
        };
        let failure = outcomes.into_report().expect_err("both failed");
        assert_eq!(failure.bureau, Bureau::Nosis);
        assert!(failure.is_retryable());
    }
}
