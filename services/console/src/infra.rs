use std::collections::{BTreeSet, HashMap};
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use credit_origination::workflows::origination::{
    Address, AuditEvent, BureauError, BureauSituation, CommercialReference, CreditEntityReport,
    Employer, EmploymentStatus, MerchantProfile, PersonalProfile, ProfileBureau, Role,
    SituationBureau, TaxId, User, UserId,
};
use rust_decimal_macros::dec;
use serde::Serialize;

/// Profile bureau answering from a fixed table keyed by tax id digits.
#[derive(Default)]
pub(crate) struct ScriptedProfileBureau {
    profiles: HashMap<String, PersonalProfile>,
    latency: Option<Duration>,
}

impl ScriptedProfileBureau {
    pub(crate) fn with(mut self, tax_id: &str, profile: PersonalProfile) -> Self {
        self.profiles.insert(digits(tax_id), profile);
        self
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

#[async_trait]
impl ProfileBureau for ScriptedProfileBureau {
    async fn fetch_profile(&self, tax_id: &TaxId) -> Result<PersonalProfile, BureauError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.profiles
            .get(tax_id.digits())
            .cloned()
            .ok_or_else(|| BureauError::invalid_id(format!("sin datos para {tax_id}")))
    }
}

/// Situation bureau answering from a fixed table keyed by tax id digits.
#[derive(Default)]
pub(crate) struct ScriptedSituationBureau {
    situations: HashMap<String, BureauSituation>,
}

impl ScriptedSituationBureau {
    pub(crate) fn with(mut self, tax_id: &str, code: &str, merchant_message: &str) -> Self {
        self.situations.insert(
            digits(tax_id),
            BureauSituation {
                code: Some(code.to_string()),
                analyst_message: Some(format!("situación {code} informada por el buró")),
                merchant_message: Some(merchant_message.to_string()),
                observations: Vec::new(),
            },
        );
        self
    }
}

#[async_trait]
impl SituationBureau for ScriptedSituationBureau {
    async fn fetch_situation(&self, tax_id: &TaxId) -> Result<BureauSituation, BureauError> {
        self.situations
            .get(tax_id.digits())
            .cloned()
            .ok_or_else(|| BureauError::invalid_id(format!("sin datos para {tax_id}")))
    }
}

fn digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

pub(crate) fn merchant(id: &str, store_name: &str, tax_id: &str) -> User {
    User {
        id: UserId::from(id),
        name: format!("Titular {store_name}"),
        email: format!("{id}@comercios.example"),
        role: Role::Merchant,
        active: true,
        permissions: BTreeSet::new(),
        merchant: Some(MerchantProfile {
            store_name: store_name.to_string(),
            tax_id: Some(tax_id.to_string()),
            address: None,
        }),
    }
}

pub(crate) fn analyst(id: &str, name: &str) -> User {
    User {
        id: UserId::from(id),
        name: name.to_string(),
        email: format!("{id}@analistas.example"),
        role: Role::Analyst,
        active: true,
        permissions: BTreeSet::from(["approve_purchases".to_string()]),
        merchant: None,
    }
}

/// Employed applicant with a clean bureau record.
pub(crate) fn clean_profile(
    first_name: &str,
    last_name: &str,
    national_id: &str,
) -> PersonalProfile {
    PersonalProfile {
        first_name: Some(first_name.to_string()),
        last_name: Some(last_name.to_string()),
        national_id: Some(national_id.to_string()),
        sex: Some("F".to_string()),
        birth_date: NaiveDate::from_ymd_opt(1988, 3, 14),
        address: Some(Address {
            street: "Bv. San Juan".to_string(),
            number: Some("850".to_string()),
            city: Some("Córdoba".to_string()),
            province: Some("Córdoba".to_string()),
            postal_code: Some("5000".to_string()),
        }),
        employer: Some(Employer {
            name: "Logística Mediterránea SRL".to_string(),
            tax_id: Some("30-71234567-9".to_string()),
            phone: None,
            address: None,
            monthly_income: Some(dec!(820000)),
        }),
        employment: EmploymentStatus::Employee,
        score: Some(690),
        credit_entities: vec![CreditEntityReport {
            entity_code: "00011".to_string(),
            entity_name: Some("Banco Nación".to_string()),
            situation: 1,
            debt: dec!(45000),
        }],
        commercial_references: vec![
            CommercialReference {
                name: "Naldo".to_string(),
                valid: true,
            },
            CommercialReference {
                name: "Musimundo".to_string(),
                valid: true,
            },
        ],
        message: None,
    }
}

/// Applicant with several delinquent lenders.
pub(crate) fn indebted_profile(first_name: &str, last_name: &str) -> PersonalProfile {
    let entity = |code: &str, name: &str, situation: u8| CreditEntityReport {
        entity_code: code.to_string(),
        entity_name: Some(name.to_string()),
        situation,
        debt: dec!(180000),
    };
    PersonalProfile {
        first_name: Some(first_name.to_string()),
        last_name: Some(last_name.to_string()),
        employment: EmploymentStatus::Employee,
        score: Some(310),
        credit_entities: vec![
            entity("00007", "Banco Galicia", 3),
            entity("00017", "BBVA", 2),
            entity("00285", "Banco Macro", 2),
        ],
        ..PersonalProfile::default()
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[derive(Debug, Serialize)]
struct AuditRow<'a> {
    at: String,
    action: &'static str,
    actor: String,
    entity: String,
    entity_id: &'a str,
    initial_application_id: String,
    detail: String,
}

impl<'a> AuditRow<'a> {
    fn from_event(event: &'a AuditEvent) -> Self {
        Self {
            at: event.at.to_rfc3339(),
            action: event.action.label(),
            actor: event
                .actor
                .user_id()
                .map(ToString::to_string)
                .unwrap_or_else(|| "system".to_string()),
            entity: event.entity.kind.to_string(),
            entity_id: event.entity.id.as_deref().unwrap_or(""),
            initial_application_id: event
                .initial_application_id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            detail: event.detail.to_string(),
        }
    }
}

/// Write the audit trail as CSV, one row per event in append order.
pub(crate) fn write_audit_csv<W: io::Write>(
    writer: W,
    events: &[AuditEvent],
) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for event in events {
        csv_writer.serialize(AuditRow::from_event(event))?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use credit_origination::workflows::origination::{
        Actor, AuditAction, EntityKind, EntityRef, InitialApplicationId,
    };
    use serde_json::json;

    #[test]
    fn parse_date_accepts_iso_dates() {
        assert_eq!(
            parse_date(" 2026-04-06 "),
            Ok(NaiveDate::from_ymd_opt(2026, 4, 6).expect("valid date"))
        );
        assert!(parse_date("06/04/2026").is_err());
    }

    #[test]
    fn audit_csv_has_one_row_per_event() {
        let event = AuditEvent {
            id: "aud-1".into(),
            actor: Actor::User(UserId::from("ana-1")),
            action: AuditAction::CascadeReject,
            entity: EntityRef::new(EntityKind::FormalApplication, "sf-1"),
            detail: json!({ "reason": "sin ingresos" }),
            initial_application_id: Some(InitialApplicationId::from("sol-1")),
            at: Utc.with_ymd_and_hms(2026, 4, 6, 10, 30, 0).unwrap(),
        };
        let system = AuditEvent {
            actor: Actor::System,
            action: AuditAction::Expire,
            entity: EntityRef::unsaved(EntityKind::InitialApplication),
            detail: json!(null),
            initial_application_id: None,
            ..event.clone()
        };

        let mut buffer = Vec::new();
        write_audit_csv(&mut buffer, &[event, system]).expect("csv written");
        let text = String::from_utf8(buffer).expect("utf-8");
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(
            lines[0],
            "at,action,actor,entity,entity_id,initial_application_id,detail"
        );
        assert!(lines[1].contains("CASCADE_REJECT,ana-1,"));
        assert!(lines[1].contains(",sf-1,sol-1,"));
        assert!(lines[2].contains("EXPIRE,system,"));
        assert_eq!(lines.len(), 3);
    }

    #[tokio::test]
    async fn scripted_bureaus_answer_by_digits() {
        let tax_id = TaxId::parse("27-28123456-3").expect("valid tax id");
        let profiles = ScriptedProfileBureau::default()
            .with("27281234563", clean_profile("Ana", "Paz", "28123456"));
        let situations =
            ScriptedSituationBureau::default().with("27-28123456-3", "APROBADO", "apto");

        let profile = profiles.fetch_profile(&tax_id).await.expect("profile");
        assert_eq!(profile.first_name.as_deref(), Some("Ana"));
        let situation = situations.fetch_situation(&tax_id).await.expect("situation");
        assert_eq!(situation.code.as_deref(), Some("APROBADO"));

        let unknown = TaxId::parse("20111111112").expect("valid tax id");
        assert!(profiles.fetch_profile(&unknown).await.is_err());
    }
}
