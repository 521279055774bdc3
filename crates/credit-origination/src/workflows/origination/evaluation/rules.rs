use serde::{Deserialize, Serialize};

use super::super::bureau::{EmploymentStatus, PersonalProfile, VerifiedSituation};
use super::config::UnderwritingConfig;
use super::ReferenceTally;

/// Identifier of an underwriting rule. Observation codes come from the situation bureau and are
/// not known in advance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCode {
    SituationCode,
    Situation2Entities,
    IrregularEntities,
    DebtEntities,
    Employment,
    BureauScore,
    CommercialReferences,
    Observation(String),
}

impl RuleCode {
    pub fn code(&self) -> String {
        match self {
            RuleCode::SituationCode => "SIT_EUREKA".to_string(),
            RuleCode::Situation2Entities => "ENT_SIT2".to_string(),
            RuleCode::IrregularEntities => "ENT_IRREGULAR".to_string(),
            RuleCode::DebtEntities => "ENT_DEUDA".to_string(),
            RuleCode::Employment => "EMPLEO".to_string(),
            RuleCode::BureauScore => "SCORE".to_string(),
            RuleCode::CommercialReferences => "REF_COMERCIALES".to_string(),
            RuleCode::Observation(code) => format!("OBS_{}", code.to_uppercase()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    Passed,
    Pending,
    Failed,
}

/// Result of one rule, with its analyst-facing label and score contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFinding {
    pub rule: RuleCode,
    pub outcome: RuleOutcome,
    pub label: String,
    pub count: Option<usize>,
    pub points: i16,
}

impl RuleFinding {
    fn new(rule: RuleCode, outcome: RuleOutcome, label: String, points: i16) -> Self {
        Self {
            rule,
            outcome,
            label,
            count: None,
            points,
        }
    }

    fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }
}

pub(crate) struct ScoreSignals {
    pub situation2_entities: Vec<String>,
    pub debt_entities: Vec<String>,
    pub references: ReferenceTally,
}

pub(crate) fn score_profile(
    profile: &PersonalProfile,
    situation: &VerifiedSituation,
    config: &UnderwritingConfig,
) -> (Vec<RuleFinding>, i16, ScoreSignals) {
    let mut findings = Vec::new();

    findings.push(situation_rule(situation, config));

    let situation2_entities: Vec<String> = profile
        .credit_entities
        .iter()
        .filter(|entity| entity.situation == 2)
        .map(|entity| entity.entity_code.clone())
        .collect();
    findings.push(situation2_rule(situation2_entities.len(), config));

    let irregular = profile
        .credit_entities
        .iter()
        .filter(|entity| entity.situation >= 3)
        .count();
    findings.push(if irregular == 0 {
        RuleFinding::new(
            RuleCode::IrregularEntities,
            RuleOutcome::Passed,
            "sin entidades en situación irregular".to_string(),
            10,
        )
    } else {
        RuleFinding::new(
            RuleCode::IrregularEntities,
            RuleOutcome::Failed,
            format!("{irregular} entidades en situación 3 o superior"),
            -40,
        )
        .with_count(irregular)
    });

    let debt_entities: Vec<String> = profile
        .credit_entities
        .iter()
        .filter(|entity| entity.debt > rust_decimal::Decimal::ZERO)
        .map(|entity| entity.entity_code.clone())
        .collect();
    let debt_count = debt_entities.len();
    findings.push(if debt_count <= config.max_debt_entities {
        RuleFinding::new(
            RuleCode::DebtEntities,
            RuleOutcome::Passed,
            format!("{debt_count} entidades con deuda"),
            10,
        )
        .with_count(debt_count)
    } else {
        RuleFinding::new(
            RuleCode::DebtEntities,
            RuleOutcome::Failed,
            format!("{debt_count} entidades con deuda"),
            -30,
        )
        .with_count(debt_count)
    });

    findings.push(employment_rule(profile.employment, config));

    if let Some(finding) = score_rule(profile.score, config) {
        findings.push(finding);
    }

    let references = ReferenceTally::from_references(&profile.commercial_references);
    findings.push(references_rule(&references, config));

    for observation in &situation.observations {
        findings.push(RuleFinding::new(
            RuleCode::Observation(observation.clone()),
            RuleOutcome::Pending,
            format!("observación informada: {observation}"),
            0,
        ));
    }

    let total_score = findings
        .iter()
        .fold(0i16, |sum, finding| sum.saturating_add(finding.points));

    let signals = ScoreSignals {
        situation2_entities,
        debt_entities,
        references,
    };

    (findings, total_score, signals)
}

fn situation_rule(situation: &VerifiedSituation, config: &UnderwritingConfig) -> RuleFinding {
    let code = situation.code.as_str();
    if config.situation_is_rejected(code) {
        RuleFinding::new(
            RuleCode::SituationCode,
            RuleOutcome::Failed,
            format!("situación eureka {code}"),
            -50,
        )
    } else if config.situation_is_approved(code) {
        RuleFinding::new(
            RuleCode::SituationCode,
            RuleOutcome::Passed,
            format!("situación eureka {code}"),
            20,
        )
    } else {
        RuleFinding::new(
            RuleCode::SituationCode,
            RuleOutcome::Pending,
            format!("situación eureka {code} requiere revisión"),
            0,
        )
    }
}

fn situation2_rule(count: usize, config: &UnderwritingConfig) -> RuleFinding {
    let (outcome, points) = if count == 0 {
        (RuleOutcome::Passed, 15)
    } else if count <= config.max_situation2_entities {
        (RuleOutcome::Pending, -10)
    } else {
        (RuleOutcome::Failed, -30)
    };

    let label = if count == 0 {
        "sin entidades en situación 2".to_string()
    } else {
        format!("{count} entidades en situación 2")
    };

    RuleFinding::new(RuleCode::Situation2Entities, outcome, label, points).with_count(count)
}

fn employment_rule(status: EmploymentStatus, config: &UnderwritingConfig) -> RuleFinding {
    let (outcome, label, points) = match status {
        EmploymentStatus::Employee => (
            RuleOutcome::Passed,
            "empleo en relación de dependencia".to_string(),
            15,
        ),
        EmploymentStatus::SelfEmployed if config.exclude_self_employed => (
            RuleOutcome::Failed,
            "monotributista excluido por política".to_string(),
            -40,
        ),
        EmploymentStatus::Retired if config.exclude_retired => (
            RuleOutcome::Failed,
            "jubilado excluido por política".to_string(),
            -40,
        ),
        EmploymentStatus::SelfEmployed | EmploymentStatus::Retired => (
            RuleOutcome::Passed,
            format!("empleo: {}", status.label()),
            5,
        ),
        EmploymentStatus::Unemployed => (
            RuleOutcome::Failed,
            "sin empleo registrado".to_string(),
            -40,
        ),
        EmploymentStatus::Unknown => (
            RuleOutcome::Pending,
            "situación laboral desconocida".to_string(),
            0,
        ),
    };

    RuleFinding::new(RuleCode::Employment, outcome, label, points)
}

fn score_rule(score: Option<u16>, config: &UnderwritingConfig) -> Option<RuleFinding> {
    let minimum = config.minimum_score?;
    let finding = match score {
        Some(score) if score >= minimum => RuleFinding::new(
            RuleCode::BureauScore,
            RuleOutcome::Passed,
            format!("score {score} alcanza el mínimo {minimum}"),
            20,
        ),
        Some(score) => RuleFinding::new(
            RuleCode::BureauScore,
            RuleOutcome::Failed,
            format!("score {score} menor al mínimo {minimum}"),
            -30,
        ),
        None => RuleFinding::new(
            RuleCode::BureauScore,
            RuleOutcome::Pending,
            "sin score informado".to_string(),
            0,
        ),
    };
    Some(finding)
}

fn references_rule(references: &ReferenceTally, config: &UnderwritingConfig) -> RuleFinding {
    let counted = references.valid.min(config.max_valid_references);
    let points = i16::try_from(counted * 5).unwrap_or(i16::MAX);
    let outcome = if references.valid >= config.min_valid_references {
        RuleOutcome::Passed
    } else {
        RuleOutcome::Pending
    };

    RuleFinding::new(
        RuleCode::CommercialReferences,
        outcome,
        format!(
            "{} referencias comerciales válidas de {}",
            references.valid, references.total
        ),
        points,
    )
    .with_count(references.valid)
}
