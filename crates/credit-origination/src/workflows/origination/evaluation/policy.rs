use std::fmt;

use serde::{Deserialize, Serialize};

use super::super::bureau::PersonalProfile;
use super::rules::{RuleFinding, RuleOutcome};

/// Automated verdict for a credit inquiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Approve,
    Pend,
    Reject,
    /// Not enough bureau data to decide either way.
    Inconclusive,
}

impl EvaluationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            EvaluationStatus::Approve => "aprobar",
            EvaluationStatus::Pend => "pendiente",
            EvaluationStatus::Reject => "rechazar",
            EvaluationStatus::Inconclusive => "sin determinar",
        }
    }
}

impl fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub(crate) fn decide_status(profile: &PersonalProfile, findings: &[RuleFinding]) -> EvaluationStatus {
    if findings
        .iter()
        .any(|finding| finding.outcome == RuleOutcome::Failed)
    {
        return EvaluationStatus::Reject;
    }

    if profile.lacks_credit_history() {
        return EvaluationStatus::Inconclusive;
    }

    if findings
        .iter()
        .any(|finding| finding.outcome == RuleOutcome::Pending)
    {
        return EvaluationStatus::Pend;
    }

    EvaluationStatus::Approve
}

pub(crate) fn reason_for(status: EvaluationStatus, findings: &[RuleFinding]) -> String {
    let labels_with = |outcome: RuleOutcome| -> Vec<&str> {
        findings
            .iter()
            .filter(|finding| finding.outcome == outcome)
            .map(|finding| finding.label.as_str())
            .collect()
    };

    match status {
        EvaluationStatus::Approve => "cumple todas las reglas de originación".to_string(),
        EvaluationStatus::Reject => {
            format!("no cumple: {}", labels_with(RuleOutcome::Failed).join("; "))
        }
        EvaluationStatus::Pend => format!(
            "requiere revisión: {}",
            labels_with(RuleOutcome::Pending).join("; ")
        ),
        EvaluationStatus::Inconclusive => "sin historial crediticio para evaluar".to_string(),
    }
}
