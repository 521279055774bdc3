mod comments;
mod config;
mod policy;
mod rules;

pub use config::UnderwritingConfig;
pub use policy::EvaluationStatus;
pub use rules::{RuleCode, RuleFinding, RuleOutcome};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::bureau::{CommercialReference, PersonalProfile, VerifiedSituation};
use policy::{decide_status, reason_for};

/// Stateless evaluator that applies the underwriting thresholds to both bureau payloads.
#[derive(Debug, Clone)]
pub struct UnderwritingEngine {
    config: UnderwritingConfig,
}

impl UnderwritingEngine {
    pub fn new(config: UnderwritingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &UnderwritingConfig {
        &self.config
    }

    pub fn evaluate(
        &self,
        profile: &PersonalProfile,
        situation: &VerifiedSituation,
    ) -> UnderwritingVerdict {
        let (findings, score, signals) = rules::score_profile(profile, situation, &self.config);
        let status = decide_status(profile, &findings);
        let reason = reason_for(status, &findings);

        let labels_with = |outcome: RuleOutcome| -> Vec<String> {
            findings
                .iter()
                .filter(|finding| finding.outcome == outcome)
                .map(|finding| finding.label.clone())
                .collect()
        };

        let verdict = UnderwritingVerdict {
            status,
            score,
            reason,
            failed_rules: labels_with(RuleOutcome::Failed),
            pending_rules: labels_with(RuleOutcome::Pending),
            passed_rules: labels_with(RuleOutcome::Passed),
            situation2_entities: signals.situation2_entities,
            debt_entities: signals.debt_entities,
            commercial_references: signals.references,
            messages: BureauMessages {
                profile: profile.message.clone(),
                situation_analyst: situation.analyst_message.clone(),
                situation_merchant: situation.merchant_message.clone(),
            },
            findings,
        };

        debug!(
            status = verdict.status.label(),
            score = verdict.score,
            failed = verdict.failed_rules.len(),
            pending = verdict.pending_rules.len(),
            "underwriting rules evaluated"
        );

        verdict
    }
}

/// Valid/invalid commercial reference counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceTally {
    pub valid: usize,
    pub invalid: usize,
    pub total: usize,
}

impl ReferenceTally {
    pub fn from_references(references: &[CommercialReference]) -> Self {
        let valid = references.iter().filter(|reference| reference.valid).count();
        Self {
            valid,
            invalid: references.len() - valid,
            total: references.len(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BureauMessages {
    pub profile: Option<String>,
    pub situation_analyst: Option<String>,
    pub situation_merchant: Option<String>,
}

/// Full output of the underwriting evaluation, persisted verbatim in the decision audit event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnderwritingVerdict {
    pub status: EvaluationStatus,
    pub score: i16,
    pub reason: String,
    pub failed_rules: Vec<String>,
    pub pending_rules: Vec<String>,
    pub passed_rules: Vec<String>,
    pub situation2_entities: Vec<String>,
    pub debt_entities: Vec<String>,
    pub commercial_references: ReferenceTally,
    pub messages: BureauMessages,
    pub findings: Vec<RuleFinding>,
}

impl UnderwritingVerdict {
    pub fn merchant_comment(&self) -> String {
        comments::merchant_comment(self)
    }

    pub fn analyst_comment(&self) -> String {
        comments::analyst_comment(self)
    }
}
