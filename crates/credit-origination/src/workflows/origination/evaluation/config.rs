use serde::{Deserialize, Serialize};

/// Thresholds for the automated underwriting rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnderwritingConfig {
    /// Situation codes from the situation bureau that pass outright (compared upper-case).
    pub approved_situations: Vec<String>,
    /// Situation codes that reject outright. Anything else is sent to an analyst.
    pub rejected_situations: Vec<String>,
    /// Entities in situation 2 tolerated before the rule fails. Any non-zero count pends.
    pub max_situation2_entities: usize,
    /// Entities reporting outstanding debt tolerated before the rule fails.
    pub max_debt_entities: usize,
    pub minimum_score: Option<u16>,
    pub min_valid_references: usize,
    /// Valid commercial references beyond this count earn no extra score.
    pub max_valid_references: usize,
    pub exclude_self_employed: bool,
    pub exclude_retired: bool,
}

impl Default for UnderwritingConfig {
    fn default() -> Self {
        Self {
            approved_situations: vec!["APROBADO".to_string(), "NORMAL".to_string()],
            rejected_situations: vec!["RECHAZADO".to_string(), "INHABILITADO".to_string()],
            max_situation2_entities: 1,
            max_debt_entities: 2,
            minimum_score: Some(400),
            min_valid_references: 1,
            max_valid_references: 2,
            exclude_self_employed: true,
            exclude_retired: false,
        }
    }
}

impl UnderwritingConfig {
    pub(crate) fn situation_is_approved(&self, code: &str) -> bool {
        contains_code(&self.approved_situations, code)
    }

    pub(crate) fn situation_is_rejected(&self, code: &str) -> bool {
        contains_code(&self.rejected_situations, code)
    }
}

fn contains_code(codes: &[String], code: &str) -> bool {
    codes
        .iter()
        .any(|candidate| candidate.trim().eq_ignore_ascii_case(code.trim()))
}
