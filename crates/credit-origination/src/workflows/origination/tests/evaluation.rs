use super::common::*;
use crate::workflows::origination::bureau::{
    BureauSituation, CommercialReference, EmploymentStatus, PersonalProfile, VerifiedSituation,
};
use crate::workflows::origination::evaluation::{
    EvaluationStatus, RuleCode, RuleOutcome, UnderwritingConfig, UnderwritingEngine,
};

fn engine() -> UnderwritingEngine {
    UnderwritingEngine::new(UnderwritingConfig::default())
}

fn situation(code: &str) -> VerifiedSituation {
    VerifiedSituation::try_from(BureauSituation {
        code: Some(code.to_string()),
        ..normal_situation()
    })
    .expect("situation has a code")
}

#[test]
fn clean_profile_is_approved() {
    let verdict = engine().evaluate(&clean_profile(), &situation("NORMAL"));

    assert_eq!(verdict.status, EvaluationStatus::Approve);
    assert!(verdict.failed_rules.is_empty());
    assert!(verdict.pending_rules.is_empty());
    assert!(verdict.score > 0);
    assert_eq!(verdict.commercial_references.valid, 2);
    assert_eq!(verdict.debt_entities, vec!["00011".to_string()]);
    assert_eq!(verdict.merchant_comment(), "Solicitud aprobada.");
}

#[test]
fn three_indebted_entities_reject_with_a_translated_merchant_comment() {
    let verdict = engine().evaluate(&indebted_profile(), &situation("NORMAL"));

    assert_eq!(verdict.status, EvaluationStatus::Reject);
    assert_eq!(verdict.failed_rules, vec!["3 entidades con deuda".to_string()]);
    assert_eq!(verdict.reason, "no cumple: 3 entidades con deuda");

    let merchant_comment = verdict.merchant_comment();
    assert!(merchant_comment.contains("registra deuda en 3 entidades"));
    assert!(!merchant_comment.contains("ENT_DEUDA"));

    let analyst_comment = verdict.analyst_comment();
    assert!(analyst_comment.contains("Reglas fallidas: 3 entidades con deuda."));
    assert!(analyst_comment.contains("Entidades con deuda: 00011, 00007, 00285."));
    assert!(analyst_comment.contains("Eureka: consulta sin alertas"));
}

#[test]
fn a_single_situation_two_entity_pends() {
    let verdict = engine().evaluate(&watchlist_profile(), &situation("NORMAL"));

    assert_eq!(verdict.status, EvaluationStatus::Pend);
    assert_eq!(verdict.situation2_entities, vec!["00011".to_string()]);
    assert!(verdict
        .merchant_comment()
        .contains("tiene 1 entidades en situación 2"));
}

#[test]
fn unknown_situation_code_pends_and_rejected_code_fails_case_insensitively() {
    let pending = engine().evaluate(&clean_profile(), &situation("EN ANALISIS"));
    assert_eq!(pending.status, EvaluationStatus::Pend);

    let rejected = engine().evaluate(&clean_profile(), &situation("rechazado"));
    assert_eq!(rejected.status, EvaluationStatus::Reject);
    assert!(rejected
        .findings
        .iter()
        .any(|finding| finding.rule == RuleCode::SituationCode
            && finding.outcome == RuleOutcome::Failed));
}

#[test]
fn profile_without_credit_history_is_inconclusive() {
    let profile = PersonalProfile {
        employment: EmploymentStatus::Employee,
        ..PersonalProfile::default()
    };

    let verdict = engine().evaluate(&profile, &situation("NORMAL"));

    assert_eq!(verdict.status, EvaluationStatus::Inconclusive);
    assert_eq!(verdict.reason, "sin historial crediticio para evaluar");
}

#[test]
fn self_employed_exclusion_follows_configuration() {
    let profile = PersonalProfile {
        employment: EmploymentStatus::SelfEmployed,
        ..clean_profile()
    };

    let excluded = engine().evaluate(&profile, &situation("NORMAL"));
    assert_eq!(excluded.status, EvaluationStatus::Reject);
    assert!(excluded
        .failed_rules
        .contains(&"monotributista excluido por política".to_string()));

    let relaxed = UnderwritingEngine::new(UnderwritingConfig {
        exclude_self_employed: false,
        ..UnderwritingConfig::default()
    });
    assert_eq!(
        relaxed.evaluate(&profile, &situation("NORMAL")).status,
        EvaluationStatus::Approve
    );
}

#[test]
fn valid_references_are_capped_for_scoring() {
    let references = (0..4)
        .map(|n| CommercialReference {
            name: format!("Comercio {n}"),
            valid: true,
        })
        .chain(std::iter::once(CommercialReference {
            name: "Comercio rechazado".to_string(),
            valid: false,
        }))
        .collect();
    let profile = PersonalProfile {
        commercial_references: references,
        ..clean_profile()
    };

    let verdict = engine().evaluate(&profile, &situation("NORMAL"));
    let finding = verdict
        .findings
        .iter()
        .find(|finding| finding.rule == RuleCode::CommercialReferences)
        .expect("reference rule evaluated");

    assert_eq!(finding.points, 10);
    assert_eq!(verdict.commercial_references.valid, 4);
    assert_eq!(verdict.commercial_references.invalid, 1);
    assert_eq!(verdict.commercial_references.total, 5);
}

#[test]
fn uncapped_references_saturate_the_score() {
    let engine = UnderwritingEngine::new(UnderwritingConfig {
        max_valid_references: usize::MAX,
        ..UnderwritingConfig::default()
    });
    let references = (0..7000)
        .map(|n| CommercialReference {
            name: format!("Comercio {n}"),
            valid: true,
        })
        .collect();
    let profile = PersonalProfile {
        commercial_references: references,
        ..clean_profile()
    };

    let verdict = engine.evaluate(&profile, &situation("NORMAL"));
    let finding = verdict
        .findings
        .iter()
        .find(|finding| finding.rule == RuleCode::CommercialReferences)
        .expect("reference rule evaluated");

    assert_eq!(finding.points, i16::MAX);
    assert_eq!(verdict.score, i16::MAX);
    assert_eq!(verdict.status, EvaluationStatus::Approve);
}

#[test]
fn unknown_observation_codes_use_the_generic_phrase() {
    let situation = VerifiedSituation {
        observations: vec!["XK-42".to_string()],
        ..situation("NORMAL")
    };

    let verdict = engine().evaluate(&clean_profile(), &situation);
    let comment = verdict.merchant_comment();

    assert_eq!(verdict.status, EvaluationStatus::Pend);
    assert!(comment.contains("no cumple con la política crediticia vigente"));
    assert!(!comment.contains("XK-42"));
    assert!(!comment.contains("OBS_"));
}

#[test]
fn evaluation_is_deterministic() {
    let first = engine().evaluate(&indebted_profile(), &situation("NORMAL"));
    let second = engine().evaluate(&indebted_profile(), &situation("NORMAL"));
    assert_eq!(first, second);
}
