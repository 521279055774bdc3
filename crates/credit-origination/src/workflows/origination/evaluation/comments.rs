use super::policy::EvaluationStatus;
use super::rules::{RuleCode, RuleFinding, RuleOutcome};
use super::UnderwritingVerdict;

const GENERIC_PHRASE: &str = "no cumple con la política crediticia vigente";

/// Merchant-safe wording for a finding. Never exposes rule codes.
pub(crate) fn merchant_phrase(finding: &RuleFinding) -> String {
    let count = finding.count.unwrap_or_default();
    match &finding.rule {
        RuleCode::SituationCode => "su situación crediticia requiere análisis".to_string(),
        RuleCode::Situation2Entities => format!("tiene {count} entidades en situación 2"),
        RuleCode::IrregularEntities => {
            format!("tiene {count} entidades con atrasos significativos")
        }
        RuleCode::DebtEntities => format!("registra deuda en {count} entidades"),
        RuleCode::Employment => "su situación laboral no cumple los requisitos".to_string(),
        RuleCode::BureauScore => "su puntaje crediticio no alcanza el mínimo".to_string(),
        RuleCode::CommercialReferences => {
            "no cuenta con referencias comerciales suficientes".to_string()
        }
        RuleCode::Observation(code) => observation_phrase(code)
            .unwrap_or(GENERIC_PHRASE)
            .to_string(),
    }
}

fn observation_phrase(code: &str) -> Option<&'static str> {
    match code.trim().to_uppercase().as_str() {
        "IDENTIDAD_NO_VALIDADA" => Some("no se pudo validar su identidad"),
        "DOMICILIO_NO_VALIDADO" => Some("no se pudo validar su domicilio"),
        "CONSULTAS_EXCESIVAS" => Some("registra muchas consultas crediticias recientes"),
        _ => None,
    }
}

pub(crate) fn merchant_comment(verdict: &UnderwritingVerdict) -> String {
    let relevant = match verdict.status {
        EvaluationStatus::Reject => RuleOutcome::Failed,
        _ => RuleOutcome::Pending,
    };
    let phrases: Vec<String> = verdict
        .findings
        .iter()
        .filter(|finding| finding.outcome == relevant)
        .map(merchant_phrase)
        .collect();

    let mut comment = match verdict.status {
        EvaluationStatus::Approve => "Solicitud aprobada.".to_string(),
        EvaluationStatus::Reject if phrases.is_empty() => {
            format!("Solicitud rechazada: el cliente {GENERIC_PHRASE}.")
        }
        EvaluationStatus::Reject => {
            format!("Solicitud rechazada: el cliente {}.", phrases.join("; "))
        }
        EvaluationStatus::Pend | EvaluationStatus::Inconclusive if phrases.is_empty() => {
            "Solicitud en revisión por un analista.".to_string()
        }
        EvaluationStatus::Pend | EvaluationStatus::Inconclusive => format!(
            "Solicitud en revisión por un analista: el cliente {}.",
            phrases.join("; ")
        ),
    };

    if let Some(message) = verdict
        .messages
        .situation_merchant
        .as_deref()
        .filter(|message| !message.trim().is_empty())
    {
        comment.push(' ');
        comment.push_str(message.trim());
    }

    comment
}

pub(crate) fn analyst_comment(verdict: &UnderwritingVerdict) -> String {
    let mut lines = vec![
        format!(
            "Evaluación automática: {} (score {}).",
            verdict.status, verdict.score
        ),
        format!("Motivo: {}.", verdict.reason),
    ];

    for (title, labels) in [
        ("Reglas fallidas", &verdict.failed_rules),
        ("Pendientes", &verdict.pending_rules),
        ("Aprobadas", &verdict.passed_rules),
    ] {
        if !labels.is_empty() {
            lines.push(format!("{title}: {}.", labels.join("; ")));
        }
    }

    if !verdict.situation2_entities.is_empty() {
        lines.push(format!(
            "Entidades en situación 2: {}.",
            verdict.situation2_entities.join(", ")
        ));
    }
    if !verdict.debt_entities.is_empty() {
        lines.push(format!(
            "Entidades con deuda: {}.",
            verdict.debt_entities.join(", ")
        ));
    }
    if let Some(message) = &verdict.messages.profile {
        lines.push(format!("Nosis: {message}"));
    }
    if let Some(message) = &verdict.messages.situation_analyst {
        lines.push(format!("Eureka: {message}"));
    }

    lines.join("\n")
}
