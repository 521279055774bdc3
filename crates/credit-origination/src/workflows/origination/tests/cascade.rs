use rust_decimal_macros::dec;

use super::common::*;
use crate::workflows::origination::audit::AuditAction;
use crate::workflows::origination::cascade::{CascadeOutcome, CascadeRejection};
use crate::workflows::origination::domain::{
    FormalApplicationState, InitialApplicationId, InitialApplicationState, PurchaseState,
};
use crate::workflows::origination::repository::{ApplicationStore, FormalApplicationStore};

const REASON: &str = "documentación inconsistente";

async fn states(harness: &Harness) -> (FormalApplicationState, InitialApplicationState) {
    let formal = harness
        .backend
        .formal_applications
        .by_initial_application(&InitialApplicationId::from("sol-1"))
        .await
        .expect("lookup")
        .expect("formal application exists");
    let initial = harness
        .backend
        .applications
        .get(&InitialApplicationId::from("sol-1"))
        .await
        .expect("lookup")
        .expect("initial application exists");
    (formal.state, initial.state)
}

#[tokio::test]
async fn approved_formal_application_is_left_alone() {
    let harness = Harness::new().await;
    let initial = harness
        .seed_application("sol-1", merchant(), InitialApplicationState::Approved, start())
        .await;
    let formal = harness
        .seed_formal(&initial, FormalApplicationState::Approved, dec!(500000), false)
        .await;
    let purchase = harness
        .seed_purchase("cmp-1", &formal, PurchaseState::Pending, dec!(1000))
        .await;

    harness
        .purchases()
        .reject(&purchase.id, &analyst(), REASON)
        .await
        .expect("rejected");

    assert_eq!(
        states(&harness).await,
        (FormalApplicationState::Approved, InitialApplicationState::Approved)
    );
    let audit = harness.audit().await;
    assert_eq!(audit.len(), 2);
    assert_eq!(audit[1].action, AuditAction::Info);
    assert_eq!(audit[1].detail["state"], "aprobada");
}

#[tokio::test]
async fn pending_formal_and_initial_applications_are_both_rejected() {
    let harness = Harness::new().await;
    let initial = harness
        .seed_application("sol-1", merchant(), InitialApplicationState::Pending, start())
        .await;
    let formal = harness
        .seed_formal(&initial, FormalApplicationState::Pending, dec!(500000), false)
        .await;
    let mut purchase = harness
        .seed_purchase("cmp-1", &formal, PurchaseState::Rejected, dec!(1000))
        .await;
    purchase.rejection_reason = Some(REASON.to_string());

    let outcome = CascadeRejection::new(&harness.backend.ports())
        .propagate(&purchase, &analyst())
        .await
        .expect("cascade runs");

    assert_eq!(
        outcome,
        CascadeOutcome {
            formal_rejected: true,
            initial_rejected: true,
        }
    );
    let expected_reason = format!("Compra cmp-1 rechazada: {REASON}");

    let formal = harness
        .backend
        .formal_applications
        .get(&formal.id)
        .await
        .expect("lookup")
        .expect("exists");
    assert_eq!(formal.state, FormalApplicationState::Rejected);
    assert_eq!(formal.rejection_reason.as_deref(), Some(expected_reason.as_str()));
    assert_eq!(formal.analyst_id, Some(analyst()));
    assert_eq!(formal.comments.for_analyst().count(), 1);

    let initial = harness
        .backend
        .applications
        .get(&initial.id)
        .await
        .expect("lookup")
        .expect("exists");
    assert_eq!(initial.state, InitialApplicationState::Rejected);
    assert_eq!(initial.rejection_reason.as_deref(), Some(expected_reason.as_str()));

    let audit = harness.audit().await;
    assert_eq!(
        audit.iter().map(|event| event.action).collect::<Vec<_>>(),
        vec![AuditAction::CascadeReject, AuditAction::CascadeReject]
    );
    assert!(audit
        .iter()
        .all(|event| event.initial_application_id == Some(initial.id.clone())));
    assert_eq!(audit[0].detail["previous_state"], "pendiente");
}

#[tokio::test]
async fn pending_increase_formal_flips_but_approved_initial_stays() {
    let harness = Harness::new().await;
    let initial = harness
        .seed_application("sol-1", merchant(), InitialApplicationState::Approved, start())
        .await;
    let formal = harness
        .seed_formal(
            &initial,
            FormalApplicationState::PendingIncrease,
            dec!(500000),
            true,
        )
        .await;
    let purchase = harness
        .seed_purchase("cmp-1", &formal, PurchaseState::Pending, dec!(1000))
        .await;

    harness
        .purchases()
        .reject(&purchase.id, &analyst(), REASON)
        .await
        .expect("rejected");

    assert_eq!(
        states(&harness).await,
        (FormalApplicationState::Rejected, InitialApplicationState::Approved)
    );
    assert_eq!(
        harness.audit_actions().await,
        vec![AuditAction::Reject, AuditAction::CascadeReject]
    );
}

#[tokio::test]
async fn cascade_failure_is_audited_but_rejection_still_succeeds() {
    let harness = Harness::new().await;
    let initial = harness
        .seed_application("sol-1", merchant(), InitialApplicationState::Pending, start())
        .await;
    let formal = harness
        .seed_formal(&initial, FormalApplicationState::Pending, dec!(500000), false)
        .await;
    let purchase = harness
        .seed_purchase("cmp-1", &formal, PurchaseState::Pending, dec!(1000))
        .await;
    harness.backend.clients.remove(&initial.client_id).await;

    let rejected = harness
        .purchases()
        .reject(&purchase.id, &analyst(), REASON)
        .await
        .expect("purchase rejection is not rolled back");

    assert_eq!(rejected.state, PurchaseState::Rejected);
    assert_eq!(
        states(&harness).await,
        (FormalApplicationState::Rejected, InitialApplicationState::Pending)
    );

    let audit = harness.audit().await;
    assert_eq!(
        audit.iter().map(|event| event.action).collect::<Vec<_>>(),
        vec![
            AuditAction::Reject,
            AuditAction::CascadeReject,
            AuditAction::Error
        ]
    );
    let failure = &audit[2];
    assert_eq!(failure.detail["operation"], "cascade");
    assert_eq!(failure.detail["category"], "state_conflict");
    assert_eq!(failure.initial_application_id, Some(initial.id.clone()));
    assert!(failure.detail["error"]
        .as_str()
        .is_some_and(|message| message.contains("cliente")));
}
