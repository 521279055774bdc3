use chrono::Duration;
use rust_decimal_macros::dec;

use super::common::*;
use crate::workflows::origination::audit::AuditAction;
use crate::workflows::origination::blocking::DuplicateResolver;
use crate::workflows::origination::domain::{
    FormalApplicationState, InitialApplicationState, PurchaseState, UserId,
};
use crate::workflows::origination::error::{OriginationError, StateConflict};
use crate::workflows::origination::notification::NotificationKind;
use crate::workflows::origination::repository::ApplicationStore;

fn resolver(harness: &Harness) -> DuplicateResolver {
    DuplicateResolver::new(harness.backend.stores(), harness.backend.users.clone())
}

#[tokio::test]
async fn same_merchant_rejected_application_blocks() {
    let harness = Harness::new().await;
    harness
        .seed_application("sol-old", merchant(), InitialApplicationState::Rejected, start())
        .await;

    let resolution = resolver(&harness)
        .resolve(&tax_id(), &merchant())
        .await
        .expect("resolution");

    assert!(resolution.blocked_by_same_merchant);
    assert!(!resolution.blocked_by_other_merchant);
    assert_eq!(
        resolution.into_result(),
        Err(StateConflict::DuplicateSameMerchant)
    );
}

#[tokio::test]
async fn same_merchant_approved_application_blocks_without_purchases() {
    let harness = Harness::new().await;
    harness
        .seed_application("sol-old", merchant(), InitialApplicationState::Approved, start())
        .await;

    let resolution = resolver(&harness)
        .resolve(&tax_id(), &merchant())
        .await
        .expect("resolution");
    assert!(resolution.blocked_by_same_merchant);
    assert!(!resolution.blocked_by_other_merchant);

    let error = harness
        .lifecycle()
        .create(request())
        .await
        .expect_err("approved application with the same merchant must block");
    assert!(matches!(
        error,
        OriginationError::Conflict(StateConflict::DuplicateSameMerchant)
    ));
    assert_eq!(harness.profile.calls(), 0);
    assert_eq!(harness.situation.calls(), 0);
}

#[tokio::test]
async fn other_merchant_rejected_application_blocks_and_names_the_store() {
    let harness = Harness::new().await;
    harness
        .seed_application(
            "sol-old",
            other_merchant(),
            InitialApplicationState::Rejected,
            start(),
        )
        .await;

    let resolution = resolver(&harness)
        .resolve(&tax_id(), &merchant())
        .await
        .expect("resolution");

    assert!(resolution.blocked_by_other_merchant);
    assert_eq!(resolution.origin_merchant_id, Some(other_merchant()));
    assert_eq!(resolution.origin_merchant_name.as_deref(), Some("Hogar Norte"));
}

#[tokio::test]
async fn expired_applications_never_block() {
    let harness = Harness::new().await;
    harness
        .seed_application(
            "sol-1",
            other_merchant(),
            InitialApplicationState::Expired,
            start(),
        )
        .await;
    harness
        .seed_application("sol-2", merchant(), InitialApplicationState::Expired, start())
        .await;

    let resolution = resolver(&harness)
        .resolve(&tax_id(), &merchant())
        .await
        .expect("resolution");

    assert!(!resolution.is_blocked());
    assert_eq!(resolution.into_result(), Ok(()));
}

#[tokio::test]
async fn other_merchant_approval_blocks_only_while_a_purchase_is_active() {
    let harness = Harness::new().await;
    let initial = harness
        .seed_application(
            "sol-1",
            other_merchant(),
            InitialApplicationState::Approved,
            start(),
        )
        .await;
    let resolver = resolver(&harness);

    let resolution = resolver.resolve(&tax_id(), &merchant()).await.expect("resolution");
    assert!(!resolution.is_blocked(), "no formal application yet");

    let formal = harness
        .seed_formal(&initial, FormalApplicationState::Approved, dec!(500000), false)
        .await;
    harness
        .seed_purchase("cmp-1", &formal, PurchaseState::Rejected, dec!(1000))
        .await;
    let resolution = resolver.resolve(&tax_id(), &merchant()).await.expect("resolution");
    assert!(!resolution.is_blocked(), "rejected purchases are not draws");

    harness
        .seed_purchase("cmp-2", &formal, PurchaseState::Pending, dec!(1000))
        .await;
    let resolution = resolver.resolve(&tax_id(), &merchant()).await.expect("resolution");
    assert!(resolution.blocked_by_other_merchant);

    let own = resolver
        .resolve(&tax_id(), &other_merchant())
        .await
        .expect("resolution");
    assert!(own.blocked_by_same_merchant);
    assert!(!own.blocked_by_other_merchant);
}

#[tokio::test]
async fn other_merchant_wins_and_unknown_merchant_falls_back_to_id() {
    let harness = Harness::new().await;
    let ghost = UserId::from("com-ghost");
    harness
        .seed_application("sol-1", merchant(), InitialApplicationState::Pending, start())
        .await;
    harness
        .seed_application(
            "sol-2",
            ghost.clone(),
            InitialApplicationState::Pending,
            start() + Duration::minutes(5),
        )
        .await;

    let resolution = resolver(&harness)
        .resolve(&tax_id(), &merchant())
        .await
        .expect("resolution");

    assert!(resolution.blocked_by_same_merchant);
    assert_eq!(
        resolution.into_result(),
        Err(StateConflict::DuplicateOtherMerchant {
            merchant_id: ghost,
            merchant_name: "com-ghost".to_string(),
        })
    );
}

#[tokio::test]
async fn blocked_creation_skips_bureaus_and_is_audited() {
    let harness = Harness::new().await;
    harness
        .seed_application(
            "sol-old",
            other_merchant(),
            InitialApplicationState::Pending,
            start(),
        )
        .await;

    let error = harness
        .lifecycle()
        .create(request())
        .await
        .expect_err("duplicate must block");

    match &error {
        OriginationError::Conflict(StateConflict::DuplicateOtherMerchant {
            merchant_name, ..
        }) => assert_eq!(merchant_name, "Hogar Norte"),
        other => panic!("expected duplicate conflict, got {other:?}"),
    }
    assert!(error.to_string().contains("Hogar Norte"));
    assert_eq!(harness.profile.calls(), 0);
    assert_eq!(harness.situation.calls(), 0);

    let stored = harness
        .backend
        .applications
        .by_tax_id(&tax_id())
        .await
        .expect("lookup");
    assert_eq!(stored.len(), 1, "nothing new persisted");

    let audit = harness.audit().await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, AuditAction::Block);
    assert_eq!(audit[0].detail["step"], "duplicate_check");

    let notifications = harness.backend.notifications.events().await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].user_id, merchant());
    assert_eq!(notifications[0].kind, NotificationKind::ApplicationFailed);
}
