use super::common::*;
use std::sync::Arc;

use crate::workflows::catalog::domain::{ApplicationId, ApplicationStatus, UserId};
use crate::workflows::catalog::moderation::ModerationError;
use crate::workflows::catalog::notify::Notice;
use crate::workflows::catalog::repository::ApplicationRepository;

#[tokio::test]
async fn approve_publishes_card_and_tells_the_submitter() {
    let harness = harness();
    let alex = submitter(1);
    let id = submit_alex(&harness, &alex).await;

    let approval = harness
        .dispatcher
        .moderation()
        .approve(ADMIN, id)
        .await
        .expect("approved");

    assert_eq!(approval.card.handle, "alex99");
    assert!(approval.card.badges.is_empty());
    assert!(!approval.card.pinned);
    assert_eq!(approval.card.category_display_name, "Small");
    assert_eq!(approval.card.links, None);
    assert!(approval.submitter_notified);

    let stored = harness.store.get(id).await.expect("get").expect("present");
    assert_eq!(stored.status, ApplicationStatus::Approved);
    assert_eq!(harness.store.cards().expect("cards").len(), 1);

    assert_eq!(
        harness.notifier.deliveries_to(alex.id),
        vec![Notice::Accepted {
            application_id: id,
            catalog_link: format!("{CATALOG_URL}#alex99"),
        }]
    );
}

#[tokio::test]
async fn second_decision_is_already_decided() {
    let harness = harness();
    let id = seed_pending(&harness.store, UserId(1), "alex99").await;
    let moderation = harness.dispatcher.moderation();

    moderation.approve(ADMIN, id).await.expect("first approval");

    for result in [
        moderation.approve(SECOND_ADMIN, id).await.map(|_| ()),
        moderation.reject(ADMIN, id).await.map(|_| ()),
    ] {
        match result {
            Err(ModerationError::AlreadyDecided { status, .. }) => {
                assert_eq!(status, ApplicationStatus::Approved)
            }
            other => panic!("expected already decided, got {other:?}"),
        }
    }
    assert_eq!(harness.store.cards().expect("cards").len(), 1);
    assert_eq!(harness.notifier.deliveries_to(UserId(1)).len(), 1);
}

#[tokio::test]
async fn reject_then_approve_creates_no_card() {
    let harness = harness();
    let id = seed_pending(&harness.store, UserId(1), "alex99").await;
    let moderation = harness.dispatcher.moderation();

    let rejection = moderation.reject(ADMIN, id).await.expect("rejected");
    assert!(rejection.submitter_notified);

    assert!(matches!(
        moderation.approve(ADMIN, id).await,
        Err(ModerationError::AlreadyDecided {
            status: ApplicationStatus::Rejected,
            ..
        })
    ));
    assert!(harness.store.cards().expect("cards").is_empty());
    assert_eq!(
        harness.notifier.deliveries_to(UserId(1)),
        vec![Notice::Rejected { application_id: id }]
    );
}

#[tokio::test]
async fn non_admins_cannot_decide() {
    let harness = harness();
    let id = seed_pending(&harness.store, UserId(1), "alex99").await;
    let moderation = harness.dispatcher.moderation();

    assert!(matches!(
        moderation.approve(UserId(1), id).await,
        Err(ModerationError::Unauthorized(_))
    ));
    assert!(matches!(
        moderation.reject(UserId(1), id).await,
        Err(ModerationError::Unauthorized(_))
    ));
    assert!(matches!(
        moderation.list_pending(UserId(1)).await,
        Err(ModerationError::Unauthorized(_))
    ));

    let stored = harness.store.get(id).await.expect("get").expect("present");
    assert_eq!(stored.status, ApplicationStatus::Pending);
    assert!(harness.notifier.deliveries().is_empty());
}

#[tokio::test]
async fn unknown_application_is_not_found() {
    let harness = harness();
    assert!(matches!(
        harness
            .dispatcher
            .moderation()
            .approve(ADMIN, ApplicationId(404))
            .await,
        Err(ModerationError::NotFound(ApplicationId(404)))
    ));
}

#[tokio::test]
async fn duplicate_handle_leaves_second_application_pending() {
    let harness = harness();
    let first = seed_pending(&harness.store, UserId(1), "alex99").await;
    let second = seed_pending(&harness.store, UserId(2), "alex99").await;
    let moderation = harness.dispatcher.moderation();

    moderation.approve(ADMIN, first).await.expect("first approval");
    match moderation.approve(ADMIN, second).await {
        Err(ModerationError::DuplicateHandle(handle)) => assert_eq!(handle, "alex99"),
        other => panic!("expected duplicate handle, got {other:?}"),
    }

    let stored = harness.store.get(second).await.expect("get").expect("present");
    assert_eq!(stored.status, ApplicationStatus::Pending);
    assert_eq!(harness.store.cards().expect("cards").len(), 1);
    assert!(harness.notifier.deliveries_to(UserId(2)).is_empty());
}

#[tokio::test]
async fn decisions_hold_when_submitter_is_unreachable() {
    let harness = harness_with(FailingNotifier, Arc::new(StaticMediaStore));
    let id = seed_pending(&harness.store, UserId(1), "alex99").await;

    let approval = harness
        .dispatcher
        .moderation()
        .approve(ADMIN, id)
        .await
        .expect("approval stands");

    assert!(!approval.submitter_notified);
    let stored = harness.store.get(id).await.expect("get").expect("present");
    assert_eq!(stored.status, ApplicationStatus::Approved);
}

#[tokio::test]
async fn concurrent_approvals_publish_one_card() {
    let harness = harness();
    let id = seed_pending(&harness.store, UserId(1), "alex99").await;
    let moderation = harness.dispatcher.moderation();

    let (first, second) = tokio::join!(
        moderation.approve(ADMIN, id),
        moderation.approve(SECOND_ADMIN, id)
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|outcome| matches!(outcome, Err(ModerationError::AlreadyDecided { .. }))));
    assert_eq!(harness.store.cards().expect("cards").len(), 1);
    assert_eq!(harness.notifier.deliveries_to(UserId(1)).len(), 1);
}

#[tokio::test]
async fn pending_listing_is_capped_and_newest_first() {
    let harness = harness();
    let mut ids = Vec::new();
    for index in 0..7 {
        ids.push(seed_pending(&harness.store, UserId(index), &format!("user{index}")).await);
    }
    harness
        .dispatcher
        .moderation()
        .reject(ADMIN, ids[6])
        .await
        .expect("rejected");

    let pending = harness
        .dispatcher
        .moderation()
        .list_pending(ADMIN)
        .await
        .expect("listed");

    let listed: Vec<ApplicationId> = pending.iter().map(|application| application.id).collect();
    assert_eq!(listed, vec![ids[5], ids[4], ids[3], ids[2], ids[1]]);
}

#[tokio::test]
async fn admin_controls_flow_through_dispatch() {
    let harness = harness();
    let alex = submitter(1);
    let id = submit_alex(&harness, &alex).await;

    let listing = harness
        .dispatcher
        .dispatch(action(&admin(), "admin:applications"))
        .await;
    assert_eq!(listing.len(), 1);
    assert!(listing[0].text.contains("alex99"));

    let denied = harness
        .dispatcher
        .dispatch(action(&alex, &format!("approve:{id}")))
        .await;
    assert_eq!(denied[0].text, "Access denied.");

    for data in ["view:999", "badge:verified:999", "admin:applications"] {
        let refused = harness.dispatcher.dispatch(action(&alex, data)).await;
        assert_eq!(refused.len(), 1);
        assert_eq!(refused[0].text, "Access denied.");
    }

    let approved = harness
        .dispatcher
        .dispatch(action(&admin(), &format!("approve:{id}")))
        .await;
    assert!(approved[0].text.contains("approved"));
    assert_eq!(approved[0].controls.len(), 4);

    let again = harness
        .dispatcher
        .dispatch(action(&admin(), &format!("reject:{id}")))
        .await;
    assert_eq!(again[0].text, format!("Application #{id} was already approved."));

    let empty = harness
        .dispatcher
        .dispatch(action(&admin(), "admin:applications"))
        .await;
    assert_eq!(empty[0].text, "No pending applications.");
}
