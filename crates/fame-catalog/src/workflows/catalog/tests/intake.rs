use super::common::*;
use std::sync::Arc;

use crate::workflows::catalog::dispatch::{Command, Event, Payload};
use crate::workflows::catalog::domain::{ApplicationStatus, Category, PhotoRef};
use crate::workflows::catalog::intake::{IntakeInput, IntakeOutcome};
use crate::workflows::catalog::media::ImageUpload;
use crate::workflows::catalog::notify::Notice;
use crate::workflows::catalog::repository::ApplicationRepository;
use crate::workflows::catalog::session::{SessionStore, Step};

#[tokio::test]
async fn text_in_photo_step_changes_nothing() {
    let harness = harness();
    let alex = submitter(1);
    harness.dispatcher.dispatch(command(&alex, Command::Apply)).await;
    let before = harness
        .sessions
        .get(alex.id)
        .await
        .expect("get")
        .expect("session started");

    let outcome = harness
        .dispatcher
        .intake()
        .handle(&alex, IntakeInput::Text("hello".to_string()))
        .await
        .expect("handled");

    assert!(matches!(outcome, IntakeOutcome::Reprompt { step: Step::Photo, .. }));
    let after = harness.sessions.get(alex.id).await.expect("get").expect("session kept");
    assert_eq!(after, before);
}

#[tokio::test]
async fn non_image_document_is_refused() {
    let harness = harness();
    let alex = submitter(1);
    harness.dispatcher.dispatch(command(&alex, Command::Apply)).await;

    let outcome = harness
        .dispatcher
        .intake()
        .handle(
            &alex,
            IntakeInput::Document(ImageUpload {
                file_id: "cv".to_string(),
                mime_type: Some("application/pdf".to_string()),
                bytes: None,
            }),
        )
        .await
        .expect("handled");
    assert!(matches!(outcome, IntakeOutcome::Reprompt { step: Step::Photo, .. }));

    let outcome = harness
        .dispatcher
        .intake()
        .handle(&alex, IntakeInput::Document(image("scan")))
        .await
        .expect("handled");
    assert!(matches!(outcome, IntakeOutcome::Advanced { step: Step::Name, .. }));

    let session = harness.sessions.get(alex.id).await.expect("get").expect("session");
    assert_eq!(session.fields.photo_ref, Some(PhotoRef("avatars/scan.jpg".to_string())));
}

#[tokio::test]
async fn media_failure_keeps_the_photo_step() {
    let harness = harness_with(RecordingNotifier::default(), Arc::new(FailingMediaStore));
    let alex = submitter(1);
    harness.dispatcher.dispatch(command(&alex, Command::Apply)).await;

    let replies = harness.dispatcher.dispatch(photo(&alex, "avatar-1")).await;

    assert!(replies[0].text.starts_with("Could not save the photo"));
    let session = harness.sessions.get(alex.id).await.expect("get").expect("session");
    assert_eq!(session.step, Step::Photo);
    assert!(session.fields.photo_ref.is_none());
}

#[tokio::test]
async fn handle_and_channel_are_normalized() {
    let harness = harness();
    let alex = submitter(1);
    for event in [
        command(&alex, Command::Apply),
        photo(&alex, "avatar-1"),
        text(&alex, "Alex"),
        text(&alex, "  @alex99 "),
        action(&alex, "category:coders"),
        text(&alex, "ПРОПУСТИТЬ"),
    ] {
        harness.dispatcher.dispatch(event).await;
    }

    let session = harness.sessions.get(alex.id).await.expect("get").expect("session");
    assert_eq!(session.step, Step::Description);
    assert_eq!(session.fields.handle.as_deref(), Some("alex99"));
    assert_eq!(session.fields.category, Some(Category::Coders));
    assert_eq!(session.fields.channel, None);
}

#[tokio::test]
async fn category_step_ignores_free_text() {
    let harness = harness();
    let alex = submitter(1);
    for event in [
        command(&alex, Command::Apply),
        photo(&alex, "avatar-1"),
        text(&alex, "Alex"),
        text(&alex, "alex99"),
    ] {
        harness.dispatcher.dispatch(event).await;
    }

    let replies = harness.dispatcher.dispatch(text(&alex, "small")).await;

    assert_eq!(replies[0].controls.len(), Category::ALL.len());
    let session = harness.sessions.get(alex.id).await.expect("get").expect("session");
    assert_eq!(session.step, Step::Category);
    assert_eq!(session.fields.category, None);
}

#[tokio::test]
async fn confirmation_creates_pending_application_and_notifies_every_admin() {
    let harness = harness();
    let alex = submitter(1);

    let id = submit_alex(&harness, &alex).await;

    let stored = harness
        .store
        .get(id)
        .await
        .expect("get")
        .expect("application stored");
    assert_eq!(stored.status, ApplicationStatus::Pending);
    assert_eq!(stored.channel, None);
    assert_eq!(stored.handle, "alex99");
    assert_eq!(stored.submitter_id, alex.id);
    assert_eq!(stored.submitter_display_name, "Alex Stone");

    for admin in [ADMIN, SECOND_ADMIN] {
        let notices = harness.notifier.deliveries_to(admin);
        assert_eq!(notices.len(), 1, "admin {admin} should get one notice");
        assert!(matches!(
            &notices[0],
            Notice::NewApplication { application_id, .. } if *application_id == id
        ));
    }
    assert!(harness.sessions.is_empty());
}

#[tokio::test]
async fn repeated_confirmation_submits_once() {
    let harness = harness();
    let alex = submitter(1);
    for event in [
        command(&alex, Command::Apply),
        photo(&alex, "avatar-1"),
        text(&alex, "Alex"),
        text(&alex, "alex99"),
        action(&alex, "category:small"),
        text(&alex, "skip"),
        text(&alex, "Runs a small tech channel."),
    ] {
        harness.dispatcher.dispatch(event).await;
    }

    let (first, second) = tokio::join!(
        harness.dispatcher.dispatch(action(&alex, "confirm:yes")),
        harness.dispatcher.dispatch(action(&alex, "confirm:yes")),
    );

    let sent = [&first, &second]
        .iter()
        .filter(|replies| {
            replies
                .iter()
                .any(|reply| reply.text.starts_with("Application sent!"))
        })
        .count();
    assert_eq!(sent, 1);
    assert_eq!(harness.store.list_pending(10).await.expect("listed").len(), 1);
    assert_eq!(harness.notifier.deliveries_to(ADMIN).len(), 1);
    assert_eq!(harness.notifier.deliveries_to(SECOND_ADMIN).len(), 1);
    assert!(harness.sessions.is_empty());
}

#[tokio::test]
async fn declining_discards_the_session() {
    let harness = harness();
    let alex = submitter(1);
    for event in [
        command(&alex, Command::Apply),
        photo(&alex, "avatar-1"),
        text(&alex, "Alex"),
        text(&alex, "alex99"),
        action(&alex, "category:small"),
        text(&alex, "t.me/alex"),
        text(&alex, "Streams"),
    ] {
        harness.dispatcher.dispatch(event).await;
    }

    let replies = harness.dispatcher.dispatch(action(&alex, "confirm:no")).await;

    assert!(replies[0].text.contains("cancelled"));
    assert!(harness.sessions.is_empty());
    assert!(harness
        .store
        .latest_for_submitter(alex.id)
        .await
        .expect("lookup")
        .is_none());
    assert!(harness.notifier.deliveries().is_empty());
}

#[tokio::test]
async fn apply_again_restarts_from_photo() {
    let harness = harness();
    let alex = submitter(1);
    for event in [
        command(&alex, Command::Apply),
        photo(&alex, "avatar-1"),
        text(&alex, "Alex"),
        command(&alex, Command::Apply),
    ] {
        harness.dispatcher.dispatch(event).await;
    }

    let session = harness.sessions.get(alex.id).await.expect("get").expect("session");
    assert_eq!(session.step, Step::Photo);
    assert_eq!(session.fields.name, None);
}

#[tokio::test]
async fn submission_stands_when_admins_are_unreachable() {
    let harness = harness_with(FailingNotifier, Arc::new(StaticMediaStore));
    let alex = submitter(1);
    for event in [
        command(&alex, Command::Apply),
        photo(&alex, "avatar-1"),
        text(&alex, "Alex"),
        text(&alex, "alex99"),
        action(&alex, "category:small"),
        text(&alex, "skip"),
    ] {
        harness.dispatcher.dispatch(event).await;
    }
    harness
        .dispatcher
        .intake()
        .handle(&alex, IntakeInput::Text("Runs a small tech channel.".to_string()))
        .await
        .expect("description accepted");

    let outcome = harness
        .dispatcher
        .intake()
        .handle(&alex, IntakeInput::Confirm(true))
        .await
        .expect("confirmed");

    match outcome {
        IntakeOutcome::Submitted {
            admins_notified, ..
        } => assert_eq!(admins_notified, 0),
        other => panic!("expected submission, got {other:?}"),
    }
    let stored = harness
        .store
        .latest_for_submitter(alex.id)
        .await
        .expect("lookup")
        .expect("stored");
    assert_eq!(stored.status, ApplicationStatus::Pending);
}

#[tokio::test]
async fn input_without_session_points_to_apply() {
    let harness = harness();
    let alex = submitter(1);

    let replies = harness
        .dispatcher
        .dispatch(Event {
            from: alex.clone(),
            payload: Payload::Text {
                text: "hello".to_string(),
            },
        })
        .await;

    assert_eq!(replies.len(), 1);
    assert!(replies[0].text.contains("/apply"));
}

#[tokio::test]
async fn status_reports_latest_application() {
    let harness = harness();
    let alex = submitter(1);

    let replies = harness.dispatcher.dispatch(text(&alex, "/status")).await;
    assert!(replies[0].text.contains("no applications"));

    let id = submit_alex(&harness, &alex).await;
    let replies = harness.dispatcher.dispatch(command(&alex, Command::Status)).await;
    assert_eq!(replies[0].text, format!("Application #{id}: pending review"));
}
