use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::ModerationConfig;
use crate::workflows::catalog::dispatch::{Command, Dispatcher, Event, Payload};
use crate::workflows::catalog::domain::{
    ApplicationId, Category, NewApplication, PhotoRef, Submitter, UserId,
};
use crate::workflows::catalog::media::{ImageUpload, MediaError, MediaStore};
use crate::workflows::catalog::notify::{DeliveryError, Notice, Notifier};
use crate::workflows::catalog::repository::ApplicationRepository;
use crate::workflows::catalog::session::MemorySessionStore;
use crate::workflows::catalog::store::MemoryStore;

pub(super) const ADMIN: UserId = UserId(100);
pub(super) const SECOND_ADMIN: UserId = UserId(101);
pub(super) const CATALOG_URL: &str = "https://catalog.test/";

pub(super) fn submitter(id: i64) -> Submitter {
    Submitter {
        id: UserId(id),
        username: Some("alex".to_string()),
        first_name: "Alex".to_string(),
        last_name: Some("Stone".to_string()),
    }
}

pub(super) fn admin() -> Submitter {
    Submitter {
        id: ADMIN,
        username: Some("moderator".to_string()),
        first_name: "Mod".to_string(),
        last_name: None,
    }
}

pub(super) fn moderation_config() -> ModerationConfig {
    ModerationConfig {
        admin_ids: vec![ADMIN, SECOND_ADMIN],
        catalog_base_url: CATALOG_URL.to_string(),
        pending_page_size: 5,
    }
}

pub(super) fn image(file_id: &str) -> ImageUpload {
    ImageUpload {
        file_id: file_id.to_string(),
        mime_type: Some("image/jpeg".to_string()),
        bytes: None,
    }
}

pub(super) fn pending_application(submitter_id: UserId, handle: &str) -> NewApplication {
    NewApplication {
        submitter_id,
        submitter_display_name: "Alex Stone".to_string(),
        photo_ref: PhotoRef(format!("avatars/{handle}.jpg")),
        name: "Alex".to_string(),
        handle: handle.to_string(),
        category: Category::Small,
        channel: None,
        description: "Runs a small tech channel.".to_string(),
    }
}

pub(super) async fn seed_pending(store: &MemoryStore, submitter_id: UserId, handle: &str) -> ApplicationId {
    store
        .create(pending_application(submitter_id, handle))
        .await
        .expect("create pending application")
}

pub(super) fn command(from: &Submitter, name: Command) -> Event {
    Event {
        from: from.clone(),
        payload: Payload::Command { name },
    }
}

pub(super) fn text(from: &Submitter, text: &str) -> Event {
    Event {
        from: from.clone(),
        payload: Payload::Text {
            text: text.to_string(),
        },
    }
}

pub(super) fn photo(from: &Submitter, file_id: &str) -> Event {
    Event {
        from: from.clone(),
        payload: Payload::Photo(image(file_id)),
    }
}

pub(super) fn action(from: &Submitter, data: &str) -> Event {
    Event {
        from: from.clone(),
        payload: Payload::Action {
            data: data.to_string(),
        },
    }
}

pub(super) struct Harness<N> {
    pub(super) dispatcher: Dispatcher<MemoryStore, N>,
    pub(super) store: Arc<MemoryStore>,
    pub(super) notifier: Arc<N>,
    pub(super) sessions: Arc<MemorySessionStore>,
}

pub(super) fn harness() -> Harness<RecordingNotifier> {
    harness_with(RecordingNotifier::default(), Arc::new(StaticMediaStore))
}

pub(super) fn harness_with<N>(notifier: N, media: Arc<dyn MediaStore>) -> Harness<N>
where
    N: Notifier + 'static,
{
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(notifier);
    let sessions = Arc::new(MemorySessionStore::default());
    let dispatcher = Dispatcher::new(
        store.clone(),
        notifier.clone(),
        sessions.clone(),
        media,
        &moderation_config(),
    );
    Harness {
        dispatcher,
        store,
        notifier,
        sessions,
    }
}

/// Walks `from` through the whole conversation and confirms.
pub(super) async fn submit_alex<N>(harness: &Harness<N>, from: &Submitter) -> ApplicationId
where
    N: Notifier + 'static,
{
    let events = [
        command(from, Command::Apply),
        photo(from, "avatar-1"),
        text(from, "Alex"),
        text(from, "alex99"),
        action(from, "category:small"),
        text(from, "skip"),
        text(from, "Runs a small tech channel."),
        action(from, "confirm:yes"),
    ];
    for event in events {
        harness.dispatcher.dispatch(event).await;
    }
    harness
        .store
        .latest_for_submitter(from.id)
        .await
        .expect("lookup succeeds")
        .expect("application stored")
        .id
}

#[derive(Default, Clone)]
pub(super) struct RecordingNotifier {
    delivered: Arc<Mutex<Vec<(UserId, Notice)>>>,
}

impl RecordingNotifier {
    pub(super) fn deliveries(&self) -> Vec<(UserId, Notice)> {
        self.delivered.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn deliveries_to(&self, recipient: UserId) -> Vec<Notice> {
        self.deliveries()
            .into_iter()
            .filter(|(to, _)| *to == recipient)
            .map(|(_, notice)| notice)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    /// Yields first so concurrent dispatches interleave at delivery, as a network call would.
    async fn deliver(&self, recipient: UserId, notice: Notice) -> Result<(), DeliveryError> {
        tokio::task::yield_now().await;
        self.delivered
            .lock()
            .expect("notifier mutex poisoned")
            .push((recipient, notice));
        Ok(())
    }
}

/// Every delivery fails, as if the recipient blocked the bot.
pub(super) struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn deliver(&self, recipient: UserId, _notice: Notice) -> Result<(), DeliveryError> {
        Err(DeliveryError::Unreachable(recipient))
    }
}

pub(super) struct StaticMediaStore;

#[async_trait]
impl MediaStore for StaticMediaStore {
    async fn store(&self, upload: &ImageUpload) -> Result<PhotoRef, MediaError> {
        Ok(PhotoRef(format!("avatars/{}.jpg", upload.file_id)))
    }
}

pub(super) struct FailingMediaStore;

#[async_trait]
impl MediaStore for FailingMediaStore {
    async fn store(&self, _upload: &ImageUpload) -> Result<PhotoRef, MediaError> {
        Err(MediaError::Unavailable("disk full".to_string()))
    }
}
