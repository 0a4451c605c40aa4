//! Maps inbound transport events onto the intake, moderation, and badge components.
//!
//! Every component error ends here and is converted into a reply for the sender. Nothing
//! propagates further, so one bad event never takes the process down.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::config::ModerationConfig;

use super::access::AdminRoster;
use super::action::{badge_controls, moderation_controls, Action, Control, Reply};
use super::badges::{BadgeError, BadgeManager};
use super::domain::{Application, ApplicationStatus, Submitter};
use super::intake::{FieldCollector, IntakeError, IntakeInput, IntakeOutcome};
use super::media::{ImageUpload, MediaStore};
use super::moderation::{ModerationError, ModerationPipeline};
use super::notify::Notifier;
use super::repository::{CatalogStore, RepositoryError};
use super::session::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Start,
    Apply,
    Status,
}

impl Command {
    /// Recognizes `/start`, `/apply` and `/status`, ignoring any `@bot` suffix.
    pub fn from_text(text: &str) -> Option<Self> {
        let word = text.trim().strip_prefix('/')?;
        let word = word.split_whitespace().next().unwrap_or_default();
        let word = word.split('@').next().unwrap_or_default();
        match word {
            "start" => Some(Command::Start),
            "apply" => Some(Command::Apply),
            "status" => Some(Command::Status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Command { name: Command },
    Text { text: String },
    Photo(ImageUpload),
    Document(ImageUpload),
    /// Raw action identifier from an interactive control.
    Action { data: String },
}

/// One inbound event as forwarded by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub from: Submitter,
    pub payload: Payload,
}

const STORAGE_FAILURE: &str = "Something went wrong on our side. Please try again later.";
const NO_SESSION: &str = "Use /apply to start an application.";

pub struct Dispatcher<R, N> {
    store: Arc<R>,
    roster: Arc<AdminRoster>,
    intake: FieldCollector<R, N>,
    moderation: ModerationPipeline<R, N>,
    badges: BadgeManager<R>,
}

impl<R, N> Dispatcher<R, N>
where
    R: CatalogStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        store: Arc<R>,
        notifier: Arc<N>,
        sessions: Arc<dyn SessionStore>,
        media: Arc<dyn MediaStore>,
        settings: &ModerationConfig,
    ) -> Self {
        let roster = Arc::new(AdminRoster::new(settings.admin_ids.iter().copied()));
        let intake = FieldCollector::new(
            sessions,
            media,
            Arc::clone(&store),
            Arc::clone(&notifier),
            Arc::clone(&roster),
        );
        let moderation = ModerationPipeline::new(
            Arc::clone(&store),
            notifier,
            Arc::clone(&roster),
            settings.catalog_base_url.clone(),
            settings.pending_page_size,
        );
        let badges = BadgeManager::new(Arc::clone(&store), Arc::clone(&roster));

        Self {
            store,
            roster,
            intake,
            moderation,
            badges,
        }
    }

    pub fn store(&self) -> &Arc<R> {
        &self.store
    }

    pub fn intake(&self) -> &FieldCollector<R, N> {
        &self.intake
    }

    pub fn moderation(&self) -> &ModerationPipeline<R, N> {
        &self.moderation
    }

    pub fn badges(&self) -> &BadgeManager<R> {
        &self.badges
    }

    /// Handles one event and returns the replies for its sender.
    pub async fn dispatch(&self, event: Event) -> Vec<Reply> {
        let Event { from, payload } = event;
        match payload {
            Payload::Command { name } => self.command(&from, name).await,
            Payload::Text { text } => match Command::from_text(&text) {
                Some(command) => self.command(&from, command).await,
                None => self.collect(&from, IntakeInput::Text(text)).await,
            },
            Payload::Photo(upload) => self.collect(&from, IntakeInput::Photo(upload)).await,
            Payload::Document(upload) => self.collect(&from, IntakeInput::Document(upload)).await,
            Payload::Action { data } => match data.parse::<Action>() {
                Ok(action) => self.action(&from, action).await,
                Err(parse_error) => {
                    debug!(sender = %from.id, %parse_error, "unrecognized action");
                    vec![Reply::text("This button is no longer supported.")]
                }
            },
        }
    }

    async fn command(&self, from: &Submitter, command: Command) -> Vec<Reply> {
        match command {
            Command::Start => self.start(from).await,
            Command::Apply => match self.intake.begin(from).await {
                Ok(reply) => vec![reply],
                Err(intake_error) => vec![intake_failure(&intake_error)],
            },
            Command::Status => self.status(from).await,
        }
    }

    async fn start(&self, from: &Submitter) -> Vec<Reply> {
        let is_admin = self.roster.is_admin(from.id);
        if let Err(storage) = self.store.register(from, is_admin).await {
            return vec![storage_failure(&storage)];
        }

        let reply = if is_admin {
            Reply::with_controls(
                "Welcome, administrator!\n\nUse the menu below to moderate applications.",
                vec![Control::new("Pending applications", Action::ListApplications)],
            )
        } else {
            Reply::text(format!(
                "Welcome to the Fame catalog, {}!\n\nTo get listed, fill in an application with /apply\nCheck your application with /status",
                from.first_name
            ))
        };
        vec![reply]
    }

    async fn status(&self, from: &Submitter) -> Vec<Reply> {
        match self.store.latest_for_submitter(from.id).await {
            Ok(Some(application)) => vec![Reply::text(format!(
                "Application #{}: {}",
                application.id,
                status_text(application.status)
            ))],
            Ok(None) => vec![Reply::text(
                "You have no applications yet. Use /apply to submit one.",
            )],
            Err(storage) => vec![storage_failure(&storage)],
        }
    }

    async fn collect(&self, from: &Submitter, input: IntakeInput) -> Vec<Reply> {
        match self.intake.handle(from, input).await {
            Ok(IntakeOutcome::NoSession) => vec![Reply::text(NO_SESSION)],
            Ok(outcome) => outcome.into_reply().into_iter().collect(),
            Err(intake_error) => vec![intake_failure(&intake_error)],
        }
    }

    async fn action(&self, from: &Submitter, action: Action) -> Vec<Reply> {
        if action.is_admin() && !self.roster.is_admin(from.id) {
            warn!(sender = %from.id, %action, "admin action refused");
            return vec![Reply::text("Access denied.")];
        }
        match action {
            Action::SelectCategory(category) => {
                self.collect(from, IntakeInput::Category(category)).await
            }
            Action::Confirm(choice) => self.collect(from, IntakeInput::Confirm(choice)).await,
            Action::Approve(id) => match self.moderation.approve(from.id, id).await {
                Ok(approval) => vec![Reply::with_controls(
                    format!(
                        "Application #{} approved. Card #{} published for @{}.",
                        approval.application_id, approval.card.id, approval.card.handle
                    ),
                    badge_controls(approval.card.id),
                )],
                Err(moderation_error) => vec![moderation_failure(&moderation_error)],
            },
            Action::Reject(id) => match self.moderation.reject(from.id, id).await {
                Ok(rejection) => vec![Reply::text(format!(
                    "Application #{} rejected.",
                    rejection.application_id
                ))],
                Err(moderation_error) => vec![moderation_failure(&moderation_error)],
            },
            Action::View(id) => match self.moderation.view(from.id, id).await {
                Ok(application) => vec![application_reply(&application)],
                Err(moderation_error) => vec![moderation_failure(&moderation_error)],
            },
            Action::ListApplications => match self.moderation.list_pending(from.id).await {
                Ok(pending) if pending.is_empty() => {
                    vec![Reply::text("No pending applications.")]
                }
                Ok(pending) => pending.iter().map(application_reply).collect(),
                Err(moderation_error) => vec![moderation_failure(&moderation_error)],
            },
            Action::ToggleBadge { badge, card_id } => {
                match self.badges.toggle(from.id, card_id, badge).await {
                    Ok(toggle) => {
                        let verb = if toggle.added { "added to" } else { "removed from" };
                        let current = if toggle.badges.is_empty() {
                            "none".to_string()
                        } else {
                            toggle.badges.iter().map(|b| b.code()).collect::<Vec<_>>().join(", ")
                        };
                        vec![Reply::with_controls(
                            format!(
                                "Badge {} {verb} card #{}.\nBadges: {current}",
                                badge.code(),
                                toggle.card_id
                            ),
                            badge_controls(toggle.card_id),
                        )]
                    }
                    Err(badge_error) => vec![badge_failure(&badge_error)],
                }
            }
        }
    }
}

fn status_text(status: ApplicationStatus) -> &'static str {
    match status {
        ApplicationStatus::Pending => "pending review",
        ApplicationStatus::Approved => "approved",
        ApplicationStatus::Rejected => "rejected",
    }
}

fn application_reply(application: &Application) -> Reply {
    let text = format!(
        "Application #{}\n\nFrom: {}\nName: {}\nUsername: @{}\nCategory: {}\nChannel: {}\nDescription: {}\nStatus: {}",
        application.id,
        application.submitter_display_name,
        application.name,
        application.handle,
        application.category.code(),
        application.channel.as_deref().unwrap_or("not specified"),
        application.description,
        application.status.label(),
    );
    if application.status.is_decided() {
        Reply::text(text)
    } else {
        Reply::with_controls(text, moderation_controls(application.id))
    }
}

fn storage_failure(storage: &RepositoryError) -> Reply {
    error!(error = %storage, "storage failure");
    Reply::text(STORAGE_FAILURE)
}

fn intake_failure(intake_error: &IntakeError) -> Reply {
    match intake_error {
        IntakeError::Incomplete(missing) => {
            warn!(%missing, "confirmation reached with incomplete session");
            Reply::text("Your application is incomplete. Start again with /apply")
        }
        IntakeError::Repository(storage) => storage_failure(storage),
        IntakeError::Sessions(sessions) => {
            error!(error = %sessions, "session store failure");
            Reply::text(STORAGE_FAILURE)
        }
    }
}

fn moderation_failure(moderation_error: &ModerationError) -> Reply {
    match moderation_error {
        ModerationError::Unauthorized(_) => Reply::text("Access denied."),
        ModerationError::NotFound(id) => Reply::text(format!("Application #{id} not found.")),
        ModerationError::AlreadyDecided { id, status } => Reply::text(format!(
            "Application #{id} was already {}.",
            status.label()
        )),
        ModerationError::DuplicateHandle(handle) => Reply::text(format!(
            "A card for @{handle} already exists. The application stays pending."
        )),
        ModerationError::Repository(storage) => storage_failure(storage),
    }
}

fn badge_failure(badge_error: &BadgeError) -> Reply {
    match badge_error {
        BadgeError::Unauthorized(_) => Reply::text("Access denied."),
        BadgeError::NotFound(card_id) => Reply::text(format!("Card #{card_id} not found.")),
        BadgeError::Repository(storage) => storage_failure(storage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_slash_commands() {
        assert_eq!(Command::from_text("/start"), Some(Command::Start));
        assert_eq!(Command::from_text(" /apply@fame_bot "), Some(Command::Apply));
        assert_eq!(Command::from_text("/status now"), Some(Command::Status));
        assert_eq!(Command::from_text("/help"), None);
        assert_eq!(Command::from_text("apply"), None);
    }

    #[test]
    fn events_decode_from_tagged_json() {
        let event: Event = serde_json::from_value(serde_json::json!({
            "from": { "id": 7, "first_name": "Alex" },
            "payload": { "type": "action", "data": "approve:3" }
        }))
        .expect("event decodes");
        assert_eq!(
            event.payload,
            Payload::Action {
                data: "approve:3".to_string()
            }
        );

        let photo: Payload = serde_json::from_value(serde_json::json!({
            "type": "photo",
            "file_id": "abc",
            "mime_type": "image/jpeg"
        }))
        .expect("photo decodes");
        assert!(matches!(photo, Payload::Photo(ref upload) if upload.file_id == "abc"));

        let downloaded: Payload = serde_json::from_value(serde_json::json!({
            "type": "photo",
            "file_id": "abc",
            "mime_type": "image/jpeg",
            "bytes": [255, 216, 255]
        }))
        .expect("photo with bytes decodes");
        assert!(matches!(
            downloaded,
            Payload::Photo(ref upload) if upload.bytes.as_deref() == Some(&[255u8, 216, 255][..])
        ));
    }
}
