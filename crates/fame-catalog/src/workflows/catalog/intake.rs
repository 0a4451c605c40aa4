use std::sync::Arc;

use tracing::{debug, info, warn};

use super::access::AdminRoster;
use super::action::{category_controls, confirm_controls, Reply};
use super::domain::{ApplicationId, Category, Submitter};
use super::media::{ImageUpload, MediaStore};
use super::notify::{notify_best_effort, Notice, Notifier};
use super::repository::{ApplicationRepository, RepositoryError};
use super::session::{
    CollectedFields, IncompleteSession, Session, SessionStore, SessionStoreError, Step, DATA_STEPS,
};

/// Tokens that leave the channel empty, compared case-insensitively.
pub const SKIP_TOKENS: [&str; 2] = ["skip", "пропустить"];

const PREVIEW_DESCRIPTION_CHARS: usize = 100;

/// Inbound payloads the conversation understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeInput {
    Text(String),
    Photo(ImageUpload),
    Document(ImageUpload),
    Category(Category),
    Confirm(bool),
}

/// What happened to the submitter's session after one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// The submitter has no live session; the input was not for the collector.
    NoSession,
    Advanced { step: Step, reply: Reply },
    /// Input did not fit the current step; nothing changed.
    Reprompt { step: Step, reply: Reply },
    Submitted {
        application_id: ApplicationId,
        admins_notified: usize,
        reply: Reply,
    },
    Cancelled { reply: Reply },
}

impl IntakeOutcome {
    pub fn into_reply(self) -> Option<Reply> {
        match self {
            IntakeOutcome::NoSession => None,
            IntakeOutcome::Advanced { reply, .. }
            | IntakeOutcome::Reprompt { reply, .. }
            | IntakeOutcome::Submitted { reply, .. }
            | IntakeOutcome::Cancelled { reply } => Some(reply),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error(transparent)]
    Sessions(#[from] SessionStoreError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Incomplete(#[from] IncompleteSession),
}

/// Strips surrounding whitespace and one leading `@`. Empty handles are rejected.
pub fn normalize_handle(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let handle = trimmed.strip_prefix('@').unwrap_or(trimmed).trim();
    if handle.is_empty() {
        None
    } else {
        Some(handle.to_string())
    }
}

pub fn is_skip_token(raw: &str) -> bool {
    let lowered = raw.trim().to_lowercase();
    SKIP_TOKENS.iter().any(|token| *token == lowered)
}

fn step_header(step: Step) -> String {
    match step.ordinal() {
        Some(position) => format!("Step {position} of {DATA_STEPS}: "),
        None => String::new(),
    }
}

/// Rendered preview of everything collected so far. Derived, never stored.
pub fn preview(fields: &CollectedFields) -> String {
    let description = fields.description.as_deref().unwrap_or_default();
    let mut excerpt: String = description.chars().take(PREVIEW_DESCRIPTION_CHARS).collect();
    if description.chars().count() > PREVIEW_DESCRIPTION_CHARS {
        excerpt.push_str("...");
    }

    format!(
        "Application preview\n\nName: {}\nUsername: @{}\nCategory: {}\nChannel: {}\nDescription: {}\n\nIs everything correct?",
        fields.name.as_deref().unwrap_or_default(),
        fields.handle.as_deref().unwrap_or_default(),
        fields.category.map(Category::code).unwrap_or_default(),
        fields.channel.as_deref().unwrap_or("not specified"),
        excerpt,
    )
}

/// Prompt asking for the input `step` expects.
pub fn prompt(step: Step, fields: &CollectedFields) -> Reply {
    let header = step_header(step);
    match step {
        Step::Photo => Reply::text(format!(
            "{header}send a photo for your avatar (a picture or an image file)."
        )),
        Step::Name => Reply::text(format!("{header}enter your name:")),
        Step::Handle => Reply::text(format!("{header}enter your username (without @):")),
        Step::Category => {
            Reply::with_controls(format!("{header}choose a category:"), category_controls())
        }
        Step::Channel => Reply::text(format!(
            "{header}if you have a channel, send its link (or send 'skip'):"
        )),
        Step::Description => Reply::text(format!(
            "{header}describe yourself in detail (projects, achievements, recognition):"
        )),
        Step::Confirm => Reply::with_controls(preview(fields), confirm_controls()),
    }
}

fn acknowledgement(completed: Step) -> &'static str {
    match completed {
        Step::Photo => "Photo saved!",
        Step::Name => "Name saved!",
        Step::Handle => "Username saved!",
        Step::Category => "Category selected!",
        Step::Channel => "Channel saved!",
        Step::Description | Step::Confirm => "",
    }
}

fn reprompt_hint(step: Step) -> &'static str {
    match step {
        Step::Photo => "Please send a photo.",
        Step::Name | Step::Handle | Step::Channel | Step::Description => {
            "Please answer with a text message."
        }
        Step::Category => "Please pick one of the categories below.",
        Step::Confirm => "Please confirm or cancel using the buttons below.",
    }
}

fn with_prefix(prefix: &str, reply: Reply) -> Reply {
    if prefix.is_empty() {
        return reply;
    }
    Reply::with_controls(format!("{prefix}\n\n{}", reply.text), reply.controls)
}

/// Per-submitter conversation that harvests an application one field at a time.
pub struct FieldCollector<R, N> {
    sessions: Arc<dyn SessionStore>,
    media: Arc<dyn MediaStore>,
    applications: Arc<R>,
    notifier: Arc<N>,
    roster: Arc<AdminRoster>,
}

enum StepResult {
    Accepted(CollectedFields),
    Rejected(&'static str),
}

impl<R, N> FieldCollector<R, N>
where
    R: ApplicationRepository + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        media: Arc<dyn MediaStore>,
        applications: Arc<R>,
        notifier: Arc<N>,
        roster: Arc<AdminRoster>,
    ) -> Self {
        Self {
            sessions,
            media,
            applications,
            notifier,
            roster,
        }
    }

    /// Starts a fresh session in `photo`, silently discarding any previous one.
    pub async fn begin(&self, submitter: &Submitter) -> Result<Reply, IntakeError> {
        let session = Session::start(submitter.id);
        let reply = prompt(session.step, &session.fields);
        self.sessions.put(session).await?;
        debug!(submitter = %submitter.id, "intake session started");
        Ok(with_prefix("Let's fill in your application!", reply))
    }

    /// Applies one input to the submitter's live session.
    pub async fn handle(
        &self,
        submitter: &Submitter,
        input: IntakeInput,
    ) -> Result<IntakeOutcome, IntakeError> {
        let Some(mut session) = self.sessions.get(submitter.id).await? else {
            return Ok(IntakeOutcome::NoSession);
        };
        let step = session.step;

        if step == Step::Confirm {
            return match input {
                IntakeInput::Confirm(true) => self.submit(submitter).await,
                IntakeInput::Confirm(false) => {
                    self.sessions.delete(submitter.id).await?;
                    info!(submitter = %submitter.id, "application cancelled");
                    Ok(IntakeOutcome::Cancelled {
                        reply: Reply::text("Application cancelled. Start again with /apply"),
                    })
                }
                _ => Ok(self.reprompt(&session, reprompt_hint(step))),
            };
        }

        let fields = match self.accept(step, &session.fields, input).await {
            StepResult::Accepted(fields) => fields,
            StepResult::Rejected(hint) => return Ok(self.reprompt(&session, hint)),
        };

        let next = step.next().unwrap_or(Step::Confirm);
        session.fields = fields;
        session.step = next;
        let reply = with_prefix(acknowledgement(step), prompt(next, &session.fields));
        self.sessions.put(session).await?;

        debug!(submitter = %submitter.id, from = step.label(), to = next.label(), "intake advanced");
        Ok(IntakeOutcome::Advanced { step: next, reply })
    }

    async fn accept(
        &self,
        step: Step,
        current: &CollectedFields,
        input: IntakeInput,
    ) -> StepResult {
        let mut fields = current.clone();
        match (step, input) {
            (Step::Photo, IntakeInput::Photo(upload)) => self.store_photo(fields, &upload).await,
            (Step::Photo, IntakeInput::Document(upload)) if upload.is_image() => {
                self.store_photo(fields, &upload).await
            }
            (Step::Name, IntakeInput::Text(text)) if !text.trim().is_empty() => {
                fields.name = Some(text);
                StepResult::Accepted(fields)
            }
            (Step::Handle, IntakeInput::Text(text)) => match normalize_handle(&text) {
                Some(handle) => {
                    fields.handle = Some(handle);
                    StepResult::Accepted(fields)
                }
                None => StepResult::Rejected("The username cannot be empty."),
            },
            (Step::Category, IntakeInput::Category(category)) => {
                fields.category = Some(category);
                StepResult::Accepted(fields)
            }
            (Step::Channel, IntakeInput::Text(text)) if !text.trim().is_empty() => {
                fields.channel = if is_skip_token(&text) { None } else { Some(text) };
                StepResult::Accepted(fields)
            }
            (Step::Description, IntakeInput::Text(text)) if !text.trim().is_empty() => {
                fields.description = Some(text);
                StepResult::Accepted(fields)
            }
            (step, _) => StepResult::Rejected(reprompt_hint(step)),
        }
    }

    async fn store_photo(&self, mut fields: CollectedFields, upload: &ImageUpload) -> StepResult {
        match self.media.store(upload).await {
            Ok(photo_ref) => {
                fields.photo_ref = Some(photo_ref);
                StepResult::Accepted(fields)
            }
            Err(error) => {
                warn!(file_id = %upload.file_id, %error, "avatar not stored");
                StepResult::Rejected("Could not save the photo, please send it again.")
            }
        }
    }

    fn reprompt(&self, session: &Session, hint: &str) -> IntakeOutcome {
        debug!(submitter = %session.submitter_id, step = session.step.label(), "input rejected");
        IntakeOutcome::Reprompt {
            step: session.step,
            reply: with_prefix(hint, prompt(session.step, &session.fields)),
        }
    }

    /// Claims the session before writing, so a repeated confirmation finds nothing to submit.
    /// The session is put back in `confirm` when the application cannot be created.
    async fn submit(&self, submitter: &Submitter) -> Result<IntakeOutcome, IntakeError> {
        let Some(session) = self.sessions.take(submitter.id).await? else {
            return Ok(IntakeOutcome::NoSession);
        };
        if session.step != Step::Confirm {
            let outcome = self.reprompt(&session, reprompt_hint(session.step));
            self.sessions.put(session).await?;
            return Ok(outcome);
        }

        let created = match session.fields.to_application(submitter) {
            Ok(application) => self
                .applications
                .create(application.clone())
                .await
                .map(|id| (id, application))
                .map_err(IntakeError::from),
            Err(missing) => Err(IntakeError::from(missing)),
        };
        let (application_id, notice_fields) = match created {
            Ok(created) => created,
            Err(error) => {
                self.sessions.put(session).await?;
                return Err(error);
            }
        };
        info!(submitter = %submitter.id, %application_id, "application submitted");

        let mut admins_notified = 0;
        for admin in self.roster.admins() {
            let notice = Notice::new_application(
                application_id,
                &notice_fields,
                submitter.username.clone(),
            );
            if notify_best_effort(self.notifier.as_ref(), admin, notice).await {
                admins_notified += 1;
            }
        }

        Ok(IntakeOutcome::Submitted {
            application_id,
            admins_notified,
            reply: Reply::text(
                "Application sent!\n\nAn administrator will review it soon.\nCheck its status with /status",
            ),
        })
    }
}
