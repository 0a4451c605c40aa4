use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::{Category, NewApplication, PhotoRef, Submitter, UserId};

/// Intake steps in the only order they can be visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Photo,
    Name,
    Handle,
    Category,
    Channel,
    Description,
    Confirm,
}

impl Step {
    pub const fn label(self) -> &'static str {
        match self {
            Step::Photo => "photo",
            Step::Name => "name",
            Step::Handle => "handle",
            Step::Category => "category",
            Step::Channel => "channel",
            Step::Description => "description",
            Step::Confirm => "confirm",
        }
    }

    /// Step after this one; `None` once the conversation reaches confirmation.
    pub const fn next(self) -> Option<Step> {
        match self {
            Step::Photo => Some(Step::Name),
            Step::Name => Some(Step::Handle),
            Step::Handle => Some(Step::Category),
            Step::Category => Some(Step::Channel),
            Step::Channel => Some(Step::Description),
            Step::Description => Some(Step::Confirm),
            Step::Confirm => None,
        }
    }

    /// One-based position among the six data-gathering steps.
    pub const fn ordinal(self) -> Option<u8> {
        match self {
            Step::Photo => Some(1),
            Step::Name => Some(2),
            Step::Handle => Some(3),
            Step::Category => Some(4),
            Step::Channel => Some(5),
            Step::Description => Some(6),
            Step::Confirm => None,
        }
    }
}

pub const DATA_STEPS: u8 = 6;

/// Partial application accumulated while the conversation advances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedFields {
    pub photo_ref: Option<PhotoRef>,
    pub name: Option<String>,
    pub handle: Option<String>,
    pub category: Option<Category>,
    pub channel: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("session is missing the {0} field")]
pub struct IncompleteSession(pub &'static str);

impl CollectedFields {
    pub fn to_application(&self, submitter: &Submitter) -> Result<NewApplication, IncompleteSession> {
        Ok(NewApplication {
            submitter_id: submitter.id,
            submitter_display_name: submitter.display_name(),
            photo_ref: self.photo_ref.clone().ok_or(IncompleteSession("photo"))?,
            name: self.name.clone().ok_or(IncompleteSession("name"))?,
            handle: self.handle.clone().ok_or(IncompleteSession("handle"))?,
            category: self.category.ok_or(IncompleteSession("category"))?,
            channel: self.channel.clone(),
            description: self
                .description
                .clone()
                .ok_or(IncompleteSession("description"))?,
        })
    }
}

/// Live conversation for one submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub submitter_id: UserId,
    pub step: Step,
    pub fields: CollectedFields,
}

impl Session {
    pub fn start(submitter_id: UserId) -> Self {
        Self {
            submitter_id,
            step: Step::Photo,
            fields: CollectedFields::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Holds at most one live session per submitter.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, submitter: UserId) -> Result<Option<Session>, SessionStoreError>;

    /// Stores `session`, replacing any session the submitter already had.
    async fn put(&self, session: Session) -> Result<(), SessionStoreError>;

    async fn delete(&self, submitter: UserId) -> Result<(), SessionStoreError>;

    /// Removes and returns the submitter's session. Of two concurrent callers only one gets it.
    async fn take(&self, submitter: UserId) -> Result<Option<Session>, SessionStoreError>;
}

/// Sessions kept in process memory; lost on restart.
#[derive(Debug, Default, Clone)]
pub struct MemorySessionStore {
    sessions: Arc<Mutex<HashMap<UserId, Session>>>,
}

impl MemorySessionStore {
    fn poisoned() -> SessionStoreError {
        SessionStoreError::Unavailable("session map lock poisoned".to_string())
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, submitter: UserId) -> Result<Option<Session>, SessionStoreError> {
        let guard = self.sessions.lock().map_err(|_| Self::poisoned())?;
        Ok(guard.get(&submitter).cloned())
    }

    async fn put(&self, session: Session) -> Result<(), SessionStoreError> {
        let mut guard = self.sessions.lock().map_err(|_| Self::poisoned())?;
        guard.insert(session.submitter_id, session);
        Ok(())
    }

    async fn delete(&self, submitter: UserId) -> Result<(), SessionStoreError> {
        let mut guard = self.sessions.lock().map_err(|_| Self::poisoned())?;
        guard.remove(&submitter);
        Ok(())
    }

    async fn take(&self, submitter: UserId) -> Result<Option<Session>, SessionStoreError> {
        let mut guard = self.sessions.lock().map_err(|_| Self::poisoned())?;
        Ok(guard.remove(&submitter))
    }
}
