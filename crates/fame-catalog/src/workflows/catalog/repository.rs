use async_trait::async_trait;

use super::domain::{
    Application, ApplicationId, ApplicationStatus, Badge, BadgeSet, Card, CardId, CardQuery,
    NewApplication, NewCard, Submitter, User, UserId,
};

/// Result of a guarded status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    Applied,
    /// Another decision won; carries the status it left behind.
    AlreadyDecided(ApplicationStatus),
    NotFound,
}

/// Result of the approve unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Publication {
    Published(Card),
    AlreadyDecided(ApplicationStatus),
    NotFound,
}

/// Durable applications and their lifecycle status.
#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn create(&self, application: NewApplication) -> Result<ApplicationId, RepositoryError>;

    async fn get(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError>;

    /// Pending applications, newest first, at most `limit`.
    async fn list_pending(&self, limit: usize) -> Result<Vec<Application>, RepositoryError>;

    /// Compare-and-set from `pending` to `status`. Only the first decision succeeds.
    async fn set_status(
        &self,
        id: ApplicationId,
        status: ApplicationStatus,
    ) -> Result<StatusTransition, RepositoryError>;

    async fn latest_for_submitter(
        &self,
        submitter: UserId,
    ) -> Result<Option<Application>, RepositoryError>;
}

/// Durable catalog cards.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Creates the card and marks the application approved in one transaction.
    ///
    /// Both writes persist or neither does. A handle collision yields
    /// [`RepositoryError::Conflict`] and leaves the application pending.
    async fn publish(
        &self,
        application_id: ApplicationId,
        card: NewCard,
    ) -> Result<Publication, RepositoryError>;

    async fn card(&self, id: CardId) -> Result<Option<Card>, RepositoryError>;

    /// Atomically flips `badge` on the card, returning the new set. The card's
    /// `pinned` flag follows membership of [`Badge::Pinned`].
    async fn toggle_badge(
        &self,
        id: CardId,
        badge: Badge,
    ) -> Result<Option<BadgeSet>, RepositoryError>;

    async fn list_cards(&self, query: &CardQuery) -> Result<Vec<Card>, RepositoryError>;
}

/// Local record of identities seen by the bot.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Inserts or refreshes the user, setting the admin flag.
    async fn register(&self, submitter: &Submitter, is_admin: bool)
        -> Result<User, RepositoryError>;

    async fn user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
}

/// Everything the intake and moderation workflows need from one backing store.
pub trait CatalogStore: ApplicationRepository + CatalogRepository + UserRepository {}

impl<T> CatalogStore for T where T: ApplicationRepository + CatalogRepository + UserRepository {}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("card handle '{0}' already exists")]
    Conflict(String),
    #[error("invalid status transition to {0:?}")]
    InvalidTransition(ApplicationStatus),
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(value: sqlx::Error) -> Self {
        Self::Unavailable(value.to_string())
    }
}
