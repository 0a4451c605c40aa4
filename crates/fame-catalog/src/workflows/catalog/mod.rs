//! Fame catalog intake, moderation, and badge management.
//!
//! Submitters walk through a fixed conversation that produces a pending application.
//! Admins approve or reject it; approval publishes a catalog card in the same transaction
//! that marks the application approved. Notifications are best-effort throughout.

pub mod access;
pub mod action;
pub mod badges;
pub mod dispatch;
pub mod domain;
pub mod intake;
pub mod media;
pub mod moderation;
pub mod notify;
pub mod repository;
pub mod router;
pub mod session;
pub mod store;

#[cfg(test)]
mod tests;

pub use access::{AdminCapability, AdminRoster, Unauthorized};
pub use action::{Action, ActionParseError, Control, Reply};
pub use badges::{BadgeError, BadgeManager, BadgeToggle};
pub use dispatch::{Command, Dispatcher, Event, Payload};
pub use domain::{
    Application, ApplicationId, ApplicationStatus, Badge, BadgeSet, Card, CardId, CardQuery,
    Category, NewApplication, NewCard, PhotoRef, Submitter, User, UserId,
};
pub use intake::{FieldCollector, IntakeError, IntakeInput, IntakeOutcome};
pub use media::{ImageUpload, MediaError, MediaStore};
pub use moderation::{Approval, ModerationError, ModerationPipeline, Rejection};
pub use notify::{notify_best_effort, DeliveryError, Notice, Notifier};
pub use repository::{
    ApplicationRepository, CatalogRepository, CatalogStore, Publication, RepositoryError,
    StatusTransition, UserRepository,
};
pub use router::catalog_router;
pub use session::{MemorySessionStore, Session, SessionStore, SessionStoreError, Step};
pub use store::{MemoryStore, SqliteStore};
