//! Outbound notices to identities other than the one that sent the current event.
//!
//! Delivery is advisory. A notice may not be delivered, and callers never roll back a
//! decision because of it: [`notify_best_effort`] logs the failure and moves on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::action::{moderation_controls, Control};
use super::domain::{ApplicationId, Category, NewApplication, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// Sent to every admin when a submitter confirms an application.
    NewApplication {
        application_id: ApplicationId,
        submitter_display_name: String,
        submitter_username: Option<String>,
        name: String,
        handle: String,
        category: Category,
    },
    Accepted {
        application_id: ApplicationId,
        catalog_link: String,
    },
    Rejected {
        application_id: ApplicationId,
    },
}

impl Notice {
    pub fn new_application(
        application_id: ApplicationId,
        application: &NewApplication,
        submitter_username: Option<String>,
    ) -> Self {
        Notice::NewApplication {
            application_id,
            submitter_display_name: application.submitter_display_name.clone(),
            submitter_username,
            name: application.name.clone(),
            handle: application.handle.clone(),
            category: application.category,
        }
    }

    pub fn application_id(&self) -> ApplicationId {
        match self {
            Notice::NewApplication { application_id, .. }
            | Notice::Accepted { application_id, .. }
            | Notice::Rejected { application_id } => *application_id,
        }
    }

    pub fn text(&self) -> String {
        match self {
            Notice::NewApplication {
                application_id,
                submitter_display_name,
                submitter_username,
                name,
                handle,
                category,
            } => {
                let from = match submitter_username {
                    Some(username) => format!("{submitter_display_name} (@{username})"),
                    None => submitter_display_name.clone(),
                };
                format!(
                    "New application!\n\nFrom: {from}\nName: {name}\nHandle: @{handle}\nCategory: {}\n\nApplication #{application_id}",
                    category.code()
                )
            }
            Notice::Accepted { catalog_link, .. } => format!(
                "Congratulations!\n\nYour application was accepted and you are now in the catalog.\n{catalog_link}"
            ),
            Notice::Rejected { .. } => "Unfortunately your application was rejected.\n\nYou can apply again with a more detailed description.".to_string(),
        }
    }

    pub fn controls(&self) -> Vec<Control> {
        match self {
            Notice::NewApplication { application_id, .. } => moderation_controls(*application_id),
            Notice::Accepted { .. } | Notice::Rejected { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("recipient {0} unreachable")]
    Unreachable(UserId),
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Delivery hook for notices; implementations may drop messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, recipient: UserId, notice: Notice) -> Result<(), DeliveryError>;
}

/// Delivers `notice` and swallows any failure. Returns whether delivery succeeded.
pub async fn notify_best_effort<N>(notifier: &N, recipient: UserId, notice: Notice) -> bool
where
    N: Notifier + ?Sized,
{
    let application_id = notice.application_id();
    match notifier.deliver(recipient, notice).await {
        Ok(()) => true,
        Err(error) => {
            warn!(%recipient, %application_id, %error, "notice not delivered");
            false
        }
    }
}
