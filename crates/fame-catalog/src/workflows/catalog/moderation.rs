use std::sync::Arc;

use tracing::{debug, info};

use super::access::{AdminCapability, AdminRoster, Unauthorized};
use super::domain::{Application, ApplicationId, ApplicationStatus, Card, UserId};
use super::notify::{notify_best_effort, Notice, Notifier};
use super::repository::{
    ApplicationRepository, CatalogRepository, Publication, RepositoryError, StatusTransition,
};

/// Committed approval: the new card plus whether the submitter heard about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approval {
    pub application_id: ApplicationId,
    pub submitter_id: UserId,
    pub card: Card,
    pub submitter_notified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub application_id: ApplicationId,
    pub submitter_id: UserId,
    pub submitter_notified: bool,
}

/// Admin-only decisions over pending applications.
pub struct ModerationPipeline<R, N> {
    repository: Arc<R>,
    notifier: Arc<N>,
    roster: Arc<AdminRoster>,
    catalog_base_url: String,
    pending_page_size: usize,
}

impl<R, N> ModerationPipeline<R, N>
where
    R: ApplicationRepository + CatalogRepository + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        repository: Arc<R>,
        notifier: Arc<N>,
        roster: Arc<AdminRoster>,
        catalog_base_url: impl Into<String>,
        pending_page_size: usize,
    ) -> Self {
        Self {
            repository,
            notifier,
            roster,
            catalog_base_url: catalog_base_url.into(),
            pending_page_size: pending_page_size.max(1),
        }
    }

    fn authorize(&self, actor: UserId) -> Result<AdminCapability, ModerationError> {
        self.roster.authorize(actor).map_err(|denied| {
            debug!(%actor, "moderation refused");
            ModerationError::from(denied)
        })
    }

    async fn pending(&self, id: ApplicationId) -> Result<Application, ModerationError> {
        let application = self
            .repository
            .get(id)
            .await?
            .ok_or(ModerationError::NotFound(id))?;
        if application.status.is_decided() {
            return Err(ModerationError::AlreadyDecided {
                id,
                status: application.status,
            });
        }
        Ok(application)
    }

    /// Publishes the application as a card and marks it approved in one unit of work.
    pub async fn approve(
        &self,
        actor: UserId,
        id: ApplicationId,
    ) -> Result<Approval, ModerationError> {
        let capability = self.authorize(actor)?;
        let application = self.pending(id).await?;

        let card = match self.repository.publish(id, application.card_draft()).await {
            Ok(Publication::Published(card)) => card,
            Ok(Publication::AlreadyDecided(status)) => {
                return Err(ModerationError::AlreadyDecided { id, status })
            }
            Ok(Publication::NotFound) => return Err(ModerationError::NotFound(id)),
            Err(RepositoryError::Conflict(handle)) => {
                info!(application_id = %id, %handle, "approval blocked by existing card");
                return Err(ModerationError::DuplicateHandle(handle));
            }
            Err(other) => return Err(other.into()),
        };
        info!(
            application_id = %id,
            card_id = %card.id,
            admin = %capability.admin(),
            "application approved"
        );

        let notice = Notice::Accepted {
            application_id: id,
            catalog_link: self.catalog_link(&card.handle),
        };
        let submitter_notified =
            notify_best_effort(self.notifier.as_ref(), application.submitter_id, notice).await;

        Ok(Approval {
            application_id: id,
            submitter_id: application.submitter_id,
            card,
            submitter_notified,
        })
    }

    pub async fn reject(
        &self,
        actor: UserId,
        id: ApplicationId,
    ) -> Result<Rejection, ModerationError> {
        let capability = self.authorize(actor)?;
        let application = self.pending(id).await?;

        match self
            .repository
            .set_status(id, ApplicationStatus::Rejected)
            .await?
        {
            StatusTransition::Applied => {}
            StatusTransition::AlreadyDecided(status) => {
                return Err(ModerationError::AlreadyDecided { id, status })
            }
            StatusTransition::NotFound => return Err(ModerationError::NotFound(id)),
        }
        info!(application_id = %id, admin = %capability.admin(), "application rejected");

        let submitter_notified = notify_best_effort(
            self.notifier.as_ref(),
            application.submitter_id,
            Notice::Rejected { application_id: id },
        )
        .await;

        Ok(Rejection {
            application_id: id,
            submitter_id: application.submitter_id,
            submitter_notified,
        })
    }

    /// Newest pending applications, capped at the configured page size.
    pub async fn list_pending(&self, actor: UserId) -> Result<Vec<Application>, ModerationError> {
        self.authorize(actor)?;
        Ok(self.repository.list_pending(self.pending_page_size).await?)
    }

    pub async fn view(
        &self,
        actor: UserId,
        id: ApplicationId,
    ) -> Result<Application, ModerationError> {
        self.authorize(actor)?;
        self.repository
            .get(id)
            .await?
            .ok_or(ModerationError::NotFound(id))
    }

    pub fn catalog_link(&self, handle: &str) -> String {
        format!("{}#{}", self.catalog_base_url, handle)
    }
}

/// Error raised by the moderation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    #[error(transparent)]
    Unauthorized(#[from] Unauthorized),
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error("application {id} was already {}", .status.label())]
    AlreadyDecided {
        id: ApplicationId,
        status: ApplicationStatus,
    },
    #[error("a card with handle '{0}' already exists")]
    DuplicateHandle(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
