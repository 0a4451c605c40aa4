use std::sync::Arc;

use tracing::info;

use super::access::{AdminRoster, Unauthorized};
use super::domain::{Badge, BadgeSet, CardId, UserId};
use super::repository::{CatalogRepository, RepositoryError};

/// Badge set after a toggle, with the direction of the flip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeToggle {
    pub card_id: CardId,
    pub badge: Badge,
    pub badges: BadgeSet,
    pub added: bool,
}

/// Admin-only badge annotations on published cards.
pub struct BadgeManager<R> {
    repository: Arc<R>,
    roster: Arc<AdminRoster>,
}

impl<R> BadgeManager<R>
where
    R: CatalogRepository + 'static,
{
    pub fn new(repository: Arc<R>, roster: Arc<AdminRoster>) -> Self {
        Self { repository, roster }
    }

    pub async fn toggle(
        &self,
        actor: UserId,
        card_id: CardId,
        badge: Badge,
    ) -> Result<BadgeToggle, BadgeError> {
        let capability = self.roster.authorize(actor)?;
        let badges = self
            .repository
            .toggle_badge(card_id, badge)
            .await?
            .ok_or(BadgeError::NotFound(card_id))?;

        let added = badges.contains(badge);
        info!(
            %card_id,
            badge = badge.code(),
            added,
            admin = %capability.admin(),
            "badge toggled"
        );
        Ok(BadgeToggle {
            card_id,
            badge,
            badges,
            added,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BadgeError {
    #[error(transparent)]
    Unauthorized(#[from] Unauthorized),
    #[error("card {0} not found")]
    NotFound(CardId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
