use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::workflows::catalog::domain::{
    sort_for_listing, Application, ApplicationId, ApplicationStatus, Badge, BadgeSet, Card,
    CardId, CardQuery, NewApplication, NewCard, Submitter, User, UserId,
};
use crate::workflows::catalog::repository::{
    ApplicationRepository, CatalogRepository, Publication, RepositoryError, StatusTransition,
    UserRepository,
};

#[derive(Debug, Default)]
struct MemoryState {
    applications: BTreeMap<ApplicationId, Application>,
    cards: BTreeMap<CardId, Card>,
    users: BTreeMap<UserId, User>,
    last_application_id: i64,
    last_card_id: i64,
}

/// Process-local store. One lock covers every table, so each call is a transaction.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("memory store lock poisoned".to_string()))
    }

    /// Snapshot of every card, used by tests and the demo.
    pub fn cards(&self) -> Result<Vec<Card>, RepositoryError> {
        Ok(self.lock()?.cards.values().cloned().collect())
    }
}

#[async_trait]
impl ApplicationRepository for MemoryStore {
    async fn create(&self, application: NewApplication) -> Result<ApplicationId, RepositoryError> {
        let mut state = self.lock()?;
        state.last_application_id += 1;
        let id = ApplicationId(state.last_application_id);
        let record = Application {
            id,
            submitter_id: application.submitter_id,
            submitter_display_name: application.submitter_display_name,
            photo_ref: application.photo_ref,
            name: application.name,
            handle: application.handle,
            category: application.category,
            channel: application.channel,
            description: application.description,
            status: ApplicationStatus::Pending,
            admin_comment: None,
            created_at: Utc::now(),
        };
        state.applications.insert(id, record);
        Ok(id)
    }

    async fn get(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        Ok(self.lock()?.applications.get(&id).cloned())
    }

    async fn list_pending(&self, limit: usize) -> Result<Vec<Application>, RepositoryError> {
        let state = self.lock()?;
        let mut pending: Vec<Application> = state
            .applications
            .values()
            .filter(|application| application.status == ApplicationStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn set_status(
        &self,
        id: ApplicationId,
        status: ApplicationStatus,
    ) -> Result<StatusTransition, RepositoryError> {
        if status == ApplicationStatus::Pending {
            return Err(RepositoryError::InvalidTransition(status));
        }

        let mut state = self.lock()?;
        let Some(application) = state.applications.get_mut(&id) else {
            return Ok(StatusTransition::NotFound);
        };
        if application.status.is_decided() {
            return Ok(StatusTransition::AlreadyDecided(application.status));
        }
        application.status = status;
        Ok(StatusTransition::Applied)
    }

    async fn latest_for_submitter(
        &self,
        submitter: UserId,
    ) -> Result<Option<Application>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .applications
            .values()
            .filter(|application| application.submitter_id == submitter)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .cloned())
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn publish(
        &self,
        application_id: ApplicationId,
        card: NewCard,
    ) -> Result<Publication, RepositoryError> {
        let mut state = self.lock()?;

        match state.applications.get(&application_id) {
            None => return Ok(Publication::NotFound),
            Some(application) if application.status.is_decided() => {
                return Ok(Publication::AlreadyDecided(application.status));
            }
            Some(_) => {}
        }

        if state.cards.values().any(|existing| existing.handle == card.handle) {
            return Err(RepositoryError::Conflict(card.handle));
        }

        state.last_card_id += 1;
        let card = Card::from_draft(CardId(state.last_card_id), card, Utc::now());
        state.cards.insert(card.id, card.clone());
        if let Some(application) = state.applications.get_mut(&application_id) {
            application.status = ApplicationStatus::Approved;
        }
        Ok(Publication::Published(card))
    }

    async fn card(&self, id: CardId) -> Result<Option<Card>, RepositoryError> {
        Ok(self.lock()?.cards.get(&id).cloned())
    }

    async fn toggle_badge(
        &self,
        id: CardId,
        badge: Badge,
    ) -> Result<Option<BadgeSet>, RepositoryError> {
        let mut state = self.lock()?;
        Ok(state.cards.get_mut(&id).map(|card| {
            card.badges.toggle(badge);
            card.pinned = card.badges.contains(Badge::Pinned);
            card.badges.clone()
        }))
    }

    async fn list_cards(&self, query: &CardQuery) -> Result<Vec<Card>, RepositoryError> {
        let state = self.lock()?;
        let mut cards: Vec<Card> = state
            .cards
            .values()
            .filter(|card| query.matches(card))
            .cloned()
            .collect();
        sort_for_listing(&mut cards);
        Ok(cards)
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn register(
        &self,
        submitter: &Submitter,
        is_admin: bool,
    ) -> Result<User, RepositoryError> {
        let user = User {
            id: submitter.id,
            handle: submitter.username.clone(),
            first_name: submitter.first_name.clone(),
            last_name: submitter.last_name.clone(),
            is_admin,
        };
        self.lock()?.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }
}
