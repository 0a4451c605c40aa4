//! SQLite implementation of the catalog repositories.
//!
//! Status changes use `UPDATE ... WHERE status = 'pending'` so that only one decision can
//! win, and approval runs the status change and card insert inside one transaction.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::debug;

use crate::workflows::catalog::domain::{
    sort_for_listing, Application, ApplicationId, ApplicationStatus, Badge, BadgeSet, Card,
    CardId, CardQuery, Category, NewApplication, NewCard, PhotoRef, Submitter, User, UserId,
};
use crate::workflows::catalog::repository::{
    ApplicationRepository, CatalogRepository, Publication, RepositoryError, StatusTransition,
    UserRepository,
};

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS applications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        submitter_id INTEGER NOT NULL,
        submitter_display_name TEXT,
        photo_ref TEXT,
        name TEXT NOT NULL,
        handle TEXT NOT NULL,
        category TEXT NOT NULL,
        channel TEXT,
        description TEXT,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'approved', 'rejected')),
        admin_comment TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_applications_status_created
    ON applications(status, created_at DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cards (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        handle TEXT UNIQUE NOT NULL,
        category TEXT NOT NULL,
        category_display_name TEXT NOT NULL,
        description TEXT,
        photo_ref TEXT,
        likes INTEGER NOT NULL DEFAULT 0,
        dislikes INTEGER NOT NULL DEFAULT 0,
        badges TEXT NOT NULL DEFAULT '',
        links TEXT,
        pinned BOOLEAN NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        handle TEXT,
        first_name TEXT,
        last_name TEXT,
        is_admin BOOLEAN NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
];

/// sqlx-backed store for applications, cards, and users.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connects to `database_url`, creating the file and tables when missing.
    pub async fn connect(database_url: &str) -> Result<Self, RepositoryError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// Single-connection in-memory database. Every pooled connection would otherwise see
    /// its own empty database.
    pub async fn in_memory() -> Result<Self, RepositoryError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, RepositoryError> {
        let store = Self { pool };
        store.initialize_tables().await?;
        Ok(store)
    }

    async fn initialize_tables(&self) -> Result<(), RepositoryError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("catalog schema ready");
        Ok(())
    }

    async fn status_of(
        &self,
        id: ApplicationId,
    ) -> Result<Option<ApplicationStatus>, RepositoryError> {
        let label: Option<String> = sqlx::query_scalar("SELECT status FROM applications WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        label.map(|label| parse_status(&label)).transpose()
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn parse_status(label: &str) -> Result<ApplicationStatus, RepositoryError> {
    ApplicationStatus::from_label(label)
        .ok_or_else(|| RepositoryError::Corrupt(format!("unknown application status '{label}'")))
}

fn parse_category(code: &str) -> Result<Category, RepositoryError> {
    Category::from_code(code)
        .ok_or_else(|| RepositoryError::Corrupt(format!("unknown category '{code}'")))
}

fn parse_count(value: i64, column: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Corrupt(format!("{column} out of range: {value}")))
}

fn application_from_row(row: &SqliteRow) -> Result<Application, RepositoryError> {
    let category: String = row.try_get("category")?;
    let status: String = row.try_get("status")?;
    Ok(Application {
        id: ApplicationId(row.try_get("id")?),
        submitter_id: UserId(row.try_get("submitter_id")?),
        submitter_display_name: row
            .try_get::<Option<String>, _>("submitter_display_name")?
            .unwrap_or_default(),
        photo_ref: PhotoRef(row.try_get::<Option<String>, _>("photo_ref")?.unwrap_or_default()),
        name: row.try_get("name")?,
        handle: row.try_get("handle")?,
        category: parse_category(&category)?,
        channel: row.try_get("channel")?,
        description: row
            .try_get::<Option<String>, _>("description")?
            .unwrap_or_default(),
        status: parse_status(&status)?,
        admin_comment: row.try_get("admin_comment")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn card_from_row(row: &SqliteRow) -> Result<Card, RepositoryError> {
    let category: String = row.try_get("category")?;
    let badges: String = row.try_get("badges")?;
    Ok(Card {
        id: CardId(row.try_get("id")?),
        name: row.try_get("name")?,
        handle: row.try_get("handle")?,
        category: parse_category(&category)?,
        category_display_name: row.try_get("category_display_name")?,
        description: row
            .try_get::<Option<String>, _>("description")?
            .unwrap_or_default(),
        photo_ref: PhotoRef(row.try_get::<Option<String>, _>("photo_ref")?.unwrap_or_default()),
        likes: parse_count(row.try_get("likes")?, "likes")?,
        dislikes: parse_count(row.try_get("dislikes")?, "dislikes")?,
        badges: BadgeSet::from_storage(&badges)
            .map_err(|err| RepositoryError::Corrupt(err.to_string()))?,
        links: row.try_get("links")?,
        pinned: row.try_get("pinned")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn user_from_row(row: &SqliteRow) -> Result<User, RepositoryError> {
    Ok(User {
        id: UserId(row.try_get("id")?),
        handle: row.try_get("handle")?,
        first_name: row
            .try_get::<Option<String>, _>("first_name")?
            .unwrap_or_default(),
        last_name: row.try_get("last_name")?,
        is_admin: row.try_get("is_admin")?,
    })
}

/// Fixed-width UTC text so `ORDER BY created_at` sorts chronologically.
fn stored_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl ApplicationRepository for SqliteStore {
    async fn create(&self, application: NewApplication) -> Result<ApplicationId, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO applications (
                submitter_id, submitter_display_name, photo_ref, name, handle,
                category, channel, description, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(application.submitter_id.0)
        .bind(&application.submitter_display_name)
        .bind(&application.photo_ref.0)
        .bind(&application.name)
        .bind(&application.handle)
        .bind(application.category.code())
        .bind(&application.channel)
        .bind(&application.description)
        .bind(stored_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(ApplicationId(result.last_insert_rowid()))
    }

    async fn get(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM applications WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(application_from_row).transpose()
    }

    async fn list_pending(&self, limit: usize) -> Result<Vec<Application>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM applications
            WHERE status = 'pending'
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(application_from_row).collect()
    }

    async fn set_status(
        &self,
        id: ApplicationId,
        status: ApplicationStatus,
    ) -> Result<StatusTransition, RepositoryError> {
        if status == ApplicationStatus::Pending {
            return Err(RepositoryError::InvalidTransition(status));
        }

        let rows_affected = sqlx::query(
            "UPDATE applications SET status = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(status.label())
        .bind(id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 1 {
            return Ok(StatusTransition::Applied);
        }

        // Decided statuses are final, so a read after the failed update is stable.
        Ok(match self.status_of(id).await? {
            Some(current) => StatusTransition::AlreadyDecided(current),
            None => StatusTransition::NotFound,
        })
    }

    async fn latest_for_submitter(
        &self,
        submitter: UserId,
    ) -> Result<Option<Application>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM applications
            WHERE submitter_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(submitter.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(application_from_row).transpose()
    }
}

#[async_trait]
impl CatalogRepository for SqliteStore {
    async fn publish(
        &self,
        application_id: ApplicationId,
        card: NewCard,
    ) -> Result<Publication, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "UPDATE applications SET status = 'approved' WHERE id = ? AND status = 'pending'",
        )
        .bind(application_id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            let label: Option<String> =
                sqlx::query_scalar("SELECT status FROM applications WHERE id = ?")
                    .bind(application_id.0)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return match label {
                Some(label) => Ok(Publication::AlreadyDecided(parse_status(&label)?)),
                None => Ok(Publication::NotFound),
            };
        }

        let created_at = Utc::now().trunc_subsecs(6);
        let inserted = sqlx::query(
            r#"
            INSERT INTO cards (
                name, handle, category, category_display_name, description,
                photo_ref, badges, links, pinned, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, '', ?, 0, ?)
            "#,
        )
        .bind(&card.name)
        .bind(&card.handle)
        .bind(card.category.code())
        .bind(&card.category_display_name)
        .bind(&card.description)
        .bind(&card.photo_ref.0)
        .bind(&card.links)
        .bind(stored_timestamp(created_at))
        .execute(&mut *tx)
        .await;

        let card_id = match inserted {
            Ok(result) => CardId(result.last_insert_rowid()),
            Err(error) if is_unique_violation(&error) => {
                tx.rollback().await?;
                return Err(RepositoryError::Conflict(card.handle));
            }
            Err(error) => return Err(error.into()),
        };

        tx.commit().await?;
        Ok(Publication::Published(Card::from_draft(
            card_id, card, created_at,
        )))
    }

    async fn card(&self, id: CardId) -> Result<Option<Card>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM cards WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(card_from_row).transpose()
    }

    async fn toggle_badge(
        &self,
        id: CardId,
        badge: Badge,
    ) -> Result<Option<BadgeSet>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Take the write lock before reading so concurrent toggles serialize.
        let locked = sqlx::query("UPDATE cards SET badges = badges WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if locked == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let raw: String = sqlx::query_scalar("SELECT badges FROM cards WHERE id = ?")
            .bind(id.0)
            .fetch_one(&mut *tx)
            .await?;
        let mut badges =
            BadgeSet::from_storage(&raw).map_err(|err| RepositoryError::Corrupt(err.to_string()))?;
        badges.toggle(badge);

        sqlx::query("UPDATE cards SET badges = ?, pinned = ? WHERE id = ?")
            .bind(badges.to_storage())
            .bind(badges.contains(Badge::Pinned))
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(badges))
    }

    async fn list_cards(&self, query: &CardQuery) -> Result<Vec<Card>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM cards WHERE (?1 IS NULL OR category = ?1)")
            .bind(query.category.map(Category::code))
            .fetch_all(&self.pool)
            .await?;

        let mut cards = Vec::with_capacity(rows.len());
        for row in &rows {
            let card = card_from_row(row)?;
            if query.matches(&card) {
                cards.push(card);
            }
        }
        sort_for_listing(&mut cards);
        Ok(cards)
    }
}

#[async_trait]
impl UserRepository for SqliteStore {
    async fn register(
        &self,
        submitter: &Submitter,
        is_admin: bool,
    ) -> Result<User, RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, handle, first_name, last_name, is_admin)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                handle = excluded.handle,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                is_admin = excluded.is_admin
            "#,
        )
        .bind(submitter.id.0)
        .bind(&submitter.username)
        .bind(&submitter.first_name)
        .bind(&submitter.last_name)
        .bind(is_admin)
        .execute(&self.pool)
        .await?;

        Ok(User {
            id: submitter.id,
            handle: submitter.username.clone(),
            first_name: submitter.first_name.clone(),
            last_name: submitter.last_name.clone(),
            is_admin,
        })
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }
}
