use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::borrow::Cow;
use std::path::Path;
use std::str::FromStr;

use super::{
    new_id, validate_new_event, validate_new_user, DriveTokens, Event, EventStatus, EventStore,
    EventUpdate, NewEvent, User, UserStore,
};
use crate::errors::{AppError, AppResult};

const EVENT_COLUMNS: &str =
    "id, user_id, name, date, status, uploads, description, folder_id, created_at";
const USER_COLUMNS: &str = "id, email, name, drive_connected, access_token, refresh_token, \
     token_expires_at, created_at, last_login";

/// SQLite-backed event and user store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) the database file and make sure the schema exists.
    pub async fn connect(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        log::info!("Database path: {}", db_path.display());

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Private in-memory database, alive as long as this store.
    pub async fn in_memory() -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        // A single connection that never idles out keeps the same database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                name TEXT NOT NULL,
                drive_connected BOOLEAN NOT NULL DEFAULT FALSE,
                access_token TEXT,
                refresh_token TEXT,
                token_expires_at TEXT,
                created_at TEXT NOT NULL,
                last_login TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                uploads INTEGER NOT NULL DEFAULT 0,
                description TEXT,
                folder_id TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_user ON events(user_id)")
            .execute(&self.pool)
            .await?;

        log::info!("Database initialized successfully");
        Ok(())
    }

    async fn fetch_user(&self, user_id: &str) -> AppResult<User> {
        self.get_user(user_id)
            .await?
            .ok_or_else(|| AppError::user_not_found(user_id))
    }
}

fn event_from_row(row: &SqliteRow) -> AppResult<Event> {
    let status: String = row.try_get("status")?;
    let uploads: i64 = row.try_get("uploads")?;

    Ok(Event {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        date: row.try_get("date")?,
        status: status.parse::<EventStatus>()?,
        uploads: uploads.max(0) as u64,
        description: row.try_get("description")?,
        folder_id: row.try_get("folder_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn user_from_row(row: &SqliteRow) -> AppResult<User> {
    let access_token: Option<String> = row.try_get("access_token")?;
    let expires_at: Option<DateTime<Utc>> = row.try_get("token_expires_at")?;

    let drive_tokens = match (access_token, expires_at) {
        (Some(access_token), Some(expires_at)) => Some(DriveTokens {
            access_token,
            refresh_token: row.try_get("refresh_token")?,
            expires_at,
        }),
        _ => None,
    };

    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        drive_connected: row.try_get("drive_connected")?,
        drive_tokens,
        created_at: row.try_get("created_at")?,
        last_login: row.try_get("last_login")?,
    })
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn create_event(&self, new_event: NewEvent) -> AppResult<Event> {
        validate_new_event(&new_event)?;

        let event = Event {
            id: new_id(),
            user_id: new_event.user_id,
            name: new_event.name.trim().to_string(),
            date: new_event.date,
            status: EventStatus::Active,
            uploads: 0,
            description: new_event.description,
            folder_id: None,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO events
            (id, user_id, name, date, status, uploads, description, folder_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.user_id)
        .bind(&event.name)
        .bind(&event.date)
        .bind(event.status.as_str())
        .bind(event.uploads as i64)
        .bind(&event.description)
        .bind(&event.folder_id)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        log::info!("Created event {} ({})", event.name, event.id);
        Ok(event)
    }

    async fn get_event(&self, id: &str) -> AppResult<Option<Event>> {
        let row = sqlx::query(&format!("SELECT {} FROM events WHERE id = ?", EVENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(event_from_row).transpose()
    }

    async fn list_events_for_user(&self, user_id: &str) -> AppResult<Vec<Event>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM events WHERE user_id = ? ORDER BY created_at DESC, name ASC",
            EVENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(event_from_row).collect()
    }

    async fn update_event(&self, id: &str, update: EventUpdate) -> AppResult<Event> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!("SELECT {} FROM events WHERE id = ?", EVENT_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::event_not_found(id))?;

        let mut event = event_from_row(&row)?;
        update.apply(&mut event);

        sqlx::query(
            r#"
            UPDATE events
            SET name = ?, date = ?, description = ?, status = ?, folder_id = ?
            WHERE id = ?
            "#,
        )
        .bind(&event.name)
        .bind(&event.date)
        .bind(&event.description)
        .bind(event.status.as_str())
        .bind(&event.folder_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(event)
    }

    async fn delete_event(&self, id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::event_not_found(id));
        }

        log::info!("Deleted event with id: {}", id);
        Ok(())
    }

    async fn record_uploads(&self, id: &str, count: u64) -> AppResult<Event> {
        let result = sqlx::query("UPDATE events SET uploads = uploads + ? WHERE id = ?")
            .bind(count as i64)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::event_not_found(id));
        }

        self.get_event(id)
            .await?
            .ok_or_else(|| AppError::event_not_found(id))
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn create_user(&self, email: &str, name: &str) -> AppResult<User> {
        validate_new_user(email, name)?;

        let user = User {
            id: new_id(),
            email: email.trim().to_string(),
            name: name.trim().to_string(),
            drive_connected: false,
            drive_tokens: None,
            created_at: Utc::now(),
            last_login: None,
        };

        let result = sqlx::query(
            "INSERT INTO users (id, email, name, drive_connected, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.drive_connected)
        .bind(user.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                log::info!("Created user {} ({})", user.email, user.id);
                Ok(user)
            }
            Err(sqlx::Error::Database(db_err))
                if db_err.code() == Some(Cow::Borrowed("2067")) =>
            {
                Err(AppError::validation("email", "A user with this email already exists"))
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    async fn get_user(&self, id: &str) -> AppResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn connect_drive(&self, user_id: &str, tokens: DriveTokens) -> AppResult<User> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET drive_connected = TRUE, access_token = ?, refresh_token = ?, token_expires_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(tokens.expires_at)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::user_not_found(user_id));
        }

        log::info!("Connected cloud storage for user {}", user_id);
        self.fetch_user(user_id).await
    }

    async fn disconnect_drive(&self, user_id: &str) -> AppResult<User> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET drive_connected = FALSE, access_token = NULL, refresh_token = NULL,
                token_expires_at = NULL
            WHERE id = ?
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::user_not_found(user_id));
        }

        log::info!("Disconnected cloud storage for user {}", user_id);
        self.fetch_user(user_id).await
    }

    async fn touch_last_login(&self, user_id: &str) -> AppResult<User> {
        let result = sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::user_not_found(user_id));
        }

        self.fetch_user(user_id).await
    }
}
