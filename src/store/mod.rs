//! Event and user records behind swappable storage backends.
//!
//! Handlers and commands take a store by trait so the in-memory backend can
//! stand in for SQLite in tests.

pub mod memory;
pub mod ownership;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{AppError, AppResult};
use crate::security::InputValidator;

pub use memory::InMemoryStore;
pub use ownership::{ensure_event_owner, resolve_upload_target, UploadTarget};
pub use sqlite::SqliteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Active,
    Inactive,
    Completed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Active => "active",
            EventStatus::Inactive => "inactive",
            EventStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EventStatus::Active),
            "inactive" => Ok(EventStatus::Inactive),
            "completed" => Ok(EventStatus::Completed),
            other => Err(AppError::validation(
                "status",
                &format!("Unknown event status '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub date: String,
    pub status: EventStatus,
    pub uploads: u64,
    pub description: Option<String>,
    pub folder_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub user_id: String,
    pub name: String,
    pub date: String,
    pub description: Option<String>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventUpdate {
    pub name: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
    pub status: Option<EventStatus>,
    pub folder_id: Option<String>,
}

impl EventUpdate {
    fn apply(self, event: &mut Event) {
        if let Some(name) = self.name {
            event.name = name.trim().to_string();
        }
        if let Some(date) = self.date {
            event.date = date;
        }
        if let Some(description) = self.description {
            event.description = Some(description);
        }
        if let Some(status) = self.status {
            event.status = status;
        }
        if let Some(folder_id) = self.folder_id {
            event.folder_id = Some(folder_id);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl DriveTokens {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub drive_connected: bool,
    #[serde(skip_serializing)]
    pub drive_tokens: Option<DriveTokens>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn create_event(&self, new_event: NewEvent) -> AppResult<Event>;

    async fn get_event(&self, id: &str) -> AppResult<Option<Event>>;

    async fn list_events_for_user(&self, user_id: &str) -> AppResult<Vec<Event>>;

    /// Fails with `EventNotFound` for unknown ids.
    async fn update_event(&self, id: &str, update: EventUpdate) -> AppResult<Event>;

    async fn delete_event(&self, id: &str) -> AppResult<()>;

    /// Add `count` to the event's upload counter.
    async fn record_uploads(&self, id: &str, count: u64) -> AppResult<Event>;

    async fn rename_event(&self, id: &str, name: &str) -> AppResult<Event> {
        InputValidator::validate_event_name(name)?;
        self.update_event(
            id,
            EventUpdate {
                name: Some(name.to_string()),
                ..EventUpdate::default()
            },
        )
        .await
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Emails are unique; a second user with the same email is rejected.
    async fn create_user(&self, email: &str, name: &str) -> AppResult<User>;

    async fn get_user(&self, id: &str) -> AppResult<Option<User>>;

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn connect_drive(&self, user_id: &str, tokens: DriveTokens) -> AppResult<User>;

    async fn disconnect_drive(&self, user_id: &str) -> AppResult<User>;

    async fn touch_last_login(&self, user_id: &str) -> AppResult<User>;
}

fn validate_new_event(new_event: &NewEvent) -> AppResult<()> {
    InputValidator::validate_event_name(&new_event.name)?;

    if new_event.user_id.trim().is_empty() {
        return Err(AppError::validation("user_id", "Event owner is required"));
    }

    if new_event.date.trim().is_empty() {
        return Err(AppError::validation("date", "Event date is required"));
    }

    Ok(())
}

fn validate_new_user(email: &str, name: &str) -> AppResult<()> {
    InputValidator::validate_email(email)?;

    if name.trim().is_empty() {
        return Err(AppError::validation("name", "User name cannot be empty"));
    }

    Ok(())
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
