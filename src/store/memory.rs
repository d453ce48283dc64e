use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{
    new_id, validate_new_event, validate_new_user, DriveTokens, Event, EventStatus, EventStore,
    EventUpdate, NewEvent, User, UserStore,
};
use crate::errors::{AppError, AppResult};

/// Process-local store, used in tests and for throwaway sessions.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    events: RwLock<HashMap<String, Event>>,
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(what: &str) -> AppError {
    AppError::Internal(format!("{} lock poisoned", what))
}

#[async_trait]
impl EventStore for InMemoryStore {
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

        self.events
            .write()
            .map_err(|_| poisoned("events"))?
            .insert(event.id.clone(), event.clone());

        log::info!("Created event {} ({})", event.name, event.id);
        Ok(event)
    }

    async fn get_event(&self, id: &str) -> AppResult<Option<Event>> {
        Ok(self
            .events
            .read()
            .map_err(|_| poisoned("events"))?
            .get(id)
            .cloned())
    }

    async fn list_events_for_user(&self, user_id: &str) -> AppResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .events
            .read()
            .map_err(|_| poisoned("events"))?
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();

        events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.name.cmp(&b.name)));
        Ok(events)
    }

    async fn update_event(&self, id: &str, update: EventUpdate) -> AppResult<Event> {
        let mut events = self.events.write().map_err(|_| poisoned("events"))?;
        let event = events.get_mut(id).ok_or_else(|| AppError::event_not_found(id))?;

        update.apply(event);
        Ok(event.clone())
    }

    async fn delete_event(&self, id: &str) -> AppResult<()> {
        let removed = self
            .events
            .write()
            .map_err(|_| poisoned("events"))?
            .remove(id);

        match removed {
            Some(event) => {
                log::info!("Deleted event {} ({})", event.name, id);
                Ok(())
            }
            None => Err(AppError::event_not_found(id)),
        }
    }

    async fn record_uploads(&self, id: &str, count: u64) -> AppResult<Event> {
        let mut events = self.events.write().map_err(|_| poisoned("events"))?;
        let event = events.get_mut(id).ok_or_else(|| AppError::event_not_found(id))?;

        event.uploads += count;
        Ok(event.clone())
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn create_user(&self, email: &str, name: &str) -> AppResult<User> {
        validate_new_user(email, name)?;

        let mut users = self.users.write().map_err(|_| poisoned("users"))?;
        if users.values().any(|u| u.email.eq_ignore_ascii_case(email.trim())) {
            return Err(AppError::validation("email", "A user with this email already exists"));
        }

        let user = User {
            id: new_id(),
            email: email.trim().to_string(),
            name: name.trim().to_string(),
            drive_connected: false,
            drive_tokens: None,
            created_at: Utc::now(),
            last_login: None,
        };
        users.insert(user.id.clone(), user.clone());

        log::info!("Created user {} ({})", user.email, user.id);
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> AppResult<Option<User>> {
        Ok(self
            .users
            .read()
            .map_err(|_| poisoned("users"))?
            .get(id)
            .cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self
            .users
            .read()
            .map_err(|_| poisoned("users"))?
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email.trim()))
            .cloned())
    }

    async fn connect_drive(&self, user_id: &str, tokens: DriveTokens) -> AppResult<User> {
        self.modify_user(user_id, |user| {
            user.drive_connected = true;
            user.drive_tokens = Some(tokens);
        })
    }

    async fn disconnect_drive(&self, user_id: &str) -> AppResult<User> {
        self.modify_user(user_id, |user| {
            user.drive_connected = false;
            user.drive_tokens = None;
        })
    }

    async fn touch_last_login(&self, user_id: &str) -> AppResult<User> {
        self.modify_user(user_id, |user| user.last_login = Some(Utc::now()))
    }
}

impl InMemoryStore {
    fn modify_user<F>(&self, user_id: &str, f: F) -> AppResult<User>
    where
        F: FnOnce(&mut User),
    {
        let mut users = self.users.write().map_err(|_| poisoned("users"))?;
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| AppError::user_not_found(user_id))?;

        f(user);
        Ok(user.clone())
    }
}
