use chrono::{DateTime, Utc};

use super::{Event, EventStatus, EventStore, User, UserStore};
use crate::errors::{AppError, AppResult};

/// Where a guest upload for an event ends up.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadTarget {
    pub event: Event,
    pub owner: User,
}

/// Resolve the account that receives uploads for `event_id`.
///
/// Uploads always go to the event's own owner. The event must be active and
/// the owner must have connected cloud storage; an expired access token is
/// only accepted when a refresh token is on file. No other account is ever
/// used as a fallback.
pub async fn resolve_upload_target<S>(
    store: &S,
    event_id: &str,
    now: DateTime<Utc>,
) -> AppResult<UploadTarget>
where
    S: EventStore + UserStore + ?Sized,
{
    let event = store
        .get_event(event_id)
        .await?
        .ok_or_else(|| AppError::event_not_found(event_id))?;

    if event.status != EventStatus::Active {
        return Err(AppError::EventClosed {
            id: event.id,
            status: event.status.to_string(),
        });
    }

    let owner = store
        .get_user(&event.user_id)
        .await?
        .ok_or_else(|| AppError::user_not_found(&event.user_id))?;

    let tokens = match (&owner.drive_tokens, owner.drive_connected) {
        (Some(tokens), true) => tokens,
        _ => {
            log::warn!(
                "Event {} owner {} has no cloud storage connected",
                event.id,
                owner.id
            );
            return Err(AppError::OwnerNotConnected { event_id: event.id });
        }
    };

    if tokens.is_expired(now) && tokens.refresh_token.is_none() {
        log::warn!(
            "Event {} owner {} token expired at {} with no refresh token",
            event.id,
            owner.id,
            tokens.expires_at
        );
        return Err(AppError::DriveTokenExpired { event_id: event.id });
    }

    log::debug!("Uploads for event {} go to user {}", event.id, owner.id);
    Ok(UploadTarget { event, owner })
}

/// Organizer operations are limited to the event's owner.
pub fn ensure_event_owner(event: &Event, user_id: &str) -> AppResult<()> {
    if event.user_id != user_id {
        log::warn!("User {} denied access to event {}", user_id, event.id);
        return Err(AppError::access_denied(&event.id));
    }
    Ok(())
}
