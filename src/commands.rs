use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::path::PathBuf;

use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::media;
use crate::security::InputValidator;
use crate::store::{
    ensure_event_owner, resolve_upload_target, DriveTokens, Event, EventStore, NewEvent, User,
    UserStore,
};
use crate::uploader::retry::merge_retry_outcome;
use crate::uploader::{
    retry_failed_uploads, BatchOutcome, FileItem, HttpUploadClient, PacingPolicy,
    SequentialUploader, UploadBatch, UploadProgress, UploadTransport,
};

/// Token lifetime assumed when the caller does not say.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;
const MAX_TOKEN_LIFETIME_SECS: i64 = 10 * 365 * 24 * 3600;

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub event_id: String,
    pub paths: Vec<PathBuf>,
    pub retry_failed: bool,
}

/// What an upload run did, for the summary line.
#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
    pub event_id: String,
    pub outcome: BatchOutcome,
    /// Present when the event is tracked in the local store.
    pub event: Option<Event>,
}

/// Build the HTTP uploader described by `config`, optionally pointed at
/// another endpoint.
pub fn build_http_uploader(
    config: &Config,
    endpoint: Option<&str>,
) -> AppResult<SequentialUploader<HttpUploadClient>> {
    let endpoint = endpoint.unwrap_or(&config.upload_endpoint);
    let client = HttpUploadClient::new(endpoint)?
        .with_chunk_size(config.progress_chunk_kb as usize * 1024);

    Ok(SequentialUploader::new(client).with_pacing(PacingPolicy::from(config)))
}

/// Read the media files named by `paths` into memory.
///
/// Directories contribute the media files directly inside them.
pub async fn load_files(paths: &[PathBuf]) -> AppResult<Vec<FileItem>> {
    let mut files = Vec::new();
    for path in media::collect_media_files(paths)? {
        files.push(FileItem::from_path(&path).await?);
    }
    Ok(files)
}

/// Upload files to an event's session.
///
/// Events tracked in `store` must resolve to a connected owner before any
/// file is sent, and their upload counter grows by the number of files that
/// made it. Unknown ids are passed through to the endpoint as-is.
pub async fn run_upload<T, S, F>(
    uploader: &SequentialUploader<T>,
    store: &S,
    config: &Config,
    request: UploadRequest,
    mut on_progress: F,
) -> AppResult<UploadSummary>
where
    T: UploadTransport,
    S: EventStore + UserStore + ?Sized,
    F: FnMut(UploadProgress),
{
    InputValidator::validate_session_id(&request.event_id)?;

    let tracked = match store.get_event(&request.event_id).await? {
        Some(_) => {
            let target = resolve_upload_target(store, &request.event_id, Utc::now()).await?;
            log::info!(
                "Uploading to event '{}' owned by {}",
                target.event.name,
                target.owner.email
            );
            true
        }
        None => {
            log::debug!(
                "Event {} is not tracked locally, sending files as-is",
                request.event_id
            );
            false
        }
    };

    let files = load_files(&request.paths).await?;
    let mut batch = UploadBatch::new(request.event_id.clone())?;
    batch.add_files(files, config.max_file_size_mb)?;

    log::info!(
        "Prepared {} files ({:.2}MB, {} videos)",
        batch.len(),
        batch.total_size_mb(),
        batch.video_count()
    );

    // A file gets at most one extra attempt, whichever retry path it takes.
    let (outcome, retried) = match uploader.upload_batch(&mut batch, &mut on_progress).await {
        Ok(outcome) => (outcome, false),
        Err(AppError::AllUploadsFailed { failures }) if request.retry_failed => {
            log::warn!(
                "All {} uploads failed, retrying once: {}",
                failures.len(),
                failures.join(", ")
            );
            let outcome = uploader
                .upload(batch.files(), &request.event_id, &mut on_progress)
                .await?;
            (outcome, true)
        }
        Err(e) => return Err(e),
    };

    let outcome = if request.retry_failed && !retried && outcome.failed_files > 0 {
        match retry_failed_uploads(
            uploader,
            batch.files(),
            &outcome,
            &request.event_id,
            &mut on_progress,
        )
        .await
        {
            Ok(Some(retry)) => merge_retry_outcome(outcome, retry),
            Ok(None) => outcome,
            Err(AppError::AllUploadsFailed { failures }) => {
                log::warn!("Retry did not recover any file: {}", failures.join(", "));
                outcome
            }
            Err(e) => return Err(e),
        }
    } else {
        outcome
    };

    let event = if tracked && outcome.uploaded_files > 0 {
        Some(
            store
                .record_uploads(&request.event_id, outcome.uploaded_files as u64)
                .await?,
        )
    } else if tracked {
        store.get_event(&request.event_id).await?
    } else {
        None
    };

    Ok(UploadSummary {
        event_id: request.event_id,
        outcome,
        event,
    })
}

pub async fn create_event<S>(
    store: &S,
    owner_id: &str,
    name: &str,
    date: &str,
    description: Option<String>,
) -> AppResult<Event>
where
    S: EventStore + UserStore + ?Sized,
{
    store
        .get_user(owner_id)
        .await?
        .ok_or_else(|| AppError::user_not_found(owner_id))?;

    store
        .create_event(NewEvent {
            user_id: owner_id.to_string(),
            name: name.to_string(),
            date: date.to_string(),
            description,
        })
        .await
}

pub async fn list_events<S>(store: &S, owner_id: &str) -> AppResult<Vec<Event>>
where
    S: EventStore + UserStore + ?Sized,
{
    store
        .get_user(owner_id)
        .await?
        .ok_or_else(|| AppError::user_not_found(owner_id))?;

    store.list_events_for_user(owner_id).await
}

pub async fn show_event<S>(store: &S, event_id: &str) -> AppResult<Event>
where
    S: EventStore + ?Sized,
{
    store
        .get_event(event_id)
        .await?
        .ok_or_else(|| AppError::event_not_found(event_id))
}

/// Rename an event on behalf of its owner.
pub async fn rename_event<S>(
    store: &S,
    event_id: &str,
    owner_id: &str,
    name: &str,
) -> AppResult<Event>
where
    S: EventStore + ?Sized,
{
    let event = show_event(store, event_id).await?;
    ensure_event_owner(&event, owner_id)?;
    store.rename_event(event_id, name).await
}

pub async fn delete_event<S>(store: &S, event_id: &str, owner_id: &str) -> AppResult<()>
where
    S: EventStore + ?Sized,
{
    let event = show_event(store, event_id).await?;
    ensure_event_owner(&event, owner_id)?;
    store.delete_event(event_id).await
}

pub async fn add_user<S>(store: &S, email: &str, name: &str) -> AppResult<User>
where
    S: UserStore + ?Sized,
{
    store.create_user(email, name).await
}

pub async fn show_user<S>(store: &S, user_id: &str) -> AppResult<User>
where
    S: UserStore + ?Sized,
{
    store
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::user_not_found(user_id))
}

/// Store cloud storage credentials for a user.
///
/// `expires_in_secs` counts from `now`.
pub async fn connect_drive<S>(
    store: &S,
    user_id: &str,
    access_token: &str,
    refresh_token: Option<String>,
    expires_in_secs: i64,
    now: DateTime<Utc>,
) -> AppResult<User>
where
    S: UserStore + ?Sized,
{
    if access_token.trim().is_empty() {
        return Err(AppError::validation(
            "access_token",
            "Access token cannot be empty",
        ));
    }

    let tokens = DriveTokens {
        access_token: access_token.trim().to_string(),
        refresh_token: refresh_token.filter(|t| !t.trim().is_empty()),
        expires_at: now + Duration::seconds(expires_in_secs.clamp(0, MAX_TOKEN_LIFETIME_SECS)),
    };

    store.connect_drive(user_id, tokens).await
}

pub async fn disconnect_drive<S>(store: &S, user_id: &str) -> AppResult<User>
where
    S: UserStore + ?Sized,
{
    store.disconnect_drive(user_id).await
}

/// Human summary of a finished upload run.
pub fn summary_message(outcome: &BatchOutcome) -> String {
    if outcome.is_complete_success() {
        format!(
            "✅ All {} files uploaded ({:.1}MB)",
            outcome.uploaded_files, outcome.uploaded_size_mb
        )
    } else {
        let failures: Vec<String> = outcome
            .results
            .iter()
            .filter_map(|r| {
                r.error
                    .as_ref()
                    .map(|e| format!("{} ({:.1}MB): {}", r.file_name, r.size_mb, e.reason()))
            })
            .collect();

        format!(
            "⚠️ {} uploaded ({:.1}MB), {} failed: {}",
            outcome.uploaded_files,
            outcome.uploaded_size_mb,
            outcome.failed_files,
            failures.join(", ")
        )
    }
}
