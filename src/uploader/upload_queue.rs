use serde::Serialize;
use std::cmp::min;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration, Instant};

use crate::config::Config;
use crate::errors::{AppError, AppResult, UploadErrorKind, UploadFailure};

use super::batch::{FileItem, UploadBatch};
use super::progress_tracker::{ProgressTracker, UploadProgress};
use super::transport::{UploadResponse, UploadTransport};

/// Every file gets at least two minutes.
pub const BASE_TIMEOUT_MS: u64 = 120_000;
/// Extra time granted per MB of payload.
pub const TIMEOUT_PER_MB_MS: u64 = 2_000;
/// Cap on the size-dependent extra time.
pub const MAX_EXTRA_TIMEOUT_MS: u64 = 300_000;
/// Files above this size earn a longer pause before the next one.
pub const LARGE_FILE_THRESHOLD_MB: u64 = 50;
pub const LARGE_FILE_DELAY_MS: u64 = 2_000;
pub const DEFAULT_DELAY_MS: u64 = 1_000;

/// Timeout and inter-file delay heuristics.
#[derive(Debug, Clone, PartialEq)]
pub struct PacingPolicy {
    pub base_timeout: Duration,
    pub timeout_per_mb_ms: u64,
    pub max_extra_timeout: Duration,
    pub large_file_threshold_mb: f64,
    pub large_file_delay: Duration,
    pub default_delay: Duration,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_millis(BASE_TIMEOUT_MS),
            timeout_per_mb_ms: TIMEOUT_PER_MB_MS,
            max_extra_timeout: Duration::from_millis(MAX_EXTRA_TIMEOUT_MS),
            large_file_threshold_mb: LARGE_FILE_THRESHOLD_MB as f64,
            large_file_delay: Duration::from_millis(LARGE_FILE_DELAY_MS),
            default_delay: Duration::from_millis(DEFAULT_DELAY_MS),
        }
    }
}

impl From<&Config> for PacingPolicy {
    fn from(config: &Config) -> Self {
        Self {
            base_timeout: Duration::from_millis(config.base_timeout_ms),
            timeout_per_mb_ms: config.timeout_per_mb_ms,
            max_extra_timeout: Duration::from_millis(config.max_extra_timeout_ms),
            large_file_threshold_mb: config.large_file_threshold_mb as f64,
            large_file_delay: Duration::from_millis(config.large_file_delay_ms),
            default_delay: Duration::from_millis(config.default_delay_ms),
        }
    }
}

impl PacingPolicy {
    /// `base + min(size_mb * per_mb, max_extra)`
    pub fn upload_timeout(&self, size_mb: f64) -> Duration {
        let extra_ms = (size_mb.max(0.0) * self.timeout_per_mb_ms as f64) as u64;
        self.base_timeout + min(Duration::from_millis(extra_ms), self.max_extra_timeout)
    }

    /// Pause after a file of `size_mb` before starting the next one.
    pub fn delay_after(&self, size_mb: f64) -> Duration {
        if size_mb > self.large_file_threshold_mb {
            self.large_file_delay
        } else {
            self.default_delay
        }
    }
}

/// Outcome of one file's single upload attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileUploadResult {
    pub file_name: String,
    pub size_mb: f64,
    pub success: bool,
    pub file_id: Option<String>,
    pub uploaded_size_mb: Option<f64>,
    pub error: Option<UploadFailure>,
}

impl FileUploadResult {
    fn succeeded(file: &FileItem, response: &UploadResponse) -> Self {
        Self {
            file_name: file.name.clone(),
            size_mb: file.size_mb(),
            success: true,
            file_id: response.file_id().map(str::to_string),
            uploaded_size_mb: Some(response.uploaded_size_mb().unwrap_or_else(|| file.size_mb())),
            error: None,
        }
    }

    fn failed(file: &FileItem, failure: UploadFailure) -> Self {
        Self {
            file_name: file.name.clone(),
            size_mb: file.size_mb(),
            success: false,
            file_id: None,
            uploaded_size_mb: None,
            error: Some(failure),
        }
    }

    pub fn error_kind(&self) -> Option<UploadErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Result of a batch that had at least one success.
///
/// Partial failures still land here; check `failed_files` before telling the
/// user everything went through.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub uploaded_files: usize,
    pub failed_files: usize,
    pub uploaded_size_mb: f64,
    /// One entry per input file, in input order.
    pub results: Vec<FileUploadResult>,
}

impl BatchOutcome {
    pub fn is_complete_success(&self) -> bool {
        self.failed_files == 0
    }
}

/// Uploads files strictly one at a time through a transport.
pub struct SequentialUploader<T: UploadTransport> {
    transport: T,
    pacing: PacingPolicy,
}

impl<T: UploadTransport> SequentialUploader<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            pacing: PacingPolicy::default(),
        }
    }

    pub fn with_pacing(mut self, pacing: PacingPolicy) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn pacing(&self) -> &PacingPolicy {
        &self.pacing
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Freeze `batch` and upload its files under the batch's session id.
    pub async fn upload_batch<F>(
        &self,
        batch: &mut UploadBatch,
        on_progress: F,
    ) -> AppResult<BatchOutcome>
    where
        F: FnMut(UploadProgress),
    {
        let session_id = batch.session_id().to_string();
        let files = batch.start()?;
        self.upload(files, &session_id, on_progress).await
    }

    /// Upload `files` in order, one request each.
    ///
    /// A failed file never stops the batch. The call only fails when no file
    /// made it, in which case the error lists every failure. Pass `|_| {}`
    /// when progress is not needed.
    pub async fn upload<F>(
        &self,
        files: &[FileItem],
        session_id: &str,
        mut on_progress: F,
    ) -> AppResult<BatchOutcome>
    where
        F: FnMut(UploadProgress),
    {
        if files.is_empty() {
            return Err(AppError::EmptyBatch);
        }

        let mut tracker = ProgressTracker::new(files);
        let mut results = Vec::with_capacity(files.len());
        let mut errors = Vec::new();
        let started_at = Instant::now();

        log::info!(
            "🚀 Starting upload of {} files ({:.2}MB total) for session {}",
            tracker.total_files(),
            tracker.total_size_mb(),
            session_id
        );

        for (index, file) in files.iter().enumerate() {
            on_progress(tracker.file_started(index, file));

            let timeout = self.pacing.upload_timeout(file.size_mb());
            log::debug!(
                "⏱️ Timeout set to {:.1} minutes for {:.1}MB file",
                timeout.as_secs_f64() / 60.0,
                file.size_mb()
            );
            log::info!("📤 Uploading: {} ({:.2}MB)", file.name, file.size_mb());

            match self
                .transfer(index, file, session_id, timeout, &tracker, &mut on_progress)
                .await
            {
                Ok(response) => {
                    log::info!("✅ Upload successful: {}", file.name);
                    on_progress(tracker.file_succeeded(index, file));
                    results.push(FileUploadResult::succeeded(file, &response));
                }
                Err(failure) => {
                    log::error!("❌ Error uploading {}: {}", file.name, failure);
                    errors.push(format!(
                        "{} ({:.1}MB): {}",
                        file.name,
                        file.size_mb(),
                        failure.reason()
                    ));
                    on_progress(tracker.file_failed(index, file));
                    results.push(FileUploadResult::failed(file, failure));
                }
            }

            if index + 1 < files.len() {
                sleep(self.pacing.delay_after(file.size_mb())).await;
            }
        }

        let uploaded_size_mb: f64 = results.iter().filter_map(|r| r.uploaded_size_mb).sum();
        on_progress(tracker.finished(uploaded_size_mb));

        log::info!(
            "Upload finished for session {} in {:.1}s: {} successful, {} failed",
            session_id,
            started_at.elapsed().as_secs_f64(),
            tracker.uploaded_files(),
            tracker.failed_files()
        );

        if tracker.uploaded_files() == 0 && !errors.is_empty() {
            return Err(AppError::AllUploadsFailed { failures: errors });
        }

        Ok(BatchOutcome {
            uploaded_files: tracker.uploaded_files(),
            failed_files: tracker.failed_files(),
            uploaded_size_mb,
            results,
        })
    }

    /// Run one transfer under its timeout, relaying transport progress.
    ///
    /// Ticks are forwarded from this task only, and any still queued when the
    /// transfer ends are flushed before returning.
    async fn transfer<F>(
        &self,
        index: usize,
        file: &FileItem,
        session_id: &str,
        timeout: Duration,
        tracker: &ProgressTracker,
        on_progress: &mut F,
    ) -> Result<UploadResponse, UploadFailure>
    where
        F: FnMut(UploadProgress),
    {
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<u8>();

        let relay = async {
            let send = self
                .transport
                .send_file(file, session_id, timeout, progress_tx);
            tokio::pin!(send);

            loop {
                tokio::select! {
                    biased;
                    Some(percent) = progress_rx.recv() => {
                        on_progress(tracker.file_progress(index, file, percent));
                    }
                    result = &mut send => break result,
                }
            }
        };

        let result = match tokio::time::timeout(timeout, relay).await {
            Ok(result) => result,
            Err(_) => {
                log::error!(
                    "Upload timeout after {:.1} minutes: {}",
                    timeout.as_secs_f64() / 60.0,
                    file.name
                );
                Err(UploadFailure::timeout(timeout))
            }
        };

        while let Ok(percent) = progress_rx.try_recv() {
            on_progress(tracker.file_progress(index, file, percent));
        }

        result
    }
}
