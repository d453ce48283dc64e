use super::batch::FileItem;
use super::progress_tracker::UploadProgress;
use super::transport::UploadTransport;
use super::upload_queue::{BatchOutcome, SequentialUploader};
use crate::errors::AppResult;

/// Files whose upload failed in `outcome`, in their original order.
pub fn failed_subset(files: &[FileItem], outcome: &BatchOutcome) -> Vec<FileItem> {
    files
        .iter()
        .zip(&outcome.results)
        .filter(|(_, result)| !result.success)
        .map(|(file, _)| file.clone())
        .collect()
}

/// Fold a retry pass back into the outcome it retried.
///
/// Failed entries of `original` are replaced, in order, by the results of
/// `retry`; the counts are recomputed from the merged list.
pub fn merge_retry_outcome(original: BatchOutcome, retry: BatchOutcome) -> BatchOutcome {
    let mut retried = retry.results.into_iter();
    let results: Vec<_> = original
        .results
        .into_iter()
        .map(|result| {
            if result.success {
                result
            } else {
                retried.next().unwrap_or(result)
            }
        })
        .collect();

    let uploaded_files = results.iter().filter(|r| r.success).count();
    BatchOutcome {
        uploaded_files,
        failed_files: results.len() - uploaded_files,
        uploaded_size_mb: results.iter().filter_map(|r| r.uploaded_size_mb).sum(),
        results,
    }
}

/// Give the failed files of a finished batch one more pass.
///
/// Returns `Ok(None)` when nothing failed. The retry is a fresh pipeline run
/// with its own progress numbering.
pub async fn retry_failed_uploads<T, F>(
    uploader: &SequentialUploader<T>,
    files: &[FileItem],
    outcome: &BatchOutcome,
    session_id: &str,
    on_progress: F,
) -> AppResult<Option<BatchOutcome>>
where
    T: UploadTransport,
    F: FnMut(UploadProgress),
{
    let retry_files = failed_subset(files, outcome);
    if retry_files.is_empty() {
        log::debug!("Nothing to retry for session {}", session_id);
        return Ok(None);
    }

    log::info!(
        "Retrying {} failed uploads for session {}",
        retry_files.len(),
        session_id
    );

    uploader
        .upload(&retry_files, session_id, on_progress)
        .await
        .map(Some)
}
