// Upload pipeline: batches, transport, progress and the sequential queue
//
// Files go out one at a time; failures are collected per file and only an
// all-failed batch is reported as an error.

pub mod batch;
pub mod progress_tracker;
pub mod retry;
pub mod transport;
pub mod upload_queue;

pub use batch::{FileItem, UploadBatch};
pub use progress_tracker::UploadProgress;
pub use retry::retry_failed_uploads;
pub use transport::{HttpUploadClient, UploadResponse, UploadTransport};
pub use upload_queue::{BatchOutcome, FileUploadResult, PacingPolicy, SequentialUploader};
