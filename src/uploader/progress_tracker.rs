use serde::{Deserialize, Serialize};

use super::batch::FileItem;
use crate::media;

/// Snapshot handed to the progress callback. Every tick gets a fresh value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub current_file: usize,
    pub total_files: usize,
    pub current_file_name: String,
    pub file_progress: u8,
    pub overall_progress: u8,
    pub status: String,
    pub uploaded_files: usize,
    pub failed_files: usize,
    #[serde(rename = "currentFileSizeMB")]
    pub current_file_size_mb: f64,
    #[serde(rename = "totalSizeMB")]
    pub total_size_mb: f64,
}

/// Overall batch percentage: `floor((completed + file_progress/100) / total * 100)`.
pub fn overall_percent(completed_files: usize, file_progress: u8, total_files: usize) -> u8 {
    if total_files == 0 {
        return 100;
    }

    let scaled = completed_files * 100 + file_progress.min(100) as usize;
    (scaled / total_files).min(100) as u8
}

/// Running counters for one pipeline invocation.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total_files: usize,
    total_size_mb: f64,
    uploaded_files: usize,
    failed_files: usize,
}

impl ProgressTracker {
    pub fn new(files: &[FileItem]) -> Self {
        let total_bytes: u64 = files.iter().map(|f| f.size).sum();
        Self {
            total_files: files.len(),
            total_size_mb: media::bytes_to_mb(total_bytes),
            uploaded_files: 0,
            failed_files: 0,
        }
    }

    pub fn total_files(&self) -> usize {
        self.total_files
    }

    pub fn total_size_mb(&self) -> f64 {
        self.total_size_mb
    }

    pub fn uploaded_files(&self) -> usize {
        self.uploaded_files
    }

    pub fn failed_files(&self) -> usize {
        self.failed_files
    }

    pub fn file_started(&self, index: usize, file: &FileItem) -> UploadProgress {
        self.snapshot(
            index,
            file,
            0,
            overall_percent(index, 0, self.total_files),
            format!("📤 Uploading: {} ({:.1}MB)...", file.name, file.size_mb()),
        )
    }

    pub fn file_progress(&self, index: usize, file: &FileItem, percent: u8) -> UploadProgress {
        let percent = percent.min(100);
        self.snapshot(
            index,
            file,
            percent,
            overall_percent(index, percent, self.total_files),
            format!(
                "📤 Uploading: {} ({:.1}MB)... {}%",
                file.name,
                file.size_mb(),
                percent
            ),
        )
    }

    pub fn file_succeeded(&mut self, index: usize, file: &FileItem) -> UploadProgress {
        self.uploaded_files += 1;
        self.snapshot(
            index,
            file,
            100,
            overall_percent(index + 1, 0, self.total_files),
            format!(
                "✅ {} uploaded successfully ({:.1}MB)",
                file.name,
                file.size_mb()
            ),
        )
    }

    pub fn file_failed(&mut self, index: usize, file: &FileItem) -> UploadProgress {
        self.failed_files += 1;
        self.snapshot(
            index,
            file,
            0,
            overall_percent(index + 1, 0, self.total_files),
            format!("❌ Failed to upload {} ({:.1}MB)", file.name, file.size_mb()),
        )
    }

    /// Final tick. Always reports 100% overall, whatever failed.
    pub fn finished(&self, uploaded_size_mb: f64) -> UploadProgress {
        UploadProgress {
            current_file: self.total_files,
            total_files: self.total_files,
            current_file_name: String::new(),
            file_progress: 100,
            overall_progress: 100,
            status: format!(
                "✅ Upload complete! {} successful ({:.1}MB), {} failed",
                self.uploaded_files, uploaded_size_mb, self.failed_files
            ),
            uploaded_files: self.uploaded_files,
            failed_files: self.failed_files,
            current_file_size_mb: 0.0,
            total_size_mb: self.total_size_mb,
        }
    }

    fn snapshot(
        &self,
        index: usize,
        file: &FileItem,
        file_progress: u8,
        overall_progress: u8,
        status: String,
    ) -> UploadProgress {
        UploadProgress {
            current_file: index + 1,
            total_files: self.total_files,
            current_file_name: file.name.clone(),
            file_progress,
            overall_progress,
            status,
            uploaded_files: self.uploaded_files,
            failed_files: self.failed_files,
            current_file_size_mb: file.size_mb(),
            total_size_mb: self.total_size_mb,
        }
    }
}
