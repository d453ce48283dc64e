use bytes::Bytes;
use std::path::Path;

use crate::errors::{AppError, AppResult};
use crate::media;
use crate::security::InputValidator;

/// A single file selected for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct FileItem {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub data: Bytes,
}

impl FileItem {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            size: data.len() as u64,
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Read a file from disk, guessing its MIME type from the extension.
    pub async fn from_path(path: &Path) -> AppResult<Self> {
        InputValidator::validate_file_path(&path.to_string_lossy())?;

        let contents = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        Ok(Self::new(name, media::detect_mime_type(path), contents))
    }

    pub fn size_mb(&self) -> f64 {
        media::bytes_to_mb(self.size)
    }

    pub fn is_video(&self) -> bool {
        media::is_video_mime(&self.mime_type)
    }
}

/// Files staged for one upload session.
///
/// Files can be added and removed until [`UploadBatch::start`] is called;
/// after that the batch is frozen until [`UploadBatch::reset`].
#[derive(Debug, Clone)]
pub struct UploadBatch {
    session_id: String,
    files: Vec<FileItem>,
    started: bool,
}

impl UploadBatch {
    pub fn new(session_id: impl Into<String>) -> AppResult<Self> {
        let session_id = session_id.into();
        InputValidator::validate_session_id(&session_id)?;

        Ok(Self {
            session_id,
            files: Vec::new(),
            started: false,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn files(&self) -> &[FileItem] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn total_size_mb(&self) -> f64 {
        self.files.iter().map(FileItem::size_mb).sum()
    }

    pub fn video_count(&self) -> usize {
        self.files.iter().filter(|f| f.is_video()).count()
    }

    /// Add files after validating all of them.
    ///
    /// If any file is rejected nothing is added, and the error lists every
    /// problem, one per line.
    pub fn add_files(&mut self, files: Vec<FileItem>, max_size_mb: u64) -> AppResult<()> {
        self.ensure_editable()?;

        let problems: Vec<String> = files
            .iter()
            .filter_map(|f| InputValidator::validate_media_file(f, max_size_mb).err())
            .map(|e| e.to_string())
            .collect();

        if !problems.is_empty() {
            return Err(AppError::validation("files", &problems.join("\n")));
        }

        log::info!(
            "📁 Selected {} files for session {}",
            files.len(),
            self.session_id
        );
        self.files.extend(files);
        Ok(())
    }

    pub fn remove_file(&mut self, index: usize) -> AppResult<FileItem> {
        self.ensure_editable()?;

        if index >= self.files.len() {
            return Err(AppError::validation(
                "index",
                &format!("No file at position {} (batch has {})", index, self.files.len()),
            ));
        }

        Ok(self.files.remove(index))
    }

    /// Freeze the batch and hand out its files for uploading.
    pub fn start(&mut self) -> AppResult<&[FileItem]> {
        self.ensure_editable()?;

        if self.files.is_empty() {
            return Err(AppError::EmptyBatch);
        }

        self.started = true;
        Ok(&self.files)
    }

    pub fn reset(&mut self) {
        self.files.clear();
        self.started = false;
    }

    fn ensure_editable(&self) -> AppResult<()> {
        if self.started {
            return Err(AppError::batch_already_started(&self.session_id));
        }
        Ok(())
    }
}
