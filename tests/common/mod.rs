#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use event_photo_uploader::errors::UploadFailure;
use event_photo_uploader::uploader::transport::ProgressSender;
use event_photo_uploader::uploader::{FileItem, UploadResponse, UploadTransport};

pub const MB: usize = 1024 * 1024;

/// How the scripted endpoint answers for one file name.
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(UploadFailure),
    /// Fail the first `n` attempts, then succeed.
    FailFirst(usize, UploadFailure),
    /// Never answer.
    Hang,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub file_name: String,
    pub session_id: String,
    pub timeout: Duration,
    pub at: Instant,
}

/// In-process transport that follows a per-file script and records calls.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    behaviors: HashMap<String, Behavior>,
    attempts: Arc<Mutex<HashMap<String, usize>>>,
    calls: Arc<Mutex<Vec<Call>>>,
    progress_steps: Vec<u8>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            progress_steps: vec![25, 50, 75, 100],
            ..Self::default()
        }
    }

    pub fn on(mut self, file_name: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(file_name.to_string(), behavior);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_names(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.file_name).collect()
    }
}

#[async_trait]
impl UploadTransport for ScriptedTransport {
    async fn send_file(
        &self,
        file: &FileItem,
        session_id: &str,
        timeout: Duration,
        progress: ProgressSender,
    ) -> Result<UploadResponse, UploadFailure> {
        self.calls.lock().unwrap().push(Call {
            file_name: file.name.clone(),
            session_id: session_id.to_string(),
            timeout,
            at: Instant::now(),
        });

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(file.name.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let behavior = self
            .behaviors
            .get(&file.name)
            .cloned()
            .unwrap_or(Behavior::Succeed);

        if let Behavior::Hang = behavior {
            let _ = progress.send(10);
            return futures::future::pending().await;
        }

        for step in &self.progress_steps {
            let _ = progress.send(*step);
            tokio::task::yield_now().await;
        }

        match behavior {
            Behavior::Fail(failure) => Err(failure),
            Behavior::FailFirst(n, failure) if attempt <= n => Err(failure),
            _ => UploadResponse::parse(&format!(
                r#"{{"success": true, "fileId": "id-{}", "sizeMB": "{:.2}"}}"#,
                file.name,
                file.size_mb()
            )),
        }
    }
}

pub fn image(name: &str, size: usize) -> FileItem {
    FileItem::new(name, "image/jpeg", vec![7u8; size])
}

pub fn video(name: &str, size: usize) -> FileItem {
    FileItem::new(name, "video/mp4", vec![7u8; size])
}

pub fn too_large() -> UploadFailure {
    UploadFailure::from_status(413, "Payload Too Large")
}

pub fn server_error() -> UploadFailure {
    UploadFailure::from_status(500, "Internal Server Error")
}
