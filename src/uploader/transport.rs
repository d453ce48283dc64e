use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use reqwest::{multipart, Body, Client};
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use super::batch::FileItem;
use crate::errors::{AppResult, UploadFailure};
use crate::security::InputValidator;

/// Multipart field carrying the file bytes.
pub const FILE_FIELD: &str = "file-0";
/// Multipart field carrying the session/event id.
pub const SESSION_FIELD: &str = "sessionId";

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Byte progress of the current transfer, as whole percentages.
pub type ProgressSender = UnboundedSender<u8>;

/// Sends one file to the upload endpoint.
///
/// Implementations report transfer progress on `progress` and must not call
/// back into the pipeline themselves.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn send_file(
        &self,
        file: &FileItem,
        session_id: &str,
        timeout: Duration,
        progress: ProgressSender,
    ) -> Result<UploadResponse, UploadFailure>;
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFileInfo {
    pub filename: Option<String>,
    pub file_id: Option<String>,
    pub url: Option<String>,
    pub download_url: Option<String>,
    pub size: Option<u64>,
    #[serde(rename = "type")]
    pub mime_type: Option<String>,
    #[serde(rename = "sizeMB", default, deserialize_with = "deserialize_size_mb")]
    pub size_mb: Option<f64>,
    pub web_view_link: Option<String>,
}

/// JSON body returned by the endpoint on success. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: Option<bool>,
    pub message: Option<String>,
    #[serde(default)]
    pub results: Vec<UploadedFileInfo>,
    pub file_id: Option<String>,
    #[serde(rename = "sizeMB", default, deserialize_with = "deserialize_size_mb")]
    pub size_mb: Option<f64>,
    #[serde(rename = "totalSizeMB", default, deserialize_with = "deserialize_size_mb")]
    pub total_size_mb: Option<f64>,
    pub folder_id: Option<String>,
    pub folder_url: Option<String>,
}

impl UploadResponse {
    pub fn parse(body: &str) -> Result<Self, UploadFailure> {
        serde_json::from_str(body).map_err(|e| {
            log::error!(
                "Invalid response format ({}): {}",
                e,
                body.chars().take(200).collect::<String>()
            );
            UploadFailure::invalid_response()
        })
    }

    /// Server-assigned id of the stored file, if the endpoint reported one.
    pub fn file_id(&self) -> Option<&str> {
        self.file_id
            .as_deref()
            .or_else(|| self.results.iter().find_map(|r| r.file_id.as_deref()))
    }

    /// Size the endpoint says it stored, in MB.
    pub fn uploaded_size_mb(&self) -> Option<f64> {
        if let Some(size) = self.size_mb.or(self.total_size_mb) {
            return Some(size);
        }

        let sizes: Vec<f64> = self.results.iter().filter_map(|r| r.size_mb).collect();
        if sizes.is_empty() {
            None
        } else {
            Some(sizes.iter().sum())
        }
    }
}

// The endpoint reports sizes either as numbers or as "12.34" strings.
fn deserialize_size_mb<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Multipart POST client for the upload endpoint.
pub struct HttpUploadClient {
    client: Client,
    endpoint: String,
    chunk_size: usize,
}

impl HttpUploadClient {
    pub fn new(endpoint: impl Into<String>) -> AppResult<Self> {
        let endpoint = endpoint.into();
        InputValidator::validate_endpoint_url(&endpoint)?;

        Ok(Self {
            client: Client::builder().build()?,
            endpoint,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Size of the body chunks; one progress tick is possible per chunk.
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes.max(1);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_form(
        &self,
        file: &FileItem,
        session_id: &str,
        progress: ProgressSender,
    ) -> Result<multipart::Form, UploadFailure> {
        let body = progress_body(file.data.clone(), self.chunk_size, progress);
        let part = multipart::Part::stream_with_length(body, file.size)
            .file_name(InputValidator::sanitize_filename(&file.name))
            .mime_str(&file.mime_type)
            .map_err(|e| {
                UploadFailure::classify(None, format!("Invalid MIME type {}: {}", file.mime_type, e))
            })?;

        Ok(multipart::Form::new()
            .part(FILE_FIELD, part)
            .text(SESSION_FIELD, session_id.to_string()))
    }
}

#[async_trait]
impl UploadTransport for HttpUploadClient {
    async fn send_file(
        &self,
        file: &FileItem,
        session_id: &str,
        timeout: Duration,
        progress: ProgressSender,
    ) -> Result<UploadResponse, UploadFailure> {
        let form = self.build_form(file, session_id, progress)?;

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadFailure::from_reqwest(e, timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UploadFailure::from_reqwest(e, timeout))?;

        if !status.is_success() {
            log::error!(
                "Upload failed with status {}: {}",
                status,
                body.chars().take(300).collect::<String>()
            );

            let mut status_text = status.canonical_reason().unwrap_or("Unknown error").to_string();
            if let Some(detail) = error_detail(&body) {
                status_text = format!("{} - {}", status_text, detail);
            }
            return Err(UploadFailure::from_status(status.as_u16(), &status_text));
        }

        UploadResponse::parse(&body)
    }
}

/// Pull the `error` string out of an endpoint error body, if there is one.
fn error_detail(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("error")?
        .as_str()
        .map(str::to_string)
}

/// Wrap file bytes in a chunked body that reports each new percentage as the
/// chunk is handed to the connection.
fn progress_body(data: Bytes, chunk_size: usize, progress: ProgressSender) -> Body {
    let total = data.len();
    let mut chunks = Vec::with_capacity(total / chunk_size + 1);
    let mut last_percent = None;
    let mut offset = 0;

    while offset < total {
        let end = (offset + chunk_size).min(total);
        let percent = ((end as u64 * 100) / total as u64) as u8;
        let report = if last_percent != Some(percent) {
            last_percent = Some(percent);
            Some(percent)
        } else {
            None
        };

        chunks.push((data.slice(offset..end), report));
        offset = end;
    }

    let stream = stream::iter(chunks).map(move |(chunk, report)| {
        if let Some(percent) = report {
            let _ = progress.send(percent);
        }
        Ok::<Bytes, std::io::Error>(chunk)
    });

    Body::wrap_stream(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint_response() {
        let body = r#"{
            "success": true,
            "message": "Successfully uploaded 1 file to Google Drive",
            "results": [{
                "filename": "a.jpg",
                "success": true,
                "fileId": "drive-123",
                "size": 1048576,
                "type": "image/jpeg",
                "sizeMB": "1.00"
            }],
            "totalUploaded": 1,
            "totalSizeMB": 1.0,
            "folderId": "folder-9"
        }"#;

        let response = UploadResponse::parse(body).unwrap();
        assert_eq!(response.file_id(), Some("drive-123"));
        assert_eq!(response.uploaded_size_mb(), Some(1.0));
        assert_eq!(response.folder_id.as_deref(), Some("folder-9"));
        assert_eq!(response.results[0].mime_type.as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn test_parse_minimal_and_invalid_responses() {
        let minimal = UploadResponse::parse(r#"{"sizeMB": "2.50"}"#).unwrap();
        assert_eq!(minimal.uploaded_size_mb(), Some(2.5));
        assert_eq!(minimal.file_id(), None);

        let empty = UploadResponse::parse("{}").unwrap();
        assert_eq!(empty.uploaded_size_mb(), None);

        let invalid = UploadResponse::parse("<html>oops</html>").unwrap_err();
        assert_eq!(invalid.kind, crate::errors::UploadErrorKind::InvalidResponse);
    }

    #[test]
    fn test_error_detail() {
        assert_eq!(
            error_detail(r#"{"error": "Event not found"}"#).as_deref(),
            Some("Event not found")
        );
        assert_eq!(error_detail("plain text"), None);
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        assert!(HttpUploadClient::new("not a url").is_err());
        let client = HttpUploadClient::new("http://localhost:3000/api/upload").unwrap();
        assert_eq!(client.endpoint(), "http://localhost:3000/api/upload");
    }
}
