use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::errors::{AppError, AppResult};
use crate::media;
use crate::uploader::batch::FileItem;

fn session_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-]{1,128}$").expect("valid session id regex"))
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex")
    })
}

fn endpoint_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^https?://[^\s/]+(/\S*)?$").expect("valid endpoint regex"))
}

fn unsafe_filename_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("valid filename regex"))
}

pub struct InputValidator;

impl InputValidator {
    /// Check a file before it may join an upload batch.
    pub fn validate_media_file(file: &FileItem, max_size_mb: u64) -> AppResult<()> {
        if !media::is_media_mime(&file.mime_type) {
            return Err(AppError::InvalidFileType {
                name: file.name.clone(),
                mime_type: file.mime_type.clone(),
            });
        }

        let size_mb = file.size_mb();
        if size_mb > max_size_mb as f64 {
            return Err(AppError::FileTooLarge {
                name: file.name.clone(),
                size_mb,
                max_mb: max_size_mb,
            });
        }

        if file.size == 0 {
            return Err(AppError::EmptyFile {
                name: file.name.clone(),
            });
        }

        Ok(())
    }

    pub fn validate_session_id(session_id: &str) -> AppResult<()> {
        if session_id.trim().is_empty() {
            return Err(AppError::validation("session_id", "Session ID is required"));
        }

        if !session_id_pattern().is_match(session_id) {
            return Err(AppError::validation(
                "session_id",
                "Session ID may only contain letters, digits, '-' and '_' (max 128)",
            ));
        }

        Ok(())
    }

    pub fn validate_event_name(name: &str) -> AppResult<()> {
        let trimmed = name.trim();

        if trimmed.is_empty() {
            return Err(AppError::validation("name", "Event name cannot be empty"));
        }

        if trimmed.chars().count() > 100 {
            return Err(AppError::validation(
                "name",
                "Event name too long (max 100 characters)",
            ));
        }

        Ok(())
    }

    pub fn validate_email(email: &str) -> AppResult<()> {
        if !email_pattern().is_match(email.trim()) {
            return Err(AppError::validation("email", "Invalid email address"));
        }
        Ok(())
    }

    pub fn validate_endpoint_url(url: &str) -> AppResult<()> {
        let trimmed = url.trim();

        if trimmed.is_empty() {
            return Err(AppError::validation("upload_endpoint", "Upload endpoint cannot be empty"));
        }

        if !endpoint_pattern().is_match(trimmed) {
            return Err(AppError::validation(
                "upload_endpoint",
                "Upload endpoint must be an http(s) URL",
            ));
        }

        Ok(())
    }

    pub fn validate_file_path(path: &str) -> AppResult<()> {
        if path.trim().is_empty() {
            return Err(AppError::validation("file_path", "File path cannot be empty"));
        }

        let path_obj = Path::new(path);
        if !path_obj.exists() {
            return Err(AppError::file_not_found(path));
        }

        if !path_obj.is_file() {
            return Err(AppError::validation("file_path", "Path is not a file"));
        }

        Ok(())
    }

    pub fn sanitize_filename(filename: &str) -> String {
        let sanitized = unsafe_filename_chars().replace_all(filename.trim(), "_");

        if sanitized.chars().count() > 255 {
            let truncated: String = sanitized.chars().take(252).collect();
            format!("{}...", truncated)
        } else {
            sanitized.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, mime: &str, size: usize) -> FileItem {
        FileItem::new(name, mime, vec![1u8; size])
    }

    #[test]
    fn test_validate_media_file() {
        assert!(InputValidator::validate_media_file(&file("a.jpg", "image/jpeg", 10), 100).is_ok());
        assert!(InputValidator::validate_media_file(&file("a.mp4", "video/mp4", 10), 100).is_ok());

        let wrong_type = InputValidator::validate_media_file(&file("a.pdf", "application/pdf", 10), 100);
        assert!(matches!(wrong_type, Err(AppError::InvalidFileType { .. })));

        let empty = InputValidator::validate_media_file(&file("a.jpg", "image/jpeg", 0), 100);
        assert!(matches!(empty, Err(AppError::EmptyFile { .. })));

        let too_big = InputValidator::validate_media_file(&file("a.mp4", "video/mp4", 2 * 1024 * 1024 + 1), 2);
        match too_big {
            Err(AppError::FileTooLarge { name, max_mb, .. }) => {
                assert_eq!(name, "a.mp4");
                assert_eq!(max_mb, 2);
            }
            other => panic!("expected FileTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_session_id() {
        assert!(InputValidator::validate_session_id("1718036123456").is_ok());
        assert!(InputValidator::validate_session_id("wedding_2024-june").is_ok());
        assert!(InputValidator::validate_session_id("").is_err());
        assert!(InputValidator::validate_session_id("../etc").is_err());
        assert!(InputValidator::validate_session_id(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_event_name_and_email() {
        assert!(InputValidator::validate_event_name("Anna & Nikos").is_ok());
        assert!(InputValidator::validate_event_name("   ").is_err());
        assert!(InputValidator::validate_event_name(&"n".repeat(101)).is_err());

        assert!(InputValidator::validate_email("guest@example.com").is_ok());
        assert!(InputValidator::validate_email("not-an-email").is_err());
    }

    #[test]
    fn test_validate_endpoint_url() {
        assert!(InputValidator::validate_endpoint_url("http://localhost:3000/api/upload").is_ok());
        assert!(InputValidator::validate_endpoint_url("https://photos.example.com/api/upload").is_ok());
        assert!(InputValidator::validate_endpoint_url("ftp://example.com").is_err());
        assert!(InputValidator::validate_endpoint_url("").is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        let safe = InputValidator::sanitize_filename("  my<photo>:1.jpg ");
        assert_eq!(safe, "my_photo__1.jpg");

        let long = InputValidator::sanitize_filename(&"a".repeat(300));
        assert_eq!(long.chars().count(), 255);
        assert!(long.ends_with("..."));
    }
}
