use std::path::{Path, PathBuf};

use crate::errors::{AppError, AppResult};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Convert a byte count into (binary) megabytes.
pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// Guess a MIME type from the file extension.
pub fn detect_mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

pub fn is_image_mime(mime_type: &str) -> bool {
    mime_type.starts_with("image/")
}

pub fn is_video_mime(mime_type: &str) -> bool {
    mime_type.starts_with("video/")
}

pub fn is_media_mime(mime_type: &str) -> bool {
    is_image_mime(mime_type) || is_video_mime(mime_type)
}

/// Expand the given paths into a flat list of files.
///
/// Directories contribute the media files directly inside them, sorted by
/// name. Plain files are kept as given, even if their type is unknown, so
/// validation can report them.
pub fn collect_media_files(paths: &[PathBuf]) -> AppResult<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if !path.exists() {
            return Err(AppError::file_not_found(&path.to_string_lossy()));
        }

        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_media_mime(&detect_mime_type(p)))
                .collect();
            entries.sort();

            log::debug!(
                "Expanded directory {} into {} media files",
                path.display(),
                entries.len()
            );
            files.extend(entries);
        } else {
            files.push(path.clone());
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_mime_type() {
        assert_eq!(detect_mime_type(Path::new("a/photo.JPG")), "image/jpeg");
        assert_eq!(detect_mime_type(Path::new("clip.mov")), "video/quicktime");
        assert_eq!(detect_mime_type(Path::new("IMG_0042.png")), "image/png");
        assert_eq!(detect_mime_type(Path::new("party.webm")), "video/webm");
        assert_eq!(detect_mime_type(Path::new("notes.txt")), "text/plain");
        assert!(!is_media_mime(&detect_mime_type(Path::new("notes.txt"))));
        assert_eq!(detect_mime_type(Path::new("no_extension")), "application/octet-stream");
    }

    #[test]
    fn test_bytes_to_mb() {
        assert_eq!(bytes_to_mb(0), 0.0);
        assert_eq!(bytes_to_mb(50 * 1024 * 1024), 50.0);
        assert!(bytes_to_mb(1) > 0.0);
    }

    #[test]
    fn test_collect_media_files_expands_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.jpg"), b"b").unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"a").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"skip").unwrap();

        let files = collect_media_files(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["a.mp4", "b.jpg"]);
    }

    #[test]
    fn test_collect_media_files_missing_path() {
        let result = collect_media_files(&[PathBuf::from("definitely_missing_dir_xyz")]);
        assert!(matches!(result, Err(AppError::FileNotFound { .. })));
    }
}
