//! File classification and acceptance rules
//!
//! Decides whether a group message carries a video worth mirroring and
//! extracts a validated `FileInfo` at the boundary, so everything
//! downstream works with a concrete struct instead of raw message
//! accessors.

use rand::distributions::Alphanumeric;
use rand::Rng;
use teloxide::types::Message;

use crate::core::config;

/// MIME types accepted from explicit videos and video documents
pub const SUPPORTED_MIME_TYPES: &[&str] = &[
    "video/mp4",
    "video/avi",
    "video/mkv",
    "video/mov",
    "video/wmv",
    "video/flv",
    "video/webm",
    "video/m4v",
    "video/3gp",
    "video/3gpp",
    "video/quicktime",
];

/// Filename extensions accepted for documents without a usable MIME type
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".mp4", ".avi", ".mkv", ".mov", ".wmv", ".flv", ".webm", ".m4v", ".3gp", ".qt",
];

/// Validated description of an upload candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub file_id: String,
    pub file_unique_id: String,
    pub original_filename: String,
    pub file_size: i64,
    pub mime_type: String,
    /// Seconds; 0 when the source carries no duration (documents)
    pub duration: i64,
    /// (width, height) when known; documents carry no dimensions
    pub dimensions: Option<(u32, u32)>,
}

/// Why a candidate was rejected (always silent toward the group)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    TooShort,
    TooSmall,
    TooLarge,
    LowResolution,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RejectReason::TooShort => "duration at or below the minimum",
            RejectReason::TooSmall => "file smaller than the minimum size",
            RejectReason::TooLarge => "file larger than the hosting limit",
            RejectReason::LowResolution => "resolution below 240x240",
        };
        f.write_str(text)
    }
}

impl FileInfo {
    /// Extracts a candidate from a message: an explicit video, or a
    /// document whose MIME type or extension marks it as one.
    pub fn from_message(msg: &Message) -> Option<FileInfo> {
        if let Some(video) = msg.video() {
            let mime = video
                .mime_type
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "video/mp4".to_string());
            let name = video
                .file_name
                .clone()
                .unwrap_or_else(|| format!("video_{}.mp4", video.file.unique_id.0));
            return Some(FileInfo {
                file_id: video.file.id.0.clone(),
                file_unique_id: video.file.unique_id.0.clone(),
                original_filename: name,
                file_size: i64::from(video.file.size),
                mime_type: mime,
                duration: i64::from(video.duration.seconds()),
                dimensions: Some((video.width, video.height)),
            });
        }

        if let Some(document) = msg.document() {
            let mime = document.mime_type.as_ref().map(|m| m.to_string());
            let name = document.file_name.clone();
            if !is_video_document(mime.as_deref(), name.as_deref()) {
                return None;
            }
            return Some(FileInfo {
                file_id: document.file.id.0.clone(),
                file_unique_id: document.file.unique_id.0.clone(),
                original_filename: name.unwrap_or_else(|| format!("video_{}.mp4", document.file.unique_id.0)),
                file_size: i64::from(document.file.size),
                mime_type: mime.unwrap_or_else(|| "video/mp4".to_string()),
                duration: 0,
                dimensions: None,
            });
        }

        None
    }

    /// Applies the acceptance rules. Duplicate suppression is a storage
    /// concern and happens separately.
    pub fn validate(&self) -> Result<(), RejectReason> {
        if self.duration <= config::upload::MIN_DURATION_SECS {
            return Err(RejectReason::TooShort);
        }
        if self.file_size < config::upload::MIN_FILE_SIZE_BYTES {
            return Err(RejectReason::TooSmall);
        }
        if self.file_size > config::upload::MAX_FILE_SIZE_BYTES {
            return Err(RejectReason::TooLarge);
        }
        if let Some((width, height)) = self.dimensions {
            if width < config::upload::MIN_DIMENSION_PX || height < config::upload::MIN_DIMENSION_PX {
                return Err(RejectReason::LowResolution);
            }
        }
        Ok(())
    }
}

/// Document heuristic: supported MIME type, or a supported extension
pub fn is_video_document(mime_type: Option<&str>, file_name: Option<&str>) -> bool {
    if let Some(mime) = mime_type {
        if SUPPORTED_MIME_TYPES.contains(&mime.to_ascii_lowercase().as_str()) {
            return true;
        }
    }
    if let Some(name) = file_name {
        let lower = name.to_ascii_lowercase();
        return SUPPORTED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext));
    }
    false
}

/// Replaces anything outside `[A-Za-z0-9._-]` with `_` and collapses
/// runs of underscores.
pub fn sanitize_filename(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    let mut last_was_underscore = false;
    for c in name.chars() {
        let keep = c.is_ascii_alphanumeric() || c == '.' || c == '-';
        if keep {
            sanitized.push(c);
            last_was_underscore = false;
        } else if !last_was_underscore {
            sanitized.push('_');
            last_was_underscore = true;
        }
    }
    sanitized
}

/// Generates the collision-resistant remote filename:
/// 12 random alphanumerics, an underscore, then the sanitized original.
pub fn random_remote_name(original: &str) -> String {
    let prefix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(config::upload::RANDOM_PREFIX_LEN)
        .map(char::from)
        .collect();
    format!("{}_{}", prefix, sanitize_filename(original))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample(duration: i64, size: i64, dimensions: Option<(u32, u32)>) -> FileInfo {
        FileInfo {
            file_id: "f1".to_string(),
            file_unique_id: "u1".to_string(),
            original_filename: "movie.mp4".to_string(),
            file_size: size,
            mime_type: "video/mp4".to_string(),
            duration,
            dimensions,
        }
    }

    const MB: i64 = 1024 * 1024;

    #[test]
    fn test_duration_bound_is_exclusive() {
        assert_eq!(sample(60, 10 * MB, None).validate(), Err(RejectReason::TooShort));
        assert!(sample(61, 10 * MB, None).validate().is_ok());
    }

    #[test]
    fn test_document_without_duration_is_rejected() {
        // Documents report no duration, which reads as zero
        assert_eq!(sample(0, 10 * MB, None).validate(), Err(RejectReason::TooShort));
    }

    #[test]
    fn test_size_bounds() {
        assert_eq!(sample(120, MB - 1, None).validate(), Err(RejectReason::TooSmall));
        assert!(sample(120, MB, None).validate().is_ok());
        assert!(sample(120, 2048 * MB, None).validate().is_ok());
        assert_eq!(sample(120, 2048 * MB + 1, None).validate(), Err(RejectReason::TooLarge));
    }

    #[test]
    fn test_resolution_bound() {
        assert_eq!(
            sample(120, 10 * MB, Some((320, 180))).validate(),
            Err(RejectReason::LowResolution)
        );
        assert!(sample(120, 10 * MB, Some((240, 240))).validate().is_ok());
        // Unknown resolution is not penalized
        assert!(sample(120, 10 * MB, None).validate().is_ok());
    }

    #[test]
    fn test_video_document_by_mime() {
        assert!(is_video_document(Some("video/x-matroska"), Some("a.mkv")));
        assert!(is_video_document(Some("video/quicktime"), None));
        assert!(!is_video_document(Some("application/pdf"), Some("a.pdf")));
    }

    #[test]
    fn test_video_document_by_extension() {
        assert!(is_video_document(None, Some("Holiday.MOV")));
        assert!(is_video_document(Some("application/octet-stream"), Some("clip.webm")));
        assert!(!is_video_document(None, Some("notes.txt")));
        assert!(!is_video_document(None, None));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("my movie (final).mp4"), "my_movie_final_.mp4");
        assert_eq!(sanitize_filename("a///b???c.mp4"), "a_b_c.mp4");
        assert_eq!(sanitize_filename("ok-name_1.mkv"), "ok-name_1.mkv");
    }

    #[test]
    fn test_random_remote_name_shape() {
        let name = random_remote_name("vacation video.mp4");
        let (prefix, rest) = name.split_once('_').unwrap();
        assert_eq!(prefix.len(), 12);
        assert!(prefix.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(rest, "vacation_video.mp4");

        // Two generations practically never collide
        assert_ne!(random_remote_name("a.mp4"), random_remote_name("a.mp4"));
    }
}
