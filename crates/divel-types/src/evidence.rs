use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Classification tag for a piece of evidence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Document,
    Audio,
    Video,
    Image,
    Other,
}

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mpeg", "mov", "avi", "flv", "mpg", "webm", "wmv", "3gp", "mkv",
];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "aac", "m4a", "ogg", "flac"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp", "heic"];
const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "txt", "rtf", "odt", "csv", "xls", "xlsx", "eml", "json", "md",
];

impl FileType {
    /// Classify by file extension (case-insensitive, without the dot).
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        let ext = ext.as_str();
        if VIDEO_EXTENSIONS.contains(&ext) {
            Self::Video
        } else if AUDIO_EXTENSIONS.contains(&ext) {
            Self::Audio
        } else if IMAGE_EXTENSIONS.contains(&ext) {
            Self::Image
        } else if DOCUMENT_EXTENSIONS.contains(&ext) {
            Self::Document
        } else {
            Self::Other
        }
    }

    /// Classify a file by the extension of its path.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Other)
    }

    /// Classify by MIME type, e.g. `video/mp4` or `application/pdf`.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        let (top, sub) = mime.split_once('/').unwrap_or((mime.as_str(), ""));
        match top {
            "video" => Self::Video,
            "audio" => Self::Audio,
            "image" => Self::Image,
            "text" => Self::Document,
            "application" => match sub {
                "pdf" | "msword" | "rtf" | "json" => Self::Document,
                s if s.starts_with("vnd.openxmlformats-officedocument")
                    || s.starts_with("vnd.oasis.opendocument")
                    || s.starts_with("vnd.ms-") =>
                {
                    Self::Document
                }
                _ => Self::Other,
            },
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Image => "image",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = std::convert::Infallible;

    /// Accepts the tag names; anything else is `Other`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "document" => Self::Document,
            "audio" => Self::Audio,
            "video" => Self::Video,
            "image" => Self::Image,
            _ => Self::Other,
        })
    }
}

/// Role of the principal that submitted a piece of evidence.
///
/// Recorded for audit only; access control lives outside the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UploaderRole {
    Police,
    Forensics,
    Judge,
    Other(String),
}

impl UploaderRole {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Police => "police",
            Self::Forensics => "forensics",
            Self::Judge => "judge",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for UploaderRole {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            // "Polaris" is the police role name used by the upload front end.
            "police" | "polaris" => Self::Police,
            "forensics" => Self::Forensics,
            "judge" => Self::Judge,
            _ => Self::Other(s.trim().to_string()),
        }
    }
}

impl From<String> for UploaderRole {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<UploaderRole> for String {
    fn from(role: UploaderRole) -> Self {
        role.as_str().to_string()
    }
}

impl FromStr for UploaderRole {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for UploaderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
