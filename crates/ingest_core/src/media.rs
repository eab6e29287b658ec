use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Declared media type of a queued item. `Auto` defers to inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Auto,
    Html,
    Pdf,
    Document,
    Audio,
    Video,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Auto => "auto",
            MediaType::Html => "html",
            MediaType::Pdf => "pdf",
            MediaType::Document => "document",
            MediaType::Audio => "audio",
            MediaType::Video => "video",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(MediaType::Auto),
            "html" => Some(MediaType::Html),
            "pdf" => Some(MediaType::Pdf),
            "document" => Some(MediaType::Document),
            "audio" => Some(MediaType::Audio),
            "video" => Some(MediaType::Video),
            _ => None,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "flac", "ogg", "aac", "opus", "wma"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "mov", "avi", "m4v", "wmv", "flv"];
const DOCUMENT_EXTENSIONS: &[&str] = &[
    "doc", "docx", "odt", "rtf", "txt", "md", "markdown", "epub", "xml", "rst",
];
const VIDEO_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "youtu.be",
    "vimeo.com",
    "www.vimeo.com",
    "dailymotion.com",
    "www.dailymotion.com",
];

/// Resolve the concrete type of a remote url. Declared types win; `Auto` is
/// inferred from known video hosts and the path extension, defaulting to html.
pub fn infer_url_type(declared: MediaType, raw_url: &str) -> MediaType {
    if declared != MediaType::Auto {
        return declared;
    }
    let Ok(parsed) = Url::parse(raw_url.trim()) else {
        return MediaType::Html;
    };
    if let Some(host) = parsed.host_str() {
        let host = host.to_ascii_lowercase();
        if VIDEO_HOSTS.contains(&host.as_str()) {
            return MediaType::Video;
        }
    }
    let extension = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(extension_of);
    extension
        .and_then(|ext| type_for_extension(&ext))
        .unwrap_or(MediaType::Html)
}

/// Resolve the concrete type of a local file from its name and mime type.
pub fn infer_file_type(name: &str, mime_type: Option<&str>) -> MediaType {
    if let Some(mime) = mime_type.map(|m| m.trim().to_ascii_lowercase()) {
        if mime == "application/pdf" {
            return MediaType::Pdf;
        }
        if mime.starts_with("audio/") {
            return MediaType::Audio;
        }
        if mime.starts_with("video/") {
            return MediaType::Video;
        }
        if mime == "text/html" || mime == "application/xhtml+xml" {
            return MediaType::Html;
        }
    }
    extension_of(name)
        .and_then(|ext| type_for_extension(&ext))
        .unwrap_or(MediaType::Document)
}

fn extension_of(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

fn type_for_extension(ext: &str) -> Option<MediaType> {
    if ext == "pdf" {
        Some(MediaType::Pdf)
    } else if ext == "html" || ext == "htm" {
        Some(MediaType::Html)
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        Some(MediaType::Audio)
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        Some(MediaType::Video)
    } else if DOCUMENT_EXTENSIONS.contains(&ext) {
        Some(MediaType::Document)
    } else {
        None
    }
}
