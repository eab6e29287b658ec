//! Review drafts: the pure half of turning successful results into local drafts.
//!
//! Planning (title, content, format, sections) happens here; stamping the
//! batch, storing assets and persisting records happens in the engine.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::media::MediaType;
use crate::payload::{extract_sub_items, first_string, is_error_label, status_label};
use crate::queue::ItemId;
use crate::reconcile::{ResultItem, ResultStatus};

pub const FALLBACK_TITLE: &str = "Untitled";

const CONTENT_KEYS: &[&str] = &[
    "content",
    "text",
    "transcript",
    "transcription",
    "summary",
    "analysis_content",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    Markdown,
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub level: u8,
    /// Byte offset of the heading line within the content.
    pub offset: usize,
}

/// Splits content into sections. Hosts may plug in a richer detector.
pub trait SectionDetector: Send + Sync {
    fn detect(&self, content: &str, format: ContentFormat) -> Vec<Section>;
}

/// Markdown ATX headings become sections; plain text has none.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadingSectionDetector;

impl SectionDetector for HeadingSectionDetector {
    fn detect(&self, content: &str, format: ContentFormat) -> Vec<Section> {
        if format != ContentFormat::Markdown {
            return Vec::new();
        }
        let mut sections = Vec::new();
        let mut offset = 0;
        let mut in_fence = false;
        for line in content.split_inclusive('\n') {
            let trimmed = line.trim_end();
            if trimmed.trim_start().starts_with("```") {
                in_fence = !in_fence;
            } else if !in_fence {
                if let Some((level, title)) = parse_heading(trimmed) {
                    sections.push(Section {
                        title: title.to_string(),
                        level,
                        offset,
                    });
                }
            }
            offset += line.len();
        }
        sections
    }
}

fn parse_heading(line: &str) -> Option<(u8, &str)> {
    let hashes = line.chars().take_while(|ch| *ch == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    let title = rest.trim();
    if title.is_empty() {
        None
    } else {
        Some((hashes as u8, title))
    }
}

/// Headings, fenced blocks, or bullet/numbered lists mark content as markdown.
pub fn infer_format(content: &str) -> ContentFormat {
    let markdown = content.lines().any(|line| {
        let line = line.trim_start();
        parse_heading(line.trim_end()).is_some()
            || line.starts_with("```")
            || line.starts_with("- ")
            || line.starts_with("* ")
            || line.starts_with("+ ")
            || is_numbered_item(line)
    });
    if markdown {
        ContentFormat::Markdown
    } else {
        ContentFormat::Plain
    }
}

fn is_numbered_item(line: &str) -> bool {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && line[digits..].starts_with(". ")
}

/// First non-empty content field; arrays are joined by newline.
pub fn resolve_content(item: &Map<String, Value>) -> Option<String> {
    CONTENT_KEYS
        .iter()
        .filter_map(|key| item.get(*key))
        .filter_map(content_text)
        .find(|text| !text.trim().is_empty())
}

fn content_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let lines: Vec<String> = parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(text) => Some(text.clone()),
                    Value::Object(map) => first_string(map, &["text", "content"]).map(str::to_string),
                    _ => None,
                })
                .filter(|text| !text.trim().is_empty())
                .collect();
            if lines.is_empty() {
                None
            } else {
                Some(lines.join("\n"))
            }
        }
        _ => None,
    }
}

/// Explicit title, then metadata title, then the original reference, then a fallback.
pub fn resolve_title(item: &Map<String, Value>, result: &ResultItem) -> String {
    first_string(item, &["title"])
        .or_else(|| {
            item.get("metadata")
                .and_then(Value::as_object)
                .and_then(|metadata| first_string(metadata, &["title"]))
        })
        .or_else(|| first_string(item, &["url", "source_url"]))
        .or(result.url.as_deref())
        .or(result.file_name.as_deref())
        .unwrap_or(FALLBACK_TITLE)
        .to_string()
}

fn resolve_keywords(item: &Map<String, Value>, fallback: &[String]) -> Vec<String> {
    let from_item: Vec<String> = match item.get("keywords") {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .map(|keyword| keyword.trim().to_string())
            .filter(|keyword| !keyword.is_empty())
            .collect(),
        Some(Value::String(joined)) => joined
            .split(',')
            .map(|keyword| keyword.trim().to_string())
            .filter(|keyword| !keyword.is_empty())
            .collect(),
        _ => Vec::new(),
    };
    if from_item.is_empty() {
        fallback.to_vec()
    } else {
        from_item
    }
}

/// Binary of a local file that produced a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub stub_id: ItemId,
    pub name: String,
    pub size: u64,
    pub mime_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSource {
    pub result: ResultItem,
    pub keywords: Vec<String>,
    pub file: Option<SourceFile>,
}

/// Everything needed to (re)build one run's drafts. Retrying reuses it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DraftRequest {
    pub sources: Vec<ReviewSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSource {
    pub result_id: Option<ItemId>,
    pub url: Option<String>,
    pub file_name: Option<String>,
    pub media_type: Option<MediaType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftPlan {
    pub title: String,
    pub content: String,
    pub format: ContentFormat,
    pub sections: Vec<Section>,
    pub keywords: Vec<String>,
    pub source: DraftSource,
    pub file: Option<SourceFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DraftPlanSet {
    pub plans: Vec<DraftPlan>,
    pub skipped_items: usize,
}

/// Plan one draft per non-failed sub-item of every `ok` result.
pub fn plan_drafts(request: &DraftRequest, detector: &dyn SectionDetector) -> DraftPlanSet {
    let mut set = DraftPlanSet::default();
    for source in &request.sources {
        if source.result.status != ResultStatus::Ok {
            continue;
        }
        for item in extract_sub_items(&source.result.data) {
            if status_label(item).is_some_and(|label| is_error_label(&label)) {
                set.skipped_items += 1;
                continue;
            }
            let content = resolve_content(item).unwrap_or_default();
            let format = infer_format(&content);
            let sections = detector.detect(&content, format);
            set.plans.push(DraftPlan {
                title: resolve_title(item, &source.result),
                content,
                format,
                sections,
                keywords: resolve_keywords(item, &source.keywords),
                source: DraftSource {
                    result_id: source.result.id.clone(),
                    url: source.result.url.clone(),
                    file_name: source.result.file_name.clone(),
                    media_type: source.result.media_type,
                },
                file: source.file.clone(),
            });
        }
    }
    set
}

/// Reference to a stored binary asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    /// Hex SHA-256 of the content.
    pub digest: String,
    pub size: u64,
    pub mime_type: Option<String>,
}

/// File provenance kept when the asset itself could not be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub name: String,
    pub size: u64,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub id: String,
    pub batch_id: String,
    pub title: String,
    pub content: String,
    pub format: ContentFormat,
    pub sections: Vec<Section>,
    pub keywords: Vec<String>,
    pub source: DraftSource,
    pub asset: Option<AssetRef>,
    pub file_meta: Option<FileMeta>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftBatch {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub draft_ids: Vec<String>,
    pub skipped_assets: usize,
}

impl DraftBatch {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Result of one draft build. `batch_id` is `None` when nothing was extractable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DraftBuildSummary {
    pub batch_id: Option<String>,
    pub draft_count: usize,
    pub skipped_items: usize,
    pub skipped_assets: usize,
}
