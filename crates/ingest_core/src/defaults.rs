//! Per-media-type defaults and the override merge used for every submitted item.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::media::MediaType;

/// Flat bag of option values as sent to the execution agent.
pub type OptionMap = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diarize: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VideoOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captions: Option<bool>,
}

/// Global defaults, one bag per media family.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TypeDefaults {
    #[serde(default)]
    pub audio: AudioOptions,
    #[serde(default)]
    pub document: DocumentOptions,
    #[serde(default)]
    pub video: VideoOptions,
}

/// Per-entry overrides. Absent sections inherit the type defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntryOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoOptions>,
}

impl EntryOverrides {
    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.document.is_none() && self.video.is_none()
    }
}

/// The three common processing switches shared by every item in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommonOptions {
    pub perform_analysis: bool,
    pub perform_chunking: bool,
    pub overwrite_existing: bool,
}

/// Media family whose defaults apply to a concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionFamily {
    Audio,
    Document,
    Video,
}

pub fn family_for(media_type: MediaType) -> Option<OptionFamily> {
    match media_type {
        MediaType::Audio => Some(OptionFamily::Audio),
        MediaType::Pdf | MediaType::Document => Some(OptionFamily::Document),
        MediaType::Video => Some(OptionFamily::Video),
        MediaType::Html | MediaType::Auto => None,
    }
}

/// Merge `overrides` over `baseline`.
///
/// Override keys with non-empty values win; empty, null or absent values are
/// removed from the result. An empty result collapses to `None`, meaning the
/// item inherits the server defaults.
pub fn merge_defaults(
    baseline: Option<&OptionMap>,
    overrides: Option<&OptionMap>,
) -> Option<OptionMap> {
    let mut merged = OptionMap::new();
    if let Some(baseline) = baseline {
        for (key, value) in baseline {
            if !is_empty_value(value) {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    if let Some(overrides) = overrides {
        for (key, value) in overrides {
            if is_empty_value(value) {
                merged.remove(key);
            } else {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    if merged.is_empty() {
        None
    } else {
        Some(merged)
    }
}

/// Null, blank strings, and empty containers count as "no value".
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Serialize a typed option bag into an [`OptionMap`].
pub fn to_option_map<T: Serialize>(options: &T) -> OptionMap {
    match serde_json::to_value(options) {
        Ok(Value::Object(map)) => map,
        _ => OptionMap::new(),
    }
}

impl TypeDefaults {
    pub fn for_family(&self, family: OptionFamily) -> OptionMap {
        match family {
            OptionFamily::Audio => to_option_map(&self.audio),
            OptionFamily::Document => to_option_map(&self.document),
            OptionFamily::Video => to_option_map(&self.video),
        }
    }

    /// Defaults for a concrete (already inferred) type.
    pub fn for_type(&self, media_type: MediaType) -> Option<OptionMap> {
        family_for(media_type).map(|family| self.for_family(family))
    }
}

impl EntryOverrides {
    pub fn for_family(&self, family: OptionFamily) -> Option<OptionMap> {
        match family {
            OptionFamily::Audio => self.audio.as_ref().map(to_option_map),
            OptionFamily::Document => self.document.as_ref().map(to_option_map),
            OptionFamily::Video => self.video.as_ref().map(to_option_map),
        }
    }
}

/// Effective per-item options: the inferred type's defaults merged with the
/// entry's override for the same family.
pub fn effective_options(
    inferred: MediaType,
    defaults: &TypeDefaults,
    overrides: &EntryOverrides,
) -> Option<OptionMap> {
    let family = family_for(inferred)?;
    let baseline = defaults.for_family(family);
    let override_map = overrides.for_family(family);
    merge_defaults(Some(&baseline), override_map.as_ref())
}

/// True when any override section changes the outcome relative to `snapshot`.
pub fn overrides_differ(snapshot: &TypeDefaults, overrides: &EntryOverrides) -> bool {
    [OptionFamily::Audio, OptionFamily::Document, OptionFamily::Video]
        .into_iter()
        .any(|family| {
            let Some(override_map) = overrides.for_family(family) else {
                return false;
            };
            let baseline = snapshot.for_family(family);
            merge_defaults(Some(&baseline), Some(&override_map))
                != merge_defaults(Some(&baseline), None)
        })
}
