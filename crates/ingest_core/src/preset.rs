//! Named option profiles and detection of the active one.

use serde_json::Value;

use crate::defaults::{
    AudioOptions, CommonOptions, DocumentOptions, OptionMap, TypeDefaults, VideoOptions,
};
use crate::run::RunOptions;

pub const CUSTOM_PRESET: &str = "custom";

/// The fields compared when matching presets. Per-type defaults are
/// normalized to plain booleans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetConfig {
    pub common: CommonOptions,
    pub store_remote: bool,
    pub review_before_storage: bool,
    pub diarize: bool,
    pub ocr: bool,
    pub captions: bool,
    pub advanced: OptionMap,
}

impl PresetConfig {
    pub fn from_options(options: &RunOptions) -> Self {
        Self {
            common: options.common,
            store_remote: options.store_remote,
            review_before_storage: options.review_before_storage,
            diarize: options.type_defaults.audio.diarize.unwrap_or(false),
            ocr: options.type_defaults.document.ocr.unwrap_or(false),
            captions: options.type_defaults.video.captions.unwrap_or(false),
            advanced: options.advanced.clone(),
        }
    }

    /// Write this preset over `options`, keeping unrelated settings such as
    /// the audio language.
    pub fn apply_to(&self, options: &mut RunOptions) {
        options.common = self.common;
        options.store_remote = self.store_remote;
        options.review_before_storage = self.review_before_storage;
        options.type_defaults = TypeDefaults {
            audio: AudioOptions {
                language: options.type_defaults.audio.language.clone(),
                diarize: Some(self.diarize),
            },
            document: DocumentOptions { ocr: Some(self.ocr) },
            video: VideoOptions {
                captions: Some(self.captions),
            },
        };
        options.advanced = self.advanced.clone();
    }

    fn matches(&self, other: &PresetConfig) -> bool {
        self.common == other.common
            && self.store_remote == other.store_remote
            && self.review_before_storage == other.review_before_storage
            && self.diarize == other.diarize
            && self.ocr == other.ocr
            && self.captions == other.captions
            && canonical_json(&Value::Object(self.advanced.clone()))
                == canonical_json(&Value::Object(other.advanced.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    pub config: PresetConfig,
}

fn preset(
    name: &'static str,
    (perform_analysis, perform_chunking, overwrite_existing): (bool, bool, bool),
    (store_remote, review_before_storage): (bool, bool),
    (diarize, ocr, captions): (bool, bool, bool),
) -> Preset {
    Preset {
        name,
        config: PresetConfig {
            common: CommonOptions {
                perform_analysis,
                perform_chunking,
                overwrite_existing,
            },
            store_remote,
            review_before_storage,
            diarize,
            ocr,
            captions,
            advanced: OptionMap::new(),
        },
    }
}

/// Built-in presets in match order.
pub fn builtin_presets() -> Vec<Preset> {
    vec![
        preset("quick", (false, false, false), (true, false), (false, false, false)),
        preset("standard", (true, true, false), (true, false), (false, false, false)),
        preset("deep", (true, true, false), (true, false), (true, true, true)),
        preset("review", (true, true, false), (false, true), (false, false, false)),
    ]
}

pub fn find_preset<'a>(presets: &'a [Preset], name: &str) -> Option<&'a Preset> {
    presets.iter().find(|preset| preset.name == name)
}

/// Name of the first preset equal to `config`, or [`CUSTOM_PRESET`].
pub fn detect_preset<'a>(config: &PresetConfig, presets: &'a [Preset]) -> &'a str {
    presets
        .iter()
        .find(|preset| preset.config.matches(config))
        .map(|preset| preset.name)
        .unwrap_or(CUSTOM_PRESET)
}

/// Serialize with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (index, key) in keys.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
