use ingest_core::{
    effective_options, merge_defaults, update, AppState, AudioOptions, DocumentOptions,
    EntryOverrides, EntryPatch, MediaType, Msg, OptionMap, TypeDefaults,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn map(value: Value) -> OptionMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[test]
fn merge_drops_empty_values_and_collapses_to_none() {
    let baseline = map(json!({ "language": "en", "diarize": false, "note": "" }));
    let overrides = map(json!({ "language": null, "diarize": true, "extra": [] }));

    let merged = merge_defaults(Some(&baseline), Some(&overrides));

    assert_eq!(merged, Some(map(json!({ "diarize": true }))));
    for value in merged.iter().flat_map(|merged| merged.values()) {
        assert!(!ingest_core::is_empty_value(value));
    }
}

#[test]
fn merge_of_nothing_is_none_not_empty_map() {
    assert_eq!(merge_defaults(None, None), None);
    assert_eq!(merge_defaults(Some(&OptionMap::new()), None), None);

    let baseline = map(json!({ "ocr": null }));
    let overrides = map(json!({ "ocr": "  " }));
    assert_eq!(merge_defaults(Some(&baseline), Some(&overrides)), None);
}

#[test]
fn override_for_other_family_does_not_leak() {
    let defaults = TypeDefaults {
        audio: AudioOptions {
            language: Some("de".to_string()),
            diarize: None,
        },
        document: DocumentOptions { ocr: Some(true) },
        ..TypeDefaults::default()
    };
    let overrides = EntryOverrides {
        audio: Some(AudioOptions {
            language: Some("fr".to_string()),
            diarize: Some(true),
        }),
        ..EntryOverrides::default()
    };

    assert_eq!(
        effective_options(MediaType::Pdf, &defaults, &overrides),
        Some(map(json!({ "ocr": true })))
    );
    assert_eq!(
        effective_options(MediaType::Audio, &defaults, &overrides),
        Some(map(json!({ "language": "fr", "diarize": true })))
    );
    assert_eq!(effective_options(MediaType::Html, &defaults, &overrides), None);
}

fn first_entry_customized(state: &AppState) -> bool {
    state.view().entries[0].customized
}

#[test]
fn customized_tracks_type_keywords_and_overrides() {
    let state = AppState::new();
    let (state, _) = update(
        state,
        Msg::AddEntry {
            url: "https://x.test/a".to_string(),
            media_type: MediaType::Auto,
        },
    );
    assert!(!first_entry_customized(&state));
    let id = state.queue().entries()[0].id.clone();

    let (state, _) = update(
        state,
        Msg::UpdateEntry {
            id: id.clone(),
            patch: EntryPatch {
                overrides: Some(EntryOverrides {
                    document: Some(DocumentOptions { ocr: None }),
                    ..EntryOverrides::default()
                }),
                ..EntryPatch::default()
            },
        },
    );
    assert!(!first_entry_customized(&state), "an empty override changes nothing");

    let (state, _) = update(
        state,
        Msg::UpdateEntry {
            id: id.clone(),
            patch: EntryPatch {
                overrides: Some(EntryOverrides {
                    document: Some(DocumentOptions { ocr: Some(true) }),
                    ..EntryOverrides::default()
                }),
                ..EntryPatch::default()
            },
        },
    );
    assert!(first_entry_customized(&state));

    let (state, _) = update(
        state,
        Msg::UpdateEntry {
            id: id.clone(),
            patch: EntryPatch {
                overrides: Some(EntryOverrides::default()),
                keywords: Some(vec!["  ".to_string(), "news".to_string()]),
                ..EntryPatch::default()
            },
        },
    );
    assert_eq!(state.queue().entries()[0].keywords, vec!["news".to_string()]);
    assert!(first_entry_customized(&state));

    let (state, _) = update(
        state,
        Msg::UpdateEntry {
            id,
            patch: EntryPatch {
                keywords: Some(Vec::new()),
                media_type: Some(MediaType::Video),
                ..EntryPatch::default()
            },
        },
    );
    assert!(first_entry_customized(&state));
}

#[test]
fn entry_defaults_snapshot_is_not_rewritten() {
    let state = AppState::new();
    let (state, _) = update(
        state,
        Msg::AddEntry {
            url: "https://x.test/talk.mp3".to_string(),
            media_type: MediaType::Auto,
        },
    );
    let snapshot = state.queue().entries()[0].defaults.clone();

    let (state, _) = update(
        state,
        Msg::TypeDefaultsChanged(TypeDefaults {
            audio: AudioOptions {
                language: Some("en".to_string()),
                diarize: Some(true),
            },
            ..TypeDefaults::default()
        }),
    );

    assert_eq!(state.queue().entries()[0].defaults, snapshot);
    assert!(!first_entry_customized(&state));
}
