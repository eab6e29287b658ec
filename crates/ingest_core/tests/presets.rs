use ingest_core::{
    builtin_presets, canonical_json, detect_preset, find_preset, update, AppState, CommonOptions,
    Msg, PresetConfig, RunOptions, CUSTOM_PRESET,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn quick() -> PresetConfig {
    PresetConfig {
        common: CommonOptions {
            perform_analysis: false,
            perform_chunking: false,
            overwrite_existing: false,
        },
        store_remote: true,
        review_before_storage: false,
        diarize: false,
        ocr: false,
        captions: false,
        advanced: Default::default(),
    }
}

#[test]
fn quick_config_is_detected() {
    assert_eq!(detect_preset(&quick(), &builtin_presets()), "quick");
}

#[test]
fn flipping_any_field_is_custom() {
    let presets = builtin_presets();
    let flips: Vec<fn(&mut PresetConfig)> = vec![
        |config| config.common.perform_analysis = true,
        |config| config.common.overwrite_existing = true,
        |config| config.store_remote = false,
        |config| config.review_before_storage = true,
        |config| config.diarize = true,
        |config| config.ocr = true,
        |config| config.captions = true,
        |config| {
            config.advanced.insert("chunk_size".to_string(), json!(500));
        },
    ];
    for flip in flips {
        let mut config = quick();
        flip(&mut config);
        assert_eq!(detect_preset(&config, &presets), CUSTOM_PRESET, "{config:?}");
    }
}

#[test]
fn chunking_alone_is_custom() {
    let mut config = quick();
    config.common.perform_chunking = true;
    assert_eq!(detect_preset(&config, &builtin_presets()), CUSTOM_PRESET);
}

#[test]
fn canonical_json_ignores_key_order() {
    let left = json!({ "b": { "y": 1, "x": [ { "q": 1, "p": 2 } ] }, "a": true });
    let right = json!({ "a": true, "b": { "x": [ { "p": 2, "q": 1 } ], "y": 1 } });

    assert_eq!(canonical_json(&left), canonical_json(&right));
    assert_eq!(canonical_json(&json!({ "b": 1, "a": 2 })), r#"{"a":2,"b":1}"#);
}

#[test]
fn advanced_values_compare_canonically() {
    let presets = builtin_presets();
    let mut custom_presets = presets.clone();
    custom_presets[0].config.advanced = match json!({ "a": 1, "b": { "d": 2, "c": 3 } }) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    };
    let mut config = quick();
    config.advanced = match json!({ "b": { "c": 3, "d": 2 }, "a": 1 }) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    };

    assert_eq!(detect_preset(&config, &custom_presets), "quick");
}

#[test]
fn default_options_match_standard_and_selection_round_trips() {
    assert_eq!(
        detect_preset(
            &PresetConfig::from_options(&RunOptions::default()),
            &builtin_presets()
        ),
        "standard"
    );

    let state = AppState::new();
    assert_eq!(state.view().selected_preset, "standard");

    let (state, _) = update(state, Msg::PresetSelected("deep".to_string()));
    assert_eq!(state.view().selected_preset, "deep");
    assert_eq!(state.options().type_defaults.video.captions, Some(true));

    let (state, _) = update(state, Msg::ReviewToggled(true));
    assert_eq!(state.view().selected_preset, CUSTOM_PRESET);

    let presets = builtin_presets();
    let review = find_preset(&presets, "review").expect("review preset");
    let (state, _) = update(state, Msg::PresetSelected(review.name.to_string()));
    assert_eq!(state.view().selected_preset, "review");
    assert!(!state.options().effective_store_remote());
}

#[test]
fn unknown_preset_selection_is_ignored() {
    let state = AppState::new();
    let (next, effects) = update(state.clone(), Msg::PresetSelected("turbo".to_string()));
    assert_eq!(next.options(), state.options());
    assert!(effects.is_empty());
}
