use bytes::Bytes;
use ingest_core::{update, AppState, Effect, FileHandle, Msg, QueueSnapshot};
use pretty_assertions::assert_eq;

fn persisted(effects: &[Effect]) -> Option<&QueueSnapshot> {
    effects.iter().rev().find_map(|effect| match effect {
        Effect::PersistQueue(snapshot) => Some(snapshot),
        _ => None,
    })
}

#[test]
fn queue_and_option_changes_emit_snapshot() {
    let state = AppState::new();
    let (state, effects) = update(state, Msg::InputChanged("https://x.test/a".to_string()));
    assert!(persisted(&effects).is_none());

    let (state, effects) = update(state, Msg::UrlsSubmitted);
    let snapshot = persisted(&effects).expect("snapshot after paste");
    assert_eq!(snapshot.entries.len(), 1);

    let (_state, effects) = update(state, Msg::PresetSelected("quick".to_string()));
    let snapshot = persisted(&effects).expect("snapshot after preset");
    assert_eq!(snapshot.selected_preset, "quick");
    assert!(!snapshot.options.common.perform_analysis);
}

#[test]
fn restore_round_trips_through_serde() {
    let state = AppState::new();
    let (state, _) = update(state, Msg::InputChanged("https://x.test/a\nhttps://x.test/b".to_string()));
    let (state, _) = update(state, Msg::UrlsSubmitted);
    let (state, _) = update(
        state,
        Msg::FilesAdded(vec![FileHandle {
            instance_id: "h1".to_string(),
            name: "a.txt".to_string(),
            size: 3,
            last_modified: 9,
            mime_type: Some("text/plain".to_string()),
            bytes: Bytes::from_static(b"abc"),
        }]),
    );
    let (state, _) = update(state, Msg::StoreRemoteToggled(false));
    let snapshot = state.snapshot();

    let encoded = serde_json::to_string(&snapshot).expect("encode");
    let decoded: QueueSnapshot = serde_json::from_str(&encoded).expect("decode");
    assert_eq!(decoded, snapshot);

    let (mut restored, effects) = update(AppState::new(), Msg::RestoreQueue(decoded));
    assert!(effects.is_empty(), "restoring does not persist again");
    assert!(restored.consume_dirty());
    assert_eq!(restored.queue().entries(), state.queue().entries());
    assert_eq!(restored.options(), state.options());
    assert_eq!(restored.view().selected_preset, "custom");
    assert!(restored.has_missing_files());

    // Ids keep counting past restored ones.
    let (restored, _) = update(restored, Msg::InputChanged("https://x.test/c".to_string()));
    let (restored, _) = update(restored, Msg::UrlsSubmitted);
    let ids: Vec<String> = restored
        .queue()
        .entries()
        .iter()
        .map(|entry| entry.id.to_string())
        .collect();
    assert_eq!(ids, vec!["item-1", "item-2", "item-4"]);
}

#[test]
fn missing_fields_fall_back_to_defaults() {
    let decoded: QueueSnapshot = serde_json::from_str("{}").expect("decode");
    assert_eq!(decoded, QueueSnapshot::default());
    assert_eq!(decoded.selected_preset, "standard");
}
