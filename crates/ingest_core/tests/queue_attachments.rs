use bytes::Bytes;
use ingest_core::{
    update, AppState, AttachmentTracker, ConnectionStatus, Effect, FileHandle, InstanceRebind,
    ItemId, MediaType, Msg, QueueStore, RunBlocked, TypeDefaults,
};
use pretty_assertions::assert_eq;

fn handle(instance_id: &str, name: &str, size: u64, last_modified: i64) -> FileHandle {
    FileHandle {
        instance_id: instance_id.to_string(),
        name: name.to_string(),
        size,
        last_modified,
        mime_type: None,
        bytes: Bytes::from(vec![0u8; size as usize]),
    }
}

fn submit_urls(state: AppState, input: &str) -> (AppState, Vec<Effect>) {
    let (state, _) = update(state, Msg::InputChanged(input.to_string()));
    update(state, Msg::UrlsSubmitted)
}

#[test]
fn add_files_skips_duplicates_of_attached_files() {
    ingest_logging::initialize_for_tests();
    let mut queue = QueueStore::new();
    let mut tracker = AttachmentTracker::new();
    let defaults = TypeDefaults::default();

    let outcome = queue.add_files(
        vec![handle("h1", "a.txt", 3, 10), handle("h2", "b.txt", 4, 10)],
        &mut tracker,
        &defaults,
    );
    assert_eq!(outcome.added.len(), 2);
    assert_eq!(outcome.skipped_duplicates, 0);

    let outcome = queue.add_files(vec![handle("h3", "a.txt", 3, 10)], &mut tracker, &defaults);
    assert!(outcome.added.is_empty());
    assert_eq!(outcome.skipped_duplicates, 1);
    assert_eq!(queue.stubs().len(), 2);
}

#[test]
fn reload_leaves_stubs_missing_until_reattached() {
    ingest_logging::initialize_for_tests();
    let state = AppState::new();
    let (state, _) = update(
        state,
        Msg::FilesAdded(vec![handle("h1", "report.pdf", 8, 42)]),
    );
    let snapshot = state.snapshot();

    let state = AppState::new();
    let (state, _) = update(state, Msg::ConnectivityChanged(ConnectionStatus::Online));
    let (state, _) = update(state, Msg::RestoreQueue(snapshot));
    let view = state.view();
    assert!(view.has_missing_files);
    assert!(view.files[0].missing);
    assert_eq!(view.planned_count, 0);
    assert!(!view.can_run);

    let (state, effects) = update(state, Msg::RunClicked);
    assert!(!effects.iter().any(|effect| matches!(effect, Effect::SubmitBatch(_))));
    assert_eq!(
        state.view().blocked_reason,
        Some(RunBlocked::MissingFiles { count: 1 }.to_string())
    );

    let (state, effects) = update(
        state,
        Msg::FilesAdded(vec![handle("h9", "report.pdf", 8, 42)]),
    );
    let stub_id = state.queue().stubs()[0].id.clone();
    assert_eq!(state.queue().stubs().len(), 1);
    assert!(!state.has_missing_files());
    assert_eq!(state.planned_count(), 1);
    assert!(effects.contains(&Effect::RebindStubs(vec![InstanceRebind {
        stub_id: stub_id.clone(),
        instance_id: "h9".to_string(),
    }])));

    let (state, _) = update(
        state,
        Msg::StubsRebound(vec![InstanceRebind {
            stub_id,
            instance_id: "h9".to_string(),
        }]),
    );
    assert_eq!(state.queue().stubs()[0].instance_id.as_deref(), Some("h9"));
    assert!(state.attachment_report().rebinds.is_empty());
}

#[test]
fn missing_files_block_run_regardless_of_planned_count() {
    ingest_logging::initialize_for_tests();
    let state = AppState::new();
    let (state, _) = update(state, Msg::FilesAdded(vec![handle("h1", "a.mp3", 5, 1)]));
    let snapshot = state.snapshot();

    let state = AppState::new();
    let (state, _) = update(state, Msg::ConnectivityChanged(ConnectionStatus::Online));
    let (state, _) = update(state, Msg::RestoreQueue(snapshot));
    let (state, _) = submit_urls(state, "https://x.test/a\nhttps://x.test/b\n");

    assert_eq!(state.planned_count(), 2);
    assert!(state.has_missing_files());
    assert_eq!(
        state.run_precondition(),
        Err(RunBlocked::MissingFiles { count: 1 })
    );
}

#[test]
fn identical_signatures_claim_distinct_handles() {
    let mut queue = QueueStore::new();
    let mut tracker = AttachmentTracker::new();
    let defaults = TypeDefaults::default();
    queue.add_files(vec![handle("h1", "a.txt", 3, 10)], &mut tracker, &defaults);
    let first = queue.stubs()[0].clone();

    // Second stub with the same signature, as restored from a previous session.
    let mut restored = first.clone();
    restored.id = ItemId::from("item-99");
    restored.instance_id = Some("old".to_string());
    let queue = QueueStore::from_parts(Vec::new(), vec![first, restored], 99);

    let report = tracker.reconcile(queue.stubs());
    assert_eq!(report.attached.len(), 1);
    assert_eq!(report.missing.len(), 1);
    assert_eq!(report.missing[0].id, ItemId::from("item-99"));

    tracker.attach(handle("h2", "a.txt", 3, 10));
    let report = tracker.reconcile(queue.stubs());
    assert_eq!(report.attached.len(), 2);
    assert_eq!(report.handle_for_stub[&ItemId::from("item-99")].instance_id, "h2");
}

#[test]
fn paste_dedupes_and_schedules_expansion() {
    ingest_logging::initialize_for_tests();
    let state = AppState::new();
    let (state, effects) = submit_urls(
        state,
        "https://x.test/a \n\n https://X.test/a/\nhttps://x.test/b\n",
    );

    let view = state.view();
    assert_eq!(view.input, "");
    assert_eq!(view.entries.len(), 2);
    assert_eq!(view.entries[0].media_type, MediaType::Auto);
    let stats = view.last_paste_stats.expect("paste stats");
    assert_eq!((stats.added, stats.skipped), (2, 1));

    let scheduled: Vec<&str> = effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::ScheduleExpansion { url, .. } => Some(url.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(scheduled, vec!["https://x.test/a", "https://x.test/b"]);
    assert!(matches!(effects.last(), Some(Effect::PersistQueue(_))));

    let (state, effects) = submit_urls(state, "https://x.test/b\n");
    assert_eq!(state.queue().entries().len(), 2);
    assert!(effects.is_empty());
}

#[test]
fn expansion_splices_children_in_place() {
    ingest_logging::initialize_for_tests();
    let playlist = "https://www.youtube.com/watch?v=x&list=PL123";
    let state = AppState::new();
    let (state, _) = submit_urls(state, &format!("https://x.test/first\n{playlist}\nhttps://x.test/last"));
    let playlist_id = state.queue().entries()[1].id.clone();

    let (state, effects) = update(
        state,
        Msg::PlaylistExpanded {
            entry_id: playlist_id,
            source_url: playlist.to_string(),
            child_urls: vec![
                "https://www.youtube.com/watch?v=1".to_string(),
                "https://www.youtube.com/watch?v=2".to_string(),
                "https://www.youtube.com/watch?v=1".to_string(),
            ],
        },
    );

    let urls: Vec<&str> = state
        .queue()
        .entries()
        .iter()
        .map(|entry| entry.url.as_str())
        .collect();
    assert_eq!(
        urls,
        vec![
            "https://x.test/first",
            "https://www.youtube.com/watch?v=1",
            "https://www.youtube.com/watch?v=2",
            "https://x.test/last",
        ]
    );
    assert!(matches!(effects.as_slice(), [Effect::PersistQueue(_)]));
}

#[test]
fn stale_expansion_is_dropped() {
    ingest_logging::initialize_for_tests();
    let playlist = "https://www.youtube.com/playlist?list=PL123";
    let state = AppState::new();
    let (state, _) = submit_urls(state, playlist);
    let id = state.queue().entries()[0].id.clone();

    let (state, _) = update(
        state,
        Msg::UpdateEntry {
            id: id.clone(),
            patch: ingest_core::EntryPatch {
                url: Some("https://x.test/other".to_string()),
                ..Default::default()
            },
        },
    );
    let before = state.queue().clone();
    let (state, effects) = update(
        state,
        Msg::PlaylistExpanded {
            entry_id: id,
            source_url: playlist.to_string(),
            child_urls: vec!["https://www.youtube.com/watch?v=1".to_string()],
        },
    );

    assert_eq!(state.queue(), &before);
    assert!(effects.is_empty());
}

#[test]
fn clear_all_drops_entries_stubs_and_handles() {
    let state = AppState::new();
    let (state, _) = submit_urls(state, "https://x.test/a");
    let (state, _) = update(state, Msg::FilesAdded(vec![handle("h1", "a.txt", 3, 1)]));
    let (state, effects) = update(state, Msg::ClearAll);

    assert!(state.queue().is_empty());
    assert_eq!(state.planned_count(), 0);
    assert!(matches!(effects.as_slice(), [Effect::PersistQueue(_)]));
}
