use bytes::Bytes;
use ingest_core::{
    infer_format, plan_drafts, resolve_content, update, AgentResponse, AppState, ConnectionStatus,
    ContentFormat, DraftBuildSummary, DraftRequest, Effect, FileHandle, HeadingSectionDetector,
    ItemId, Msg, ProgressFragment, ResultItem, ResultStatus, ReviewSource, ReviewState, Section,
    SectionDetector,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn source(data: Value) -> ReviewSource {
    ReviewSource {
        result: ResultItem {
            id: Some(ItemId::from("item-1")),
            status: ResultStatus::Ok,
            outcome: None,
            url: Some("https://x.test/a".to_string()),
            file_name: None,
            media_type: None,
            data,
            error: None,
        },
        keywords: vec!["queued".to_string()],
        file: None,
    }
}

fn object(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[test]
fn plans_one_draft_per_successful_sub_item() {
    let request = DraftRequest {
        sources: vec![source(json!({ "results": [
            { "title": "First", "content": "# Intro\ntext\n## Details\nmore", "keywords": ["a", " b "] },
            { "status": "error", "content": "nope" },
            { "metadata": { "title": "From metadata" }, "transcript": ["line one", "line two"] },
            { "summary": "plain words" }
        ]}))],
    };

    let set = plan_drafts(&request, &HeadingSectionDetector);

    assert_eq!(set.skipped_items, 1);
    let titles: Vec<&str> = set.plans.iter().map(|plan| plan.title.as_str()).collect();
    assert_eq!(titles, vec!["First", "From metadata", "https://x.test/a"]);

    let first = &set.plans[0];
    assert_eq!(first.format, ContentFormat::Markdown);
    assert_eq!(first.keywords, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(
        first.sections,
        vec![
            Section {
                title: "Intro".to_string(),
                level: 1,
                offset: 0,
            },
            Section {
                title: "Details".to_string(),
                level: 2,
                offset: 13,
            },
        ]
    );

    assert_eq!(set.plans[1].content, "line one\nline two");
    assert_eq!(set.plans[1].format, ContentFormat::Plain);
    assert_eq!(set.plans[1].keywords, vec!["queued".to_string()]);
    assert_eq!(set.plans[2].source.result_id, Some(ItemId::from("item-1")));
}

#[test]
fn payload_without_sub_items_plans_nothing() {
    for data in [Value::Null, json!({}), json!([]), json!({ "results": [] })] {
        let set = plan_drafts(
            &DraftRequest {
                sources: vec![source(data)],
            },
            &HeadingSectionDetector,
        );
        assert!(set.plans.is_empty());
        assert_eq!(set.skipped_items, 0);
    }
}

#[test]
fn content_resolution_prefers_first_non_empty_key() {
    let item = object(json!({ "content": "  ", "text": "", "transcription": "spoken", "summary": "short" }));
    assert_eq!(resolve_content(&item).as_deref(), Some("spoken"));
    assert_eq!(resolve_content(&object(json!({ "title": "t" }))), None);
}

#[test]
fn markdown_heuristics() {
    assert_eq!(infer_format("- item\n- item"), ContentFormat::Markdown);
    assert_eq!(infer_format("1. first"), ContentFormat::Markdown);
    assert_eq!(infer_format("```\ncode\n```"), ContentFormat::Markdown);
    assert_eq!(infer_format("#hashtag only"), ContentFormat::Plain);
    assert_eq!(infer_format("just words"), ContentFormat::Plain);
}

#[test]
fn headings_inside_fences_are_not_sections() {
    let content = "# Real\n```\n# not a heading\n```\n";
    let sections = HeadingSectionDetector.detect(content, ContentFormat::Markdown);
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].title, "Real");
    assert!(HeadingSectionDetector
        .detect(content, ContentFormat::Plain)
        .is_empty());
}

fn settled_review_run(results: Vec<Value>) -> (AppState, Vec<Effect>) {
    let state = update(AppState::new(), Msg::ConnectivityChanged(ConnectionStatus::Online)).0;
    let (state, _) = update(state, Msg::ReviewToggled(true));
    let (state, _) = update(state, Msg::InputChanged("https://x.test/a".to_string()));
    let (state, _) = update(state, Msg::UrlsSubmitted);
    let (state, _) = update(
        state,
        Msg::FilesAdded(vec![FileHandle {
            instance_id: "h1".to_string(),
            name: "notes.md".to_string(),
            size: 5,
            last_modified: 7,
            mime_type: Some("text/markdown".to_string()),
            bytes: Bytes::from_static(b"# hi\n"),
        }]),
    );
    let (state, effects) = update(state, Msg::RunClicked);
    let request = effects
        .iter()
        .find_map(|effect| match effect {
            Effect::SubmitBatch(request) => Some(request.clone()),
            _ => None,
        })
        .expect("submitted");
    assert!(!request.store_remote);
    let results = results
        .into_iter()
        .zip(request.entries.iter().map(|e| &e.id).chain(request.files.iter().map(|f| &f.id)))
        .map(|(mut result, id)| {
            result["id"] = Value::String(id.to_string());
            result
        })
        .collect();
    update(
        state,
        Msg::SubmissionFinished(AgentResponse {
            ok: true,
            error: None,
            results,
        }),
    )
}

#[test]
fn review_run_requests_drafts_with_file_bytes() {
    let (state, effects) = settled_review_run(vec![
        json!({ "status": "ok", "data": { "content": "from url" } }),
        json!({ "status": "ok", "data": { "content": "from file" } }),
    ]);

    let request = match effects.as_slice() {
        [Effect::BuildDrafts(request)] => request.clone(),
        other => panic!("expected draft request, got {other:?}"),
    };
    assert_eq!(*state.review(), ReviewState::Building);
    assert_eq!(request.sources.len(), 2);
    assert!(request.sources[0].file.is_none());
    let file = request.sources[1].file.as_ref().expect("file source");
    assert_eq!(file.bytes, Bytes::from_static(b"# hi\n"));

    let summary = DraftBuildSummary {
        batch_id: Some("batch".to_string()),
        draft_count: 2,
        skipped_items: 0,
        skipped_assets: 0,
    };
    let (state, _) = update(state, Msg::DraftsBuilt(summary.clone()));
    assert_eq!(*state.review(), ReviewState::Built(summary));
}

#[test]
fn failed_drafts_can_be_retried_or_bypassed() {
    let (state, _) = settled_review_run(vec![
        json!({ "status": "ok", "data": { "content": "from url" } }),
        json!({ "status": "error", "error": "unreadable" }),
    ]);
    let (state, _) = update(state, Msg::DraftsFailed("disk full".to_string()));
    assert_eq!(*state.review(), ReviewState::Failed("disk full".to_string()));

    let (state, effects) = update(state, Msg::RetryDraftsClicked);
    match effects.as_slice() {
        [Effect::BuildDrafts(request)] => assert_eq!(request.sources.len(), 1),
        other => panic!("expected draft request, got {other:?}"),
    }

    let (state, effects) = update(state, Msg::RetryDraftsClicked);
    assert!(effects.is_empty(), "already building");

    let (state, _) = update(state, Msg::DraftsFailed("disk full".to_string()));
    let (state, effects) = update(state, Msg::StoreWithoutReviewClicked);
    let resubmitted = effects.iter().find_map(|effect| match effect {
        Effect::SubmitBatch(request) => Some(request),
        _ => None,
    });
    assert!(resubmitted.is_some_and(|request| request.store_remote));
    assert!(!state.options().review_before_storage);
    assert!(effects
        .iter()
        .any(|effect| matches!(effect, Effect::PersistQueue(_))));
}

#[test]
fn review_run_without_ok_results_builds_nothing() {
    let (state, effects) = settled_review_run(vec![
        json!({ "status": "error", "error": "a" }),
        json!({ "status": "error", "error": "b" }),
    ]);
    assert!(effects.is_empty());
    assert_eq!(*state.review(), ReviewState::Idle);
}

fn review_run_on_one_url() -> (AppState, ItemId) {
    let state = update(AppState::new(), Msg::ConnectivityChanged(ConnectionStatus::Online)).0;
    let (state, _) = update(state, Msg::ReviewToggled(true));
    let (state, _) = update(state, Msg::InputChanged("https://x.test/a".to_string()));
    let (state, _) = update(state, Msg::UrlsSubmitted);
    let (state, effects) = update(state, Msg::RunClicked);
    let id = effects
        .iter()
        .find_map(|effect| match effect {
            Effect::SubmitBatch(request) => Some(request.entries[0].id.clone()),
            _ => None,
        })
        .expect("submitted");
    (state, id)
}

fn count_fragment(result: Option<Value>) -> Msg {
    Msg::Progress(ProgressFragment {
        processed_count: Some(1),
        total_count: Some(1),
        result,
    })
}

#[test]
fn drafts_wait_for_results_in_the_final_reply() {
    let (state, id) = review_run_on_one_url();

    let (state, effects) = update(state, count_fragment(None));
    assert!(effects.is_empty());
    assert_eq!(*state.review(), ReviewState::Idle);

    let (state, effects) = update(
        state,
        Msg::SubmissionFinished(AgentResponse {
            ok: true,
            error: None,
            results: vec![json!({
                "id": id.as_str(),
                "status": "ok",
                "data": { "content": "hello" }
            })],
        }),
    );
    match effects.as_slice() {
        [Effect::BuildDrafts(request)] => {
            assert_eq!(request.sources.len(), 1);
            assert_eq!(request.sources[0].result.id, Some(id));
        }
        other => panic!("expected draft request, got {other:?}"),
    }
    assert_eq!(*state.review(), ReviewState::Building);
}

#[test]
fn streamed_results_are_drafted_once_the_reply_closes_the_run() {
    let (state, id) = review_run_on_one_url();
    let streamed = json!({ "id": id.as_str(), "status": "ok", "data": { "content": "hello" } });

    let (state, effects) = update(state, count_fragment(Some(streamed)));
    assert!(effects.is_empty());
    let (state, effects) = update(state, Msg::RunDone);
    assert!(effects.is_empty());

    let (state, effects) = update(
        state,
        Msg::SubmissionFinished(AgentResponse {
            ok: true,
            error: None,
            results: Vec::new(),
        }),
    );
    assert!(matches!(effects.as_slice(), [Effect::BuildDrafts(_)]));
    assert_eq!(*state.review(), ReviewState::Building);
}

#[test]
fn failure_reply_after_complete_counts_builds_no_drafts() {
    let (state, id) = review_run_on_one_url();
    let streamed = json!({ "id": id.as_str(), "status": "ok", "data": { "content": "hello" } });

    let (state, _) = update(state, count_fragment(Some(streamed)));
    let (state, effects) = update(
        state,
        Msg::SubmissionFinished(AgentResponse::failure("agent crashed")),
    );
    assert!(effects.is_empty());
    assert_eq!(*state.review(), ReviewState::Idle);
}
