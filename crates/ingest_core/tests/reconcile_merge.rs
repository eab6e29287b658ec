use ingest_core::{
    derive_result_outcome, extract_sub_items, FileSource, ItemId, Outcome, ResultItem,
    ResultLedger, ResultStatus,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn files(pairs: &[(&str, &str)]) -> Vec<FileSource> {
    pairs
        .iter()
        .map(|(id, name)| FileSource {
            id: ItemId::from(*id),
            name: name.to_string(),
        })
        .collect()
}

fn ok_item(data: Value) -> ResultItem {
    ResultItem {
        id: Some(ItemId::from("a")),
        status: ResultStatus::Ok,
        outcome: None,
        url: None,
        file_name: None,
        media_type: None,
        data,
        error: None,
    }
}

#[test]
fn merge_is_last_write_wins_per_field() {
    let mut ledger = ResultLedger::new();
    ledger.upsert(json!({ "id": "a", "status": "ok", "url": "https://x.test/a" }), &[]);
    ledger.upsert(json!({ "id": "a", "error": "x" }), &[]);

    let items = ledger.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, ResultStatus::Error);
    assert_eq!(items[0].error.as_deref(), Some("x"));
    assert_eq!(items[0].url.as_deref(), Some("https://x.test/a"));
}

#[test]
fn merge_is_order_independent_across_ids() {
    let fragments = [
        json!({ "id": "a", "status": "ok" }),
        json!({ "id": "b", "status": "error", "error": "boom" }),
        json!({ "id": "a", "url": "https://x.test/a" }),
    ];

    let mut forward = ResultLedger::new();
    for fragment in fragments.iter().cloned() {
        forward.upsert(fragment, &[]);
    }
    let mut reversed = ResultLedger::new();
    for fragment in fragments.iter().rev().cloned() {
        reversed.upsert(fragment, &[]);
    }

    let mut forward_items = forward.items();
    let mut reversed_items = reversed.items();
    forward_items.sort_by(|left, right| left.id.cmp(&right.id));
    reversed_items.sort_by(|left, right| left.id.cmp(&right.id));
    assert_eq!(forward_items, reversed_items);
}

#[test]
fn filename_fallback_only_when_unambiguous() {
    let mut ledger = ResultLedger::new();
    let sources = files(&[("f1", "notes.txt"), ("f2", "scan.pdf"), ("f3", "scan.pdf")]);

    ledger.upsert(json!({ "fileName": "notes.txt", "status": "ok" }), &sources);
    ledger.upsert(json!({ "fileName": "scan.pdf", "status": "ok" }), &sources);

    let items = ledger.items();
    assert_eq!(items[0].id, Some(ItemId::from("f1")));
    assert_eq!(items[1].id, None);
}

#[test]
fn filename_fallback_skips_already_resolved_candidates() {
    let mut ledger = ResultLedger::new();
    let sources = files(&[("f2", "scan.pdf"), ("f3", "scan.pdf")]);

    ledger.upsert(json!({ "id": "f2", "status": "ok" }), &sources);
    ledger.upsert(json!({ "fileName": "scan.pdf", "status": "ok" }), &sources);

    let ids: Vec<Option<ItemId>> = ledger.items().into_iter().map(|item| item.id).collect();
    assert_eq!(ids, vec![Some(ItemId::from("f2")), Some(ItemId::from("f3"))]);
}

#[test]
fn outcomes_follow_status_skip_vocabulary_and_store_mode() {
    let mut failed = ok_item(Value::Null);
    failed.status = ResultStatus::Error;
    assert_eq!(derive_result_outcome(&failed, true), Outcome::Failed);

    let skipped = ok_item(json!({ "results": [
        { "status": "Duplicate" },
        { "status": "unchanged" }
    ]}));
    assert_eq!(derive_result_outcome(&skipped, true), Outcome::Skipped);

    let mixed = ok_item(json!([{ "status": "skipped" }, { "status": "created" }]));
    assert_eq!(derive_result_outcome(&mixed, true), Outcome::Ingested);
    assert_eq!(derive_result_outcome(&mixed, false), Outcome::Processed);

    let unlabeled = ok_item(json!({ "title": "t" }));
    assert_eq!(derive_result_outcome(&unlabeled, false), Outcome::Processed);
}

#[test]
fn outcomes_appear_only_after_finalize() {
    let mut ledger = ResultLedger::new();
    ledger.upsert(json!({ "id": "a", "status": "ok" }), &[]);
    assert_eq!(ledger.items()[0].outcome, None);

    ledger.finalize(false);
    assert_eq!(ledger.items()[0].outcome, Some(Outcome::Processed));
    assert_eq!(ledger.summary().processed, 1);
}

#[test]
fn sub_items_unwrap_in_precedence_order() {
    let data = json!({
        "articles": [{ "title": "ignored" }],
        "results": { "result": [{ "title": "one" }, [{ "title": "two" }]] }
    });

    let titles: Vec<&str> = extract_sub_items(&data)
        .into_iter()
        .filter_map(|item| item.get("title").and_then(Value::as_str))
        .collect();
    assert_eq!(titles, vec!["one", "two"]);

    assert!(extract_sub_items(&json!({})).is_empty());
    assert!(extract_sub_items(&json!("text")).is_empty());
}

#[test]
fn deeply_nested_payload_is_bounded() {
    let mut data = json!({ "title": "leaf" });
    for _ in 0..100 {
        data = json!({ "result": data });
    }
    assert!(extract_sub_items(&data).is_empty());
}
