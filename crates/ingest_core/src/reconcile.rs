//! Progress/result reconciliation.
//!
//! Fragments arrive in any order. Each result is upserted by id and merged
//! field by field, last write wins, so the merge is commutative across ids.

use ingest_logging::ingest_debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::media::MediaType;
use crate::payload::{extract_sub_items, status_label};
use crate::queue::ItemId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Error,
}

/// Post-settlement classification of a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ingested,
    Processed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultItem {
    pub id: Option<ItemId>,
    pub status: ResultStatus,
    pub outcome: Option<Outcome>,
    pub url: Option<String>,
    pub file_name: Option<String>,
    pub media_type: Option<MediaType>,
    pub data: Value,
    pub error: Option<String>,
}

/// One incremental message from the agent's progress channel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressFragment {
    #[serde(
        default,
        rename = "processedCount",
        alias = "processed_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub processed_count: Option<u64>,
    #[serde(
        default,
        rename = "totalCount",
        alias = "total_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// Final reply to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<Value>,
}

impl AgentResponse {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            results: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub total: usize,
    pub ingested: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Labels that mean "nothing new was stored".
const SKIP_VOCABULARY: &[&str] = &[
    "skipped",
    "skip",
    "duplicate",
    "duplicated",
    "unchanged",
    "exists",
    "already_exists",
    "already exists",
    "not_modified",
];

/// `error` status fails; a payload whose every sub-item label is in the skip
/// vocabulary is skipped; anything else is ingested or processed depending on
/// whether the run stored remotely.
pub fn derive_result_outcome(item: &ResultItem, store_remote: bool) -> Outcome {
    if item.status == ResultStatus::Error {
        return Outcome::Failed;
    }
    let labels: Vec<String> = extract_sub_items(&item.data)
        .into_iter()
        .filter_map(status_label)
        .collect();
    if !labels.is_empty()
        && labels
            .iter()
            .all(|label| SKIP_VOCABULARY.contains(&label.as_str()))
    {
        return Outcome::Skipped;
    }
    if store_remote {
        Outcome::Ingested
    } else {
        Outcome::Processed
    }
}

/// A local file submitted in the current run, for filename fallback matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSource {
    pub id: ItemId,
    pub name: String,
}

/// Merged result records for the current run, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultLedger {
    records: Vec<Map<String, Value>>,
    store_remote: Option<bool>,
}

impl ResultLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.store_remote = None;
    }

    /// Outcomes are derived from here on.
    pub fn finalize(&mut self, store_remote: bool) {
        self.store_remote = Some(store_remote);
    }

    /// Merge one result into the ledger. Results without an id are matched to
    /// a local file by name only when exactly one unresolved file carries it.
    pub fn upsert(&mut self, result: Value, files: &[FileSource]) {
        let Value::Object(mut incoming) = result else {
            ingest_debug!("reconcile: ignoring non-object result");
            return;
        };
        if !incoming.contains_key("status") && incoming.get("error").is_some_and(has_text) {
            incoming.insert("status".to_string(), Value::String("error".to_string()));
        }

        let id = read_id(&incoming).or_else(|| self.correlate_by_name(&incoming, files));
        let Some(id) = id else {
            self.records.push(incoming);
            return;
        };
        incoming.insert("id".to_string(), Value::String(id.0.clone()));

        match self
            .records
            .iter_mut()
            .find(|record| read_id(record).as_ref() == Some(&id))
        {
            Some(record) => {
                for (key, value) in incoming {
                    record.insert(key, value);
                }
            }
            None => self.records.push(incoming),
        }
    }

    fn correlate_by_name(
        &self,
        incoming: &Map<String, Value>,
        files: &[FileSource],
    ) -> Option<ItemId> {
        let name = read_string(incoming, &["fileName", "file_name", "filename", "name"])?;
        let mut candidates = files.iter().filter(|file| {
            file.name == name
                && !self
                    .records
                    .iter()
                    .any(|record| read_id(record).as_ref() == Some(&file.id))
        });
        let first = candidates.next()?;
        if candidates.next().is_some() {
            return None;
        }
        Some(first.id.clone())
    }

    pub fn items(&self) -> Vec<ResultItem> {
        self.records
            .iter()
            .map(|record| {
                let mut item = to_result_item(record);
                item.outcome = self
                    .store_remote
                    .map(|store_remote| derive_result_outcome(&item, store_remote));
                item
            })
            .collect()
    }

    pub fn summary(&self) -> RunSummary {
        let items = self.items();
        let mut summary = RunSummary {
            total: items.len(),
            ..RunSummary::default()
        };
        for item in &items {
            match item.outcome {
                Some(Outcome::Ingested) => summary.ingested += 1,
                Some(Outcome::Processed) => summary.processed += 1,
                Some(Outcome::Skipped) => summary.skipped += 1,
                Some(Outcome::Failed) => summary.failed += 1,
                None => {}
            }
        }
        summary
    }
}

fn has_text(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.trim().is_empty(),
        _ => true,
    }
}

fn read_id(record: &Map<String, Value>) -> Option<ItemId> {
    match record.get("id")? {
        Value::String(text) if !text.trim().is_empty() => Some(ItemId(text.trim().to_string())),
        Value::Number(number) => Some(ItemId(number.to_string())),
        _ => None,
    }
}

fn read_string(record: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .filter_map(Value::as_str)
        .map(|text| text.trim().to_string())
        .find(|text| !text.is_empty())
}

fn to_result_item(record: &Map<String, Value>) -> ResultItem {
    let status = match record
        .get("status")
        .and_then(Value::as_str)
        .map(|label| label.trim().to_ascii_lowercase())
        .as_deref()
    {
        Some("error" | "failed" | "failure") => ResultStatus::Error,
        _ => ResultStatus::Ok,
    };
    let error = record.get("error").and_then(|value| match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Null | Value::String(_) => None,
        other => Some(other.to_string()),
    });
    ResultItem {
        id: read_id(record),
        status,
        outcome: None,
        url: read_string(record, &["url"]),
        file_name: read_string(record, &["fileName", "file_name", "filename"]),
        media_type: read_string(record, &["type", "media_type"])
            .and_then(|raw| MediaType::parse(&raw)),
        data: record.get("data").cloned().unwrap_or(Value::Null),
        error,
    }
}
