//! Batch run lifecycle: preconditions, request serialization, and run counters.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attachments::AttachmentReport;
use crate::defaults::{effective_options, CommonOptions, EntryOverrides, OptionMap, TypeDefaults};
use crate::media::{infer_file_type, infer_url_type, MediaType};
use crate::queue::{ItemId, QueueStore};

const MIB: u64 = 1024 * 1024;

/// Size and liveness limits applied by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestLimits {
    /// Files above this size are rejected outright.
    pub hard_ceiling_bytes: u64,
    /// Files above this size cannot be sent inline with the batch.
    pub inline_threshold_bytes: u64,
    /// A running batch with no progress for this long is failed on the next tick.
    pub stall_timeout: Option<Duration>,
}

impl Default for IngestLimits {
    fn default() -> Self {
        Self {
            hard_ceiling_bytes: 500 * MIB,
            inline_threshold_bytes: 100 * MIB,
            stall_timeout: Some(Duration::from_secs(15 * 60)),
        }
    }
}

/// Server reachability as reported by the host's health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Online,
    Offline,
    Unconfigured,
    #[default]
    Unknown,
}

/// Reasons a run cannot leave `Idle`. None of these reach the agent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunBlocked {
    #[error("a run is already in progress")]
    AlreadyRunning,
    #[error("add at least one url or file before running")]
    EmptyQueue,
    #[error("{count} file(s) must be re-attached or removed before running")]
    MissingFiles { count: usize },
    #[error("the server is not configured")]
    Unconfigured,
    #[error("the server is not reachable")]
    NotConnected,
    #[error("still checking the server connection")]
    CheckingConnection,
    #[error("{name} is {size} bytes, above the {limit} byte limit")]
    FileTooLarge { name: String, size: u64, limit: u64 },
    #[error("{name} is {size} bytes, too large to send inline (limit {limit}); upload it to the server directly")]
    FileRequiresUpload { name: String, size: u64, limit: u64 },
}

/// Option set applied to a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    pub common: CommonOptions,
    pub type_defaults: TypeDefaults,
    #[serde(default)]
    pub advanced: OptionMap,
    pub store_remote: bool,
    pub review_before_storage: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            common: CommonOptions {
                perform_analysis: true,
                perform_chunking: true,
                overwrite_existing: false,
            },
            type_defaults: TypeDefaults::default(),
            advanced: OptionMap::new(),
            store_remote: true,
            review_before_storage: false,
        }
    }
}

impl RunOptions {
    /// Review mode keeps results local until the drafts are accepted.
    pub fn effective_store_remote(&self) -> bool {
        self.store_remote && !self.review_before_storage
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub id: ItemId,
    pub url: String,
    pub media_type: MediaType,
    pub inferred_type: MediaType,
    pub keywords: Vec<String>,
    pub options: Option<OptionMap>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFile {
    pub id: ItemId,
    pub name: String,
    pub size: u64,
    pub mime_type: Option<String>,
    pub inferred_type: MediaType,
    pub bytes: Bytes,
    pub options: Option<OptionMap>,
}

/// One job submitted to the execution agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub entries: Vec<BatchEntry>,
    pub files: Vec<BatchFile>,
    pub store_remote: bool,
    pub process_only: bool,
    pub common: CommonOptions,
    pub advanced: OptionMap,
    pub file_defaults: TypeDefaults,
}

impl BatchRequest {
    pub fn item_count(&self) -> usize {
        self.entries.len() + self.files.len()
    }
}

/// Checks that do not depend on file contents.
pub fn check_preconditions(
    planned_count: usize,
    report: &AttachmentReport,
    connection: ConnectionStatus,
) -> Result<(), RunBlocked> {
    if report.has_missing_files() {
        return Err(RunBlocked::MissingFiles {
            count: report.missing.len(),
        });
    }
    if planned_count == 0 {
        return Err(RunBlocked::EmptyQueue);
    }
    match connection {
        ConnectionStatus::Online => Ok(()),
        ConnectionStatus::Unconfigured => Err(RunBlocked::Unconfigured),
        ConnectionStatus::Offline => Err(RunBlocked::NotConnected),
        ConnectionStatus::Unknown => Err(RunBlocked::CheckingConnection),
    }
}

/// Serialize the queue into one request. `only` restricts the request to the
/// given item ids (per-item retry).
pub fn build_batch_request(
    queue: &QueueStore,
    report: &AttachmentReport,
    options: &RunOptions,
    limits: &IngestLimits,
    only: Option<&HashSet<ItemId>>,
) -> Result<BatchRequest, RunBlocked> {
    let selected = |id: &ItemId| only.is_none_or(|ids| ids.contains(id));

    let entries: Vec<BatchEntry> = queue
        .entries()
        .iter()
        .filter(|entry| entry.has_url() && selected(&entry.id))
        .map(|entry| {
            let inferred_type = infer_url_type(entry.media_type, &entry.url);
            BatchEntry {
                id: entry.id.clone(),
                url: entry.url.clone(),
                media_type: entry.media_type,
                inferred_type,
                keywords: entry.keywords.clone(),
                options: effective_options(
                    inferred_type,
                    &options.type_defaults,
                    &entry.overrides,
                ),
            }
        })
        .collect();

    let mut files = Vec::new();
    for stub in report.attached.iter().filter(|stub| selected(&stub.id)) {
        let Some(handle) = report.handle_for_stub.get(&stub.id) else {
            continue;
        };
        let size = handle.size.max(handle.bytes.len() as u64);
        if size > limits.hard_ceiling_bytes {
            return Err(RunBlocked::FileTooLarge {
                name: stub.name.clone(),
                size,
                limit: limits.hard_ceiling_bytes,
            });
        }
        if size > limits.inline_threshold_bytes {
            return Err(RunBlocked::FileRequiresUpload {
                name: stub.name.clone(),
                size,
                limit: limits.inline_threshold_bytes,
            });
        }
        let inferred_type = infer_file_type(&stub.name, stub.mime_type.as_deref());
        files.push(BatchFile {
            id: stub.id.clone(),
            name: stub.name.clone(),
            size,
            mime_type: stub.mime_type.clone(),
            inferred_type,
            bytes: handle.bytes.clone(),
            options: effective_options(
                inferred_type,
                &options.type_defaults,
                &EntryOverrides::default(),
            ),
        });
    }

    if entries.is_empty() && files.is_empty() {
        return Err(RunBlocked::EmptyQueue);
    }

    let store_remote = options.effective_store_remote();
    Ok(BatchRequest {
        entries,
        files,
        store_remote,
        process_only: !store_remote,
        common: options.common,
        advanced: options.advanced.clone(),
        file_defaults: options.type_defaults.clone(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Success,
    HardFailure { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    Submitting,
    Running,
    Settled(Settlement),
}

impl RunPhase {
    pub fn is_active(&self) -> bool {
        matches!(self, RunPhase::Submitting | RunPhase::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunProgress {
    pub pct: u8,
    pub done_count: u64,
    pub elapsed_label: String,
}

/// Counters for one batch execution. Reset at start, frozen at settlement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunState {
    pub total_planned: u64,
    pub processed_count: u64,
    pub live_total_count: u64,
    pub started_at: Option<Instant>,
    pub last_activity: Option<Instant>,
    pub finished_at: Option<Instant>,
}

impl RunState {
    pub fn start(total_planned: u64, now: Instant) -> Self {
        Self {
            total_planned,
            processed_count: 0,
            live_total_count: 0,
            started_at: Some(now),
            last_activity: Some(now),
            finished_at: None,
        }
    }

    /// Counts only move forward.
    pub fn observe(&mut self, processed: Option<u64>, total: Option<u64>, now: Instant) {
        if self.finished_at.is_some() {
            return;
        }
        if let Some(processed) = processed {
            self.processed_count = self.processed_count.max(processed);
        }
        if let Some(total) = total {
            self.live_total_count = self.live_total_count.max(total);
        }
        self.last_activity = Some(now);
    }

    pub fn touch(&mut self, now: Instant) {
        if self.finished_at.is_none() {
            self.last_activity = Some(now);
        }
    }

    pub fn expected_total(&self) -> u64 {
        if self.live_total_count > 0 {
            self.live_total_count
        } else {
            self.total_planned
        }
    }

    pub fn counts_complete(&self) -> bool {
        let total = self.expected_total();
        total > 0 && self.processed_count >= total
    }

    pub fn freeze(&mut self, now: Instant) {
        if self.finished_at.is_none() {
            self.finished_at = Some(now);
        }
    }

    pub fn is_stalled(&self, now: Instant, timeout: Duration) -> bool {
        self.finished_at.is_none()
            && self
                .last_activity
                .is_some_and(|last| now.saturating_duration_since(last) >= timeout)
    }

    pub fn progress(&self, now: Instant) -> RunProgress {
        let total = self.expected_total();
        let done_count = self.processed_count;
        let pct = if total == 0 {
            0
        } else {
            let done = u128::from(self.processed_count.min(total));
            (done * 100 / u128::from(total)) as u8
        };
        let elapsed = match self.started_at {
            Some(started) => self.finished_at.unwrap_or(now).saturating_duration_since(started),
            None => Duration::ZERO,
        };
        RunProgress {
            pct,
            done_count,
            elapsed_label: elapsed_label(elapsed),
        }
    }
}

pub fn elapsed_label(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}
