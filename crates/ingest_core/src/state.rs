use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::attachments::{AttachmentReport, AttachmentTracker};
use crate::drafts::{DraftBuildSummary, DraftRequest, ReviewSource, SourceFile};
use crate::preset::{builtin_presets, detect_preset, PresetConfig};
use crate::queue::{Entry, FileStub, ItemId, QueueStore};
use crate::reconcile::{FileSource, ResultLedger, ResultStatus};
use crate::run::{
    build_batch_request, check_preconditions, BatchRequest, ConnectionStatus, IngestLimits,
    RunBlocked, RunOptions, RunPhase, RunState, Settlement,
};
use crate::view_model::{
    AppViewModel, EntryRowView, FileRowView, LastFileStats, LastPasteStats, ResultRowView,
};

/// Everything that survives a reload. Binary handles are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    #[serde(default)]
    pub entries: Vec<Entry>,
    #[serde(default)]
    pub stubs: Vec<FileStub>,
    #[serde(default)]
    pub next_id: u64,
    #[serde(default)]
    pub options: RunOptions,
    #[serde(default = "default_preset_name")]
    pub selected_preset: String,
}

impl Default for QueueSnapshot {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            stubs: Vec::new(),
            next_id: 0,
            options: RunOptions::default(),
            selected_preset: default_preset_name(),
        }
    }
}

fn default_preset_name() -> String {
    detect_preset(
        &PresetConfig::from_options(&RunOptions::default()),
        &builtin_presets(),
    )
    .to_string()
}

/// Draft-building state for the current run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReviewState {
    #[default]
    Idle,
    Building,
    Built(DraftBuildSummary),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub(crate) queue: QueueStore,
    pub(crate) attachments: AttachmentTracker,
    pub(crate) options: RunOptions,
    pub(crate) selected_preset: String,
    pub(crate) connection: ConnectionStatus,
    pub(crate) limits: IngestLimits,
    pub(crate) input: String,
    pub(crate) phase: RunPhase,
    pub(crate) run: RunState,
    pub(crate) results: ResultLedger,
    pub(crate) run_store_remote: bool,
    pub(crate) run_review: bool,
    /// The agent's closing reply for the current run has not arrived yet.
    pub(crate) awaiting_final: bool,
    pub(crate) run_files: Vec<FileSource>,
    pub(crate) blocked: Option<RunBlocked>,
    pub(crate) review: ReviewState,
    pub(crate) last_paste_stats: Option<LastPasteStats>,
    pub(crate) last_file_stats: Option<LastFileStats>,
    dirty: bool,
    queue_changed: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            queue: QueueStore::new(),
            attachments: AttachmentTracker::new(),
            options: RunOptions::default(),
            selected_preset: default_preset_name(),
            connection: ConnectionStatus::default(),
            limits: IngestLimits::default(),
            input: String::new(),
            phase: RunPhase::Idle,
            run: RunState::default(),
            results: ResultLedger::new(),
            run_store_remote: false,
            run_review: false,
            awaiting_final: false,
            run_files: Vec::new(),
            blocked: None,
            review: ReviewState::Idle,
            last_paste_stats: None,
            last_file_stats: None,
            dirty: false,
            queue_changed: false,
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: IngestLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    pub fn queue(&self) -> &QueueStore {
        &self.queue
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn phase(&self) -> &RunPhase {
        &self.phase
    }

    pub fn run_state(&self) -> &RunState {
        &self.run
    }

    pub fn results(&self) -> &ResultLedger {
        &self.results
    }

    pub fn review(&self) -> &ReviewState {
        &self.review
    }

    pub fn attachment_report(&self) -> AttachmentReport {
        self.attachments.reconcile(self.queue.stubs())
    }

    pub fn planned_count(&self) -> usize {
        self.queue.planned_count(&self.attachment_report())
    }

    pub fn has_missing_files(&self) -> bool {
        self.attachment_report().has_missing_files()
    }

    /// Why the run button is disabled right now, if it is.
    pub fn run_precondition(&self) -> Result<(), RunBlocked> {
        if self.phase.is_active() {
            return Err(RunBlocked::AlreadyRunning);
        }
        let report = self.attachment_report();
        check_preconditions(self.queue.planned_count(&report), &report, self.connection)
    }

    pub(crate) fn prepare_batch(
        &self,
        only: Option<&HashSet<ItemId>>,
    ) -> Result<BatchRequest, RunBlocked> {
        self.run_precondition()?;
        let report = self.attachment_report();
        build_batch_request(&self.queue, &report, &self.options, &self.limits, only)
    }

    pub(crate) fn begin_run(&mut self, request: &BatchRequest, now: Instant) {
        self.run = RunState::start(request.item_count() as u64, now);
        self.results.clear();
        self.run_store_remote = request.store_remote;
        self.run_review = self.options.review_before_storage;
        self.awaiting_final = true;
        self.run_files = request
            .files
            .iter()
            .map(|file| FileSource {
                id: file.id.clone(),
                name: file.name.clone(),
            })
            .collect();
        self.phase = RunPhase::Submitting;
        self.blocked = None;
        self.review = ReviewState::Idle;
        self.mark_dirty();
    }

    pub(crate) fn settle_success(&mut self, now: Instant) {
        self.phase = RunPhase::Settled(Settlement::Success);
        self.run.freeze(now);
        self.results.finalize(self.run_store_remote);
        self.mark_dirty();
    }

    pub(crate) fn settle_failure(&mut self, message: String, now: Instant) {
        self.results.clear();
        self.phase = RunPhase::Settled(Settlement::HardFailure { message });
        self.run.freeze(now);
        self.mark_dirty();
    }

    /// Successful results of the settled run, paired with their sources.
    pub(crate) fn draft_request(&self) -> DraftRequest {
        let report = self.attachment_report();
        let sources = self
            .results
            .items()
            .into_iter()
            .filter(|item| item.status == ResultStatus::Ok)
            .map(|result| {
                let keywords = result
                    .id
                    .as_ref()
                    .and_then(|id| self.queue.entry(id))
                    .map(|entry| entry.keywords.clone())
                    .unwrap_or_default();
                let file = result.id.as_ref().and_then(|id| {
                    let stub = self.queue.stub(id)?;
                    let handle = report.handle_for_stub.get(id)?;
                    Some(SourceFile {
                        stub_id: stub.id.clone(),
                        name: stub.name.clone(),
                        size: stub.size,
                        mime_type: stub.mime_type.clone(),
                        bytes: handle.bytes.clone(),
                    })
                });
                ReviewSource {
                    result,
                    keywords,
                    file,
                }
            })
            .collect();
        DraftRequest { sources }
    }

    pub(crate) fn refresh_preset(&mut self) {
        self.selected_preset = detect_preset(
            &PresetConfig::from_options(&self.options),
            &builtin_presets(),
        )
        .to_string();
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            entries: self.queue.entries().to_vec(),
            stubs: self.queue.stubs().to_vec(),
            next_id: self.queue.next_id(),
            options: self.options.clone(),
            selected_preset: self.selected_preset.clone(),
        }
    }

    pub(crate) fn restore(&mut self, snapshot: QueueSnapshot) {
        self.queue = QueueStore::from_parts(snapshot.entries, snapshot.stubs, snapshot.next_id);
        self.options = snapshot.options;
        self.selected_preset = snapshot.selected_preset;
        self.attachments.prune(self.queue.stubs());
        self.mark_dirty();
    }

    pub fn view(&self) -> AppViewModel {
        let report = self.attachment_report();
        let missing: HashSet<&ItemId> = report.missing.iter().map(|stub| &stub.id).collect();
        let now = Instant::now();
        let run_visible = !matches!(self.phase, RunPhase::Idle);
        let results = self.results.items();
        AppViewModel {
            phase: self.phase.clone(),
            input: self.input.clone(),
            entries: self
                .queue
                .entries()
                .iter()
                .map(|entry| EntryRowView {
                    id: entry.id.clone(),
                    url: entry.url.clone(),
                    media_type: entry.media_type,
                    inferred_type: crate::media::infer_url_type(entry.media_type, &entry.url),
                    customized: entry.is_customized(),
                })
                .collect(),
            files: self
                .queue
                .stubs()
                .iter()
                .map(|stub| FileRowView {
                    id: stub.id.clone(),
                    name: stub.name.clone(),
                    size: stub.size,
                    missing: missing.contains(&stub.id),
                })
                .collect(),
            planned_count: self.queue.planned_count(&report),
            has_missing_files: report.has_missing_files(),
            blocked_reason: self
                .blocked
                .as_ref()
                .map(ToString::to_string)
                .or_else(|| self.run_precondition().err().map(|err| err.to_string())),
            can_run: self.run_precondition().is_ok(),
            progress: run_visible.then(|| self.run.progress(now)),
            summary: matches!(self.phase, RunPhase::Settled(Settlement::Success))
                .then(|| self.results.summary()),
            results: results
                .into_iter()
                .map(|item| ResultRowView {
                    id: item.id,
                    status: item.status,
                    outcome: item.outcome,
                    label: item
                        .url
                        .or(item.file_name)
                        .unwrap_or_else(|| "(unknown)".to_string()),
                    error: item.error,
                })
                .collect(),
            review: self.review.clone(),
            selected_preset: self.selected_preset.clone(),
            connection: self.connection,
            last_paste_stats: self.last_paste_stats.clone(),
            last_file_stats: self.last_file_stats.clone(),
            dirty: self.dirty,
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn mark_queue_changed(&mut self) {
        self.queue_changed = true;
        self.dirty = true;
    }

    pub(crate) fn take_queue_changed(&mut self) -> bool {
        std::mem::take(&mut self.queue_changed)
    }

    /// Returns whether the view changed since the last call, and resets the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}
