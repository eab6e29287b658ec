use crate::media::MediaType;
use crate::queue::ItemId;
use crate::reconcile::{Outcome, ResultStatus, RunSummary};
use crate::run::{ConnectionStatus, RunPhase, RunProgress};
use crate::state::ReviewState;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LastPasteStats {
    pub added: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LastFileStats {
    pub added: usize,
    pub reattached: usize,
    pub skipped_duplicates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppViewModel {
    pub phase: RunPhase,
    pub input: String,
    pub entries: Vec<EntryRowView>,
    pub files: Vec<FileRowView>,
    pub planned_count: usize,
    pub has_missing_files: bool,
    pub can_run: bool,
    pub blocked_reason: Option<String>,
    pub progress: Option<RunProgress>,
    pub summary: Option<RunSummary>,
    pub results: Vec<ResultRowView>,
    pub review: ReviewState,
    pub selected_preset: String,
    pub connection: ConnectionStatus,
    pub last_paste_stats: Option<LastPasteStats>,
    pub last_file_stats: Option<LastFileStats>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRowView {
    pub id: ItemId,
    pub url: String,
    pub media_type: MediaType,
    pub inferred_type: MediaType,
    pub customized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRowView {
    pub id: ItemId,
    pub name: String,
    pub size: u64,
    /// Persisted stub without a live handle; must be re-attached or removed.
    pub missing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRowView {
    pub id: Option<ItemId>,
    pub status: ResultStatus,
    pub outcome: Option<Outcome>,
    pub label: String,
    pub error: Option<String>,
}
