//! Ingest core: pure queue, run and reconciliation state machine plus view-model helpers.
mod attachments;
mod defaults;
mod drafts;
mod effect;
mod media;
mod msg;
mod payload;
mod playlist;
mod preset;
mod queue;
mod reconcile;
mod run;
mod schema;
mod state;
mod update;
mod view_model;

pub use attachments::{file_key, AttachmentReport, AttachmentTracker, FileHandle, InstanceRebind};
pub use defaults::{
    effective_options, family_for, is_empty_value, merge_defaults, overrides_differ,
    to_option_map, AudioOptions, CommonOptions, DocumentOptions, EntryOverrides, OptionFamily,
    OptionMap, TypeDefaults, VideoOptions,
};
pub use drafts::{
    infer_format, plan_drafts, resolve_content, resolve_title, AssetRef, ContentFormat, Draft,
    DraftBatch, DraftBuildSummary, DraftPlan, DraftPlanSet, DraftRequest, DraftSource, FileMeta,
    HeadingSectionDetector, ReviewSource, Section, SectionDetector, SourceFile, FALLBACK_TITLE,
};
pub use effect::Effect;
pub use media::{infer_file_type, infer_url_type, MediaType};
pub use msg::Msg;
pub use payload::{extract_sub_items, is_error_label, status_label};
pub use playlist::{detect_composite, CompositeRef};
pub use preset::{
    builtin_presets, canonical_json, detect_preset, find_preset, Preset, PresetConfig,
    CUSTOM_PRESET,
};
pub use queue::{
    normalize_url_for_dedupe, AddFilesOutcome, Entry, EntryPatch, FileStub, ItemId, QueueStore,
};
pub use reconcile::{
    derive_result_outcome, AgentResponse, FileSource, Outcome, ProgressFragment, ResultItem,
    ResultLedger, ResultStatus, RunSummary,
};
pub use run::{
    build_batch_request, check_preconditions, elapsed_label, BatchEntry, BatchFile, BatchRequest,
    ConnectionStatus, IngestLimits, RunBlocked, RunOptions, RunPhase, RunProgress, RunState,
    Settlement,
};
pub use schema::{
    diff_schemas, fallback_schema, flatten_schema, SchemaDiff, SchemaEntry, SchemaOrigin,
};
pub use state::{AppState, QueueSnapshot, ReviewState};
pub use update::update;
pub use view_model::{
    AppViewModel, EntryRowView, FileRowView, LastFileStats, LastPasteStats, ResultRowView,
};
