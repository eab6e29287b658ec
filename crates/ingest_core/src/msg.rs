use crate::attachments::{FileHandle, InstanceRebind};
use crate::defaults::{CommonOptions, OptionMap, TypeDefaults};
use crate::drafts::DraftBuildSummary;
use crate::media::MediaType;
use crate::queue::{EntryPatch, ItemId};
use crate::reconcile::{AgentResponse, ProgressFragment};
use crate::run::ConnectionStatus;
use crate::state::QueueSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// User edited the url input box.
    InputChanged(String),
    /// User submitted the input box; one url per line.
    UrlsSubmitted,
    /// User added a single row.
    AddEntry { url: String, media_type: MediaType },
    UpdateEntry { id: ItemId, patch: EntryPatch },
    RemoveEntry(ItemId),
    /// User picked or dropped local files.
    FilesAdded(Vec<FileHandle>),
    RemoveFile(ItemId),
    ClearAll,
    /// Restore persisted queue state after a reload.
    RestoreQueue(QueueSnapshot),
    /// Handle identities recorded asynchronously after reattachment.
    StubsRebound(Vec<InstanceRebind>),
    /// A composite url resolved into its child urls.
    PlaylistExpanded {
        entry_id: ItemId,
        source_url: String,
        child_urls: Vec<String>,
    },
    ConnectivityChanged(ConnectionStatus),
    CommonOptionsChanged(CommonOptions),
    TypeDefaultsChanged(TypeDefaults),
    AdvancedValuesChanged(OptionMap),
    StoreRemoteToggled(bool),
    ReviewToggled(bool),
    PresetSelected(String),
    RunClicked,
    /// Resubmit only the items whose results failed.
    RetryFailedClicked,
    /// The agent acknowledged the submission.
    SubmissionAccepted,
    /// One fragment from the progress channel.
    Progress(ProgressFragment),
    /// The agent's final reply to the submission.
    SubmissionFinished(AgentResponse),
    /// Explicit completion signal from the progress channel.
    RunDone,
    DraftsBuilt(DraftBuildSummary),
    DraftsFailed(String),
    RetryDraftsClicked,
    /// Disable review mode and resubmit, storing directly.
    StoreWithoutReviewClicked,
    /// Periodic tick; drives the stall watchdog.
    Tick,
    /// Fallback for placeholder wiring.
    NoOp,
}
