use crate::attachments::InstanceRebind;
use crate::drafts::DraftRequest;
use crate::queue::ItemId;
use crate::run::BatchRequest;
use crate::state::QueueSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Evaluate `url` for playlist expansion, debounced per entry.
    ScheduleExpansion { entry_id: ItemId, url: String },
    /// Send the batch to the execution agent.
    SubmitBatch(BatchRequest),
    /// Build review drafts for the settled run.
    BuildDrafts(DraftRequest),
    /// Record new handle identities on stubs; echoed back as `Msg::StubsRebound`.
    RebindStubs(Vec<InstanceRebind>),
    /// Persist queue and option state.
    PersistQueue(QueueSnapshot),
}
