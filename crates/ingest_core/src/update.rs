use std::collections::HashSet;
use std::time::Instant;

use ingest_logging::{ingest_debug, ingest_info, ingest_warn};

use crate::media::MediaType;
use crate::preset::{builtin_presets, find_preset};
use crate::queue::{normalize_url_for_dedupe, ItemId};
use crate::reconcile::ResultStatus;
use crate::run::{RunPhase, Settlement};
use crate::state::ReviewState;
use crate::view_model::{LastFileStats, LastPasteStats};
use crate::{AppState, Effect, Msg};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let now = Instant::now();
    let mut effects = match msg {
        Msg::InputChanged(text) => {
            state.input = text;
            state.mark_dirty();
            Vec::new()
        }
        Msg::UrlsSubmitted => submit_input(&mut state),
        Msg::AddEntry { url, media_type } => {
            let id = state
                .queue
                .add_entry(&url, media_type, &state.options.type_defaults);
            state.mark_queue_changed();
            expansion_effect(&id, &url)
        }
        Msg::UpdateEntry { id, patch } => match state.queue.update_entry(&id, patch) {
            Some(entry) => {
                let url = entry.url.clone();
                state.mark_queue_changed();
                expansion_effect(&id, &url)
            }
            None => Vec::new(),
        },
        Msg::RemoveEntry(id) => {
            if state.queue.remove_entry(&id) {
                state.mark_queue_changed();
            }
            Vec::new()
        }
        Msg::FilesAdded(handles) => {
            let outcome =
                state
                    .queue
                    .add_files(handles, &mut state.attachments, &state.options.type_defaults);
            if outcome.skipped_duplicates > 0 {
                ingest_info!(
                    "queue: skipped {} duplicate file(s)",
                    outcome.skipped_duplicates
                );
            }
            state.last_file_stats = Some(LastFileStats {
                added: outcome.added.len(),
                reattached: outcome.reattached.len(),
                skipped_duplicates: outcome.skipped_duplicates,
            });
            if outcome.added.is_empty() && outcome.reattached.is_empty() {
                state.mark_dirty();
            } else {
                state.mark_queue_changed();
            }
            let rebinds = state.attachment_report().rebinds;
            if rebinds.is_empty() {
                Vec::new()
            } else {
                vec![Effect::RebindStubs(rebinds)]
            }
        }
        Msg::RemoveFile(id) => {
            if state.queue.remove_file(&id, &mut state.attachments) {
                state.mark_queue_changed();
            }
            Vec::new()
        }
        Msg::ClearAll => {
            if !state.queue.is_empty() {
                state.queue.clear_all(&mut state.attachments);
                state.mark_queue_changed();
            }
            Vec::new()
        }
        Msg::RestoreQueue(snapshot) => {
            state.restore(snapshot);
            Vec::new()
        }
        Msg::StubsRebound(rebinds) => {
            if state.queue.apply_rebinds(&rebinds) > 0 {
                state.mark_queue_changed();
            }
            Vec::new()
        }
        Msg::PlaylistExpanded {
            entry_id,
            source_url,
            child_urls,
        } => {
            match state
                .queue
                .splice_expansion(&entry_id, &source_url, &child_urls)
            {
                Some(ids) => {
                    ingest_info!("queue: expanded {} into {} entries", entry_id, ids.len());
                    state.mark_queue_changed();
                }
                None => {
                    ingest_debug!("queue: dropped stale expansion for {}", entry_id);
                }
            }
            Vec::new()
        }
        Msg::ConnectivityChanged(status) => {
            if state.connection != status {
                state.connection = status;
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::CommonOptionsChanged(common) => {
            state.options.common = common;
            options_changed(&mut state)
        }
        Msg::TypeDefaultsChanged(defaults) => {
            state.options.type_defaults = defaults;
            options_changed(&mut state)
        }
        Msg::AdvancedValuesChanged(values) => {
            state.options.advanced = values;
            options_changed(&mut state)
        }
        Msg::StoreRemoteToggled(store_remote) => {
            state.options.store_remote = store_remote;
            options_changed(&mut state)
        }
        Msg::ReviewToggled(review) => {
            state.options.review_before_storage = review;
            options_changed(&mut state)
        }
        Msg::PresetSelected(name) => {
            let presets = builtin_presets();
            if let Some(preset) = find_preset(&presets, &name) {
                preset.config.apply_to(&mut state.options);
                state.selected_preset = preset.name.to_string();
                state.mark_queue_changed();
            }
            Vec::new()
        }
        Msg::RunClicked => start_run(&mut state, None, now),
        Msg::RetryFailedClicked => {
            if state.phase != RunPhase::Settled(Settlement::Success) {
                return finish(state, Vec::new());
            }
            let failed: HashSet<ItemId> = state
                .results
                .items()
                .into_iter()
                .filter(|item| item.status == ResultStatus::Error)
                .filter_map(|item| item.id)
                .collect();
            if failed.is_empty() {
                Vec::new()
            } else {
                start_run(&mut state, Some(&failed), now)
            }
        }
        Msg::SubmissionAccepted => {
            if state.phase == RunPhase::Submitting {
                state.phase = RunPhase::Running;
                state.run.touch(now);
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::Progress(fragment) => {
            match state.phase {
                RunPhase::Idle | RunPhase::Settled(Settlement::HardFailure { .. }) => {
                    return finish(state, Vec::new());
                }
                RunPhase::Submitting => state.phase = RunPhase::Running,
                RunPhase::Running | RunPhase::Settled(Settlement::Success) => {}
            }
            state
                .run
                .observe(fragment.processed_count, fragment.total_count, now);
            if let Some(result) = fragment.result {
                state.results.upsert(result, &state.run_files);
            }
            state.mark_dirty();
            if state.phase.is_active() && state.run.counts_complete() {
                settle(&mut state, now)
            } else {
                Vec::new()
            }
        }
        Msg::SubmissionFinished(response) => {
            let awaited = std::mem::take(&mut state.awaiting_final);
            let current = match state.phase {
                RunPhase::Submitting | RunPhase::Running => true,
                RunPhase::Settled(Settlement::Success) => awaited,
                RunPhase::Idle | RunPhase::Settled(Settlement::HardFailure { .. }) => false,
            };
            if !current {
                return finish(state, Vec::new());
            }
            if !response.ok {
                let message = response
                    .error
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| "batch submission failed".to_string());
                ingest_warn!("run: hard failure: {}", message);
                state.settle_failure(message, now);
                return finish(state, Vec::new());
            }
            for result in response.results {
                state.results.upsert(result, &state.run_files);
            }
            state.mark_dirty();
            if state.phase.is_active() {
                settle(&mut state, now)
            } else if state.run_review {
                // Settled on counts; drafts waited for this reply.
                request_drafts(&mut state)
            } else {
                Vec::new()
            }
        }
        Msg::RunDone => {
            if state.phase.is_active() {
                settle(&mut state, now)
            } else {
                Vec::new()
            }
        }
        Msg::DraftsBuilt(summary) => {
            ingest_info!(
                "review: built {} draft(s), {} asset(s) skipped",
                summary.draft_count,
                summary.skipped_assets
            );
            state.review = ReviewState::Built(summary);
            state.mark_dirty();
            Vec::new()
        }
        Msg::DraftsFailed(message) => {
            ingest_warn!("review: draft creation failed: {}", message);
            state.review = ReviewState::Failed(message);
            state.mark_dirty();
            Vec::new()
        }
        Msg::RetryDraftsClicked => {
            let retryable = state.phase == RunPhase::Settled(Settlement::Success)
                && state.run_review
                && state.review != ReviewState::Building;
            if retryable {
                request_drafts(&mut state)
            } else {
                Vec::new()
            }
        }
        Msg::StoreWithoutReviewClicked => {
            if state.phase.is_active() {
                return finish(state, Vec::new());
            }
            state.options.review_before_storage = false;
            state.options.store_remote = true;
            state.refresh_preset();
            state.mark_queue_changed();
            start_run(&mut state, None, now)
        }
        Msg::Tick => {
            if state.phase.is_active() {
                if let Some(timeout) = state.limits.stall_timeout {
                    if state.run.is_stalled(now, timeout) {
                        let message =
                            format!("run stalled: no progress for {}s", timeout.as_secs());
                        ingest_warn!("run: {}", message);
                        state.settle_failure(message, now);
                    }
                }
            }
            Vec::new()
        }
        Msg::NoOp => Vec::new(),
    };

    if state.take_queue_changed() {
        effects.push(Effect::PersistQueue(state.snapshot()));
    }
    (state, effects)
}

fn finish(mut state: AppState, mut effects: Vec<Effect>) -> (AppState, Vec<Effect>) {
    if state.take_queue_changed() {
        effects.push(Effect::PersistQueue(state.snapshot()));
    }
    (state, effects)
}

fn expansion_effect(id: &ItemId, url: &str) -> Vec<Effect> {
    let url = url.trim();
    if url.is_empty() {
        return Vec::new();
    }
    vec![Effect::ScheduleExpansion {
        entry_id: id.clone(),
        url: url.to_string(),
    }]
}

fn submit_input(state: &mut AppState) -> Vec<Effect> {
    let raw = std::mem::take(&mut state.input);
    let urls = parse_urls(&raw);
    if urls.is_empty() {
        return Vec::new();
    }

    let mut effects = Vec::with_capacity(urls.len());
    let mut seen = HashSet::new();
    let mut skipped = 0;
    for url in urls {
        if !seen.insert(normalize_url_for_dedupe(&url)) || state.queue.contains_url(&url) {
            skipped += 1;
            continue;
        }
        let id = state
            .queue
            .add_entry(&url, MediaType::Auto, &state.options.type_defaults);
        effects.extend(expansion_effect(&id, &url));
    }
    state.last_paste_stats = Some(LastPasteStats {
        added: effects.len(),
        skipped,
    });
    if effects.is_empty() {
        state.mark_dirty();
    } else {
        state.mark_queue_changed();
    }
    effects
}

fn parse_urls(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn options_changed(state: &mut AppState) -> Vec<Effect> {
    state.refresh_preset();
    state.mark_queue_changed();
    Vec::new()
}

fn start_run(state: &mut AppState, only: Option<&HashSet<ItemId>>, now: Instant) -> Vec<Effect> {
    match state.prepare_batch(only) {
        Ok(request) => {
            ingest_info!(
                "run: submitting {} url(s) and {} file(s), store_remote={}",
                request.entries.len(),
                request.files.len(),
                request.store_remote
            );
            state.begin_run(&request, now);
            vec![Effect::SubmitBatch(request)]
        }
        Err(blocked) => {
            ingest_info!("run: blocked: {}", blocked);
            state.blocked = Some(blocked);
            state.mark_dirty();
            Vec::new()
        }
    }
}

fn settle(state: &mut AppState, now: Instant) -> Vec<Effect> {
    state.settle_success(now);
    let summary = state.results.summary();
    ingest_info!(
        "run: settled with {} result(s): {} ingested, {} processed, {} skipped, {} failed",
        summary.total,
        summary.ingested,
        summary.processed,
        summary.skipped,
        summary.failed
    );
    if state.run_review && !state.awaiting_final {
        request_drafts(state)
    } else {
        Vec::new()
    }
}

fn request_drafts(state: &mut AppState) -> Vec<Effect> {
    let request = state.draft_request();
    if request.sources.is_empty() {
        return Vec::new();
    }
    state.review = ReviewState::Building;
    state.mark_dirty();
    vec![Effect::BuildDrafts(request)]
}
