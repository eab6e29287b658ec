use std::io;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use ingest_core::{
    AgentResponse, BatchRequest, DraftRequest, Effect, HeadingSectionDetector, Msg,
    SectionDetector,
};
use ingest_logging::{ingest_debug, ingest_error, ingest_info, ingest_warn};
use thiserror::Error;

use crate::agent::{
    build_client, AgentError, AgentEvent, AgentSettings, ExecutionAgent, ProgressSink,
    ReqwestAgent,
};
use crate::config::EngineConfig;
use crate::persist::StateFile;
use crate::playlist::{
    ExpanderSettings, PlaylistExpander, PlaylistResolver, ReqwestPlaylistResolver,
};
use crate::review::{build_review_drafts, AssetStore, DraftStore, FsAssetStore, FsDraftStore};
use crate::schema_cache::{
    LoadOptions, LoadedSchema, ReqwestSchemaSource, SchemaCache, SchemaReload, SchemaSource,
};

/// Everything the engine reports back to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Feed into `ingest_core::update`.
    Core(Msg),
    Schema(LoadedSchema),
    SchemaReloaded(SchemaReload),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start engine runtime: {0}")]
    Runtime(#[source] io::Error),
    #[error("failed to set up http client: {0}")]
    Client(#[from] AgentError),
}

enum EngineCommand {
    Effect(Effect),
    LoadSchema {
        prefer_server: bool,
        options: LoadOptions,
    },
    ReloadSchema {
        prefer_server: bool,
    },
    InvalidateSchema,
    PurgeDrafts,
}

/// Collaborators the engine drives. `EngineHandle::new` wires the HTTP and
/// filesystem implementations; tests substitute their own.
pub struct EngineParts {
    pub agent: Arc<dyn ExecutionAgent>,
    pub resolver: Arc<dyn PlaylistResolver>,
    pub schema_source: Arc<dyn SchemaSource>,
    pub assets: Arc<dyn AssetStore>,
    pub drafts: Arc<dyn DraftStore>,
    pub detector: Arc<dyn SectionDetector>,
    /// `None` disables queue persistence.
    pub state_file: Option<StateFile>,
}

impl EngineParts {
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let client = build_client(config.connect_timeout, Some(config.request_timeout))?;
        let agent = ReqwestAgent::new(AgentSettings {
            submit_url: config.endpoint(&config.submit_path),
            api_key: config.api_key.clone(),
            connect_timeout: config.connect_timeout,
        })?;
        Ok(Self {
            agent: Arc::new(agent),
            resolver: Arc::new(ReqwestPlaylistResolver::new(
                client.clone(),
                config.endpoint(&config.playlist_path),
                config.api_key.clone(),
            )),
            schema_source: Arc::new(ReqwestSchemaSource::new(
                client,
                config.endpoint(&config.openapi_path),
                config.options_schema.clone(),
                config.api_key.clone(),
            )),
            assets: Arc::new(FsAssetStore::new(
                config.assets_dir.clone(),
                config.asset_cap_bytes,
            )),
            drafts: Arc::new(FsDraftStore::new(config.drafts_dir.clone())),
            detector: Arc::new(HeadingSectionDetector),
            state_file: Some(StateFile::new(config.state_dir.clone())),
        })
    }
}

/// Runs effects on a background Tokio runtime and hands events back over a
/// channel, so the host's update loop stays synchronous.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
}

impl EngineHandle {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let parts = EngineParts::from_config(config)?;
        Self::with_parts(config, parts)
    }

    /// Start the engine thread. A saved queue is restored first, as a
    /// `Msg::RestoreQueue` event, and expired draft batches are purged.
    pub fn with_parts(config: &EngineConfig, parts: EngineParts) -> Result<Self, EngineError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(EngineError::Runtime)?;
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();

        let tick_interval = config.tick_interval;
        let worker = Worker {
            agent: parts.agent,
            expander: PlaylistExpander::new(
                parts.resolver,
                ExpanderSettings {
                    debounce: config.playlist_debounce,
                    cache_ttl: config.playlist_cache_ttl,
                    max_items: config.playlist_max_items,
                },
                event_tx.clone(),
            ),
            schema: SchemaCache::new(
                parts.schema_source,
                config.schema_server_ttl,
                config.schema_fallback_ttl,
            ),
            assets: parts.assets,
            drafts: parts.drafts,
            detector: parts.detector,
            state_file: parts.state_file,
            draft_retention: config.draft_retention,
            events: event_tx,
        };

        thread::spawn(move || {
            let _guard = runtime.enter();
            worker.restore_queue();
            worker.purge_drafts();
            if !tick_interval.is_zero() {
                runtime.spawn(tick_loop(tick_interval, worker.events.clone()));
            }
            while let Ok(command) = cmd_rx.recv() {
                worker.handle(&runtime, command);
            }
            ingest_debug!("engine: command channel closed, shutting down");
        });

        Ok(Self { cmd_tx, event_rx })
    }

    pub fn dispatch(&self, effect: Effect) {
        self.send(EngineCommand::Effect(effect));
    }

    pub fn dispatch_all(&self, effects: impl IntoIterator<Item = Effect>) {
        for effect in effects {
            self.dispatch(effect);
        }
    }

    /// Answered with `EngineEvent::Schema`.
    pub fn load_schema(&self, prefer_server: bool, options: LoadOptions) {
        self.send(EngineCommand::LoadSchema {
            prefer_server,
            options,
        });
    }

    /// Answered with `EngineEvent::SchemaReloaded`.
    pub fn reload_schema(&self, prefer_server: bool) {
        self.send(EngineCommand::ReloadSchema { prefer_server });
    }

    pub fn invalidate_schema(&self) {
        self.send(EngineCommand::InvalidateSchema);
    }

    pub fn purge_drafts(&self) {
        self.send(EngineCommand::PurgeDrafts);
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    fn send(&self, command: EngineCommand) {
        let _ = self.cmd_tx.send(command);
    }
}

async fn tick_loop(period: Duration, events: mpsc::Sender<EngineEvent>) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    loop {
        interval.tick().await;
        if events.send(EngineEvent::Core(Msg::Tick)).is_err() {
            break;
        }
    }
}

struct Worker {
    agent: Arc<dyn ExecutionAgent>,
    expander: PlaylistExpander,
    schema: SchemaCache,
    assets: Arc<dyn AssetStore>,
    drafts: Arc<dyn DraftStore>,
    detector: Arc<dyn SectionDetector>,
    state_file: Option<StateFile>,
    draft_retention: Duration,
    events: mpsc::Sender<EngineEvent>,
}

impl Worker {
    fn handle(&self, runtime: &tokio::runtime::Runtime, command: EngineCommand) {
        match command {
            EngineCommand::Effect(effect) => self.run_effect(runtime, effect),
            EngineCommand::LoadSchema {
                prefer_server,
                options,
            } => {
                let schema = self.schema.clone();
                let events = self.events.clone();
                runtime.spawn(async move {
                    let loaded = schema.load(prefer_server, options).await;
                    let _ = events.send(EngineEvent::Schema(loaded));
                });
            }
            EngineCommand::ReloadSchema { prefer_server } => {
                let schema = self.schema.clone();
                let events = self.events.clone();
                runtime.spawn(async move {
                    let reload = schema.reload(prefer_server).await;
                    let _ = events.send(EngineEvent::SchemaReloaded(reload));
                });
            }
            EngineCommand::InvalidateSchema => self.schema.invalidate(),
            EngineCommand::PurgeDrafts => self.purge_drafts(),
        }
    }

    fn run_effect(&self, runtime: &tokio::runtime::Runtime, effect: Effect) {
        match effect {
            Effect::ScheduleExpansion { entry_id, url } => self.expander.schedule(entry_id, url),
            Effect::SubmitBatch(request) => {
                let agent = self.agent.clone();
                let events = self.events.clone();
                runtime.spawn(submit_batch(agent, request, events));
            }
            Effect::BuildDrafts(request) => self.build_drafts(runtime, request),
            Effect::RebindStubs(rebinds) => {
                let _ = self.events.send(EngineEvent::Core(Msg::StubsRebound(rebinds)));
            }
            // Written inline so snapshots land in the order they were produced.
            Effect::PersistQueue(snapshot) => {
                if let Some(state_file) = &self.state_file {
                    if let Err(err) = state_file.save(&snapshot) {
                        ingest_error!("engine: failed to persist queue: {}", err);
                    }
                }
            }
        }
    }

    fn build_drafts(&self, runtime: &tokio::runtime::Runtime, request: DraftRequest) {
        let assets = self.assets.clone();
        let drafts = self.drafts.clone();
        let detector = self.detector.clone();
        let retention = self.draft_retention;
        let events = self.events.clone();
        runtime.spawn_blocking(move || {
            let msg = match build_review_drafts(
                &request,
                detector.as_ref(),
                assets.as_ref(),
                drafts.as_ref(),
                retention,
                Utc::now(),
            ) {
                Ok(summary) => Msg::DraftsBuilt(summary),
                Err(err) => Msg::DraftsFailed(err.to_string()),
            };
            let _ = events.send(EngineEvent::Core(msg));
        });
    }

    fn restore_queue(&self) {
        let Some(state_file) = &self.state_file else {
            return;
        };
        match state_file.load() {
            Ok(Some(snapshot)) => {
                let _ = self.events.send(EngineEvent::Core(Msg::RestoreQueue(snapshot)));
            }
            Ok(None) => ingest_debug!("engine: no saved queue at {:?}", state_file.path()),
            Err(err) => ingest_warn!("engine: ignoring unreadable saved queue: {}", err),
        }
    }

    fn purge_drafts(&self) {
        if let Err(err) = self.drafts.purge_expired(Utc::now()) {
            ingest_warn!("engine: failed to purge expired drafts: {}", err);
        }
    }
}

async fn submit_batch(
    agent: Arc<dyn ExecutionAgent>,
    request: BatchRequest,
    events: mpsc::Sender<EngineEvent>,
) {
    let sink = ChannelProgressSink::new(events.clone());
    let response = match agent.submit(&request, &sink).await {
        Ok(response) => response,
        Err(err) => {
            ingest_warn!("engine: batch submission failed: {}", err);
            AgentResponse::failure(err.to_string())
        }
    };
    ingest_info!(
        "engine: batch finished ok={} with {} result(s)",
        response.ok,
        response.results.len()
    );
    let _ = events.send(EngineEvent::Core(Msg::SubmissionFinished(response)));
}

/// Forwards agent progress to the host as core messages.
pub struct ChannelProgressSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: AgentEvent) {
        let msg = match event {
            AgentEvent::Accepted => Msg::SubmissionAccepted,
            AgentEvent::Progress(fragment) => Msg::Progress(fragment),
            AgentEvent::Done => Msg::RunDone,
        };
        let _ = self.tx.send(EngineEvent::Core(msg));
    }
}
