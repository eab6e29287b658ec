//! Ingest engine: async side effects for the core (agent submission, playlist
//! expansion, schema cache, review drafts and queue persistence).
mod agent;
mod config;
mod engine;
mod persist;
mod playlist;
mod review;
mod schema_cache;

pub use agent::{
    build_client, AgentError, AgentEvent, AgentSettings, ExecutionAgent, ProgressSink,
    ReqwestAgent, API_KEY_HEADER,
};
pub use config::{ConfigError, EngineConfig};
pub use engine::{ChannelProgressSink, EngineError, EngineEvent, EngineHandle, EngineParts};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError, StateFile, STATE_FILENAME};
pub use playlist::{
    ExpanderSettings, PlaylistExpander, PlaylistResolver, ReqwestPlaylistResolver, ResolveError,
};
pub use review::{
    build_review_drafts, content_digest, AssetError, AssetStore, DraftStore, DraftStoreError,
    FsAssetStore, FsDraftStore, StoredBatch,
};
pub use schema_cache::{
    LoadOptions, LoadedSchema, ReqwestSchemaSource, SchemaCache, SchemaFetchError, SchemaReload,
    SchemaSource,
};
