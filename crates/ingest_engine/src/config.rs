use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ingest_core::{AppState, IngestLimits};
use ingest_logging::ingest_info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Engine settings. Every field has a default, so a config file only needs
/// the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base url of the execution agent, e.g. `http://127.0.0.1:8000`.
    pub server_url: String,
    pub submit_path: String,
    pub openapi_path: String,
    /// Resolver that enumerates playlist and channel urls.
    pub playlist_path: String,
    /// Component schema holding the advanced ingest options.
    pub options_schema: String,
    pub api_key: Option<String>,
    pub connect_timeout: Duration,
    /// Applies to short requests; batch submissions stream without a timeout.
    pub request_timeout: Duration,
    pub playlist_debounce: Duration,
    pub playlist_cache_ttl: Duration,
    pub playlist_max_items: usize,
    /// Interval between `Msg::Tick`s sent to the core.
    pub tick_interval: Duration,
    pub schema_server_ttl: Duration,
    pub schema_fallback_ttl: Duration,
    pub draft_retention: Duration,
    pub asset_cap_bytes: u64,
    pub state_dir: PathBuf,
    pub drafts_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub limits: IngestLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".to_string(),
            submit_path: "/api/v1/media/ingest-batch".to_string(),
            openapi_path: "/openapi.json".to_string(),
            playlist_path: "/api/v1/media/playlist".to_string(),
            options_schema: "IngestOptions".to_string(),
            api_key: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            playlist_debounce: Duration::from_millis(500),
            playlist_cache_ttl: Duration::from_secs(60 * 60),
            playlist_max_items: 200,
            tick_interval: Duration::from_secs(5),
            schema_server_ttl: Duration::from_secs(60 * 60),
            schema_fallback_ttl: Duration::from_secs(5 * 60),
            draft_retention: Duration::from_secs(7 * 24 * 60 * 60),
            asset_cap_bytes: 100 * MIB,
            state_dir: PathBuf::from("./ingest_state"),
            drafts_dir: PathBuf::from("./ingest_state/drafts"),
            assets_dir: PathBuf::from("./ingest_state/assets"),
            limits: IngestLimits::default(),
        }
    }
}

impl EngineConfig {
    /// Read a RON config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                ingest_info!("config: {:?} not found, using defaults", path);
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let config = ron::from_str(&content).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        ingest_info!("config: loaded {:?}", path);
        Ok(config)
    }

    /// Fresh core state carrying the configured size and stall limits.
    pub fn initial_state(&self) -> AppState {
        AppState::with_limits(self.limits.clone())
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.server_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
