//! Debounced playlist expansion.
//!
//! Every entry id moves through `idle -> pending(timer) -> in-flight -> idle`.
//! Rescheduling a pending id cancels its timer; scheduling an in-flight id is
//! ignored. Resolutions are cached per composite id for a fixed TTL.

use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ingest_core::{detect_composite, CompositeRef, ItemId, Msg};
use ingest_logging::{ingest_debug, ingest_info, ingest_warn};
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::agent::{map_reqwest_error, AgentError, API_KEY_HEADER};
use crate::EngineEvent;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("playlist request failed: {0}")]
    Transport(#[from] AgentError),
    #[error("playlist resolver returned http status {0}")]
    HttpStatus(u16),
    #[error("unexpected playlist response: {0}")]
    Malformed(String),
}

#[async_trait::async_trait]
pub trait PlaylistResolver: Send + Sync {
    /// Child urls of the collection, in order.
    async fn resolve(&self, composite: &CompositeRef) -> Result<Vec<String>, ResolveError>;
}

/// Asks the server to enumerate a collection. Accepts a bare array of urls,
/// an array of objects carrying `url`, or either wrapped under `items`/`urls`.
#[derive(Debug, Clone)]
pub struct ReqwestPlaylistResolver {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl ReqwestPlaylistResolver {
    pub fn new(client: reqwest::Client, endpoint: String, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint,
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl PlaylistResolver for ReqwestPlaylistResolver {
    async fn resolve(&self, composite: &CompositeRef) -> Result<Vec<String>, ResolveError> {
        let mut endpoint = Url::parse(&self.endpoint)
            .map_err(|err| AgentError::InvalidUrl(err.to_string()))?;
        endpoint
            .query_pairs_mut()
            .append_pair("url", &composite.url);
        let mut builder = self.client.get(endpoint);
        if let Some(key) = self.api_key.as_deref() {
            builder = builder.header(API_KEY_HEADER, key);
        }
        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::HttpStatus(status.as_u16()));
        }
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        let body: Value = serde_json::from_slice(&bytes)
            .map_err(|err| ResolveError::Malformed(err.to_string()))?;
        Ok(child_urls(&body))
    }
}

fn child_urls(body: &Value) -> Vec<String> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(map) => match ["items", "urls", "entries"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
        {
            Some(items) => items,
            None => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(url) => Some(url.as_str()),
            Value::Object(map) => map.get("url").and_then(Value::as_str),
            _ => None,
        })
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone)]
pub struct ExpanderSettings {
    pub debounce: Duration,
    pub cache_ttl: Duration,
    pub max_items: usize,
}

impl Default for ExpanderSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            cache_ttl: Duration::from_secs(60 * 60),
            max_items: 200,
        }
    }
}

#[derive(Debug)]
enum Slot {
    Pending {
        generation: u64,
        token: CancellationToken,
    },
    InFlight,
}

#[derive(Debug)]
struct CachedExpansion {
    urls: Vec<String>,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct ExpanderState {
    slots: HashMap<ItemId, Slot>,
    cache: HashMap<String, CachedExpansion>,
    next_generation: u64,
}

/// Schedules expansions on the current Tokio runtime and reports each one as
/// `Msg::PlaylistExpanded`. The core drops results whose entry changed meanwhile.
#[derive(Clone)]
pub struct PlaylistExpander {
    resolver: Arc<dyn PlaylistResolver>,
    settings: ExpanderSettings,
    state: Arc<Mutex<ExpanderState>>,
    events: mpsc::Sender<EngineEvent>,
}

impl PlaylistExpander {
    pub fn new(
        resolver: Arc<dyn PlaylistResolver>,
        settings: ExpanderSettings,
        events: mpsc::Sender<EngineEvent>,
    ) -> Self {
        Self {
            resolver,
            settings,
            state: Arc::new(Mutex::new(ExpanderState::default())),
            events,
        }
    }

    /// Must be called from within a Tokio runtime.
    pub fn schedule(&self, entry_id: ItemId, url: String) {
        let composite = detect_composite(&url);
        let mut state = self.lock();

        if matches!(state.slots.get(&entry_id), Some(Slot::InFlight)) {
            ingest_debug!("playlist: {} already expanding, ignoring", entry_id);
            return;
        }
        if let Some(Slot::Pending { token, .. }) = state.slots.remove(&entry_id) {
            token.cancel();
        }

        let Some(composite) = composite else {
            return;
        };

        state.next_generation += 1;
        let generation = state.next_generation;
        let token = CancellationToken::new();
        state.slots.insert(
            entry_id.clone(),
            Slot::Pending {
                generation,
                token: token.clone(),
            },
        );
        drop(state);

        let expander = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(expander.settings.debounce) => {
                    expander.expand(entry_id, url, composite, generation).await;
                }
            }
        });
    }

    /// Drop every cached resolution.
    pub fn invalidate_cache(&self) {
        self.lock().cache.clear();
    }

    async fn expand(&self, entry_id: ItemId, url: String, composite: CompositeRef, generation: u64) {
        let cached = {
            let mut state = self.lock();
            let current = matches!(
                state.slots.get(&entry_id),
                Some(Slot::Pending { generation: pending, .. }) if *pending == generation
            );
            if !current {
                return;
            }
            state.slots.insert(entry_id.clone(), Slot::InFlight);
            let now = Instant::now();
            state.cache.retain(|_, entry| entry.expires_at > now);
            state
                .cache
                .get(&composite.composite_id)
                .map(|entry| entry.urls.clone())
        };

        let resolved = match cached {
            Some(urls) => {
                ingest_debug!("playlist: cache hit for {}", composite.composite_id);
                Ok(urls)
            }
            None => self.resolver.resolve(&composite).await.map(|mut urls| {
                urls.truncate(self.settings.max_items);
                self.lock().cache.insert(
                    composite.composite_id.clone(),
                    CachedExpansion {
                        urls: urls.clone(),
                        expires_at: Instant::now() + self.settings.cache_ttl,
                    },
                );
                urls
            }),
        };
        self.lock().slots.remove(&entry_id);

        match resolved {
            Ok(urls) if urls.is_empty() => {
                ingest_info!("playlist: {} resolved to no items", composite.composite_id);
            }
            Ok(urls) => {
                ingest_info!(
                    "playlist: {} resolved to {} items",
                    composite.composite_id,
                    urls.len()
                );
                let _ = self.events.send(EngineEvent::Core(Msg::PlaylistExpanded {
                    entry_id,
                    source_url: url,
                    child_urls: urls,
                }));
            }
            Err(err) => {
                ingest_warn!(
                    "playlist: failed to resolve {}: {}",
                    composite.composite_id,
                    err
                );
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, ExpanderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
