//! Process-wide cache of the advanced option schema.
//!
//! One global slot: a server-sourced schema stays fresh for the server TTL, a
//! fallback-sourced one only for the shorter fallback TTL so a real fetch is
//! retried sooner.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ingest_core::{
    diff_schemas, fallback_schema, flatten_schema, SchemaDiff, SchemaEntry, SchemaOrigin,
};
use ingest_logging::{ingest_debug, ingest_info, ingest_warn};
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use url::Url;

use crate::agent::{map_reqwest_error, AgentError, API_KEY_HEADER};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaFetchError {
    #[error("schema request failed: {0}")]
    Transport(#[from] AgentError),
    #[error("schema endpoint returned http status {0}")]
    HttpStatus(u16),
    #[error("schema document is not valid json: {0}")]
    Malformed(String),
    #[error("schema {0} has no usable fields")]
    Empty(String),
}

#[async_trait::async_trait]
pub trait SchemaSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<SchemaEntry>, SchemaFetchError>;
}

/// Fetches the server's OpenAPI document and flattens one component schema.
#[derive(Debug, Clone)]
pub struct ReqwestSchemaSource {
    client: reqwest::Client,
    document_url: String,
    schema_name: String,
    api_key: Option<String>,
}

impl ReqwestSchemaSource {
    pub fn new(
        client: reqwest::Client,
        document_url: String,
        schema_name: String,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            document_url,
            schema_name,
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl SchemaSource for ReqwestSchemaSource {
    async fn fetch(&self) -> Result<Vec<SchemaEntry>, SchemaFetchError> {
        let url = Url::parse(&self.document_url)
            .map_err(|err| AgentError::InvalidUrl(err.to_string()))?;
        let mut builder = self.client.get(url);
        if let Some(key) = self.api_key.as_deref() {
            builder = builder.header(API_KEY_HEADER, key);
        }
        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SchemaFetchError::HttpStatus(status.as_u16()));
        }
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        let document: Value = serde_json::from_slice(&bytes)
            .map_err(|err| SchemaFetchError::Malformed(err.to_string()))?;
        let entries = flatten_schema(&document, &self.schema_name);
        if entries.is_empty() {
            return Err(SchemaFetchError::Empty(self.schema_name.clone()));
        }
        Ok(entries)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Ignore any cached schema.
    pub force_fetch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSchema {
    pub entries: Vec<SchemaEntry>,
    pub source: SchemaOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReload {
    pub schema: LoadedSchema,
    /// Fields added or removed relative to the schema held before the reload.
    pub diff: SchemaDiff,
}

#[derive(Debug)]
struct CachedSchema {
    schema: LoadedSchema,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct SchemaCache {
    source: Arc<dyn SchemaSource>,
    server_ttl: Duration,
    fallback_ttl: Duration,
    slot: Arc<Mutex<Option<CachedSchema>>>,
}

impl SchemaCache {
    pub fn new(source: Arc<dyn SchemaSource>, server_ttl: Duration, fallback_ttl: Duration) -> Self {
        Self {
            source,
            server_ttl,
            fallback_ttl,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Never fails: fetch errors fall back to the static schema.
    pub async fn load(&self, prefer_server: bool, options: LoadOptions) -> LoadedSchema {
        if !prefer_server {
            let schema = fallback();
            self.store(&schema);
            return schema;
        }

        if !options.force_fetch {
            let now = Instant::now();
            let fresh = self
                .lock()
                .as_ref()
                .filter(|cached| cached.expires_at > now)
                .map(|cached| cached.schema.clone());
            if let Some(schema) = fresh {
                ingest_debug!("schema: cache hit ({:?})", schema.source);
                return schema;
            }
        }

        let schema = match self.source.fetch().await {
            Ok(entries) => {
                ingest_info!("schema: loaded {} fields from server", entries.len());
                LoadedSchema {
                    entries,
                    source: SchemaOrigin::Server,
                }
            }
            Err(err) => {
                ingest_warn!("schema: fetch failed, using fallback: {}", err);
                fallback()
            }
        };
        self.store(&schema);
        schema
    }

    /// Fetch again and report which fields changed.
    pub async fn reload(&self, prefer_server: bool) -> SchemaReload {
        let previous = self
            .lock()
            .as_ref()
            .map(|cached| cached.schema.entries.clone())
            .unwrap_or_default();
        let schema = self
            .load(prefer_server, LoadOptions { force_fetch: true })
            .await;
        let diff = diff_schemas(&previous, &schema.entries);
        if !diff.is_empty() {
            ingest_info!(
                "schema: reload added {} and removed {} field(s)",
                diff.added.len(),
                diff.removed.len()
            );
        }
        SchemaReload { schema, diff }
    }

    pub fn invalidate(&self) {
        *self.lock() = None;
    }

    fn store(&self, schema: &LoadedSchema) {
        let ttl = match schema.source {
            SchemaOrigin::Server => self.server_ttl,
            SchemaOrigin::Fallback => self.fallback_ttl,
        };
        *self.lock() = Some(CachedSchema {
            schema: schema.clone(),
            expires_at: Instant::now() + ttl,
        });
    }

    fn lock(&self) -> MutexGuard<'_, Option<CachedSchema>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn fallback() -> LoadedSchema {
    LoadedSchema {
        entries: fallback_schema(),
        source: SchemaOrigin::Fallback,
    }
}
