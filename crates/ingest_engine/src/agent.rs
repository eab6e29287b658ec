use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::StreamExt;
use ingest_core::{
    AgentResponse, BatchRequest, CommonOptions, ItemId, MediaType, OptionMap, ProgressFragment,
    TypeDefaults,
};
use ingest_logging::{ingest_debug, ingest_info, ingest_warn};
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

pub const API_KEY_HEADER: &str = "X-API-KEY";
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("invalid agent url: {0}")]
    InvalidUrl(String),
    #[error("agent returned http status {status}: {message}")]
    HttpStatus { status: u16, message: String },
    #[error("agent request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to encode batch: {0}")]
    Encode(String),
    #[error("malformed agent response: {0}")]
    Malformed(String),
    #[error("agent stream ended without a final response")]
    Incomplete,
}

/// Something the agent reported before its final response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// The submission was accepted and the job is running.
    Accepted,
    Progress(ProgressFragment),
    /// Explicit completion signal, ahead of the final response.
    Done,
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: AgentEvent);
}

#[async_trait::async_trait]
pub trait ExecutionAgent: Send + Sync {
    /// Submit one batch. Progress goes to `sink`; the returned response is the
    /// agent's final reply. Transport failures are errors, agent-reported
    /// failures are `Ok` responses with `ok == false`.
    async fn submit(
        &self,
        request: &BatchRequest,
        sink: &dyn ProgressSink,
    ) -> Result<AgentResponse, AgentError>;
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub submit_url: String,
    pub api_key: Option<String>,
    pub connect_timeout: Duration,
}

/// Build a client shared by the engine's HTTP collaborators. `timeout` is
/// left unset for streaming requests.
pub fn build_client(
    connect_timeout: Duration,
    timeout: Option<Duration>,
) -> Result<reqwest::Client, AgentError> {
    let mut builder = reqwest::Client::builder().connect_timeout(connect_timeout);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(map_reqwest_error)
}

/// Posts the batch as JSON and reads an NDJSON reply: every line without an
/// `ok` key is a progress fragment, the line carrying `ok` is the final response.
/// A plain `application/json` reply is taken as the final response directly.
#[derive(Debug, Clone)]
pub struct ReqwestAgent {
    client: reqwest::Client,
    settings: AgentSettings,
}

impl ReqwestAgent {
    pub fn new(settings: AgentSettings) -> Result<Self, AgentError> {
        let client = build_client(settings.connect_timeout, None)?;
        Ok(Self { client, settings })
    }
}

#[async_trait::async_trait]
impl ExecutionAgent for ReqwestAgent {
    async fn submit(
        &self,
        request: &BatchRequest,
        sink: &dyn ProgressSink,
    ) -> Result<AgentResponse, AgentError> {
        let url = Url::parse(&self.settings.submit_url)
            .map_err(|err| AgentError::InvalidUrl(err.to_string()))?;
        let body = serde_json::to_vec(&WireBatch::from_request(request))
            .map_err(|err| AgentError::Encode(err.to_string()))?;
        ingest_info!(
            "agent: submitting {} bytes to {}",
            body.len(),
            self.settings.submit_url
        );

        let mut builder = self
            .client
            .post(url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(
                ACCEPT,
                HeaderValue::from_static("application/x-ndjson, application/json"),
            )
            .body(body);
        if let Some(key) = self.settings.api_key.as_deref() {
            builder = builder.header(API_KEY_HEADER, key);
        }
        let response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::HttpStatus {
                status: status.as_u16(),
                message: error_message(&text).unwrap_or_else(|| status.to_string()),
            });
        }
        sink.emit(AgentEvent::Accepted);

        let is_plain_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.trim_start().starts_with("application/json"));
        if is_plain_json {
            let bytes = response.bytes().await.map_err(map_reqwest_error)?;
            return serde_json::from_slice(&bytes)
                .map_err(|err| AgentError::Malformed(err.to_string()));
        }

        let mut reader = NdjsonReader::default();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            for line in reader.push(&chunk) {
                if let Some(response) = handle_line(&line, sink)? {
                    return Ok(response);
                }
            }
        }
        if let Some(line) = reader.finish() {
            if let Some(response) = handle_line(&line, sink)? {
                return Ok(response);
            }
        }
        Err(AgentError::Incomplete)
    }
}

/// Splits a byte stream into complete lines; partial lines wait for the next chunk.
#[derive(Debug, Default)]
struct NdjsonReader {
    buffer: Vec<u8>,
}

impl NdjsonReader {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(position) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=position).collect();
            lines.push(String::from_utf8_lossy(&line).trim().to_string());
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&std::mem::take(&mut self.buffer))
            .trim()
            .to_string();
        (!rest.is_empty()).then_some(rest)
    }
}

fn handle_line(line: &str, sink: &dyn ProgressSink) -> Result<Option<AgentResponse>, AgentError> {
    if line.is_empty() {
        return Ok(None);
    }
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(err) => {
            ingest_warn!("agent: skipping unparsable progress line: {}", err);
            return Ok(None);
        }
    };
    if value.get("ok").is_some() {
        return serde_json::from_value(value)
            .map(Some)
            .map_err(|err| AgentError::Malformed(err.to_string()));
    }
    if value.get("done").and_then(Value::as_bool) == Some(true) {
        sink.emit(AgentEvent::Done);
        return Ok(None);
    }
    match serde_json::from_value::<ProgressFragment>(value) {
        Ok(fragment) => {
            ingest_debug!(
                "agent: progress processed={:?} total={:?} result={}",
                fragment.processed_count,
                fragment.total_count,
                fragment.result.is_some()
            );
            sink.emit(AgentEvent::Progress(fragment));
        }
        Err(err) => ingest_warn!("agent: skipping malformed progress fragment: {}", err),
    }
    Ok(None)
}

fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["error", "detail", "message"] {
            if let Some(text) = value.get(key).and_then(Value::as_str) {
                return Some(text.to_string());
            }
        }
    }
    Some(body.chars().take(ERROR_BODY_LIMIT).collect())
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> AgentError {
    if err.is_timeout() {
        return AgentError::Timeout;
    }
    if err.is_builder() {
        return AgentError::InvalidUrl(err.to_string());
    }
    AgentError::Network(err.to_string())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireBatch<'a> {
    entries: Vec<WireEntry<'a>>,
    files: Vec<WireFile<'a>>,
    store_remote: bool,
    process_only: bool,
    common_options: &'a CommonOptions,
    advanced_values: &'a OptionMap,
    file_defaults: &'a TypeDefaults,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireEntry<'a> {
    id: &'a ItemId,
    url: &'a str,
    #[serde(rename = "type")]
    media_type: MediaType,
    keywords: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<&'a OptionMap>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireFile<'a> {
    id: &'a ItemId,
    name: &'a str,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    #[serde(rename = "type")]
    media_type: MediaType,
    data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<&'a OptionMap>,
}

impl<'a> WireBatch<'a> {
    fn from_request(request: &'a BatchRequest) -> Self {
        Self {
            entries: request
                .entries
                .iter()
                .map(|entry| WireEntry {
                    id: &entry.id,
                    url: &entry.url,
                    media_type: entry.inferred_type,
                    keywords: &entry.keywords,
                    options: entry.options.as_ref(),
                })
                .collect(),
            files: request
                .files
                .iter()
                .map(|file| WireFile {
                    id: &file.id,
                    name: &file.name,
                    size: file.size,
                    mime_type: file.mime_type.as_deref(),
                    media_type: file.inferred_type,
                    data: BASE64.encode(&file.bytes),
                    options: file.options.as_ref(),
                })
                .collect(),
            store_remote: request.store_remote,
            process_only: request.process_only,
            common_options: &request.common,
            advanced_values: &request.advanced,
            file_defaults: &request.file_defaults,
        }
    }
}
