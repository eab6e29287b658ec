//! Review drafts on disk: a content-addressed asset store with a byte cap and
//! one JSON document per draft batch.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use ingest_core::{
    plan_drafts, AssetRef, Draft, DraftBatch, DraftBuildSummary, DraftRequest, FileMeta, ItemId,
    SectionDetector, SourceFile,
};
use ingest_logging::{ingest_debug, ingest_info, ingest_warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::persist::{AtomicFileWriter, PersistError};

const BATCH_EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset store full: need {needed} bytes, {available} available")]
    CapExceeded { needed: u64, available: u64 },
    #[error("asset io error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

#[derive(Debug, Error)]
pub enum DraftStoreError {
    #[error("draft store io error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("failed to encode draft batch: {0}")]
    Encode(String),
    #[error("failed to decode draft batch {path:?}: {message}")]
    Decode { path: PathBuf, message: String },
}

pub trait AssetStore: Send + Sync {
    /// Store `bytes` and return its reference. Identical content is stored once.
    fn put(&self, bytes: &[u8], mime_type: Option<&str>) -> Result<AssetRef, AssetError>;
    fn used_bytes(&self) -> Result<u64, AssetError>;
}

pub trait DraftStore: Send + Sync {
    fn save_batch(&self, batch: &DraftBatch, drafts: &[Draft]) -> Result<(), DraftStoreError>;
    fn load_batch(&self, batch_id: &str) -> Result<Option<StoredBatch>, DraftStoreError>;
    fn list_batches(&self) -> Result<Vec<DraftBatch>, DraftStoreError>;
    /// Remove batches whose expiry has passed; returns how many were removed.
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, DraftStoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBatch {
    pub batch: DraftBatch,
    pub drafts: Vec<Draft>,
}

pub fn content_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Assets live in one directory, named by their SHA-256 digest.
#[derive(Debug, Clone)]
pub struct FsAssetStore {
    writer: AtomicFileWriter,
    cap_bytes: u64,
}

impl FsAssetStore {
    pub fn new(dir: PathBuf, cap_bytes: u64) -> Self {
        Self {
            writer: AtomicFileWriter::new(dir),
            cap_bytes,
        }
    }

    pub fn asset_path(&self, digest: &str) -> PathBuf {
        self.writer.dir().join(digest)
    }
}

impl AssetStore for FsAssetStore {
    fn put(&self, bytes: &[u8], mime_type: Option<&str>) -> Result<AssetRef, AssetError> {
        let digest = content_digest(bytes);
        let size = bytes.len() as u64;
        let asset = AssetRef {
            digest: digest.clone(),
            size,
            mime_type: mime_type.map(str::to_string),
        };
        if self.asset_path(&digest).is_file() {
            ingest_debug!("assets: {} already stored", digest);
            return Ok(asset);
        }

        let used = self.used_bytes()?;
        if used.saturating_add(size) > self.cap_bytes {
            return Err(AssetError::CapExceeded {
                needed: size,
                available: self.cap_bytes.saturating_sub(used),
            });
        }
        self.writer.write(&digest, bytes)?;
        Ok(asset)
    }

    fn used_bytes(&self) -> Result<u64, AssetError> {
        let entries = match fs::read_dir(self.writer.dir()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        let mut total = 0u64;
        for entry in entries {
            let meta = entry?.metadata()?;
            if meta.is_file() {
                total = total.saturating_add(meta.len());
            }
        }
        Ok(total)
    }
}

/// One `{batch_id}.json` document per batch.
#[derive(Debug, Clone)]
pub struct FsDraftStore {
    writer: AtomicFileWriter,
}

impl FsDraftStore {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            writer: AtomicFileWriter::new(dir),
        }
    }

    fn batch_path(&self, batch_id: &str) -> PathBuf {
        self.writer
            .dir()
            .join(format!("{batch_id}.{BATCH_EXTENSION}"))
    }

    fn batch_files(&self) -> Result<Vec<PathBuf>, DraftStoreError> {
        let entries = match fs::read_dir(self.writer.dir()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(BATCH_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

fn read_batch(path: &Path) -> Result<StoredBatch, DraftStoreError> {
    let content = fs::read(path)?;
    serde_json::from_slice(&content).map_err(|err| DraftStoreError::Decode {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

impl DraftStore for FsDraftStore {
    fn save_batch(&self, batch: &DraftBatch, drafts: &[Draft]) -> Result<(), DraftStoreError> {
        let stored = StoredBatch {
            batch: batch.clone(),
            drafts: drafts.to_vec(),
        };
        let content = serde_json::to_vec_pretty(&stored)
            .map_err(|err| DraftStoreError::Encode(err.to_string()))?;
        self.writer
            .write(&format!("{}.{BATCH_EXTENSION}", batch.id), content)?;
        Ok(())
    }

    fn load_batch(&self, batch_id: &str) -> Result<Option<StoredBatch>, DraftStoreError> {
        let path = self.batch_path(batch_id);
        if !path.is_file() {
            return Ok(None);
        }
        read_batch(&path).map(Some)
    }

    fn list_batches(&self) -> Result<Vec<DraftBatch>, DraftStoreError> {
        let mut batches = Vec::new();
        for path in self.batch_files()? {
            match read_batch(&path) {
                Ok(stored) => batches.push(stored.batch),
                Err(err) => ingest_warn!("drafts: skipping unreadable batch: {}", err),
            }
        }
        batches.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(batches)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, DraftStoreError> {
        let mut removed = 0;
        for path in self.batch_files()? {
            let expired = match read_batch(&path) {
                Ok(stored) => stored.batch.is_expired(now),
                Err(err) => {
                    ingest_warn!("drafts: skipping unreadable batch: {}", err);
                    false
                }
            };
            if expired {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            ingest_info!("drafts: purged {} expired batch(es)", removed);
        }
        Ok(removed)
    }
}

/// Build and store one batch of drafts for a settled review run.
///
/// Nothing is written when no sub-item is extractable. Asset failures never
/// fail the build: the draft keeps file metadata and `skipped_assets` grows.
pub fn build_review_drafts(
    request: &DraftRequest,
    detector: &dyn SectionDetector,
    assets: &dyn AssetStore,
    store: &dyn DraftStore,
    retention: Duration,
    now: DateTime<Utc>,
) -> Result<DraftBuildSummary, DraftStoreError> {
    let planned = plan_drafts(request, detector);
    if planned.plans.is_empty() {
        ingest_info!(
            "drafts: nothing to review ({} sub-item(s) skipped)",
            planned.skipped_items
        );
        return Ok(DraftBuildSummary {
            batch_id: None,
            draft_count: 0,
            skipped_items: planned.skipped_items,
            skipped_assets: 0,
        });
    }

    let batch_id = Uuid::new_v4().to_string();
    let expires_at = TimeDelta::from_std(retention)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    let mut stored_assets: HashMap<ItemId, Option<AssetRef>> = HashMap::new();
    let mut skipped_assets = 0;
    let mut drafts = Vec::with_capacity(planned.plans.len());
    for plan in planned.plans {
        let mut asset = None;
        let mut file_meta = None;
        if let Some(file) = &plan.file {
            asset = stored_assets
                .entry(file.stub_id.clone())
                .or_insert_with(|| store_asset(assets, file))
                .clone();
            if asset.is_none() {
                skipped_assets += 1;
                file_meta = Some(FileMeta {
                    name: file.name.clone(),
                    size: file.size,
                    mime_type: file.mime_type.clone(),
                });
            }
        }
        drafts.push(Draft {
            id: Uuid::new_v4().to_string(),
            batch_id: batch_id.clone(),
            title: plan.title,
            content: plan.content,
            format: plan.format,
            sections: plan.sections,
            keywords: plan.keywords,
            source: plan.source,
            asset,
            file_meta,
            created_at: now,
            expires_at,
        });
    }

    let batch = DraftBatch {
        id: batch_id.clone(),
        created_at: now,
        expires_at,
        draft_ids: drafts.iter().map(|draft| draft.id.clone()).collect(),
        skipped_assets,
    };
    store.save_batch(&batch, &drafts)?;
    ingest_info!(
        "drafts: stored batch {} with {} draft(s)",
        batch_id,
        drafts.len()
    );
    Ok(DraftBuildSummary {
        batch_id: Some(batch_id),
        draft_count: drafts.len(),
        skipped_items: planned.skipped_items,
        skipped_assets,
    })
}

fn store_asset(assets: &dyn AssetStore, file: &SourceFile) -> Option<AssetRef> {
    match assets.put(&file.bytes, file.mime_type.as_deref()) {
        Ok(asset) => Some(asset),
        Err(err) => {
            ingest_warn!("drafts: keeping metadata only for {}: {}", file.name, err);
            None
        }
    }
}
