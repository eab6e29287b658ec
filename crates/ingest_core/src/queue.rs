//! Queue store: ordered remote entries and local file stubs.

use std::collections::HashSet;
use std::fmt;

use ingest_logging::ingest_debug;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::attachments::{AttachmentReport, AttachmentTracker, FileHandle, InstanceRebind};
use crate::defaults::{overrides_differ, EntryOverrides, TypeDefaults};
use crate::media::MediaType;

/// Opaque identifier shared by entries, stubs and the results that correlate to them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        ItemId(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        ItemId(value)
    }
}

/// A queued remote url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: ItemId,
    pub url: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub overrides: EntryOverrides,
    /// Type defaults captured when the entry was created. Never rewritten.
    pub defaults: TypeDefaults,
}

impl Entry {
    pub fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }

    /// Type forced away from `auto`, keywords set, or overrides that change
    /// the captured defaults.
    pub fn is_customized(&self) -> bool {
        self.media_type != MediaType::Auto
            || !self.keywords.is_empty()
            || overrides_differ(&self.defaults, &self.overrides)
    }
}

/// Persisted metadata for a queued local file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStub {
    pub id: ItemId,
    /// Content signature: name + size + modification time.
    pub key: String,
    /// Identity of the last handle this stub was attached to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    pub name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub defaults: TypeDefaults,
}

/// User edit applied to an entry. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntryPatch {
    pub url: Option<String>,
    pub media_type: Option<MediaType>,
    pub keywords: Option<Vec<String>>,
    pub overrides: Option<EntryOverrides>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddFilesOutcome {
    pub added: Vec<ItemId>,
    pub reattached: Vec<ItemId>,
    pub skipped_duplicates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueStore {
    entries: Vec<Entry>,
    stubs: Vec<FileStub>,
    next_id: u64,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(entries: Vec<Entry>, stubs: Vec<FileStub>, next_id: u64) -> Self {
        Self {
            entries,
            stubs,
            next_id,
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn stubs(&self) -> &[FileStub] {
        &self.stubs
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn entry(&self, id: &ItemId) -> Option<&Entry> {
        self.entries.iter().find(|entry| &entry.id == id)
    }

    pub fn stub(&self, id: &ItemId) -> Option<&FileStub> {
        self.stubs.iter().find(|stub| &stub.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.stubs.is_empty()
    }

    fn allocate_id(&mut self) -> ItemId {
        self.next_id += 1;
        ItemId(format!("item-{}", self.next_id))
    }

    pub fn add_entry(
        &mut self,
        url: &str,
        media_type: MediaType,
        defaults: &TypeDefaults,
    ) -> ItemId {
        let id = self.allocate_id();
        self.entries.push(Entry {
            id: id.clone(),
            url: url.trim().to_string(),
            media_type,
            keywords: Vec::new(),
            overrides: EntryOverrides::default(),
            defaults: defaults.clone(),
        });
        ingest_debug!("queue: added entry {} url_len={}", id, url.len());
        id
    }

    /// Apply a patch. Returns the updated entry, or `None` for an unknown id.
    pub fn update_entry(&mut self, id: &ItemId, patch: EntryPatch) -> Option<&Entry> {
        let entry = self.entries.iter_mut().find(|entry| &entry.id == id)?;
        if let Some(url) = patch.url {
            entry.url = url.trim().to_string();
        }
        if let Some(media_type) = patch.media_type {
            entry.media_type = media_type;
        }
        if let Some(keywords) = patch.keywords {
            entry.keywords = keywords
                .into_iter()
                .map(|keyword| keyword.trim().to_string())
                .filter(|keyword| !keyword.is_empty())
                .collect();
        }
        if let Some(overrides) = patch.overrides {
            entry.overrides = overrides;
        }
        Some(&*entry)
    }

    pub fn remove_entry(&mut self, id: &ItemId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| &entry.id != id);
        before != self.entries.len()
    }

    /// Add local files. A handle whose signature matches a missing stub
    /// reattaches to the first such stub; one matching an attached stub is a
    /// duplicate and is skipped; anything else becomes a new stub.
    pub fn add_files(
        &mut self,
        handles: Vec<FileHandle>,
        tracker: &mut AttachmentTracker,
        defaults: &TypeDefaults,
    ) -> AddFilesOutcome {
        let report = tracker.reconcile(&self.stubs);
        let mut attached_keys: HashSet<String> =
            report.attached.iter().map(|stub| stub.key.clone()).collect();
        let mut unclaimed_missing: Vec<FileStub> = report.missing;
        let mut outcome = AddFilesOutcome::default();

        for handle in handles {
            let key = handle.key();
            if let Some(position) = unclaimed_missing.iter().position(|stub| stub.key == key) {
                let stub = unclaimed_missing.remove(position);
                ingest_debug!("queue: reattached file {} to stub {}", handle.name, stub.id);
                tracker.attach(handle);
                attached_keys.insert(key);
                outcome.reattached.push(stub.id);
                continue;
            }
            if attached_keys.contains(&key) {
                outcome.skipped_duplicates += 1;
                continue;
            }

            let id = self.allocate_id();
            self.stubs.push(FileStub {
                id: id.clone(),
                key: key.clone(),
                instance_id: Some(handle.instance_id.clone()),
                name: handle.name.clone(),
                size: handle.size,
                mime_type: handle.mime_type.clone(),
                defaults: defaults.clone(),
            });
            tracker.attach(handle);
            attached_keys.insert(key);
            outcome.added.push(id);
        }
        outcome
    }

    pub fn remove_file(&mut self, id: &ItemId, tracker: &mut AttachmentTracker) -> bool {
        let before = self.stubs.len();
        self.stubs.retain(|stub| &stub.id != id);
        let removed = before != self.stubs.len();
        if removed {
            tracker.prune(&self.stubs);
        }
        removed
    }

    pub fn clear_all(&mut self, tracker: &mut AttachmentTracker) {
        self.entries.clear();
        self.stubs.clear();
        tracker.clear();
    }

    /// Entries with a url plus attached file stubs.
    pub fn planned_count(&self, report: &AttachmentReport) -> usize {
        self.entries.iter().filter(|entry| entry.has_url()).count() + report.attached.len()
    }

    /// Apply tracker proposals. Patches for stubs removed in the meantime are dropped.
    pub fn apply_rebinds(&mut self, rebinds: &[InstanceRebind]) -> usize {
        let mut applied = 0;
        for rebind in rebinds {
            if let Some(stub) = self.stubs.iter_mut().find(|stub| stub.id == rebind.stub_id) {
                stub.instance_id = Some(rebind.instance_id.clone());
                applied += 1;
            }
        }
        applied
    }

    /// Replace one entry with one entry per child url, in place. Skipped when
    /// the entry is gone or its url no longer equals `source_url`.
    pub fn splice_expansion(
        &mut self,
        entry_id: &ItemId,
        source_url: &str,
        child_urls: &[String],
    ) -> Option<Vec<ItemId>> {
        let index = self.entries.iter().position(|entry| &entry.id == entry_id)?;
        if self.entries[index].url != source_url.trim() {
            return None;
        }
        let mut seen = HashSet::new();
        let children: Vec<&String> = child_urls
            .iter()
            .filter(|url| !url.trim().is_empty())
            .filter(|url| seen.insert(normalize_url_for_dedupe(url)))
            .collect();
        if children.is_empty() {
            return None;
        }

        let template = self.entries[index].clone();
        let mut replacements = Vec::with_capacity(children.len());
        let mut ids = Vec::with_capacity(children.len());
        for child in children {
            let id = self.allocate_id();
            ids.push(id.clone());
            replacements.push(Entry {
                id,
                url: child.trim().to_string(),
                ..template.clone()
            });
        }
        self.entries.splice(index..=index, replacements);
        Some(ids)
    }

    pub fn contains_url(&self, url: &str) -> bool {
        let wanted = normalize_url_for_dedupe(url);
        self.entries
            .iter()
            .any(|entry| entry.has_url() && normalize_url_for_dedupe(&entry.url) == wanted)
    }
}

/// Normalize a url for duplicate detection: trimmed, scheme and host
/// lower-cased, trailing slash dropped.
pub fn normalize_url_for_dedupe(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(parsed) => parsed.to_string().trim_end_matches('/').to_string(),
        Err(_) => trimmed.trim_end_matches('/').to_ascii_lowercase(),
    }
}
