//! Reconciles volatile in-memory file handles against persisted stubs.
//!
//! Handles never survive a reload; stubs do. Matching runs at read time:
//! identity (`instance_id`) first, then content signature against any handle
//! not yet claimed. A stub claims at most one handle.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;

use crate::queue::{FileStub, ItemId};

/// A live binary handle supplied by the host for the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub instance_id: String,
    pub name: String,
    pub size: u64,
    /// Modification time in milliseconds since the Unix epoch.
    pub last_modified: i64,
    pub mime_type: Option<String>,
    pub bytes: Bytes,
}

impl FileHandle {
    pub fn key(&self) -> String {
        file_key(&self.name, self.size, self.last_modified)
    }
}

/// Content signature used for dedup and reattachment matching.
pub fn file_key(name: &str, size: u64, last_modified: i64) -> String {
    format!("{name}::{size}::{last_modified}")
}

/// Bookkeeping patch: the stub matched a different handle than the one it recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRebind {
    pub stub_id: ItemId,
    pub instance_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentReport {
    pub attached: Vec<FileStub>,
    pub missing: Vec<FileStub>,
    pub handle_for_stub: HashMap<ItemId, FileHandle>,
    pub rebinds: Vec<InstanceRebind>,
}

impl AttachmentReport {
    pub fn has_missing_files(&self) -> bool {
        !self.missing.is_empty()
    }
}

/// Owns the live handles of the current session. Never mutates stubs; it only
/// proposes [`InstanceRebind`] patches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentTracker {
    handles: Vec<FileHandle>,
}

impl AttachmentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, handle: FileHandle) {
        if self
            .handles
            .iter()
            .any(|existing| existing.instance_id == handle.instance_id)
        {
            return;
        }
        self.handles.push(handle);
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }

    /// Drop handles no stub claims any more.
    pub fn prune(&mut self, stubs: &[FileStub]) {
        let report = self.reconcile(stubs);
        let claimed: HashSet<&str> = report
            .handle_for_stub
            .values()
            .map(|handle| handle.instance_id.as_str())
            .collect();
        let keep: Vec<FileHandle> = self
            .handles
            .iter()
            .filter(|handle| claimed.contains(handle.instance_id.as_str()))
            .cloned()
            .collect();
        self.handles = keep;
    }

    pub fn reconcile(&self, stubs: &[FileStub]) -> AttachmentReport {
        let mut claimed: HashSet<usize> = HashSet::new();
        let mut matched: Vec<Option<usize>> = vec![None; stubs.len()];

        for (stub_index, stub) in stubs.iter().enumerate() {
            if let Some(stub_instance) = stub.instance_id.as_deref() {
                let found = self.handles.iter().enumerate().find(|(index, handle)| {
                    !claimed.contains(index) && handle.instance_id == stub_instance
                });
                if let Some((index, _)) = found {
                    claimed.insert(index);
                    matched[stub_index] = Some(index);
                }
            }
        }

        for (stub_index, stub) in stubs.iter().enumerate() {
            if matched[stub_index].is_some() {
                continue;
            }
            let found = self
                .handles
                .iter()
                .enumerate()
                .find(|(index, handle)| !claimed.contains(index) && handle.key() == stub.key);
            if let Some((index, _)) = found {
                claimed.insert(index);
                matched[stub_index] = Some(index);
            }
        }

        let mut report = AttachmentReport::default();
        for (stub, handle_index) in stubs.iter().zip(matched) {
            match handle_index {
                Some(index) => {
                    let handle = &self.handles[index];
                    if stub.instance_id.as_deref() != Some(handle.instance_id.as_str()) {
                        report.rebinds.push(InstanceRebind {
                            stub_id: stub.id.clone(),
                            instance_id: handle.instance_id.clone(),
                        });
                    }
                    report.handle_for_stub.insert(stub.id.clone(), handle.clone());
                    report.attached.push(stub.clone());
                }
                None => report.missing.push(stub.clone()),
            }
        }
        report
    }
}
