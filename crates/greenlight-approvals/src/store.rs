//! Durable approval record store.
//!
//! Maps a request id to every message surface currently showing its pending
//! status. One process-wide lock guards both the in-memory map and the file:
//! each mutation rewrites `approval_requests.json` in full before the lock is
//! released, so the file always matches the last successful mutation.
//!
//! Failures never escape this module:
//! - a missing or corrupt file at load is treated as empty state
//! - a failed write is logged and the in-memory map stays authoritative

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use greenlight_types::{ApprovalRecord, GreenlightError, MessageId, MessageRef, RequestId, SurfaceId, UserId};

/// File name under the settings directory.
pub const STATE_FILE: &str = "approval_requests.json";

pub struct ApprovalStore {
    path: PathBuf,
    records: Mutex<BTreeMap<RequestId, ApprovalRecord>>,
}

impl ApprovalStore {
    /// Open the store under `settings_dir`. Never fails.
    pub fn open(settings_dir: &Path) -> Self {
        let path = settings_dir.join(STATE_FILE);
        let records = load_records(&path);
        let store = Self {
            path,
            records: Mutex::new(records),
        };
        {
            let records = store.lock();
            store.persist(&records);
        }
        tracing::info!(
            path = %store.path.display(),
            records = store.len(),
            "approval store loaded"
        );
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register a surface for a request, creating the record if needed.
    ///
    /// An identical `(surface_id, message_id)` pair is never added twice. On
    /// an existing record a non-blank username replaces the stored one and a
    /// non-zero user id fills a missing one.
    pub fn add_message(
        &self,
        request_id: RequestId,
        requester_username: &str,
        requester_user_id: UserId,
        message: MessageRef,
    ) {
        let mut records = self.lock();
        let record = records
            .entry(request_id)
            .or_insert_with(|| ApprovalRecord {
                request_id,
                requester_username: requester_username.to_string(),
                requester_user_id,
                messages: Vec::new(),
                registered_at: Some(Utc::now()),
            });

        if !requester_username.trim().is_empty() {
            record.requester_username = requester_username.to_string();
        }
        if record.requester_user_id == 0 && requester_user_id != 0 {
            record.requester_user_id = requester_user_id;
        }
        if !record.contains(message.surface_id, message.message_id) {
            record.messages.push(message);
        }

        self.persist(&records);
    }

    /// Copy of one record.
    pub fn snapshot(&self, request_id: RequestId) -> Option<ApprovalRecord> {
        self.lock().get(&request_id).cloned()
    }

    /// Copies of all records, ordered by request id.
    pub fn snapshots(&self) -> Vec<ApprovalRecord> {
        self.lock().values().cloned().collect()
    }

    /// Record whose surfaces include the given message, if any.
    pub fn find_by_message(&self, surface_id: SurfaceId, message_id: MessageId) -> Option<ApprovalRecord> {
        self.lock()
            .values()
            .find(|r| r.contains(surface_id, message_id))
            .cloned()
    }

    /// Drop a record. Returns whether it existed.
    pub fn remove(&self, request_id: RequestId) -> bool {
        let mut records = self.lock();
        let existed = records.remove(&request_id).is_some();
        if existed {
            self.persist(&records);
        }
        existed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<RequestId, ApprovalRecord>> {
        // A panic mid-mutation cannot leave the map torn: every mutation is a
        // single insert/remove/push.
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Rewrite the file. Called with the lock held.
    fn persist(&self, records: &BTreeMap<RequestId, ApprovalRecord>) {
        if let Err(e) = write_records(&self.path, records) {
            tracing::warn!(
                error = %e,
                path = %self.path.display(),
                "failed to persist approval records, keeping in-memory state"
            );
        }
    }
}

fn load_records(path: &Path) -> BTreeMap<RequestId, ApprovalRecord> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "approval file unreadable, starting empty");
            return BTreeMap::new();
        }
    };

    if content.trim().is_empty() {
        return BTreeMap::new();
    }

    match serde_json::from_str::<Vec<ApprovalRecord>>(&content) {
        Ok(list) => list
            .into_iter()
            .map(dedupe_messages)
            .filter(|r| !r.messages.is_empty())
            .map(|r| (r.request_id, r))
            .collect(),
        Err(e) => {
            let backup = path.with_extension("json.corrupt");
            match std::fs::rename(path, &backup) {
                Ok(()) => tracing::warn!(
                    error = %e,
                    backup = %backup.display(),
                    "approval file corrupt, moved aside and starting empty"
                ),
                Err(rename_err) => tracing::warn!(
                    error = %e,
                    rename_error = %rename_err,
                    "approval file corrupt and could not be moved aside, starting empty"
                ),
            }
            BTreeMap::new()
        }
    }
}

/// Keep the first ref for each `(surface, message)` pair.
fn dedupe_messages(mut record: ApprovalRecord) -> ApprovalRecord {
    let mut seen = HashSet::new();
    record.messages.retain(|m| seen.insert(m.key()));
    record
}

fn write_records(
    path: &Path,
    records: &BTreeMap<RequestId, ApprovalRecord>,
) -> Result<(), GreenlightError> {
    let list: Vec<&ApprovalRecord> = records.values().filter(|r| !r.messages.is_empty()).collect();
    let json = serde_json::to_string_pretty(&list)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GreenlightError::Persistence(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
    }

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .map_err(|e| GreenlightError::Persistence(format!("failed to write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        GreenlightError::Persistence(format!("failed to replace {}: {e}", path.display()))
    })
}
