//! In-memory registry of downloads
//!
//! The registry is the single point of truth for engine state. The map is
//! guarded by a read-write lock and every record carries its own lock, so a
//! transfer updating its counters never blocks readers of other downloads.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use url::Url;

use crate::download::{Download, DownloadEntry, DownloadId};
use crate::error::{DownError, DownResult};
use crate::filename::candidate_file_name;

#[derive(Debug, Default)]
pub(crate) struct DownloadRegistry {
    downloads: RwLock<HashMap<DownloadId, Arc<DownloadEntry>>>,
    /// Number of downloads created so far
    started: AtomicU64,
}

impl DownloadRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Creates a `Waiting` record and returns it
    pub(crate) fn create(&self, url: Url, destination_dir: PathBuf) -> Arc<DownloadEntry> {
        let seq = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        let id = DownloadId::new(seq);
        let file_name = candidate_file_name(&url, seq as usize);

        let entry = Arc::new(DownloadEntry::new(id, url, file_name, destination_dir));
        self.downloads.write().insert(id, Arc::clone(&entry));

        debug!(id = %id, url = %entry.url(), file_name = entry.file_name(), "Download registered");
        entry
    }

    pub(crate) fn entry(&self, id: DownloadId) -> DownResult<Arc<DownloadEntry>> {
        self.downloads
            .read()
            .get(&id)
            .cloned()
            .ok_or(DownError::NotFound(id))
    }

    pub(crate) fn get(&self, id: DownloadId) -> DownResult<Download> {
        self.entry(id).map(|entry| entry.snapshot())
    }

    /// Snapshots every record, ordered by creation
    pub(crate) fn list(&self) -> Vec<Download> {
        let entries: Vec<Arc<DownloadEntry>> = self.downloads.read().values().cloned().collect();
        let mut snapshots: Vec<Download> = entries.iter().map(|entry| entry.snapshot()).collect();
        snapshots.sort_by_key(|download| download.id);
        snapshots
    }

    /// Removes a record that has reached a terminal status
    pub(crate) fn remove(&self, id: DownloadId) -> DownResult<Download> {
        let mut downloads = self.downloads.write();
        let entry = downloads.get(&id).ok_or(DownError::NotFound(id))?;

        let snapshot = entry.snapshot();
        if !snapshot.status.is_terminal() {
            return Err(DownError::NotTerminal(id));
        }

        downloads.remove(&id);
        debug!(id = %id, status = %snapshot.status, "Download dismissed");
        Ok(snapshot)
    }

    pub(crate) fn mark_cancel_requested(&self, id: DownloadId) -> DownResult<()> {
        let entry = self.entry(id)?;
        if entry.request_cancel() {
            info!(id = %id, "Cancellation requested");
        } else {
            debug!(id = %id, status = %entry.status(), "Cancellation already requested or download finished");
        }
        Ok(())
    }

    /// Returns how many downloads have been created
    pub(crate) fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }
}
