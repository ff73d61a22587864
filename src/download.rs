//! Download records and their state machine
//!
//! A [`DownloadEntry`] is the live, lock-guarded record owned by the registry.
//! Callers only ever see [`Download`] snapshots of it.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::{RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::progress::Progress;

/// Opaque identifier of a download, unique per engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DownloadId(u64);

impl DownloadId {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw numeric value of the id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for DownloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Status of a download task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DownloadStatus {
    /// Created, waiting for a worker slot
    Waiting,
    /// Request sent, waiting for response headers
    Connecting,
    /// Body is being streamed to disk
    Downloading,
    /// Download is completed
    Completed,
    /// Download is cancelled
    Cancelled,
    /// Download failed with an error
    Failed(String),
}

impl DownloadStatus {
    /// Returns true for statuses no transition ever leaves
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed(_))
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: &DownloadStatus) -> bool {
        use DownloadStatus::*;

        match (self, next) {
            (Waiting, Connecting | Cancelled | Failed(_)) => true,
            (Connecting, Downloading | Cancelled | Failed(_)) => true,
            (Downloading, Completed | Cancelled | Failed(_)) => true,
            _ => false,
        }
    }

    /// Returns the failure reason, if any
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

impl Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "Waiting"),
            Self::Connecting => write!(f, "Connecting..."),
            Self::Downloading => write!(f, "Downloading..."),
            Self::Completed => write!(f, "Completed"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Failed(reason) => write!(f, "Error: {}", reason),
        }
    }
}

/// Point-in-time copy of a download record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Download {
    pub id: DownloadId,
    pub url: String,
    /// File name chosen when the download was created
    pub file_name: String,
    pub destination_dir: PathBuf,
    /// Final path on disk, known once the transfer has claimed it
    pub destination_path: Option<PathBuf>,
    pub total_bytes: Option<u64>,
    pub downloaded_bytes: u64,
    pub status: DownloadStatus,
    /// Completed fraction in `[0, 1]`, absent while the size is unknown
    pub progress: Option<f64>,
    pub speed_bytes_per_sec: u64,
    pub cancel_requested: bool,
    pub created_at: SystemTime,
}

/// Mutable part of a record
#[derive(Debug)]
struct DownloadState {
    destination_path: Option<PathBuf>,
    total_bytes: Option<u64>,
    downloaded_bytes: u64,
    status: DownloadStatus,
    progress: Option<f64>,
    speed_bytes_per_sec: u64,
}

/// Live record of one download.
///
/// Byte counters and status are written only by the transfer task that owns
/// the download; any caller may request cancellation.
#[derive(Debug)]
pub(crate) struct DownloadEntry {
    id: DownloadId,
    url: Url,
    file_name: String,
    destination_dir: PathBuf,
    created_at: SystemTime,
    state: RwLock<DownloadState>,
    cancel: CancellationToken,
    finished: watch::Sender<bool>,
}

impl DownloadEntry {
    pub(crate) fn new(id: DownloadId, url: Url, file_name: String, destination_dir: PathBuf) -> Self {
        let (finished, _) = watch::channel(false);
        Self {
            id,
            url,
            file_name,
            destination_dir,
            created_at: SystemTime::now(),
            state: RwLock::new(DownloadState {
                destination_path: None,
                total_bytes: None,
                downloaded_bytes: 0,
                status: DownloadStatus::Waiting,
                progress: None,
                speed_bytes_per_sec: 0,
            }),
            cancel: CancellationToken::new(),
            finished,
        }
    }

    pub(crate) fn id(&self) -> DownloadId {
        self.id
    }

    pub(crate) fn url(&self) -> &Url {
        &self.url
    }

    pub(crate) fn file_name(&self) -> &str {
        &self.file_name
    }

    pub(crate) fn destination_dir(&self) -> &Path {
        &self.destination_dir
    }

    pub(crate) fn status(&self) -> DownloadStatus {
        self.state.read().status.clone()
    }

    pub(crate) fn snapshot(&self) -> Download {
        let state = self.state.read();
        Download {
            id: self.id,
            url: self.url.to_string(),
            file_name: self.file_name.clone(),
            destination_dir: self.destination_dir.clone(),
            destination_path: state.destination_path.clone(),
            total_bytes: state.total_bytes,
            downloaded_bytes: state.downloaded_bytes,
            status: state.status.clone(),
            progress: state.progress,
            speed_bytes_per_sec: state.speed_bytes_per_sec,
            cancel_requested: self.cancel.is_cancelled(),
            created_at: self.created_at,
        }
    }

    /// Applies a status transition, returning false if the state machine forbids it
    pub(crate) fn transition(&self, next: DownloadStatus) -> bool {
        self.apply_transition(self.state.write(), next)
    }

    /// Moves to `Completed` unless cancellation was requested first.
    ///
    /// Shares the state lock with [`request_cancel`](Self::request_cancel), so a
    /// record never ends up completed with its cancel flag set.
    pub(crate) fn complete(&self) -> bool {
        let state = self.state.write();
        if self.cancel.is_cancelled() {
            return false;
        }
        self.apply_transition(state, DownloadStatus::Completed)
    }

    fn apply_transition(
        &self,
        mut state: RwLockWriteGuard<'_, DownloadState>,
        next: DownloadStatus,
    ) -> bool {
        if !state.status.can_transition_to(&next) {
            warn!(
                id = %self.id,
                from = %state.status,
                to = %next,
                "Rejected illegal status transition"
            );
            return false;
        }

        trace!(id = %self.id, from = %state.status, to = %next, "Status transition");
        let terminal = next.is_terminal();
        if next == DownloadStatus::Completed {
            state.progress = Some(1.0);
        }
        state.status = next;
        drop(state);

        if terminal {
            self.finished.send_replace(true);
        }
        true
    }

    /// Records the announced size; later calls are ignored
    pub(crate) fn set_total_bytes(&self, total: u64) {
        let mut state = self.state.write();
        if state.total_bytes.is_none() {
            state.total_bytes = Some(total);
        }
    }

    /// Records the resolved destination; later calls are ignored
    pub(crate) fn set_destination_path(&self, path: PathBuf) {
        let mut state = self.state.write();
        if state.destination_path.is_none() {
            state.destination_path = Some(path);
        }
    }

    pub(crate) fn record_progress(&self, progress: &Progress) {
        let mut state = self.state.write();
        // Counters never move backwards
        state.downloaded_bytes = state.downloaded_bytes.max(progress.downloaded());
        state.progress = progress.fraction();
        state.speed_bytes_per_sec = progress.speed();
    }

    /// Requests cancellation, returning true if this call set the flag.
    ///
    /// Terminal records are left untouched.
    pub(crate) fn request_cancel(&self) -> bool {
        let state = self.state.write();
        if self.cancel.is_cancelled() || state.status.is_terminal() {
            return false;
        }
        self.cancel.cancel();
        true
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn finished(&self) -> watch::Receiver<bool> {
        self.finished.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> DownloadEntry {
        DownloadEntry::new(
            DownloadId::new(1),
            Url::parse("http://x.test/file.bin").unwrap(),
            "file.bin".to_string(),
            PathBuf::from("/tmp/d"),
        )
    }

    #[test]
    fn test_state_machine_happy_path() {
        let entry = entry();
        assert_eq!(entry.status(), DownloadStatus::Waiting);
        assert!(entry.transition(DownloadStatus::Connecting));
        assert!(entry.transition(DownloadStatus::Downloading));
        assert!(entry.transition(DownloadStatus::Completed));
        assert_eq!(entry.snapshot().progress, Some(1.0));
        assert!(*entry.finished().borrow());
    }

    #[test]
    fn test_terminal_statuses_are_final() {
        let terminal = [
            DownloadStatus::Completed,
            DownloadStatus::Cancelled,
            DownloadStatus::Failed("boom".into()),
        ];
        let all = [
            DownloadStatus::Waiting,
            DownloadStatus::Connecting,
            DownloadStatus::Downloading,
            DownloadStatus::Completed,
            DownloadStatus::Cancelled,
            DownloadStatus::Failed("again".into()),
        ];

        for from in &terminal {
            assert!(from.is_terminal());
            for to in &all {
                assert!(!from.can_transition_to(to), "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn test_never_reenters_waiting() {
        let entry = entry();
        assert!(entry.transition(DownloadStatus::Connecting));
        assert!(!entry.transition(DownloadStatus::Waiting));
        assert!(!entry.transition(DownloadStatus::Completed));
        assert_eq!(entry.status(), DownloadStatus::Connecting);
    }

    #[test]
    fn test_cancel_flag_is_write_once() {
        let entry = entry();
        assert!(!entry.snapshot().cancel_requested);
        assert!(entry.request_cancel());
        assert!(!entry.request_cancel());
        assert!(entry.snapshot().cancel_requested);
        assert!(entry.cancel_token().is_cancelled());
    }

    #[test]
    fn test_cancel_after_completion_is_ignored() {
        let entry = entry();
        entry.transition(DownloadStatus::Connecting);
        entry.transition(DownloadStatus::Downloading);
        entry.transition(DownloadStatus::Completed);

        assert!(!entry.request_cancel());
        assert!(!entry.snapshot().cancel_requested);
    }

    #[test]
    fn test_complete_refuses_after_cancel() {
        let entry = entry();
        entry.transition(DownloadStatus::Connecting);
        entry.transition(DownloadStatus::Downloading);

        assert!(entry.request_cancel());
        assert!(!entry.complete());
        assert_eq!(entry.status(), DownloadStatus::Downloading);
        assert!(!*entry.finished().borrow());

        assert!(entry.transition(DownloadStatus::Cancelled));
        assert!(*entry.finished().borrow());
    }

    #[test]
    fn test_cancel_and_complete_never_both_win() {
        for cancel_first in [true, false] {
            let entry = entry();
            entry.transition(DownloadStatus::Connecting);
            entry.transition(DownloadStatus::Downloading);

            let (cancelled, completed) = if cancel_first {
                let c = entry.request_cancel();
                (c, entry.complete())
            } else {
                let done = entry.complete();
                (entry.request_cancel(), done)
            };

            assert!(cancelled != completed, "cancel_first={cancel_first}");
            let snapshot = entry.snapshot();
            assert_eq!(snapshot.cancel_requested, cancelled);
            assert_eq!(snapshot.status == DownloadStatus::Completed, completed);
        }
    }

    #[test]
    fn test_total_and_destination_are_set_once() {
        let entry = entry();
        entry.set_total_bytes(10);
        entry.set_total_bytes(20);
        entry.set_destination_path(PathBuf::from("/tmp/d/file.bin"));
        entry.set_destination_path(PathBuf::from("/tmp/d/other.bin"));

        let snapshot = entry.snapshot();
        assert_eq!(snapshot.total_bytes, Some(10));
        assert_eq!(snapshot.destination_path, Some(PathBuf::from("/tmp/d/file.bin")));
    }

    #[test]
    fn test_status_display_matches_ui_labels() {
        assert_eq!(DownloadStatus::Connecting.to_string(), "Connecting...");
        assert_eq!(
            DownloadStatus::Failed("404 Not Found".into()).to_string(),
            "Error: 404 Not Found"
        );
        assert_eq!(
            DownloadStatus::Failed("x".into()).failure_reason(),
            Some("x")
        );
    }
}
