//! Download events and subscriptions

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::download::{DownloadId, DownloadStatus};
use crate::progress::Progress;

/// A change to one download, published by its transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DownloadEvent {
    /// The download moved to a new status
    StatusChanged {
        id: DownloadId,
        status: DownloadStatus,
    },
    /// A chunk was written to disk
    Progress { id: DownloadId, progress: Progress },
}

impl DownloadEvent {
    pub fn id(&self) -> DownloadId {
        match self {
            Self::StatusChanged { id, .. } | Self::Progress { id, .. } => *id,
        }
    }

    /// Returns true if no further events follow for this download
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::StatusChanged { status, .. } if status.is_terminal())
    }
}

/// Handle to a callback registered with [`Engine::subscribe`](crate::Engine::subscribe).
///
/// Delivery stops when the download reaches a terminal status or when the
/// handle is dropped.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    /// Runs `callback` on its own task for every event of `id`.
    ///
    /// `current` is the status observed after `rx` was created; if it is already
    /// terminal the callback receives it once and delivery ends.
    pub(crate) fn spawn<F>(
        id: DownloadId,
        mut rx: broadcast::Receiver<DownloadEvent>,
        current: DownloadStatus,
        mut callback: F,
    ) -> Self
    where
        F: FnMut(DownloadEvent) + Send + 'static,
    {
        let task = tokio::spawn(async move {
            if current.is_terminal() {
                callback(DownloadEvent::StatusChanged {
                    id,
                    status: current,
                });
                return;
            }

            loop {
                match rx.recv().await {
                    Ok(event) if event.id() == id => {
                        let terminal = event.is_terminal();
                        callback(event);
                        if terminal {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(id = %id, skipped, "Subscriber lagging, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            trace!(id = %id, "Subscription finished");
        });

        Self { task }
    }

    /// Returns true once no more events will be delivered
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits until delivery has ended
    pub async fn finished(mut self) {
        let _ = (&mut self.task).await;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
