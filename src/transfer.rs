//! Transfer executor
//!
//! One [`Transfer`] runs per download. It waits for a worker slot, opens the
//! source, claims a destination file and streams the body to disk in bounded
//! chunks, publishing progress after every chunk. All errors end up in the
//! record's status; nothing is returned to the caller that started it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, Semaphore};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::config::DownloadConfig;
use crate::download::{DownloadEntry, DownloadStatus};
use crate::error::{DownError, DownResult};
use crate::events::DownloadEvent;
use crate::filename::{create_destination, probe_destination};
use crate::progress::ProgressTracker;
use crate::source::Source;

pub(crate) struct Transfer {
    entry: Arc<DownloadEntry>,
    source: Arc<dyn Source>,
    config: Arc<DownloadConfig>,
    slots: Arc<Semaphore>,
    events: broadcast::Sender<DownloadEvent>,
}

impl Transfer {
    pub(crate) fn new(
        entry: Arc<DownloadEntry>,
        source: Arc<dyn Source>,
        config: Arc<DownloadConfig>,
        slots: Arc<Semaphore>,
        events: broadcast::Sender<DownloadEvent>,
    ) -> Self {
        Self {
            entry,
            source,
            config,
            slots,
            events,
        }
    }

    /// Spawns the transfer on the current runtime.
    ///
    /// A panicking transfer still leaves its record in a terminal status.
    pub(crate) fn spawn(self) {
        let entry = Arc::clone(&self.entry);
        let events = self.events.clone();
        let task = tokio::spawn(self.run());

        tokio::spawn(async move {
            if let Err(e) = task.await {
                error!(id = %entry.id(), error = ?e, "Transfer task panicked");
                let status = DownloadStatus::Failed(format!("Task error: {}", e));
                if entry.transition(status.clone()) {
                    let _ = events.send(DownloadEvent::StatusChanged {
                        id: entry.id(),
                        status,
                    });
                }
            }
        });
    }

    async fn run(self) {
        let id = self.entry.id();
        let token = self.entry.cancel_token();

        // Stay `Waiting` until a worker slot frees up
        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!(id = %id, "Cancelled while waiting for a worker slot");
                self.set_status(DownloadStatus::Cancelled);
                return;
            }
            permit = Arc::clone(&self.slots).acquire_owned() => permit,
        };
        let _permit = match permit {
            Ok(permit) => permit,
            Err(e) => {
                self.set_status(DownloadStatus::Failed(e.to_string()));
                return;
            }
        };

        match self.execute(&token).await {
            Ok(path) => {
                if self.entry.complete() {
                    info!(id = %id, url = %self.entry.url(), "Download completed");
                    self.publish(DownloadEvent::StatusChanged {
                        id,
                        status: DownloadStatus::Completed,
                    });
                } else {
                    // Cancel landed after the last chunk
                    info!(id = %id, "Download cancelled after the body was received");
                    remove_partial_file(&path).await;
                    self.set_status(DownloadStatus::Cancelled);
                }
            }
            Err(DownError::Cancelled) => {
                info!(id = %id, "Download cancelled");
                self.set_status(DownloadStatus::Cancelled);
            }
            Err(e) => {
                error!(id = %id, url = %self.entry.url(), error = %e, "Download failed");
                self.set_status(DownloadStatus::Failed(e.to_string()));
            }
        }
    }

    /// Runs the transfer, returning the path of the fully written file
    async fn execute(&self, token: &CancellationToken) -> DownResult<PathBuf> {
        let url = self.entry.url().clone();
        self.set_status(DownloadStatus::Connecting);

        let response_timeout = self.config.read_timeout;
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(DownError::Cancelled),
            result = timeout(response_timeout, self.source.open(&url)) => {
                result.map_err(|_| DownError::Timeout(response_timeout))??
            }
        };

        if let Some(total) = response.content_length {
            self.entry.set_total_bytes(total);
        }
        self.set_status(DownloadStatus::Downloading);

        let (path, mut file) = self.open_destination().await?;
        self.entry.set_destination_path(path.clone());

        let result = self
            .stream_to_file(&mut file, response.body, response.content_length, token)
            .await;

        // Settle in-flight writes before the handle is released
        let flushed = file.flush().await;
        drop(file);

        match result {
            Ok(()) => {
                flushed?;
                Ok(path)
            }
            Err(DownError::Cancelled) => {
                remove_partial_file(&path).await;
                Err(DownError::Cancelled)
            }
            Err(e) => Err(e),
        }
    }

    /// Creates the destination directory and claims the output file
    async fn open_destination(&self) -> DownResult<(PathBuf, File)> {
        let dir = self.entry.destination_dir();
        fs::create_dir_all(dir).await.map_err(|e| {
            error!(error = %e, path = %dir.display(), "Failed to create destination directory");
            DownError::DirectoryCreationFailed {
                path: dir.to_path_buf(),
                error: e,
            }
        })?;

        let name = self.entry.file_name();
        if self.config.exclusive_create {
            create_destination(dir, name).await
        } else {
            // Truncates if another writer claimed the path after the probe
            let path = probe_destination(dir, name).await?;
            let file = File::create(&path).await?;
            Ok((path, file))
        }
    }

    async fn stream_to_file(
        &self,
        file: &mut File,
        mut body: BoxStream<'static, DownResult<Bytes>>,
        total: Option<u64>,
        token: &CancellationToken,
    ) -> DownResult<()> {
        let id = self.entry.id();
        let chunk_size = self.config.chunk_size;
        let read_timeout = self.config.read_timeout;
        let mut tracker = ProgressTracker::new(
            total,
            self.config.progress_update_interval,
            self.config.speed_smoothing,
        );
        let mut downloaded = 0u64;

        debug!(id = %id, ?total, chunk_size, "Starting to stream body");

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(DownError::Cancelled),
                next = timeout(read_timeout, body.next()) => {
                    next.map_err(|_| DownError::Timeout(read_timeout))?
                }
            };
            let Some(packet) = next else { break };
            let mut packet = packet?;

            while !packet.is_empty() {
                if token.is_cancelled() {
                    return Err(DownError::Cancelled);
                }

                let chunk = packet.split_to(packet.len().min(chunk_size));
                let received = downloaded + chunk.len() as u64;
                if let Some(expected) = total {
                    if received > expected {
                        return Err(DownError::SizeMismatch { expected, received });
                    }
                }

                file.write_all(&chunk).await?;
                downloaded = received;

                let progress = tracker.sample(downloaded);
                trace!(id = %id, downloaded, speed = progress.speed(), "Chunk written");
                self.entry.record_progress(&progress);
                self.publish(DownloadEvent::Progress { id, progress });
            }
        }

        debug!(id = %id, downloaded, "Body exhausted");
        self.entry.record_progress(&tracker.finish());
        Ok(())
    }

    fn set_status(&self, status: DownloadStatus) {
        if self.entry.transition(status.clone()) {
            self.publish(DownloadEvent::StatusChanged {
                id: self.entry.id(),
                status,
            });
        }
    }

    fn publish(&self, event: DownloadEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}

/// Best-effort removal of a cancelled download's partial file
async fn remove_partial_file(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial file"),
        Err(e) => warn!(error = %e, path = %path.display(), "Failed to remove partial file"),
    }
}
