//! Down Core - A concurrent download engine with progress tracking and cancellation
//!
//! This crate provides the engine behind a desktop download manager:
//! - One cooperative transfer task per download, capped by a worker pool
//! - Per-download state machine from `Waiting` to a terminal status
//! - Progress fraction and transfer speed updated after every chunk
//! - Cancellation that removes the partially written file
//! - Filename conflict resolution (`report (1).pdf`, `report (2).pdf`, …)
//!
//! The presentation layer only talks to [`Engine`]: it starts and cancels
//! downloads, reads snapshots and subscribes to events.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{broadcast, Semaphore};

mod config;
mod download;
mod error;
mod events;
mod filename;
mod progress;
mod registry;
mod settings;
mod source;
mod transfer;
mod utils;
mod watcher;

pub use config::DownloadConfig;
pub use download::{Download, DownloadId, DownloadStatus};
pub use error::{DownError, DownResult};
pub use events::{DownloadEvent, Subscription};
pub use filename::{candidate_file_name, create_destination, probe_destination, resolve_destination};
pub use progress::{Progress, ProgressTracker};
pub use settings::{default_download_dir, Settings};
pub use source::{HttpSource, Source, SourceResponse};
pub use utils::{format_duration, format_size, format_speed, is_valid_url, validate_url};
pub use watcher::UrlWatcher;

use registry::DownloadRegistry;
use transfer::Transfer;

#[macro_use]
extern crate tracing;

/// The main entry point for the Down engine.
///
/// Cloning is cheap; clones share the same downloads.
///
/// # Examples
///
/// ```no_run
/// use down_core::{DownResult, DownloadConfig, DownloadEvent, Engine};
///
/// #[tokio::main]
/// async fn main() -> DownResult<()> {
///     let engine = Engine::new(DownloadConfig::new())?;
///
///     let id = engine.start_download("https://example.com/large-file.zip", "./downloads")?;
///
///     let _subscription = engine.subscribe(id, |event| {
///         if let DownloadEvent::Progress { progress, .. } = event {
///             println!("Downloaded: {} bytes, Speed: {} B/s", progress.downloaded(), progress.speed());
///         }
///     })?;
///
///     let download = engine.wait(id).await?;
///     println!("{}: {}", download.file_name, download.status);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Engine {
    config: Arc<DownloadConfig>,
    registry: Arc<DownloadRegistry>,
    source: Arc<dyn Source>,
    slots: Arc<Semaphore>,
    events: broadcast::Sender<DownloadEvent>,
}

impl Engine {
    /// Creates a new engine that downloads over HTTP(S)
    pub fn new(config: DownloadConfig) -> DownResult<Self> {
        let source = Arc::new(HttpSource::new(&config)?);
        Ok(Self::with_source(config, source))
    }

    /// Creates a new engine that reads from a custom [`Source`]
    pub fn with_source(config: DownloadConfig, source: Arc<dyn Source>) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        let slots = Arc::new(Semaphore::new(config.max_concurrent_downloads));
        info!(
            max_concurrent_downloads = config.max_concurrent_downloads,
            chunk_size = config.chunk_size,
            "Download engine initialised"
        );

        Self {
            config: Arc::new(config),
            registry: Arc::new(DownloadRegistry::new()),
            source,
            slots,
            events,
        }
    }

    /// Starts downloading `url` into `destination_dir`.
    ///
    /// Invalid URLs are rejected immediately and nothing is spawned. Otherwise
    /// the record is created in `Waiting` status, the transfer is spawned and
    /// the id is returned without waiting for it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_download(
        &self,
        url: &str,
        destination_dir: impl AsRef<Path>,
    ) -> DownResult<DownloadId> {
        let url = utils::validate_url(url).map_err(|e| {
            debug!(error = %e, "Rejected download request");
            e
        })?;

        let entry = self
            .registry
            .create(url, destination_dir.as_ref().to_path_buf());
        let id = entry.id();
        info!(
            id = %id,
            url = %entry.url(),
            destination = %entry.destination_dir().display(),
            "Starting download"
        );

        Transfer::new(
            entry,
            Arc::clone(&self.source),
            Arc::clone(&self.config),
            Arc::clone(&self.slots),
            self.events.clone(),
        )
        .spawn();

        Ok(id)
    }

    /// Requests cancellation of a download.
    ///
    /// Returns as soon as the request is recorded; the transfer stops at its
    /// next chunk boundary. Cancelling twice has no further effect.
    pub fn cancel_download(&self, id: DownloadId) -> DownResult<()> {
        self.registry.mark_cancel_requested(id)
    }

    /// Snapshots all downloads, oldest first
    pub fn list_downloads(&self) -> Vec<Download> {
        self.registry.list()
    }

    /// Snapshots one download
    pub fn get(&self, id: DownloadId) -> DownResult<Download> {
        self.registry.get(id)
    }

    /// Removes a finished download from the engine and returns its last snapshot.
    ///
    /// Fails with [`DownError::NotTerminal`] while the download is still active.
    pub fn dismiss(&self, id: DownloadId) -> DownResult<Download> {
        self.registry.remove(id)
    }

    /// Calls `callback` for every event of download `id`.
    ///
    /// The callback runs on its own task and never blocks the transfer; a
    /// subscriber that falls too far behind loses events. Delivery ends after
    /// the terminal status event or when the returned handle is dropped.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe<F>(&self, id: DownloadId, callback: F) -> DownResult<Subscription>
    where
        F: FnMut(DownloadEvent) + Send + 'static,
    {
        let entry = self.registry.entry(id)?;
        // Subscribe before reading the status so a terminal event cannot slip between
        let rx = self.events.subscribe();
        Ok(Subscription::spawn(id, rx, entry.status(), callback))
    }

    /// Receives events for all downloads
    pub fn events(&self) -> broadcast::Receiver<DownloadEvent> {
        self.events.subscribe()
    }

    /// Waits until download `id` reaches a terminal status and returns its snapshot
    pub async fn wait(&self, id: DownloadId) -> DownResult<Download> {
        let entry = self.registry.entry(id)?;
        let mut finished = entry.finished();
        // The sender lives as long as the entry, so this cannot fail
        let _ = finished.wait_for(|done| *done).await;
        Ok(entry.snapshot())
    }

    /// Returns how many downloads have been started since the engine was created
    pub fn started(&self) -> u64 {
        self.registry.started()
    }

    /// Returns the engine configuration
    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("downloads", &self.registry.started())
            .finish_non_exhaustive()
    }
}
