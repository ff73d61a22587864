//! Configuration module for the Down engine
//!
//! This module provides configuration options for the engine, including
//! read chunk size, timeouts, the worker cap and progress sampling.

use std::time::Duration;

/// Configuration for the download engine
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Maximum number of bytes written per chunk
    pub chunk_size: usize,
    /// Connection timeout
    pub connection_timeout: Duration,
    /// Time allowed for response headers and for each body read
    pub read_timeout: Duration,
    /// Maximum number of transfers running at once
    pub max_concurrent_downloads: usize,
    /// Whether to follow redirects
    pub follow_redirects: bool,
    /// User agent string
    pub user_agent: String,
    /// Minimum interval between speed recalculations
    pub progress_update_interval: Duration,
    /// Weight of the newest speed sample, 1.0 disables smoothing
    pub speed_smoothing: f64,
    /// Claim the destination path with exclusive create.
    ///
    /// When false, the path is probed first and then created with truncation,
    /// so a file created by someone else in between is overwritten.
    pub exclusive_create: bool,
    /// Number of events buffered for slow subscribers
    pub event_capacity: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: 8192, // 8KB
            connection_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            max_concurrent_downloads: 4,
            follow_redirects: true,
            user_agent: format!("down-core/{}", env!("CARGO_PKG_VERSION")),
            progress_update_interval: Duration::from_millis(100),
            speed_smoothing: 1.0,
            exclusive_create: true,
            event_capacity: 1024,
        }
    }
}

impl DownloadConfig {
    /// Creates a new download configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of bytes written per chunk
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1024); // Ensure reasonable minimum chunk size
        self
    }

    /// Sets the connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Sets the read timeout for download operations
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the number of transfers allowed to run at once
    pub fn with_max_concurrent_downloads(mut self, max: usize) -> Self {
        self.max_concurrent_downloads = max.max(1);
        self
    }

    /// Sets whether to follow redirects
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    /// Sets the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the progress update interval
    pub fn with_progress_update_interval(mut self, interval: Duration) -> Self {
        self.progress_update_interval = interval;
        self
    }

    /// Sets the exponential smoothing factor applied to speed samples.
    ///
    /// Values are clamped to `(0, 1]`; `1.0` reports the raw instantaneous rate.
    pub fn with_speed_smoothing(mut self, alpha: f64) -> Self {
        self.speed_smoothing = if alpha.is_finite() {
            alpha.clamp(0.01, 1.0)
        } else {
            1.0
        };
        self
    }

    /// Sets whether the destination file is claimed with exclusive create
    pub fn with_exclusive_create(mut self, exclusive: bool) -> Self {
        self.exclusive_create = exclusive;
        self
    }

    /// Sets how many events are buffered before slow subscribers start losing them
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(16);
        self
    }
}
