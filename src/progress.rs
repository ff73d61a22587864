//! Progress tracking module for the Down engine
//!
//! This module turns raw byte counters into a completed fraction, a transfer
//! speed and an estimated time remaining.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Represents the current progress of a download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Total size of the file in bytes, if the server announced it
    total_size: Option<u64>,
    /// Number of bytes downloaded so far
    downloaded: u64,
    /// Current download speed in bytes per second
    speed: u64,
    /// Estimated time remaining in seconds
    eta: Option<u64>,
    /// Whether the download is complete
    is_complete: bool,
}

impl Progress {
    /// Creates a new Progress instance
    pub fn new(total_size: Option<u64>) -> Self {
        trace!(?total_size, "Creating new Progress instance");
        Self {
            total_size,
            downloaded: 0,
            speed: 0,
            eta: None,
            is_complete: false,
        }
    }

    /// Returns the completed fraction in `[0, 1]`.
    ///
    /// `None` while the total size is unknown or zero; always `1.0` once complete.
    pub fn fraction(&self) -> Option<f64> {
        if self.is_complete {
            return Some(1.0);
        }
        match self.total_size {
            Some(total) if total > 0 => Some((self.downloaded as f64 / total as f64).min(1.0)),
            _ => None,
        }
    }

    /// Returns the percentage of the download that has been completed
    pub fn percentage(&self) -> Option<f64> {
        self.fraction().map(|fraction| fraction * 100.0)
    }

    /// Returns the number of bytes downloaded so far
    pub fn downloaded(&self) -> u64 {
        self.downloaded
    }

    /// Returns the total size of the file in bytes
    pub fn total(&self) -> Option<u64> {
        self.total_size
    }

    /// Returns the current download speed in bytes per second
    pub fn speed(&self) -> u64 {
        self.speed
    }

    /// Returns the estimated time remaining in seconds
    pub fn eta(&self) -> Option<u64> {
        self.eta
    }

    /// Returns whether the download is complete
    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    /// Marks the download as complete
    fn mark_complete(&mut self) {
        trace!("Marking download as complete");
        self.is_complete = true;
        self.eta = Some(0);
    }
}

/// Samples byte counters into [`Progress`] values.
///
/// Speed is the rate since the previous speed sample, not a cumulative
/// average. It is recalculated at most once per `update_interval` and can be
/// smoothed with an exponential moving average.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    /// The current progress
    progress: Progress,
    /// Minimum time between speed calculations
    update_interval: Duration,
    /// Weight given to the newest speed sample
    smoothing: f64,
    /// Unrounded speed carried between samples
    smoothed_speed: Option<f64>,
    /// Timestamp of the last speed calculation
    last_speed_calc_time: Instant,
    /// Total bytes downloaded at the time of the last speed calculation
    bytes_at_last_speed_calc: u64,
}

impl ProgressTracker {
    /// Creates a new ProgressTracker
    pub fn new(total_size: Option<u64>, update_interval: Duration, smoothing: f64) -> Self {
        Self::started_at(total_size, update_interval, smoothing, Instant::now())
    }

    /// Creates a tracker whose first speed interval begins at `start`
    pub fn started_at(
        total_size: Option<u64>,
        update_interval: Duration,
        smoothing: f64,
        start: Instant,
    ) -> Self {
        debug!(
            ?total_size,
            update_interval_ms = update_interval.as_millis(),
            smoothing,
            "Creating new ProgressTracker"
        );
        Self {
            progress: Progress::new(total_size),
            update_interval,
            smoothing: smoothing.clamp(0.01, 1.0),
            smoothed_speed: None,
            last_speed_calc_time: start,
            bytes_at_last_speed_calc: 0,
        }
    }

    /// Gets a clone of the current progress
    pub fn progress(&self) -> Progress {
        self.progress.clone()
    }

    /// Records the cumulative byte count and returns the updated progress
    pub fn sample(&mut self, downloaded: u64) -> Progress {
        self.sample_at(downloaded, Instant::now())
    }

    /// Same as [`sample`](Self::sample) with an explicit clock reading
    pub fn sample_at(&mut self, downloaded: u64, now: Instant) -> Progress {
        self.progress.downloaded = self.progress.downloaded.max(downloaded);

        let elapsed = now.saturating_duration_since(self.last_speed_calc_time);
        if elapsed.is_zero() || elapsed < self.update_interval {
            return self.progress.clone();
        }

        let current_total = self.progress.downloaded;
        let interval_bytes = current_total.saturating_sub(self.bytes_at_last_speed_calc);
        let instant_speed = interval_bytes as f64 / elapsed.as_secs_f64();

        let speed = if interval_bytes == 0 {
            0.0
        } else {
            match self.smoothed_speed {
                Some(previous) if previous > 0.0 => {
                    self.smoothing * instant_speed + (1.0 - self.smoothing) * previous
                }
                _ => instant_speed,
            }
        };
        self.smoothed_speed = Some(speed);
        self.progress.speed = speed.round() as u64;

        self.progress.eta = match self.progress.total_size {
            Some(total) if self.progress.speed > 0 => {
                let remaining = total.saturating_sub(current_total);
                Some((remaining as f64 / self.progress.speed as f64).round() as u64)
            }
            _ => None,
        };

        trace!(
            interval_bytes,
            elapsed_ms = elapsed.as_millis(),
            speed = self.progress.speed,
            "Calculated current download speed"
        );

        self.last_speed_calc_time = now;
        self.bytes_at_last_speed_calc = current_total;

        self.progress.clone()
    }

    /// Marks the download as complete and returns the final progress
    pub fn finish(&mut self) -> Progress {
        self.progress.mark_complete();
        self.progress.clone()
    }
}
