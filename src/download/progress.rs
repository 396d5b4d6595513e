// audiobook-engine - Chapter download and playback engine for audiobooks
// Copyright (C) 2025 audiobook-engine contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Fetch progress tracking and reporting
//!
//! # Progress Information
//! - Bytes downloaded / total bytes (when the server announced a length)
//! - Fraction complete in [0, 1]
//!
//! Fetchers report through a [`ProgressCallback`]; [`ProgressTracker`]
//! throttles how often they do.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Progress snapshot for a single chapter fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    /// Bytes written to the destination so far
    pub bytes_downloaded: u64,

    /// Total bytes expected, if known
    pub total_bytes: Option<u64>,
}

impl FetchProgress {
    pub fn new(bytes_downloaded: u64, total_bytes: Option<u64>) -> Self {
        Self {
            bytes_downloaded,
            total_bytes,
        }
    }

    /// Fraction complete in [0, 1]; 0 when the total is unknown
    pub fn fraction(&self) -> f64 {
        match self.total_bytes {
            Some(total) if total > 0 => {
                (self.bytes_downloaded as f64 / total as f64).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }

    /// Whole percent complete, as published in chapter statuses
    pub fn percent(&self) -> u8 {
        (self.fraction() * 100.0).floor() as u8
    }
}

/// Callback type for progress updates
pub type ProgressCallback = Arc<dyn Fn(FetchProgress) + Send + Sync>;

/// A callback that discards every update
pub fn ignore_progress() -> ProgressCallback {
    Arc::new(|_| {})
}

/// Throttled progress state for one fetch
#[derive(Debug)]
pub struct ProgressTracker {
    progress: FetchProgress,
    last_update: Option<Instant>,

    /// Minimum interval between progress callbacks
    update_interval: Duration,
}

impl ProgressTracker {
    pub fn new(total_bytes: Option<u64>) -> Self {
        Self::with_interval(total_bytes, Duration::from_millis(200))
    }

    pub fn with_interval(total_bytes: Option<u64>, update_interval: Duration) -> Self {
        Self {
            progress: FetchProgress::new(0, total_bytes),
            last_update: None,
            update_interval,
        }
    }

    /// Record a new position
    ///
    /// Returns true if enough time has passed and the callback should be invoked
    pub fn update(&mut self, bytes_downloaded: u64) -> bool {
        self.progress.bytes_downloaded = bytes_downloaded;

        let now = Instant::now();
        match self.last_update {
            Some(last) if now.duration_since(last) < self.update_interval => false,
            _ => {
                self.last_update = Some(now);
                true
            }
        }
    }

    pub fn snapshot(&self) -> FetchProgress {
        self.progress
    }
}
