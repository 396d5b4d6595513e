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


//! Chapter downloads
//!
//! # Layers
//! - [`DownloadTask`]: per-chapter state machine, owns the local file
//! - [`DownloadCoordinator`]: routes each fetch to a hook or the default fetcher
//! - [`Fetcher`]: the capability that actually moves bytes ([`HttpFetcher`])
//! - [`progress`]: throttled byte progress reported by fetchers

pub mod coordinator;
pub mod fetch;
pub mod progress;
pub mod task;

// Re-export commonly used types
pub use coordinator::{
    BearerTokenHook, DownloadConfig, DownloadCoordinator, DownloadHook, FetchOutcome, TokenSource,
};
pub use fetch::{FetchRequest, Fetcher, HttpFetcher};
pub use progress::{FetchProgress, ProgressCallback};
pub use task::DownloadTask;
