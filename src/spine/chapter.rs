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


//! Chapter model
//!
//! A chapter is one reading-order entry of the manifest. Its index is fixed
//! for the book's lifetime; its descriptor (id, link, ...) only changes
//! through manifest hot-replacement; its download status is written only by
//! the chapter's download task.
//!
//! Neighbours are index lookups, never stored references.

use crate::manifest::{ChapterDescriptor, SourceLink};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Download status of one chapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadStatus {
    /// No local data
    NotDownloaded,
    /// Fetch in flight
    Downloading { percent: u8 },
    /// Local file present and complete
    Downloaded,
    /// Last fetch failed; `fetch()` may be retried
    Failed { reason: String },
    /// Last fetch hit an expired link; refresh the manifest and retry
    Expired { reason: String },
}

impl DownloadStatus {
    pub fn is_downloaded(&self) -> bool {
        matches!(self, DownloadStatus::Downloaded)
    }
}

/// One chapter of a book
#[derive(Debug)]
pub struct Chapter {
    index: usize,
    book_len: usize,
    descriptor: RwLock<ChapterDescriptor>,
    duration: RwLock<Option<Duration>>,
    status: RwLock<DownloadStatus>,
}

impl Chapter {
    pub(crate) fn new(index: usize, book_len: usize, descriptor: ChapterDescriptor) -> Self {
        let duration = descriptor.duration_ms.map(Duration::from_millis);
        Self {
            index,
            book_len,
            descriptor: RwLock::new(descriptor),
            duration: RwLock::new(duration),
            status: RwLock::new(DownloadStatus::NotDownloaded),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn id(&self) -> String {
        self.descriptor.read().resolved_id()
    }

    pub fn part(&self) -> u32 {
        self.descriptor.read().part
    }

    /// Chapter number within its part
    pub fn chapter_number(&self) -> u32 {
        self.descriptor.read().chapter
    }

    pub fn title(&self) -> Option<String> {
        self.descriptor.read().title.clone()
    }

    pub fn link(&self) -> SourceLink {
        self.descriptor.read().link.clone()
    }

    /// Best known duration: the manifest hint, corrected once played
    pub fn duration(&self) -> Option<Duration> {
        *self.duration.read()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration().map(|d| d.as_millis() as u64)
    }

    pub fn download_status(&self) -> DownloadStatus {
        self.status.read().clone()
    }

    pub fn next_index(&self) -> Option<usize> {
        if self.index + 1 < self.book_len {
            Some(self.index + 1)
        } else {
            None
        }
    }

    pub fn previous_index(&self) -> Option<usize> {
        self.index.checked_sub(1)
    }

    pub(crate) fn set_download_status(&self, status: DownloadStatus) {
        *self.status.write() = status;
    }

    pub(crate) fn correct_duration(&self, duration: Duration) {
        *self.duration.write() = Some(duration);
    }

    /// Swap in a replacement descriptor, keeping the corrected duration
    pub(crate) fn replace_descriptor(&self, descriptor: ChapterDescriptor) {
        *self.descriptor.write() = descriptor;
    }
}
