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


//! Player events
//!
//! Emitted only by the engine worker, in transition order.

use crate::player::state::PlaybackRate;
use serde::Serialize;

/// Why an error event was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerErrorCode {
    /// The chapter the player waits for failed to download
    DownloadFailed,
    /// The chapter's link expired; refresh the manifest and fetch again
    DownloadExpired,
    /// The renderer rejected an operation
    RendererFailure,
    /// A requested location is not part of the book
    LocationNotFound,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerEvent {
    PlaybackStarted { chapter: usize, offset_ms: u64 },
    PlaybackBuffering { chapter: usize, offset_ms: u64 },
    PlaybackProgressUpdate { chapter: usize, offset_ms: u64 },
    PlaybackPaused { chapter: usize, offset_ms: u64 },
    PlaybackStopped { chapter: usize, offset_ms: u64 },
    ChapterCompleted { chapter: usize },
    ChapterWaiting { chapter: usize },
    PlaybackRateChanged { rate: PlaybackRate },
    Error {
        chapter: Option<usize>,
        offset_ms: u64,
        code: PlayerErrorCode,
        message: String,
    },
    ManifestUpdated,
}

impl PlayerEvent {
    /// Chapter the event refers to, if any
    pub fn chapter(&self) -> Option<usize> {
        match self {
            PlayerEvent::PlaybackStarted { chapter, .. }
            | PlayerEvent::PlaybackBuffering { chapter, .. }
            | PlayerEvent::PlaybackProgressUpdate { chapter, .. }
            | PlayerEvent::PlaybackPaused { chapter, .. }
            | PlayerEvent::PlaybackStopped { chapter, .. }
            | PlayerEvent::ChapterCompleted { chapter }
            | PlayerEvent::ChapterWaiting { chapter } => Some(*chapter),
            PlayerEvent::Error { chapter, .. } => *chapter,
            PlayerEvent::PlaybackRateChanged { .. } | PlayerEvent::ManifestUpdated => None,
        }
    }

    pub fn is_progress(&self) -> bool {
        matches!(self, PlayerEvent::PlaybackProgressUpdate { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_event_serialization() {
        let event = PlayerEvent::Error {
            chapter: Some(3),
            offset_ms: 1200,
            code: PlayerErrorCode::DownloadExpired,
            message: "link expired".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "download_expired");
        assert_eq!(event.chapter(), Some(3));
    }
}
