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


//! Persistable playback positions
//!
//! # Format (version 1)
//! ```json
//! {
//!   "@version": 1,
//!   "location": {
//!     "title": "Chapter 3",
//!     "part": 0,
//!     "chapter": 3,
//!     "offsetMilliseconds": 120000
//!   }
//! }
//! ```
//!
//! `title` is always written, as `null` when unknown, and may be absent on
//! read.

use crate::error::{AudiobookError, Result};
use serde::{Deserialize, Serialize};

/// The only format version this build reads and writes
pub const POSITION_FORMAT_VERSION: i64 = 1;

/// A location inside a book
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlayerPosition {
    pub title: Option<String>,
    pub part: u32,
    pub chapter: u32,
    pub offset_ms: u64,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "@version")]
    version: Option<i64>,
    location: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationV1 {
    #[serde(default)]
    title: Option<String>,
    part: u32,
    chapter: u32,
    offset_milliseconds: u64,
}

impl PlayerPosition {
    pub fn new(part: u32, chapter: u32, offset_ms: u64) -> Self {
        Self {
            title: None,
            part,
            chapter,
            offset_ms,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Same chapter, different offset
    pub fn with_offset(mut self, offset_ms: u64) -> Self {
        self.offset_ms = offset_ms;
        self
    }

    pub fn to_json(&self) -> Result<String> {
        let location = LocationV1 {
            title: self.title.clone(),
            part: self.part,
            chapter: self.chapter,
            offset_milliseconds: self.offset_ms,
        };
        let envelope = Envelope {
            version: Some(POSITION_FORMAT_VERSION),
            location: Some(serde_json::to_value(location)?),
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(json)
            .map_err(|e| AudiobookError::InvalidPosition(e.to_string()))?;

        match envelope.version {
            Some(POSITION_FORMAT_VERSION) => {}
            Some(other) => return Err(AudiobookError::UnsupportedPositionVersion(other)),
            None => {
                return Err(AudiobookError::InvalidPosition(
                    "missing @version".to_string(),
                ))
            }
        }

        let location = envelope
            .location
            .ok_or_else(|| AudiobookError::InvalidPosition("missing location".to_string()))?;
        let location: LocationV1 = serde_json::from_value(location)
            .map_err(|e| AudiobookError::InvalidPosition(e.to_string()))?;

        Ok(Self {
            title: location.title,
            part: location.part,
            chapter: location.chapter,
            offset_ms: location.offset_milliseconds,
        })
    }
}
