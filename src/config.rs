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


//! Engine configuration file
//!
//! ```json
//! {
//!   "download": { "download_directory": "/data/books", "deletion_strategy": "rename_then_delete" },
//!   "player": { "tick_interval_ms": 250 },
//!   "database_path": "/data/positions.db"
//! }
//! ```
//!
//! Every field is optional and falls back to its default.

use crate::download::DownloadConfig;
use crate::error::{AudiobookError, Result};
use crate::player::PlayerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub download: DownloadConfig,
    pub player: PlayerConfig,

    /// SQLite file for saved positions; positions are not persisted when unset
    pub database_path: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            AudiobookError::FileIoError(format!(
                "Failed to read config {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.player.tick_interval_ms == 0 {
            return Err(AudiobookError::InvalidConfiguration(
                "player.tick_interval_ms must be positive".to_string(),
            ));
        }
        if self.player.event_capacity == 0 || self.download.status_capacity == 0 {
            return Err(AudiobookError::InvalidConfiguration(
                "event capacities must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
