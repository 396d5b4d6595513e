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


//! Validated manifest values
//!
//! The engine never parses raw manifest documents. Hosts hand over an
//! already-transformed [`Manifest`]; the serde derives only exist so that a
//! host (or the CLI) can pass the value around as JSON.
//!
//! # Validation Rules
//! - Reading order must not be empty
//! - Chapter ids must be unique
//! - (part, chapter) pairs must be unique

use crate::error::{AudiobookError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use url::Url;

/// Remote location of a chapter (or an auxiliary resource)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLink {
    /// Absolute URL of the resource
    pub href: Url,

    /// Declared media type, e.g. `audio/mpeg`
    #[serde(default)]
    pub media_type: Option<String>,

    /// Free-form link properties carried over from the manifest
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

impl SourceLink {
    pub fn new(href: Url) -> Self {
        Self {
            href,
            media_type: None,
            properties: HashMap::new(),
        }
    }

    /// Whether the manifest marks this link as requiring authentication
    pub fn requires_authentication(&self) -> bool {
        self.properties
            .get("authenticate")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Encryption scheme declared by the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptionDescriptor {
    pub scheme: String,

    #[serde(default)]
    pub profile: Option<String>,
}

/// One entry of the manifest's reading order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterDescriptor {
    /// Stable chapter id; derived from part and chapter when absent
    #[serde(default)]
    pub id: Option<String>,

    /// Part number (0 for single-part books)
    #[serde(default)]
    pub part: u32,

    /// Chapter number within the part
    pub chapter: u32,

    #[serde(default)]
    pub title: Option<String>,

    /// Duration hint in milliseconds
    #[serde(default)]
    pub duration_ms: Option<u64>,

    #[serde(default)]
    pub media_type: Option<String>,

    pub link: SourceLink,
}

impl ChapterDescriptor {
    /// Id used for the book's id index
    pub fn resolved_id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.part, self.chapter))
    }
}

/// Audiobook manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Book identifier; hot-replacement requires it to stay the same
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub encrypted: Option<EncryptionDescriptor>,

    pub reading_order: Vec<ChapterDescriptor>,

    /// Auxiliary links (cover, license, refresh endpoint, ...)
    #[serde(default)]
    pub links: Vec<SourceLink>,

    /// Extension values not interpreted by the engine
    #[serde(default)]
    pub extensions: HashMap<String, serde_json::Value>,
}

impl Manifest {
    /// Check structural invariants the book relies on
    pub fn validate(&self) -> Result<()> {
        if self.reading_order.is_empty() {
            return Err(AudiobookError::InvalidManifest(format!(
                "manifest '{}' has an empty reading order",
                self.id
            )));
        }

        let mut ids = HashSet::new();
        let mut positions = HashSet::new();
        for descriptor in &self.reading_order {
            let id = descriptor.resolved_id();
            if !ids.insert(id.clone()) {
                return Err(AudiobookError::InvalidManifest(format!(
                    "duplicate chapter id '{}'",
                    id
                )));
            }
            if !positions.insert((descriptor.part, descriptor.chapter)) {
                return Err(AudiobookError::InvalidManifest(format!(
                    "duplicate chapter position part {} chapter {}",
                    descriptor.part, descriptor.chapter
                )));
            }
        }

        Ok(())
    }

    /// Parse a manifest value handed over as JSON and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(json)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn chapter_count(&self) -> usize {
        self.reading_order.len()
    }
}
