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


//! Renderer seam
//!
//! A renderer plays one local chapter file at a time. The engine polls it;
//! renderers never call back into the engine. Every renderer is owned by a
//! single engine worker, so methods take `&mut self` and only `Send` is
//! required.

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

pub trait Renderer: Send {
    /// Load `file` and start playing at `offset_ms`
    fn open(&mut self, file: &Path, offset_ms: u64) -> Result<()>;

    /// Continue playing the loaded file
    fn resume(&mut self) -> Result<()>;

    /// Halt playback, keeping the file loaded
    fn stop(&mut self) -> Result<()>;

    fn seek(&mut self, offset_ms: u64) -> Result<()>;

    fn set_rate(&mut self, speed: f32) -> Result<()>;

    /// Current playback position
    fn position_ms(&self) -> u64;

    /// Duration of the loaded file, once known
    fn duration_ms(&self) -> Option<u64>;

    /// Whether playback ran off the end of the file
    fn has_ended(&self) -> bool;

    fn is_buffering(&self) -> bool {
        false
    }

    /// Unload the current file
    fn reset(&mut self);

    /// Free all resources; the renderer is not used afterwards
    fn release(&mut self);
}

/// Builds renderers for new players
#[async_trait]
pub trait RendererFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn Renderer>>;
}
