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


//! Playback
//!
//! A [`Player`] drives one renderer over the chapters of one [`Book`].
//! Its state machine runs on a dedicated engine worker; the handle only
//! queues commands and reads the latest published [`PlayerStatus`].
//!
//! [`Book`]: crate::spine::Book

pub mod engine;
pub mod events;
pub mod position;
pub mod renderer;
pub mod state;

pub use engine::{Player, PlayerConfig};
pub use events::{PlayerErrorCode, PlayerEvent};
pub use position::PlayerPosition;
pub use renderer::{Renderer, RendererFactory};
pub use state::{PlaybackRate, PlayerState, PlayerStatus};
