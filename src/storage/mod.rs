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


//! SQLite persistence
//!
//! # Database Schema
//! - PlaybackPositions: latest serialized position per book id
//!
//! # Usage Example
//! ```no_run
//! use audiobook_engine::player::PlayerPosition;
//! use audiobook_engine::storage::{Database, PositionStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new("./positions.db").await?;
//! let store = PositionStore::new(db);
//!
//! store.save("urn:isbn:9780000000001", &PlayerPosition::new(0, 3, 120_000)).await?;
//! let saved = store.load("urn:isbn:9780000000001").await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod migrations;
pub mod positions;

pub use database::Database;
pub use positions::{PositionStore, SavedPosition};
