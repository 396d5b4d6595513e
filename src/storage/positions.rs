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


//! Persisted playback positions
//!
//! One row per book id holding the latest position in its versioned JSON
//! form, so rows written by older builds stay readable as long as the
//! format version is understood.

use crate::error::{AudiobookError, Result};
use crate::player::position::PlayerPosition;
use crate::storage::database::Database;
use chrono::{DateTime, Utc};
use tracing::debug;

/// A position together with the time it was saved
#[derive(Debug, Clone, PartialEq)]
pub struct SavedPosition {
    pub position: PlayerPosition,
    pub saved_at: DateTime<Utc>,
}

/// Stores the latest position for each book
#[derive(Debug, Clone)]
pub struct PositionStore {
    db: Database,
}

impl PositionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Save (or overwrite) the position for `book_id`
    pub async fn save(&self, book_id: &str, position: &PlayerPosition) -> Result<()> {
        let json = position.to_json()?;
        let saved_at = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO PlaybackPositions (book_id, position_json, saved_at)
            VALUES (?, ?, ?)
            ON CONFLICT(book_id) DO UPDATE SET
                position_json = excluded.position_json,
                saved_at = excluded.saved_at
            "#,
        )
        .bind(book_id)
        .bind(&json)
        .bind(&saved_at)
        .execute(self.db.pool())
        .await?;

        debug!(book = book_id, chapter = position.chapter, offset_ms = position.offset_ms, "position saved");
        Ok(())
    }

    /// Latest position for `book_id`, if any
    pub async fn load(&self, book_id: &str) -> Result<Option<SavedPosition>> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT position_json, saved_at FROM PlaybackPositions WHERE book_id = ?",
        )
        .bind(book_id)
        .fetch_optional(self.db.pool())
        .await?;

        let Some((json, saved_at)) = row else {
            return Ok(None);
        };

        let saved_at = DateTime::parse_from_rfc3339(&saved_at)
            .map_err(|e| AudiobookError::InvalidPosition(format!("bad saved_at: {}", e)))?
            .with_timezone(&Utc);

        Ok(Some(SavedPosition {
            position: PlayerPosition::from_json(&json)?,
            saved_at,
        }))
    }

    /// Forget the position for `book_id`; returns whether one existed
    pub async fn delete(&self, book_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM PlaybackPositions WHERE book_id = ?")
            .bind(book_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Ids of every book with a saved position
    pub async fn book_ids(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar("SELECT book_id FROM PlaybackPositions ORDER BY book_id")
            .fetch_all(self.db.pool())
            .await?;
        Ok(ids)
    }
}
