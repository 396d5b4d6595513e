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


//! Playback rate and the public player status snapshot

use crate::error::{AudiobookError, Result};
use serde::{Deserialize, Serialize};

/// Supported playback speeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackRate {
    ThreeQuarters,
    #[default]
    Normal,
    OneAndAQuarter,
    OneAndAHalf,
    Double,
}

impl PlaybackRate {
    pub const ALL: [PlaybackRate; 5] = [
        PlaybackRate::ThreeQuarters,
        PlaybackRate::Normal,
        PlaybackRate::OneAndAQuarter,
        PlaybackRate::OneAndAHalf,
        PlaybackRate::Double,
    ];

    /// Speed multiplier handed to the renderer
    pub fn speed(self) -> f32 {
        match self {
            PlaybackRate::ThreeQuarters => 0.75,
            PlaybackRate::Normal => 1.0,
            PlaybackRate::OneAndAQuarter => 1.25,
            PlaybackRate::OneAndAHalf => 1.5,
            PlaybackRate::Double => 2.0,
        }
    }

    /// Rate for an exact multiplier, e.g. `1.5`
    pub fn from_speed(speed: f32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|rate| (rate.speed() - speed).abs() < f32::EPSILON)
            .ok_or_else(|| {
                AudiobookError::InvalidConfiguration(format!("unsupported playback rate {}", speed))
            })
    }
}

/// Where the player is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PlayerState {
    /// Nothing selected
    Initial,
    Playing { chapter: usize },
    Stopped { chapter: usize },
    /// Positioned on a chapter whose data is not local yet
    WaitingForElement { chapter: usize },
}

impl PlayerState {
    pub fn chapter(&self) -> Option<usize> {
        match *self {
            PlayerState::Initial => None,
            PlayerState::Playing { chapter }
            | PlayerState::Stopped { chapter }
            | PlayerState::WaitingForElement { chapter } => Some(chapter),
        }
    }
}

/// Snapshot published by the engine worker after every command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlayerStatus {
    pub state: PlayerState,
    pub offset_ms: u64,
    pub rate: PlaybackRate,
    pub closed: bool,
}

impl Default for PlayerStatus {
    fn default() -> Self {
        Self {
            state: PlayerState::Initial,
            offset_ms: 0,
            rate: PlaybackRate::Normal,
            closed: false,
        }
    }
}

impl PlayerStatus {
    pub fn is_playing(&self) -> bool {
        matches!(self.state, PlayerState::Playing { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates() {
        let speeds: Vec<f32> = PlaybackRate::ALL.iter().map(|r| r.speed()).collect();
        assert_eq!(speeds, vec![0.75, 1.0, 1.25, 1.5, 2.0]);
        assert_eq!(PlaybackRate::from_speed(1.25).unwrap(), PlaybackRate::OneAndAQuarter);
        assert!(PlaybackRate::from_speed(3.0).is_err());
        assert_eq!(PlaybackRate::default(), PlaybackRate::Normal);
    }

    #[test]
    fn test_state_chapter() {
        assert_eq!(PlayerState::Initial.chapter(), None);
        assert_eq!(PlayerState::WaitingForElement { chapter: 2 }.chapter(), Some(2));
        assert!(!PlayerStatus::default().is_playing());
    }
}
