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


//! Closable broadcast bus shared by the book status stream and player events
//!
//! # Delivery Policy
//! - Bounded `tokio::sync::broadcast` channel
//! - Producers never block; a slow subscriber loses the oldest events and
//!   observes `RecvError::Lagged(n)` before resuming with the newest ones
//! - Per-subscriber order always matches emission order
//! - `close()` drops the only sender, so every subscriber sees the stream end
//!   after draining what it already holds

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Event distribution bus with an explicit end-of-stream
#[derive(Debug)]
pub struct EventBus<T> {
    tx: Arc<Mutex<Option<broadcast::Sender<T>>>>,
    capacity: usize,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
            capacity: self.capacity,
        }
    }
}

impl<T: Clone + Send + 'static> EventBus<T> {
    /// Create a bus retaining at most `capacity` undelivered events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to future events
    ///
    /// Subscribing to a closed bus yields a receiver that is already at its end.
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.subscribe(),
            None => {
                let (_, rx) = broadcast::channel(1);
                rx
            }
        }
    }

    /// Emit an event to all current subscribers
    ///
    /// Returns the number of subscribers that will see the event. Having no
    /// subscribers, or a closed bus, is not an error.
    pub fn emit(&self, event: T) -> usize {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Complete the stream; idempotent
    pub fn close(&self) {
        self.tx.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx
            .lock()
            .as_ref()
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}
