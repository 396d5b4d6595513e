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


//! Player engine
//!
//! # Execution Model
//! Each [`Player`] owns one engine worker (a tokio task) that consumes an
//! unbounded command queue in arrival order. Every state change happens on
//! that worker:
//!
//! - transport calls on the handle become commands
//! - a forwarder task re-posts every [`BookEvent`] of the book as a command
//! - while playing, an observer task posts a `Tick` command per interval
//!
//! Handle methods never block. They fail synchronously only when the player
//! is closed; everything else is reported on the event stream.
//!
//! # Observers
//! Each observer carries an id. Ticks from an observer that is no longer the
//! current one are dropped, so a tick queued just before a pause or a
//! chapter switch has no effect.

use crate::bus::EventBus;
use crate::error::{AudiobookError, Result};
use crate::player::events::{PlayerErrorCode, PlayerEvent};
use crate::player::position::PlayerPosition;
use crate::player::renderer::{Renderer, RendererFactory};
use crate::player::state::{PlaybackRate, PlayerState, PlayerStatus};
use crate::spine::{Book, BookEvent, DownloadStatus};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Player tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Interval between renderer polls while playing
    pub tick_interval_ms: u64,

    /// Consecutive end-of-track polls required before a chapter completes
    pub end_of_track_grace_ticks: u32,

    /// Skipping back from at most this far into a chapter lands in the
    /// previous chapter
    pub skip_back_threshold_ms: u64,

    /// Upper bound for building the renderer
    pub renderer_timeout_ms: u64,

    /// Undelivered events retained per subscriber
    pub event_capacity: usize,

    /// Request the download of a chapter the player starts waiting for
    pub fetch_on_wait: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            end_of_track_grace_ticks: 3,
            skip_back_threshold_ms: 4000,
            renderer_timeout_ms: 5000,
            event_capacity: 256,
            fetch_on_wait: true,
        }
    }
}

#[derive(Debug)]
enum Command {
    Play,
    Pause,
    SkipToNext { offset_ms: u64 },
    SkipToPrevious { offset_ms: u64 },
    SkipPlayhead { delta_ms: i64 },
    PlayAt(PlayerPosition),
    MoveTo(PlayerPosition),
    PlayAtBookStart,
    MoveToBookStart,
    SetRate(PlaybackRate),
    Book(BookEvent),
    Resync,
    Tick { observer: u64 },
    Close,
}

#[derive(Debug)]
struct Observer {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Debug)]
enum EngineState {
    Initial,
    Playing { chapter: usize, observer: Observer },
    Stopped { chapter: usize },
    WaitingForElement { chapter: usize },
}

impl EngineState {
    fn chapter(&self) -> Option<usize> {
        match self {
            EngineState::Initial => None,
            EngineState::Playing { chapter, .. }
            | EngineState::Stopped { chapter }
            | EngineState::WaitingForElement { chapter } => Some(*chapter),
        }
    }

    fn snapshot(&self) -> PlayerState {
        match self {
            EngineState::Initial => PlayerState::Initial,
            EngineState::Playing { chapter, .. } => PlayerState::Playing { chapter: *chapter },
            EngineState::Stopped { chapter } => PlayerState::Stopped { chapter: *chapter },
            EngineState::WaitingForElement { chapter } => {
                PlayerState::WaitingForElement { chapter: *chapter }
            }
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    status: RwLock<PlayerStatus>,
    closed: AtomicBool,
}

/// Handle to a player bound to one book
pub struct Player {
    id: Uuid,
    book: Arc<Book>,
    commands: mpsc::UnboundedSender<Command>,
    events: EventBus<PlayerEvent>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("id", &self.id)
            .field("book", &self.book.id())
            .field("status", &self.status())
            .finish()
    }
}

impl Player {
    /// Build the renderer and start the engine worker
    ///
    /// Fails with `RendererConstructionTimeout` when the factory does not
    /// deliver within `renderer_timeout_ms`.
    pub async fn open(
        book: Arc<Book>,
        factory: &dyn RendererFactory,
        config: PlayerConfig,
    ) -> Result<Player> {
        if book.is_closed() {
            return Err(AudiobookError::illegal_use(format!("book {}", book.id())));
        }

        let timeout = Duration::from_millis(config.renderer_timeout_ms);
        let renderer = match tokio::time::timeout(timeout, factory.create()).await {
            Ok(renderer) => renderer?,
            Err(_) => {
                warn!(timeout_ms = config.renderer_timeout_ms, "renderer construction timed out");
                return Err(AudiobookError::RendererConstructionTimeout(
                    config.renderer_timeout_ms,
                ));
            }
        };

        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let events = EventBus::new(config.event_capacity);
        let shared = Arc::new(Shared::default());
        let shutdown = CancellationToken::new();

        // Subscribe before the worker exists so no status change is missed
        let book_events = book.subscribe();
        tokio::spawn(forward_book_events(book_events, tx.clone(), shutdown.clone()));

        let engine = Engine {
            book: Arc::clone(&book),
            renderer,
            renderer_chapter: None,
            state: EngineState::Initial,
            offset_ms: 0,
            rate: PlaybackRate::Normal,
            end_ticks: 0,
            next_observer: 0,
            config,
            events: events.clone(),
            shared: Arc::clone(&shared),
            commands: tx.clone(),
            shutdown,
        };
        tokio::spawn(engine.run(rx));

        info!(player = %id, book = %book.id(), "player opened");

        Ok(Player {
            id,
            book,
            commands: tx,
            events,
            shared,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn book(&self) -> &Arc<Book> {
        &self.book
    }

    fn send(&self, command: Command) -> Result<()> {
        if self.is_closed() {
            return Err(AudiobookError::illegal_use(format!("player {}", self.id)));
        }
        self.commands
            .send(command)
            .map_err(|_| AudiobookError::illegal_use(format!("player {}", self.id)))
    }

    pub fn play(&self) -> Result<()> {
        self.send(Command::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    /// Start the next chapter at `offset_ms`; no-op on the last chapter
    pub fn skip_to_next_chapter(&self, offset_ms: u64) -> Result<()> {
        self.send(Command::SkipToNext { offset_ms })
    }

    /// Start the previous chapter at `offset_ms`; no-op on the first chapter
    pub fn skip_to_previous_chapter(&self, offset_ms: u64) -> Result<()> {
        self.send(Command::SkipToPrevious { offset_ms })
    }

    /// Move the playhead by `delta_ms` (negative skips back)
    pub fn skip_playhead(&self, delta_ms: i64) -> Result<()> {
        self.send(Command::SkipPlayhead { delta_ms })
    }

    pub fn play_at_location(&self, position: PlayerPosition) -> Result<()> {
        self.send(Command::PlayAt(position))
    }

    /// Position the playhead without starting playback
    pub fn move_playhead_to_location(&self, position: PlayerPosition) -> Result<()> {
        self.send(Command::MoveTo(position))
    }

    pub fn play_at_book_start(&self) -> Result<()> {
        self.send(Command::PlayAtBookStart)
    }

    pub fn move_playhead_to_book_start(&self) -> Result<()> {
        self.send(Command::MoveToBookStart)
    }

    pub fn set_playback_rate(&self, rate: PlaybackRate) -> Result<()> {
        self.send(Command::SetRate(rate))?;
        self.shared.status.write().rate = rate;
        Ok(())
    }

    pub fn playback_rate(&self) -> PlaybackRate {
        self.shared.status.read().rate
    }

    pub fn is_playing(&self) -> bool {
        !self.is_closed() && self.shared.status.read().is_playing()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Latest snapshot published by the engine worker
    pub fn status(&self) -> PlayerStatus {
        let mut status = *self.shared.status.read();
        status.closed = self.is_closed();
        status
    }

    /// Current location as a persistable position
    pub fn current_position(&self) -> Option<PlayerPosition> {
        let status = self.status();
        self.book
            .position_of(status.state.chapter()?, status.offset_ms)
    }

    /// Subscribe to player events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    /// Release the renderer and complete the event stream; idempotent
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // The worker may already be gone if the runtime shut down
        let _ = self.commands.send(Command::Close);
        debug!(player = %self.id, "player close requested");
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.close();
    }
}

/// Re-post book events into the player's queue
async fn forward_book_events(
    mut book_events: broadcast::Receiver<BookEvent>,
    commands: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = book_events.recv() => received,
        };

        let command = match received {
            Ok(event) => Command::Book(event),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "player lagged behind book events, resyncing");
                Command::Resync
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if commands.send(command).is_err() {
            break;
        }
    }
}

/// State owned by the engine worker
struct Engine {
    book: Arc<Book>,
    renderer: Box<dyn Renderer>,
    /// Chapter whose file the renderer currently has loaded
    renderer_chapter: Option<usize>,
    state: EngineState,
    offset_ms: u64,
    rate: PlaybackRate,
    end_ticks: u32,
    next_observer: u64,
    config: PlayerConfig,
    events: EventBus<PlayerEvent>,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,
}

impl Engine {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            if matches!(command, Command::Close) {
                break;
            }
            self.handle(command);
            self.publish_status();
        }
        self.shut_down();
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Play => self.play(),
            Command::Pause => self.pause(),
            Command::SkipToNext { offset_ms } => {
                let current = self.state.chapter().unwrap_or(0);
                if let Some(next) = self.book.chapter(current).and_then(|c| c.next_index()) {
                    self.start_chapter(next, offset_ms);
                }
            }
            Command::SkipToPrevious { offset_ms } => {
                let current = self.state.chapter().unwrap_or(0);
                if let Some(previous) = self.book.chapter(current).and_then(|c| c.previous_index()) {
                    self.start_chapter(previous, offset_ms);
                }
            }
            Command::SkipPlayhead { delta_ms } => self.skip_playhead(delta_ms),
            Command::PlayAt(position) => {
                if let Some(index) = self.resolve(&position) {
                    self.play_at(index, position.offset_ms);
                }
            }
            Command::MoveTo(position) => {
                if let Some(index) = self.resolve(&position) {
                    self.position_at(index, position.offset_ms);
                }
            }
            Command::PlayAtBookStart => self.play_at(0, 0),
            Command::MoveToBookStart => self.position_at(0, 0),
            Command::SetRate(rate) => self.set_rate(rate),
            Command::Book(BookEvent::ChapterStatusChanged { index, status }) => {
                self.on_chapter_status(index, status)
            }
            Command::Book(BookEvent::ManifestUpdated) => self.emit(PlayerEvent::ManifestUpdated),
            Command::Resync => {
                if let Some(chapter) = self.state.chapter() {
                    if let Some(status) = self.book.chapter(chapter).map(|c| c.download_status()) {
                        self.on_chapter_status(chapter, status);
                    }
                }
            }
            Command::Tick { observer } => self.tick(observer),
            Command::Close => {}
        }
    }

    fn emit(&self, event: PlayerEvent) {
        self.events.emit(event);
    }

    fn emit_error(&self, chapter: Option<usize>, code: PlayerErrorCode, message: String) {
        self.emit(PlayerEvent::Error {
            chapter,
            offset_ms: self.offset_ms,
            code,
            message,
        });
    }

    fn publish_status(&self) {
        let mut status = self.shared.status.write();
        status.state = self.state.snapshot();
        status.offset_ms = self.offset_ms;
        status.rate = self.rate;
    }

    /// Replace the state, cancelling the observer of the old one
    fn set_state(&mut self, state: EngineState) {
        if let EngineState::Playing { observer, .. } = &self.state {
            observer.cancel.cancel();
        }
        self.state = state;
    }

    fn start_observer(&mut self) -> Observer {
        self.next_observer += 1;
        let id = self.next_observer;
        let cancel = self.shutdown.child_token();
        let interval = Duration::from_millis(self.config.tick_interval_ms.max(1));
        let commands = self.commands.clone();
        let token = cancel.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of an interval completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if commands.send(Command::Tick { observer: id }).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Observer { id, cancel }
    }

    fn is_downloaded(&self, index: usize) -> bool {
        self.book
            .task(index)
            .map(|task| task.is_downloaded())
            .unwrap_or(false)
    }

    fn resolve(&self, position: &PlayerPosition) -> Option<usize> {
        let found = self
            .book
            .chapter_at(position.part, position.chapter)
            .map(|c| c.index());
        if found.is_none() {
            self.emit_error(
                None,
                PlayerErrorCode::LocationNotFound,
                format!("part {} chapter {} is not in the book", position.part, position.chapter),
            );
        }
        found
    }

    /// Where playback actually is; polls the renderer while playing
    fn current_offset(&mut self) -> u64 {
        if matches!(self.state, EngineState::Playing { .. }) {
            self.offset_ms = self.renderer.position_ms();
        }
        self.offset_ms
    }

    fn unload_renderer(&mut self) {
        if self.renderer_chapter.take().is_some() {
            self.renderer.reset();
        }
    }

    /// Report a renderer failure and fall back to a stopped state
    fn renderer_failed(&mut self, chapter: usize, error: AudiobookError) {
        warn!(chapter, error = %error, "renderer failure");
        self.unload_renderer();
        self.set_state(EngineState::Stopped { chapter });
        self.emit_error(Some(chapter), PlayerErrorCode::RendererFailure, error.to_string());
    }

    /// Start playing `index` at `offset_ms`, or wait for its download
    fn start_chapter(&mut self, index: usize, offset_ms: u64) {
        self.offset_ms = offset_ms;
        self.end_ticks = 0;

        if !self.is_downloaded(index) {
            self.unload_renderer();
            self.set_state(EngineState::WaitingForElement { chapter: index });
            debug!(chapter = index, "waiting for chapter download");
            self.emit(PlayerEvent::ChapterWaiting { chapter: index });

            if self.config.fetch_on_wait {
                if let Some(task) = self.book.task(index) {
                    if let Err(e) = task.fetch() {
                        warn!(chapter = index, error = %e, "could not request chapter download");
                    }
                }
            }
            return;
        }

        let loaded = if self.renderer_chapter == Some(index) {
            self.renderer
                .seek(offset_ms)
                .and_then(|_| self.renderer.resume())
        } else {
            self.unload_renderer();
            let file = match self.book.task(index) {
                Some(task) => task.local_file(),
                None => return,
            };
            self.renderer
                .open(&file, offset_ms)
                .and_then(|_| self.renderer.set_rate(self.rate.speed()))
                .map(|_| {
                    self.renderer_chapter = Some(index);
                })
        };

        if let Err(e) = loaded {
            self.renderer_failed(index, e);
            return;
        }

        self.correct_duration(index);
        let observer = self.start_observer();
        self.set_state(EngineState::Playing {
            chapter: index,
            observer,
        });
        debug!(chapter = index, offset_ms, "playback started");
        self.emit(PlayerEvent::PlaybackStarted {
            chapter: index,
            offset_ms,
        });
    }

    /// Record the duration the renderer reports for a freshly opened chapter
    fn correct_duration(&self, index: usize) {
        let (Some(chapter), Some(actual)) = (self.book.chapter(index), self.renderer.duration_ms())
        else {
            return;
        };
        if chapter.duration_ms() != Some(actual) {
            debug!(chapter = index, hint = ?chapter.duration_ms(), actual, "correcting chapter duration");
            chapter.correct_duration(Duration::from_millis(actual));
        }
    }

    /// Put the playhead on `index` at `offset_ms` without playing
    fn position_at(&mut self, index: usize, offset_ms: u64) {
        self.offset_ms = offset_ms;
        self.end_ticks = 0;

        if self.renderer_chapter == Some(index) {
            let result = self
                .renderer
                .stop()
                .and_then(|_| self.renderer.seek(offset_ms));
            if let Err(e) = result {
                self.renderer_failed(index, e);
                return;
            }
        } else {
            self.unload_renderer();
        }

        self.set_state(EngineState::Stopped { chapter: index });
        self.emit(PlayerEvent::PlaybackPaused {
            chapter: index,
            offset_ms,
        });
    }

    fn play_at(&mut self, index: usize, offset_ms: u64) {
        let in_place = self.renderer_chapter == Some(index) && self.is_downloaded(index);
        if !in_place {
            self.start_chapter(index, offset_ms);
            return;
        }

        if let EngineState::Playing { .. } = self.state {
            if let Err(e) = self.renderer.seek(offset_ms) {
                self.renderer_failed(index, e);
                return;
            }
            self.offset_ms = offset_ms;
            self.end_ticks = 0;
            self.emit(PlayerEvent::PlaybackProgressUpdate {
                chapter: index,
                offset_ms,
            });
        } else {
            self.start_chapter(index, offset_ms);
        }
    }

    fn play(&mut self) {
        match self.state {
            EngineState::Initial => self.start_chapter(0, 0),
            EngineState::Stopped { chapter } => {
                if self.renderer_chapter != Some(chapter) || !self.is_downloaded(chapter) {
                    self.start_chapter(chapter, self.offset_ms);
                    return;
                }
                if let Err(e) = self.renderer.resume() {
                    self.renderer_failed(chapter, e);
                    return;
                }
                let observer = self.start_observer();
                self.end_ticks = 0;
                self.set_state(EngineState::Playing { chapter, observer });
                self.emit(PlayerEvent::PlaybackStarted {
                    chapter,
                    offset_ms: self.offset_ms,
                });
            }
            EngineState::Playing { .. } | EngineState::WaitingForElement { .. } => {}
        }
    }

    fn pause(&mut self) {
        match self.state {
            EngineState::Playing { chapter, .. } => {
                let offset_ms = self.current_offset();
                self.set_state(EngineState::Stopped { chapter });
                if let Err(e) = self.renderer.stop() {
                    self.renderer_failed(chapter, e);
                    return;
                }
                self.emit(PlayerEvent::PlaybackPaused { chapter, offset_ms });
            }
            EngineState::WaitingForElement { chapter } => {
                // Stop waiting so the download finishing does not start playback
                self.set_state(EngineState::Stopped { chapter });
                self.emit(PlayerEvent::PlaybackPaused {
                    chapter,
                    offset_ms: self.offset_ms,
                });
            }
            EngineState::Initial | EngineState::Stopped { .. } => {}
        }
    }

    fn skip_playhead(&mut self, delta_ms: i64) {
        let Some(chapter) = self.state.chapter() else {
            return;
        };
        let offset = self.current_offset();

        if delta_ms >= 0 {
            let mut target = offset.saturating_add(delta_ms as u64);
            if let Some(duration) = self.book.chapter(chapter).and_then(|c| c.duration_ms()) {
                target = target.min(duration);
            }
            self.seek_within(chapter, target);
            return;
        }

        let back = delta_ms.unsigned_abs();
        if offset > self.config.skip_back_threshold_ms {
            self.seek_within(chapter, offset.saturating_sub(back));
            return;
        }

        let Some(previous) = self.book.previous(chapter).cloned() else {
            self.seek_within(chapter, 0);
            return;
        };

        let remaining = back.saturating_sub(offset);
        let target = previous
            .duration_ms()
            .map(|duration| duration.saturating_sub(remaining))
            .unwrap_or(0);
        let previous = previous.index();

        match self.state {
            EngineState::Stopped { .. } => self.position_at(previous, target),
            _ => self.start_chapter(previous, target),
        }
    }

    /// Seek inside the current chapter, keeping the play/stop mode
    fn seek_within(&mut self, chapter: usize, target: u64) {
        if self.renderer_chapter == Some(chapter) {
            if let Err(e) = self.renderer.seek(target) {
                self.renderer_failed(chapter, e);
                return;
            }
        }
        self.offset_ms = target;
        self.end_ticks = 0;
        self.emit(PlayerEvent::PlaybackProgressUpdate {
            chapter,
            offset_ms: target,
        });
    }

    fn set_rate(&mut self, rate: PlaybackRate) {
        self.rate = rate;
        if self.renderer_chapter.is_some() {
            if let Err(e) = self.renderer.set_rate(rate.speed()) {
                self.emit_error(self.state.chapter(), PlayerErrorCode::RendererFailure, e.to_string());
            }
        }
        self.emit(PlayerEvent::PlaybackRateChanged { rate });
    }

    /// React to a status change of chapter `index`
    ///
    /// Events may trail the task's actual state, so transitions are decided
    /// on the task itself; the event payload only supplies error reasons.
    fn on_chapter_status(&mut self, index: usize, status: DownloadStatus) {
        match self.state {
            EngineState::WaitingForElement { chapter } if chapter == index => {
                if self.is_downloaded(chapter) {
                    self.start_chapter(chapter, self.offset_ms);
                    return;
                }
                match status {
                    DownloadStatus::Failed { reason } => {
                        self.emit_error(Some(chapter), PlayerErrorCode::DownloadFailed, reason)
                    }
                    DownloadStatus::Expired { reason } => {
                        self.emit_error(Some(chapter), PlayerErrorCode::DownloadExpired, reason)
                    }
                    _ => {}
                }
            }
            EngineState::Playing { chapter, .. } | EngineState::Stopped { chapter }
                if chapter == index =>
            {
                if !self.is_downloaded(chapter) {
                    self.lose_chapter(chapter);
                }
            }
            _ => {}
        }
    }

    /// The current chapter's data went away
    fn lose_chapter(&mut self, chapter: usize) {
        info!(chapter, "chapter data no longer available, stopping");
        self.set_state(EngineState::Initial);
        self.unload_renderer();
        self.offset_ms = 0;
        self.emit(PlayerEvent::PlaybackStopped {
            chapter,
            offset_ms: 0,
        });
    }

    fn tick(&mut self, observer: u64) {
        let chapter = match &self.state {
            EngineState::Playing { chapter, observer: current } if current.id == observer => *chapter,
            _ => return,
        };

        let position = self.renderer.position_ms();
        self.offset_ms = position;

        if self.renderer.is_buffering() {
            self.emit(PlayerEvent::PlaybackBuffering {
                chapter,
                offset_ms: position,
            });
            return;
        }

        let duration = self
            .renderer
            .duration_ms()
            .or_else(|| self.book.chapter(chapter).and_then(|c| c.duration_ms()));
        let at_end = self.renderer.has_ended() || duration.map_or(false, |d| position >= d);

        if !at_end {
            self.end_ticks = 0;
            self.emit(PlayerEvent::PlaybackProgressUpdate {
                chapter,
                offset_ms: position,
            });
            return;
        }

        self.end_ticks += 1;
        if self.end_ticks < self.config.end_of_track_grace_ticks {
            self.emit(PlayerEvent::PlaybackProgressUpdate {
                chapter,
                offset_ms: position,
            });
            return;
        }

        self.complete_chapter(chapter);
    }

    fn complete_chapter(&mut self, chapter: usize) {
        debug!(chapter, "chapter completed");
        self.emit(PlayerEvent::ChapterCompleted { chapter });

        match self.book.chapter(chapter).and_then(|c| c.next_index()) {
            Some(next) => self.start_chapter(next, 0),
            None => {
                self.set_state(EngineState::Initial);
                if let Err(e) = self.renderer.stop() {
                    warn!(error = %e, "renderer stop failed at end of book");
                }
                self.unload_renderer();
                self.offset_ms = 0;
                info!(book = %self.book.id(), "end of book reached");
                self.emit(PlayerEvent::PlaybackStopped {
                    chapter,
                    offset_ms: 0,
                });
            }
        }
    }

    fn shut_down(&mut self) {
        self.set_state(EngineState::Initial);
        self.renderer_chapter = None;
        self.renderer.release();
        self.shutdown.cancel();
        self.publish_status();
        self.events.close();
        info!(book = %self.book.id(), "player closed");
    }
}
