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


//! Test doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use audiobook_engine::download::{FetchProgress, FetchRequest, Fetcher, ProgressCallback};
use audiobook_engine::manifest::{ChapterDescriptor, SourceLink};
use audiobook_engine::player::{Renderer, RendererFactory};
use audiobook_engine::{AudiobookError, Book, DownloadConfig, DownloadCoordinator, Manifest, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;
use url::Url;

pub const CHAPTER_DURATION_MS: u64 = 60_000;
pub const CHAPTER_BYTES: &[u8] = b"not really audio";

// ===== Manifests and books =====

pub fn manifest(id: &str, chapters: u32) -> Manifest {
    Manifest {
        id: id.to_string(),
        title: "Test Book".to_string(),
        encrypted: None,
        reading_order: (0..chapters)
            .map(|n| ChapterDescriptor {
                id: Some(format!("ch-{}", n)),
                part: 0,
                chapter: n,
                title: Some(format!("Chapter {}", n)),
                duration_ms: Some(CHAPTER_DURATION_MS),
                media_type: Some("audio/mpeg".to_string()),
                link: SourceLink::new(
                    Url::parse(&format!("https://cdn.example.com/book/{}.mp3", n)).unwrap(),
                ),
            })
            .collect(),
        links: vec![],
        extensions: HashMap::new(),
    }
}

pub fn open_book(dir: &Path, fetcher: Arc<FakeFetcher>, chapters: u32) -> Arc<Book> {
    Book::open(
        manifest("urn:book:test", chapters),
        &DownloadConfig::new(dir),
        Arc::new(DownloadCoordinator::new(fetcher)),
    )
    .unwrap()
}

/// Put chapter data on disk as if it had been downloaded earlier
pub fn precreate_chapter(dir: &Path, book_id: &str, index: usize) {
    let paths = audiobook_engine::file::ChapterPaths::for_book(dir, book_id);
    std::fs::create_dir_all(paths.book_dir()).unwrap();
    std::fs::write(paths.chapter_file(index), CHAPTER_BYTES).unwrap();
}

/// Open a book whose chapters are all on disk already
pub fn open_downloaded_book(dir: &Path, chapters: u32) -> Arc<Book> {
    for index in 0..chapters as usize {
        precreate_chapter(dir, "urn:book:test", index);
    }
    open_book(dir, Arc::new(FakeFetcher::new()), chapters)
}

/// Files in the book directory, sorted by name
pub fn book_files(book: &Book) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(book.chapter_paths().book_dir()) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => vec![],
    };
    names.sort();
    names
}

// ===== Fetcher =====

#[derive(Clone)]
pub enum Behavior {
    /// Write the chapter immediately
    Succeed,
    /// Write the chapter once the gate is opened
    Gate(Arc<Notify>),
    /// Report half the bytes twice, then succeed
    HalfwayThenSucceed,
    Fail(String),
    Expire,
    /// Never finish on its own
    Hang,
}

pub struct FakeFetcher {
    behaviors: Mutex<HashMap<usize, Behavior>>,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self {
            behaviors: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(self, chapter: usize, behavior: Behavior) -> Self {
        self.set(chapter, behavior);
        self
    }

    pub fn set(&self, chapter: usize, behavior: Behavior) {
        self.behaviors.lock().insert(chapter, behavior);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(
        &self,
        request: FetchRequest,
        progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .behaviors
            .lock()
            .get(&request.chapter_index)
            .cloned()
            .unwrap_or(Behavior::Succeed);

        let total = CHAPTER_BYTES.len() as u64;
        match behavior {
            Behavior::Succeed => {}
            Behavior::Gate(gate) => gate.notified().await,
            Behavior::HalfwayThenSucceed => {
                progress(FetchProgress::new(total / 2, Some(total)));
                progress(FetchProgress::new(total / 2, Some(total)));
            }
            Behavior::Fail(reason) => return Err(AudiobookError::DownloadFailed(reason)),
            Behavior::Expire => {
                return Err(AudiobookError::DownloadExpired("link expired".to_string()))
            }
            Behavior::Hang => {
                cancel.cancelled().await;
                return Err(AudiobookError::DownloadCancelled);
            }
        }

        tokio::fs::write(&request.destination, CHAPTER_BYTES).await?;
        progress(FetchProgress::new(total, Some(total)));
        Ok(total)
    }
}

// ===== Renderer =====

#[derive(Debug)]
pub struct RendererState {
    pub opened: Vec<(PathBuf, u64)>,
    pub position_ms: u64,
    /// Duration reported for every opened file
    pub duration_ms: u64,
    /// Added to the position on every poll while playing
    pub step_ms: u64,
    pub loaded: bool,
    pub playing: bool,
    pub rate: f32,
    pub resets: usize,
    pub released: bool,
    pub fail_open: bool,
}

impl Default for RendererState {
    fn default() -> Self {
        Self {
            opened: vec![],
            position_ms: 0,
            duration_ms: CHAPTER_DURATION_MS,
            step_ms: 0,
            loaded: false,
            playing: false,
            rate: 1.0,
            resets: 0,
            released: false,
            fail_open: false,
        }
    }
}

pub type SharedRendererState = Arc<Mutex<RendererState>>;

pub struct FakeRenderer {
    state: SharedRendererState,
}

impl Renderer for FakeRenderer {
    fn open(&mut self, file: &Path, offset_ms: u64) -> Result<()> {
        let mut s = self.state.lock();
        if s.fail_open {
            return Err(AudiobookError::RendererError("cannot decode".to_string()));
        }
        if !file.exists() {
            return Err(AudiobookError::RendererError(format!("missing {}", file.display())));
        }
        s.opened.push((file.to_path_buf(), offset_ms));
        s.position_ms = offset_ms;
        s.loaded = true;
        s.playing = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.state.lock().playing = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.state.lock().playing = false;
        Ok(())
    }

    fn seek(&mut self, offset_ms: u64) -> Result<()> {
        let mut s = self.state.lock();
        s.position_ms = offset_ms.min(s.duration_ms);
        Ok(())
    }

    fn set_rate(&mut self, speed: f32) -> Result<()> {
        self.state.lock().rate = speed;
        Ok(())
    }

    fn position_ms(&self) -> u64 {
        let mut s = self.state.lock();
        if s.loaded && s.playing {
            s.position_ms = (s.position_ms + s.step_ms).min(s.duration_ms);
        }
        s.position_ms
    }

    fn duration_ms(&self) -> Option<u64> {
        let s = self.state.lock();
        s.loaded.then_some(s.duration_ms)
    }

    fn has_ended(&self) -> bool {
        let s = self.state.lock();
        s.loaded && s.position_ms >= s.duration_ms
    }

    fn reset(&mut self) {
        let mut s = self.state.lock();
        s.loaded = false;
        s.playing = false;
        s.position_ms = 0;
        s.resets += 1;
    }

    fn release(&mut self) {
        let mut s = self.state.lock();
        s.loaded = false;
        s.playing = false;
        s.released = true;
    }
}

pub struct FakeRendererFactory {
    pub state: SharedRendererState,
    pub delay: Option<Duration>,
}

impl FakeRendererFactory {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RendererState::default())),
            delay: None,
        }
    }

    pub fn with_step(self, step_ms: u64, duration_ms: u64) -> Self {
        {
            let mut s = self.state.lock();
            s.step_ms = step_ms;
            s.duration_ms = duration_ms;
        }
        self
    }
}

#[async_trait]
impl RendererFactory for FakeRendererFactory {
    async fn create(&self) -> Result<Box<dyn Renderer>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Box::new(FakeRenderer {
            state: Arc::clone(&self.state),
        }))
    }
}

// ===== Event helpers =====

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Receive events until one matches, returning everything received
pub async fn collect_until<T, F>(rx: &mut broadcast::Receiver<T>, mut done: F) -> Vec<T>
where
    T: Clone + std::fmt::Debug,
    F: FnMut(&T) -> bool,
{
    let mut seen = Vec::new();
    loop {
        let received = tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out; received so far: {:?}", seen));
        match received {
            Ok(event) => {
                let finished = done(&event);
                seen.push(event);
                if finished {
                    return seen;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => {
                panic!("stream closed; received so far: {:?}", seen)
            }
        }
    }
}

/// Receive events until one matches and return it
pub async fn expect_event<T, F>(rx: &mut broadcast::Receiver<T>, done: F) -> T
where
    T: Clone + std::fmt::Debug,
    F: FnMut(&T) -> bool,
{
    collect_until(rx, done)
        .await
        .pop()
        .expect("collect_until returns the matching event last")
}

/// Everything already queued on the receiver, without waiting
pub fn drain<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return events,
        }
    }
}
