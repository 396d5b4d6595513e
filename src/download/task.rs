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


//! Per-chapter download task
//!
//! # State Machine
//! ```text
//!            fetch()                 fetch succeeded
//! Initial ───────────▶ Downloading ─────────────────▶ Downloaded
//!    ▲                  │  cancel() / failed / expired    │
//!    └──────────────────┘                                 │
//!    ▲                         delete()                   │
//!    └────────────────────────────────────────────────────┘
//! ```
//!
//! # Attempts
//! Every `fetch()` from `Initial` starts a new attempt with its own
//! generation number and partial file. When an attempt settles, its outcome
//! is applied only if the task is still downloading that same generation;
//! anything else is stale and only has its partial file cleaned up.
//!
//! # Status Publication
//! Every transition writes the chapter's status and emits
//! [`BookEvent::ChapterStatusChanged`] while the task lock is held, so the
//! stream order always matches the transition order.

use crate::bus::EventBus;
use crate::download::coordinator::{DownloadCoordinator, FetchOutcome};
use crate::download::fetch::FetchRequest;
use crate::download::progress::{FetchProgress, ProgressCallback};
use crate::error::{AudiobookError, Result};
use crate::file::{ChapterPaths, FileManager};
use crate::spine::book::BookEvent;
use crate::spine::chapter::{Chapter, DownloadStatus};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug)]
enum TaskState {
    Initial,
    Downloading {
        cancel: CancellationToken,
        generation: u64,
    },
    Downloaded,
}

#[derive(Debug)]
struct TaskInner {
    state: TaskState,
    next_generation: u64,
    progress: f64,
    last_percent: Option<u8>,
}

/// Download task owning one chapter's local file
#[derive(Debug)]
pub struct DownloadTask {
    chapter: Arc<Chapter>,
    paths: ChapterPaths,
    coordinator: Arc<DownloadCoordinator>,
    files: FileManager,
    events: EventBus<BookEvent>,
    book_closed: Arc<AtomicBool>,
    inner: Mutex<TaskInner>,
}

impl DownloadTask {
    /// Create the task for `chapter`
    ///
    /// A task whose file is already on disk starts out `Downloaded`.
    pub(crate) fn new(
        chapter: Arc<Chapter>,
        paths: ChapterPaths,
        coordinator: Arc<DownloadCoordinator>,
        files: FileManager,
        events: EventBus<BookEvent>,
        book_closed: Arc<AtomicBool>,
    ) -> Self {
        let present = FileManager::file_exists(&paths.chapter_file(chapter.index()));
        let state = if present {
            chapter.set_download_status(DownloadStatus::Downloaded);
            TaskState::Downloaded
        } else {
            TaskState::Initial
        };

        Self {
            chapter,
            paths,
            coordinator,
            files,
            events,
            book_closed,
            inner: Mutex::new(TaskInner {
                state,
                next_generation: 1,
                progress: if present { 1.0 } else { 0.0 },
                last_percent: None,
            }),
        }
    }

    pub fn chapter(&self) -> &Arc<Chapter> {
        &self.chapter
    }

    /// Final location of the chapter's data
    pub fn local_file(&self) -> PathBuf {
        self.paths.chapter_file(self.chapter.index())
    }

    pub fn status(&self) -> DownloadStatus {
        self.chapter.download_status()
    }

    pub fn is_downloaded(&self) -> bool {
        matches!(self.inner.lock().state, TaskState::Downloaded)
    }

    pub fn is_downloading(&self) -> bool {
        matches!(self.inner.lock().state, TaskState::Downloading { .. })
    }

    /// Fraction of the current attempt completed, in [0, 1]
    pub fn progress(&self) -> f64 {
        self.inner.lock().progress
    }

    fn ensure_open(&self) -> Result<()> {
        if self.book_closed.load(Ordering::SeqCst) {
            return Err(AudiobookError::illegal_use(format!(
                "download task for chapter {}",
                self.chapter.index()
            )));
        }
        Ok(())
    }

    fn publish(&self, status: DownloadStatus) {
        self.chapter.set_download_status(status.clone());
        self.events.emit(BookEvent::ChapterStatusChanged {
            index: self.chapter.index(),
            status,
        });
    }

    /// Start downloading the chapter
    ///
    /// While downloading or downloaded this only re-broadcasts the current
    /// status.
    pub fn fetch(self: &Arc<Self>) -> Result<()> {
        self.ensure_open()?;
        let mut inner = self.inner.lock();

        if !matches!(inner.state, TaskState::Initial) {
            self.publish(self.chapter.download_status());
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AudiobookError::internal(format!("fetch outside a runtime: {}", e)))?;

        let index = self.chapter.index();
        let generation = inner.next_generation;
        let request = FetchRequest::new(
            index,
            self.chapter.link(),
            self.paths.partial_file(index, generation),
        );
        let cancel = CancellationToken::new();
        let pending = self
            .coordinator
            .start(request, self.progress_callback(generation), cancel.clone())?;
        FileManager::ensure_directory_exists(self.paths.book_dir())?;

        inner.next_generation += 1;
        inner.state = TaskState::Downloading {
            cancel: cancel.clone(),
            generation,
        };
        inner.progress = 0.0;
        inner.last_percent = Some(0);
        self.publish(DownloadStatus::Downloading { percent: 0 });
        drop(inner);

        debug!(chapter = index, generation, "download started");

        let task = Arc::clone(self);
        runtime.spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => FetchOutcome::Cancelled,
                outcome = pending => outcome,
            };
            task.settle(generation, outcome);
        });

        Ok(())
    }

    fn progress_callback(self: &Arc<Self>, generation: u64) -> ProgressCallback {
        let task: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |progress: FetchProgress| {
            if let Some(task) = task.upgrade() {
                task.on_progress(generation, progress);
            }
        })
    }

    fn on_progress(&self, generation: u64, progress: FetchProgress) {
        let mut inner = self.inner.lock();
        match inner.state {
            TaskState::Downloading { generation: current, .. } if current == generation => {}
            _ => return,
        }

        inner.progress = progress.fraction();
        let percent = progress.percent();
        if inner.last_percent != Some(percent) {
            inner.last_percent = Some(percent);
            self.publish(DownloadStatus::Downloading { percent });
        }
    }

    /// Apply the outcome of attempt `generation`
    fn settle(&self, generation: u64, outcome: FetchOutcome) {
        let index = self.chapter.index();
        let partial = self.paths.partial_file(index, generation);
        let mut inner = self.inner.lock();

        match inner.state {
            TaskState::Downloading { generation: current, .. } if current == generation => {}
            _ => {
                debug!(chapter = index, generation, ?outcome, "ignoring stale download outcome");
                self.discard(&partial);
                return;
            }
        }

        let status = match outcome {
            FetchOutcome::Completed(bytes) => {
                match FileManager::promote(&partial, &self.local_file()) {
                    Ok(()) => {
                        info!(chapter = index, bytes, "chapter downloaded");
                        inner.state = TaskState::Downloaded;
                        inner.progress = 1.0;
                        self.publish(DownloadStatus::Downloaded);
                        return;
                    }
                    Err(e) => DownloadStatus::Failed {
                        reason: e.to_string(),
                    },
                }
            }
            FetchOutcome::Cancelled => DownloadStatus::NotDownloaded,
            FetchOutcome::Expired(reason) => DownloadStatus::Expired { reason },
            FetchOutcome::Failed(reason) => DownloadStatus::Failed { reason },
        };

        if !matches!(status, DownloadStatus::NotDownloaded) {
            warn!(chapter = index, ?status, "download did not complete");
        }
        self.discard(&partial);
        inner.state = TaskState::Initial;
        inner.progress = 0.0;
        inner.last_percent = None;
        self.publish(status);
    }

    fn discard(&self, partial: &std::path::Path) {
        if let Err(e) = self.files.safe_delete(partial) {
            warn!(path = %partial.display(), error = %e, "could not remove partial download");
        }
    }

    /// Cancel the in-flight attempt, if any
    pub fn cancel(&self) -> Result<()> {
        self.ensure_open()?;
        self.cancel_in_flight();
        Ok(())
    }

    /// Cancel regardless of the book's lifecycle; used while closing
    pub(crate) fn cancel_in_flight(&self) -> bool {
        let mut inner = self.inner.lock();
        self.cancel_locked(&mut inner)
    }

    fn cancel_locked(&self, inner: &mut TaskInner) -> bool {
        let TaskState::Downloading { cancel, generation } = &inner.state else {
            return false;
        };

        cancel.cancel();
        let partial = self.paths.partial_file(self.chapter.index(), *generation);
        debug!(chapter = self.chapter.index(), generation, "download cancelled");

        self.discard(&partial);
        inner.state = TaskState::Initial;
        inner.progress = 0.0;
        inner.last_percent = None;
        self.publish(DownloadStatus::NotDownloaded);
        true
    }

    /// Remove the chapter's local data
    ///
    /// Deleting while downloading cancels the attempt; the chapter then sees a
    /// single `NotDownloaded` transition.
    pub fn delete(&self) -> Result<()> {
        self.ensure_open()?;
        let mut inner = self.inner.lock();

        match inner.state {
            TaskState::Initial => Ok(()),
            TaskState::Downloading { .. } => {
                self.cancel_locked(&mut inner);
                self.files.safe_delete(&self.local_file())
            }
            TaskState::Downloaded => {
                self.files.safe_delete(&self.local_file())?;
                inner.state = TaskState::Initial;
                inner.progress = 0.0;
                inner.last_percent = None;
                info!(chapter = self.chapter.index(), "chapter data deleted");
                self.publish(DownloadStatus::NotDownloaded);
                Ok(())
            }
        }
    }
}
