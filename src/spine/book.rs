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


//! Book aggregate
//!
//! # Ownership
//! - One [`Chapter`] and one [`DownloadTask`] per reading-order entry, both
//!   created here and never replaced
//! - Secondary indexes by chapter id and by (part, chapter), rebuilt only by
//!   [`Book::replace_manifest`]
//! - One [`BookEvent`] stream shared by every task of the book
//!
//! # Closing
//! `close()` cancels in-flight downloads and completes the event stream.
//! Downloaded chapter files stay on disk; remove them with
//! [`Book::delete_all`] first if that is wanted.

use crate::bus::EventBus;
use crate::download::{DownloadConfig, DownloadCoordinator, DownloadTask};
use crate::error::{AudiobookError, Result};
use crate::file::{ChapterPaths, FileManager};
use crate::license::{self, LicenseCheck};
use crate::manifest::Manifest;
use crate::player::position::PlayerPosition;
use crate::spine::chapter::{Chapter, DownloadStatus};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Events published on a book's stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookEvent {
    ChapterStatusChanged {
        index: usize,
        status: DownloadStatus,
    },
    ManifestUpdated,
}

#[derive(Debug, Default)]
struct ChapterIndexes {
    by_id: HashMap<String, usize>,
    by_position: HashMap<(u32, u32), usize>,
}

impl ChapterIndexes {
    fn build(manifest: &Manifest) -> Self {
        let mut indexes = Self::default();
        for (index, descriptor) in manifest.reading_order.iter().enumerate() {
            indexes.by_id.insert(descriptor.resolved_id(), index);
            indexes
                .by_position
                .insert((descriptor.part, descriptor.chapter), index);
        }
        indexes
    }
}

/// An opened audiobook
#[derive(Debug)]
pub struct Book {
    id: String,
    manifest: RwLock<Manifest>,
    chapters: Vec<Arc<Chapter>>,
    tasks: Vec<Arc<DownloadTask>>,
    indexes: RwLock<ChapterIndexes>,
    events: EventBus<BookEvent>,
    closed: Arc<AtomicBool>,
    paths: ChapterPaths,
}

impl Book {
    /// Build a book from a validated manifest
    pub fn open(
        manifest: Manifest,
        config: &DownloadConfig,
        coordinator: Arc<DownloadCoordinator>,
    ) -> Result<Arc<Book>> {
        manifest.validate()?;

        let paths = ChapterPaths::for_book(&config.download_directory, &manifest.id);
        let files = FileManager::new(config.deletion_strategy);
        let events = EventBus::new(config.status_capacity);
        let closed = Arc::new(AtomicBool::new(false));
        let count = manifest.chapter_count();

        let chapters: Vec<Arc<Chapter>> = manifest
            .reading_order
            .iter()
            .enumerate()
            .map(|(index, descriptor)| Arc::new(Chapter::new(index, count, descriptor.clone())))
            .collect();

        let tasks = chapters
            .iter()
            .map(|chapter| {
                Arc::new(DownloadTask::new(
                    Arc::clone(chapter),
                    paths.clone(),
                    Arc::clone(&coordinator),
                    files,
                    events.clone(),
                    Arc::clone(&closed),
                ))
            })
            .collect();

        info!(book = %manifest.id, chapters = count, dir = %paths.book_dir().display(), "book opened");

        Ok(Arc::new(Book {
            id: manifest.id.clone(),
            indexes: RwLock::new(ChapterIndexes::build(&manifest)),
            manifest: RwLock::new(manifest),
            chapters,
            tasks,
            events,
            closed,
            paths,
        }))
    }

    /// Run license checks, then open the book
    ///
    /// Nothing is built when a check fails.
    pub async fn open_verified(
        manifest: Manifest,
        config: &DownloadConfig,
        coordinator: Arc<DownloadCoordinator>,
        checks: &[Arc<dyn LicenseCheck>],
    ) -> Result<Arc<Book>> {
        license::verify_all(&manifest, checks).await?;
        Self::open(manifest, config, coordinator)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> String {
        self.manifest.read().title.clone()
    }

    /// Snapshot of the current manifest
    pub fn manifest(&self) -> Manifest {
        self.manifest.read().clone()
    }

    pub fn chapter_paths(&self) -> &ChapterPaths {
        &self.paths
    }

    pub fn chapter_count(&self) -> usize {
        self.chapters.len()
    }

    pub fn chapters(&self) -> &[Arc<Chapter>] {
        &self.chapters
    }

    pub fn chapter(&self, index: usize) -> Option<&Arc<Chapter>> {
        self.chapters.get(index)
    }

    pub fn first(&self) -> &Arc<Chapter> {
        // validate() guarantees at least one chapter
        &self.chapters[0]
    }

    pub fn next(&self, index: usize) -> Option<&Arc<Chapter>> {
        self.chapter(index)?
            .next_index()
            .and_then(|next| self.chapter(next))
    }

    pub fn previous(&self, index: usize) -> Option<&Arc<Chapter>> {
        self.chapter(index)?
            .previous_index()
            .and_then(|previous| self.chapter(previous))
    }

    pub fn chapter_by_id(&self, id: &str) -> Option<&Arc<Chapter>> {
        let index = *self.indexes.read().by_id.get(id)?;
        self.chapter(index)
    }

    pub fn chapter_at(&self, part: u32, chapter: u32) -> Option<&Arc<Chapter>> {
        let index = *self.indexes.read().by_position.get(&(part, chapter))?;
        self.chapter(index)
    }

    pub fn task(&self, index: usize) -> Option<&Arc<DownloadTask>> {
        self.tasks.get(index)
    }

    pub fn tasks(&self) -> &[Arc<DownloadTask>] {
        &self.tasks
    }

    /// Subscribe to chapter status changes and manifest updates
    pub fn subscribe(&self) -> broadcast::Receiver<BookEvent> {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(AudiobookError::illegal_use(format!("book {}", self.id)));
        }
        Ok(())
    }

    /// Position value for persisting `offset_ms` into chapter `index`
    pub fn position_of(&self, index: usize, offset_ms: u64) -> Option<PlayerPosition> {
        let chapter = self.chapter(index)?;
        let mut position = PlayerPosition::new(chapter.part(), chapter.chapter_number(), offset_ms);
        position.title = chapter.title();
        Some(position)
    }

    /// Swap in a refreshed manifest for the same book
    ///
    /// The replacement must carry the same id and the same number of
    /// chapters. On any error nothing has been changed.
    pub fn replace_manifest(&self, replacement: Manifest) -> Result<()> {
        self.ensure_open()?;
        replacement.validate()?;

        if replacement.id != self.id {
            return Err(AudiobookError::manifest_mismatch(format!(
                "book id {} does not match {}",
                replacement.id, self.id
            )));
        }
        if replacement.chapter_count() != self.chapters.len() {
            return Err(AudiobookError::manifest_mismatch(format!(
                "chapter count {} does not match {}",
                replacement.chapter_count(),
                self.chapters.len()
            )));
        }

        let indexes = ChapterIndexes::build(&replacement);
        for (chapter, descriptor) in self.chapters.iter().zip(&replacement.reading_order) {
            chapter.replace_descriptor(descriptor.clone());
        }
        *self.indexes.write() = indexes;
        *self.manifest.write() = replacement;

        info!(book = %self.id, "manifest replaced");
        self.events.emit(BookEvent::ManifestUpdated);
        Ok(())
    }

    /// Start downloading every chapter
    pub fn fetch_all(&self) -> Result<()> {
        self.ensure_open()?;
        for task in &self.tasks {
            task.fetch()?;
        }
        Ok(())
    }

    /// Delete every chapter's local data
    ///
    /// Keeps going past individual failures and reports the first one.
    pub fn delete_all(&self) -> Result<()> {
        self.ensure_open()?;
        let mut first_error = None;
        for task in &self.tasks {
            if let Err(e) = task.delete() {
                warn!(chapter = task.chapter().index(), error = %e, "delete failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Cancel downloads and complete the event stream; idempotent
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let cancelled = self
            .tasks
            .iter()
            .filter(|task| task.cancel_in_flight())
            .count();
        self.events.close();
        info!(book = %self.id, cancelled, "book closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::{FetchRequest, Fetcher, ProgressCallback};
    use crate::manifest::{ChapterDescriptor, SourceLink};
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;
    use url::Url;

    struct NoFetch;

    #[async_trait]
    impl Fetcher for NoFetch {
        async fn fetch(
            &self,
            _request: FetchRequest,
            _progress: ProgressCallback,
            _cancel: CancellationToken,
        ) -> Result<u64> {
            Err(AudiobookError::DownloadFailed("offline".to_string()))
        }
    }

    fn manifest(count: u32) -> Manifest {
        Manifest {
            id: "urn:book:unit".to_string(),
            title: "Unit".to_string(),
            encrypted: None,
            reading_order: (0..count)
                .map(|n| ChapterDescriptor {
                    id: Some(format!("c{}", n)),
                    part: 1,
                    chapter: n,
                    title: Some(format!("Chapter {}", n)),
                    duration_ms: Some(10_000),
                    media_type: None,
                    link: SourceLink::new(
                        Url::parse(&format!("https://example.com/{}.mp3", n)).unwrap(),
                    ),
                })
                .collect(),
            links: vec![],
            extensions: HashMap::new(),
        }
    }

    fn open(count: u32) -> (tempfile::TempDir, Arc<Book>) {
        let dir = tempfile::tempdir().unwrap();
        let book = Book::open(
            manifest(count),
            &DownloadConfig::new(dir.path()),
            Arc::new(DownloadCoordinator::new(Arc::new(NoFetch))),
        )
        .unwrap();
        (dir, book)
    }

    #[test]
    fn test_position_of_uses_chapter_descriptor() {
        let (_dir, book) = open(3);
        let position = book.position_of(2, 777).unwrap();
        assert_eq!(position.part, 1);
        assert_eq!(position.chapter, 2);
        assert_eq!(position.title.as_deref(), Some("Chapter 2"));
        assert_eq!(position.offset_ms, 777);
        assert!(book.position_of(3, 0).is_none());
    }

    #[test]
    fn test_replace_manifest_rejects_mismatched_id() {
        let (_dir, book) = open(2);
        let mut other = manifest(2);
        other.id = "urn:book:other".to_string();

        let err = book.replace_manifest(other).unwrap_err();
        assert!(matches!(err, AudiobookError::ManifestMismatch { .. }));
        assert_eq!(book.chapter(0).unwrap().link().href.as_str(), "https://example.com/0.mp3");
    }

    #[test]
    fn test_close_is_idempotent() {
        let (_dir, book) = open(1);
        book.close();
        book.close();
        assert!(book.is_closed());
        assert!(matches!(book.fetch_all(), Err(AudiobookError::IllegalUse(_))));
    }
}
