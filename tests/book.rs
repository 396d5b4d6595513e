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


//! Book lifecycle integration tests
//!
//! Run with: cargo test --test book

mod common;

use audiobook_engine::license::{EncryptionSchemeCheck, LicenseCheck};
use audiobook_engine::manifest::EncryptionDescriptor;
use audiobook_engine::{
    AudiobookError, Book, BookEvent, DownloadConfig, DownloadCoordinator, DownloadStatus,
};
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use url::Url;

#[tokio::test]
async fn test_chapter_linkage() {
    let dir = tempfile::tempdir().unwrap();
    let book = open_book(dir.path(), Arc::new(FakeFetcher::new()), 3);

    assert_eq!(book.chapter_count(), 3);
    assert_eq!(book.first().index(), 0);
    assert!(book.previous(0).is_none());
    assert!(book.next(2).is_none());

    for index in 0..2 {
        let next = book.next(index).unwrap();
        assert_eq!(next.index(), index + 1);
        assert_eq!(book.previous(next.index()).unwrap().index(), index);
    }

    // Every chapter has exactly one task, pointing back at it
    for (chapter, task) in book.chapters().iter().zip(book.tasks()) {
        assert!(Arc::ptr_eq(chapter, task.chapter()));
    }
}

#[tokio::test]
async fn test_chapter_lookups() {
    let dir = tempfile::tempdir().unwrap();
    let book = open_book(dir.path(), Arc::new(FakeFetcher::new()), 3);

    assert_eq!(book.chapter_by_id("ch-2").unwrap().index(), 2);
    assert_eq!(book.chapter_at(0, 1).unwrap().id(), "ch-1");
    assert!(book.chapter_by_id("ch-9").is_none());
    assert!(book.chapter_at(1, 0).is_none());

    let position = book.position_of(2, 4500).unwrap();
    assert_eq!(
        (position.part, position.chapter, position.offset_ms),
        (0, 2, 4500)
    );
    assert_eq!(position.title.as_deref(), Some("Chapter 2"));
    assert!(book.position_of(3, 0).is_none());
}

#[tokio::test]
async fn test_open_rejects_invalid_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let mut empty = manifest("urn:book:test", 1);
    empty.reading_order.clear();

    let err = Book::open(
        empty,
        &DownloadConfig::new(dir.path()),
        Arc::new(DownloadCoordinator::new(Arc::new(FakeFetcher::new()))),
    )
    .unwrap_err();
    assert!(matches!(err, AudiobookError::InvalidManifest(_)));
}

#[tokio::test]
async fn test_replace_manifest_updates_links() {
    let dir = tempfile::tempdir().unwrap();
    let book = open_book(dir.path(), Arc::new(FakeFetcher::new()), 2);
    let mut events = book.subscribe();

    let mut refreshed = manifest("urn:book:test", 2);
    refreshed.title = "Test Book (refreshed)".to_string();
    for descriptor in &mut refreshed.reading_order {
        descriptor.link.href = Url::parse(&format!(
            "https://cdn.example.com/signed/{}.mp3?token=abc",
            descriptor.chapter
        ))
        .unwrap();
    }
    refreshed.reading_order[1].id = Some("ch-one".to_string());

    book.replace_manifest(refreshed).unwrap();

    assert_eq!(drain(&mut events), vec![BookEvent::ManifestUpdated]);
    assert_eq!(book.title(), "Test Book (refreshed)");
    assert_eq!(
        book.chapter(0).unwrap().link().href.as_str(),
        "https://cdn.example.com/signed/0.mp3?token=abc"
    );

    // Lookups follow the new ids
    assert_eq!(book.chapter_by_id("ch-one").unwrap().index(), 1);
    assert!(book.chapter_by_id("ch-1").is_none());
}

#[tokio::test]
async fn test_replace_manifest_keeps_download_state() {
    let dir = tempfile::tempdir().unwrap();
    precreate_chapter(dir.path(), "urn:book:test", 0);
    let book = open_book(dir.path(), Arc::new(FakeFetcher::new()), 2);

    book.replace_manifest(manifest("urn:book:test", 2)).unwrap();

    assert!(book.task(0).unwrap().is_downloaded());
    assert_eq!(book.chapter(0).unwrap().download_status(), DownloadStatus::Downloaded);
}

#[tokio::test]
async fn test_replace_manifest_is_all_or_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let book = open_book(dir.path(), Arc::new(FakeFetcher::new()), 2);
    let mut events = book.subscribe();
    let before = book.manifest();

    let err = book
        .replace_manifest(manifest("urn:book:test", 3))
        .unwrap_err();
    assert!(matches!(err, AudiobookError::ManifestMismatch { .. }));

    let err = book
        .replace_manifest(manifest("urn:book:other", 2))
        .unwrap_err();
    assert!(matches!(err, AudiobookError::ManifestMismatch { .. }));

    let mut duplicate = manifest("urn:book:test", 2);
    duplicate.reading_order[1].id = Some("ch-0".to_string());
    duplicate.title = "Changed".to_string();
    let err = book.replace_manifest(duplicate).unwrap_err();
    assert!(matches!(err, AudiobookError::InvalidManifest(_)));

    assert_eq!(book.manifest(), before);
    assert_eq!(book.title(), "Test Book");
    assert_eq!(book.chapter_by_id("ch-1").unwrap().index(), 1);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn test_fetch_all_and_delete_all() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(FakeFetcher::new());
    let book = open_book(dir.path(), fetcher.clone(), 3);
    let mut events = book.subscribe();

    book.fetch_all().unwrap();
    let mut downloaded = 0;
    while downloaded < 3 {
        expect_event(&mut events, |e| {
            matches!(
                e,
                BookEvent::ChapterStatusChanged {
                    status: DownloadStatus::Downloaded,
                    ..
                }
            )
        })
        .await;
        downloaded += 1;
    }
    assert!(book.tasks().iter().all(|t| t.is_downloaded()));
    assert_eq!(fetcher.calls(), 3);

    book.delete_all().unwrap();
    assert!(book.tasks().iter().all(|t| !t.local_file().exists()));
    assert!(book
        .chapters()
        .iter()
        .all(|c| c.download_status() == DownloadStatus::NotDownloaded));
}

#[tokio::test]
async fn test_close_completes_stream_and_keeps_files() {
    let dir = tempfile::tempdir().unwrap();
    precreate_chapter(dir.path(), "urn:book:test", 0);
    let fetcher = Arc::new(FakeFetcher::new().with(1, Behavior::Hang));
    let book = open_book(dir.path(), fetcher, 2);
    let mut events = book.subscribe();

    book.task(1).unwrap().fetch().unwrap();
    book.close();
    book.close();
    assert!(book.is_closed());

    // The in-flight download was cancelled before the stream ended
    let mut seen = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("book stream did not complete")
        {
            Ok(event) => seen.push(event),
            Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
        }
    }
    assert_eq!(
        seen.last(),
        Some(&BookEvent::ChapterStatusChanged {
            index: 1,
            status: DownloadStatus::NotDownloaded
        })
    );

    // A late subscriber sees an already completed stream
    let mut late = book.subscribe();
    assert!(matches!(
        late.recv().await,
        Err(broadcast::error::RecvError::Closed)
    ));

    assert!(book.task(0).unwrap().local_file().exists());
    assert!(matches!(book.fetch_all(), Err(AudiobookError::IllegalUse(_))));
    assert!(matches!(book.delete_all(), Err(AudiobookError::IllegalUse(_))));
    assert!(matches!(
        book.replace_manifest(manifest("urn:book:test", 2)),
        Err(AudiobookError::IllegalUse(_))
    ));
}

#[tokio::test]
async fn test_slow_subscriber_lags() {
    let dir = tempfile::tempdir().unwrap();
    precreate_chapter(dir.path(), "urn:book:test", 0);
    let config = DownloadConfig {
        status_capacity: 2,
        ..DownloadConfig::new(dir.path())
    };
    let book = Book::open(
        manifest("urn:book:test", 1),
        &config,
        Arc::new(DownloadCoordinator::new(Arc::new(FakeFetcher::new()))),
    )
    .unwrap();
    let mut events = book.subscribe();

    // Each fetch of a downloaded chapter re-broadcasts its status
    for _ in 0..5 {
        book.task(0).unwrap().fetch().unwrap();
    }

    assert!(matches!(
        events.recv().await,
        Err(broadcast::error::RecvError::Lagged(3))
    ));
    // The newest events are still delivered
    assert_eq!(
        events.recv().await.unwrap(),
        BookEvent::ChapterStatusChanged {
            index: 0,
            status: DownloadStatus::Downloaded
        }
    );
}

#[tokio::test]
async fn test_open_verified_runs_license_checks() {
    let dir = tempfile::tempdir().unwrap();
    let checks: Vec<Arc<dyn LicenseCheck>> =
        vec![Arc::new(EncryptionSchemeCheck::new(["urn:scheme:supported"]))];
    let coordinator = Arc::new(DownloadCoordinator::new(Arc::new(FakeFetcher::new())));
    let config = DownloadConfig::new(dir.path());

    let mut supported = manifest("urn:book:test", 1);
    supported.encrypted = Some(EncryptionDescriptor {
        scheme: "urn:scheme:supported".to_string(),
        profile: None,
    });
    let book = Book::open_verified(supported, &config, coordinator.clone(), &checks)
        .await
        .unwrap();
    assert_eq!(book.chapter_count(), 1);

    let mut unsupported = manifest("urn:book:locked", 1);
    unsupported.encrypted = Some(EncryptionDescriptor {
        scheme: "urn:scheme:unknown".to_string(),
        profile: None,
    });
    let err = Book::open_verified(unsupported, &config, coordinator, &checks)
        .await
        .unwrap_err();

    match err {
        AudiobookError::LicenseCheckFailed { check, .. } => {
            assert_eq!(check, "encryption-scheme")
        }
        other => panic!("unexpected error {:?}", other),
    }
}
