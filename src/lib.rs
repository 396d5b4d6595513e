//! Audiobook playback and download orchestration
//!
//! # Modules
//! - [`manifest`]: validated manifest values handed over by the host
//! - [`spine`]: the [`Book`] aggregate and its [`Chapter`]s
//! - [`download`]: per-chapter download tasks, the coordinator and fetchers
//! - [`player`]: the playback state machine and its event stream
//! - [`license`]: checks run before a book is opened
//! - [`storage`]: persisted playback positions
//! - [`file`]: chapter file layout and deletion
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use audiobook_engine::{Book, DownloadConfig, DownloadCoordinator, HttpFetcher, Manifest};
//!
//! # fn example(json: &str) -> audiobook_engine::Result<()> {
//! let manifest = Manifest::from_json(json)?;
//! let coordinator = DownloadCoordinator::new(Arc::new(HttpFetcher::new()?));
//! let book = Book::open(manifest, &DownloadConfig::new("/tmp/books"), Arc::new(coordinator))?;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod download;
pub mod error;
pub mod file;
pub mod license;
pub mod manifest;
pub mod player;
pub mod spine;
pub mod storage;

pub use config::EngineConfig;
pub use download::{DownloadConfig, DownloadCoordinator, DownloadTask, HttpFetcher};
pub use error::{AudiobookError, Result};
pub use manifest::Manifest;
pub use player::{PlaybackRate, Player, PlayerConfig, PlayerEvent, PlayerPosition};
pub use spine::{Book, BookEvent, Chapter, DownloadStatus};
