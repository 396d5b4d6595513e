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


use anyhow::{anyhow, Context};
use async_trait::async_trait;
use audiobook_engine::download::{BearerTokenHook, TokenSource};
use audiobook_engine::manifest::SourceLink;
use audiobook_engine::storage::{Database, PositionStore};
use audiobook_engine::{
    Book, BookEvent, DownloadCoordinator, DownloadStatus, EngineConfig, HttpFetcher, Manifest,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "audiobook-cli")]
#[command(about = "Audiobook engine CLI - desktop testing tool", long_about = None)]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the download directory
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every chapter of a manifest and print status changes
    Download {
        /// Manifest JSON file
        manifest: PathBuf,

        /// Bearer token for authenticated links
        #[arg(long)]
        token: Option<String>,

        /// Host that always gets the bearer token (repeatable)
        #[arg(long = "auth-host")]
        auth_hosts: Vec<String>,
    },
    /// Delete every downloaded chapter of a manifest
    Delete {
        /// Manifest JSON file
        manifest: PathBuf,
    },
    /// Print the serialized position for a chapter and offset
    Position {
        /// Manifest JSON file
        manifest: PathBuf,

        /// Chapter index in reading order
        #[arg(long, default_value_t = 0)]
        chapter: usize,

        /// Offset into the chapter in milliseconds
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Also save it to the configured position database
        #[arg(long)]
        save: bool,
    },
}

/// Hands out the same token for every link
struct StaticToken(String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self, _link: &SourceLink) -> audiobook_engine::Result<String> {
        Ok(self.0.clone())
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn,sqlx=warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &cli.dir {
        config.download.download_directory = dir.clone();
    }
    Ok(config)
}

fn load_manifest(path: &Path) -> anyhow::Result<Manifest> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading manifest {}", path.display()))?;
    Ok(Manifest::from_json(&json)?)
}

fn open_book(
    config: &EngineConfig,
    manifest: Manifest,
    coordinator: DownloadCoordinator,
) -> anyhow::Result<Arc<Book>> {
    Ok(Book::open(manifest, &config.download, Arc::new(coordinator))?)
}

async fn download(
    config: &EngineConfig,
    manifest: Manifest,
    token: Option<String>,
    auth_hosts: Vec<String>,
) -> anyhow::Result<()> {
    let fetcher = Arc::new(HttpFetcher::new()?);
    let mut coordinator = DownloadCoordinator::new(fetcher.clone());
    if let Some(token) = token {
        let hook = BearerTokenHook::new(auth_hosts, Arc::new(StaticToken(token)), fetcher);
        coordinator = coordinator.with_hook(Arc::new(hook));
    }

    let book = open_book(config, manifest, coordinator)?;
    let mut events = book.subscribe();
    book.fetch_all()?;

    while !all_settled(&book) {
        match events.recv().await {
            Ok(BookEvent::ChapterStatusChanged { index, status }) => match &status {
                DownloadStatus::Downloading { percent } => {
                    println!("chapter {:>4}: {:>3}%", index, percent)
                }
                DownloadStatus::Failed { reason } | DownloadStatus::Expired { reason } => {
                    println!("chapter {:>4}: did not download ({})", index, reason)
                }
                other => println!("chapter {:>4}: {:?}", index, other),
            },
            Ok(BookEvent::ManifestUpdated) => {}
            Err(RecvError::Lagged(missed)) => warn!(missed, "status output lagged"),
            Err(RecvError::Closed) => break,
        }
    }

    let failures = book
        .chapters()
        .iter()
        .filter(|c| {
            matches!(
                c.download_status(),
                DownloadStatus::Failed { .. } | DownloadStatus::Expired { .. }
            )
        })
        .count();
    info!(book = book.id(), failures, "download finished");
    book.close();

    if failures > 0 {
        return Err(anyhow!("{} chapter(s) did not download", failures));
    }
    Ok(())
}

/// Every chapter either downloaded or stopped trying
fn all_settled(book: &Book) -> bool {
    book.tasks().iter().all(|task| !task.is_downloading())
}

async fn position(
    config: &EngineConfig,
    manifest: Manifest,
    chapter: usize,
    offset: u64,
    save: bool,
) -> anyhow::Result<()> {
    let book = open_book(config, manifest, DownloadCoordinator::hooks_only())?;
    let position = book
        .position_of(chapter, offset)
        .ok_or_else(|| anyhow!("book has no chapter {}", chapter))?;
    println!("{}", position.to_json()?);

    if save {
        let path = config
            .database_path
            .as_ref()
            .ok_or_else(|| anyhow!("no database_path configured"))?;
        let store = PositionStore::new(Database::new(path).await?);
        store.save(book.id(), &position).await?;
        info!(book = book.id(), db = %path.display(), "position saved");
    }

    book.close();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Download {
            manifest,
            token,
            auth_hosts,
        } => download(&config, load_manifest(&manifest)?, token, auth_hosts).await,
        Commands::Delete { manifest } => {
            let book = open_book(&config, load_manifest(&manifest)?, DownloadCoordinator::hooks_only())?;
            book.delete_all()?;
            println!("deleted {} chapter(s) of {}", book.chapter_count(), book.title());
            book.close();
            Ok(())
        }
        Commands::Position {
            manifest,
            chapter,
            offset,
            save,
        } => position(&config, load_manifest(&manifest)?, chapter, offset, save).await,
    }
}
