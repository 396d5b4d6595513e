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


//! Download coordinator
//!
//! Routes every chapter fetch to exactly one capability:
//!
//! 1. Registered [`DownloadHook`]s, in registration order; the first one
//!    that claims the request services it
//! 2. Otherwise the default [`Fetcher`]
//!
//! Hooks are injected explicitly with [`DownloadCoordinator::with_hook`].
//! Whatever ran, its result is normalized into a [`FetchOutcome`].

use crate::download::fetch::{FetchRequest, Fetcher};
use crate::download::progress::ProgressCallback;
use crate::error::{AudiobookError, Result};
use crate::file::DeletionStrategy;
use crate::manifest::SourceLink;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Download configuration shared by every task of a book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Root directory for downloaded chapters
    pub download_directory: PathBuf,

    /// How chapter files are removed
    pub deletion_strategy: DeletionStrategy,

    /// Undelivered status events retained per book subscriber
    pub status_capacity: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_directory: std::env::temp_dir().join("audiobook-engine"),
            deletion_strategy: DeletionStrategy::default(),
            status_capacity: 256,
        }
    }
}

impl DownloadConfig {
    pub fn new(download_directory: impl Into<PathBuf>) -> Self {
        Self {
            download_directory: download_directory.into(),
            ..Self::default()
        }
    }
}

/// Normalized result of one fetch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Bytes written to the destination
    Completed(u64),
    Cancelled,
    /// Link is time-limited and has run out
    Expired(String),
    Failed(String),
}

impl From<Result<u64>> for FetchOutcome {
    fn from(result: Result<u64>) -> Self {
        match result {
            Ok(bytes) => FetchOutcome::Completed(bytes),
            Err(AudiobookError::DownloadCancelled) => FetchOutcome::Cancelled,
            Err(AudiobookError::DownloadExpired(reason)) => FetchOutcome::Expired(reason),
            Err(e) => FetchOutcome::Failed(e.to_string()),
        }
    }
}

/// A substitution hook offered every request before the default fetcher
#[async_trait]
pub trait DownloadHook: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Whether this hook wants to service the request
    fn claims(&self, request: &FetchRequest) -> bool;

    async fn fetch(
        &self,
        request: FetchRequest,
        progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> Result<u64>;
}

enum Route {
    Hook(Arc<dyn DownloadHook>),
    Default(Arc<dyn Fetcher>),
}

/// Routes fetch requests to hooks or the default fetcher
#[derive(Clone, Default)]
pub struct DownloadCoordinator {
    hooks: Vec<Arc<dyn DownloadHook>>,
    default: Option<Arc<dyn Fetcher>>,
}

impl std::fmt::Debug for DownloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCoordinator")
            .field("hooks", &self.hooks.iter().map(|h| h.name()).collect::<Vec<_>>())
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

impl DownloadCoordinator {
    /// Coordinator with a default fetcher and no hooks
    pub fn new(default: Arc<dyn Fetcher>) -> Self {
        Self {
            hooks: Vec::new(),
            default: Some(default),
        }
    }

    /// Coordinator that can only service requests some hook claims
    pub fn hooks_only() -> Self {
        Self::default()
    }

    /// Register a hook after the already registered ones
    pub fn with_hook(mut self, hook: Arc<dyn DownloadHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    fn route(&self, request: &FetchRequest) -> Result<Route> {
        if let Some(hook) = self.hooks.iter().find(|h| h.claims(request)) {
            debug!(hook = hook.name(), chapter = request.chapter_index, "hook claimed fetch");
            return Ok(Route::Hook(Arc::clone(hook)));
        }

        match &self.default {
            Some(fetcher) => Ok(Route::Default(Arc::clone(fetcher))),
            None => Err(AudiobookError::InvalidConfiguration(format!(
                "no hook claims {} and no default fetcher is configured",
                request.link.href
            ))),
        }
    }

    /// Pick the capability for `request` and return its pending outcome
    ///
    /// Routing errors are returned immediately; everything that happens
    /// after routing ends up in the [`FetchOutcome`].
    pub fn start(
        &self,
        request: FetchRequest,
        progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> Result<BoxFuture<'static, FetchOutcome>> {
        let route = self.route(&request)?;

        Ok(Box::pin(async move {
            let result = match route {
                Route::Hook(hook) => hook.fetch(request, progress, cancel).await,
                Route::Default(fetcher) => fetcher.fetch(request, progress, cancel).await,
            };
            FetchOutcome::from(result)
        }))
    }
}

/// Source of bearer tokens for authenticated links
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self, link: &SourceLink) -> Result<String>;
}

/// Hook adding `Authorization: Bearer …` before delegating to a fetcher
///
/// Claims links whose host is configured, or whose link properties carry
/// `"authenticate": true`.
pub struct BearerTokenHook {
    hosts: HashSet<String>,
    tokens: Arc<dyn TokenSource>,
    inner: Arc<dyn Fetcher>,
}

impl BearerTokenHook {
    pub fn new<I, S>(hosts: I, tokens: Arc<dyn TokenSource>, inner: Arc<dyn Fetcher>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(|h| h.into().to_ascii_lowercase()).collect(),
            tokens,
            inner,
        }
    }
}

#[async_trait]
impl DownloadHook for BearerTokenHook {
    fn name(&self) -> &str {
        "bearer-token"
    }

    fn claims(&self, request: &FetchRequest) -> bool {
        request.link.requires_authentication()
            || request
                .host()
                .map(|host| self.hosts.contains(&host.to_ascii_lowercase()))
                .unwrap_or(false)
    }

    async fn fetch(
        &self,
        request: FetchRequest,
        progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> Result<u64> {
        let token = self.tokens.token(&request.link).await?;
        let request = request.with_header("Authorization", format!("Bearer {}", token));
        self.inner.fetch(request, progress, cancel).await
    }
}
