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


//! Fetch capability and the default HTTP implementation
//!
//! # Contract
//! A [`Fetcher`] writes the resource behind a [`FetchRequest`] to
//! `request.destination` and returns the number of bytes written.
//!
//! - `Err(DownloadCancelled)` when the cancel token fired
//! - `Err(DownloadExpired)` when the link is no longer valid
//! - any other error is a plain failure
//!
//! The destination is an attempt-specific partial file; the caller decides
//! whether it gets promoted or removed.

use crate::download::progress::{FetchProgress, ProgressCallback, ProgressTracker};
use crate::error::{AudiobookError, Result};
use crate::manifest::SourceLink;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Write buffer size
const DOWNLOAD_BUFF_SZ: usize = 64 * 1024;

/// Request timeout for a whole chapter
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// One chapter fetch
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Index of the chapter being fetched
    pub chapter_index: usize,

    /// Where to fetch from
    pub link: SourceLink,

    /// Where to write to
    pub destination: PathBuf,

    /// Extra request headers, usually added by hooks
    pub headers: HashMap<String, String>,
}

impl FetchRequest {
    pub fn new(chapter_index: usize, link: SourceLink, destination: PathBuf) -> Self {
        Self {
            chapter_index,
            link,
            destination,
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn host(&self) -> Option<&str> {
        self.link.href.host_str()
    }
}

/// Asynchronous, cancellable fetch capability
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        request: FetchRequest,
        progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> Result<u64>;
}

/// Whether a status code means the link itself has expired
///
/// Time-limited links answer with an auth failure or `Gone` once past
/// their deadline.
pub fn is_expiry_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::GONE
    )
}

/// Default fetcher streaming over HTTP(S) with reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client })
    }

    /// Use a preconfigured client (proxies, custom TLS roots, ...)
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn send(&self, request: &FetchRequest) -> Result<reqwest::Response> {
        let mut builder = self.client.get(request.link.href.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            AudiobookError::network_error(e.to_string(), e.is_timeout() || e.is_connect())
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if is_expiry_status(status) {
            return Err(AudiobookError::DownloadExpired(format!(
                "{} answered {}",
                request.link.href, status
            )));
        }
        Err(AudiobookError::UnexpectedStatusCode {
            status_code: status.as_u16(),
            url: request.link.href.to_string(),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        request: FetchRequest,
        progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> Result<u64> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AudiobookError::DownloadCancelled),
            response = self.send(&request) => response?,
        };

        let total_bytes = response.content_length();
        debug!(
            chapter = request.chapter_index,
            url = %request.link.href,
            total_bytes = ?total_bytes,
            "streaming chapter"
        );

        let file = File::create(&request.destination).await?;
        let mut writer = BufWriter::with_capacity(DOWNLOAD_BUFF_SZ, file);
        let mut tracker = ProgressTracker::new(total_bytes);
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AudiobookError::DownloadCancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk.map_err(|e| {
                AudiobookError::DownloadFailed(format!(
                    "Stream broke after {}/{} bytes: {}",
                    written,
                    total_bytes.map_or_else(|| "?".to_string(), |t| t.to_string()),
                    e
                ))
            })?;

            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;

            if tracker.update(written) {
                progress(tracker.snapshot());
            }
        }

        writer.flush().await?;

        if let Some(total) = total_bytes {
            if written < total {
                warn!(chapter = request.chapter_index, written, total, "short read");
                return Err(AudiobookError::DownloadFailed(format!(
                    "Download incomplete: {}/{} bytes",
                    written, total
                )));
            }
        }

        progress(FetchProgress::new(written, total_bytes.or(Some(written))));
        Ok(written)
    }
}
