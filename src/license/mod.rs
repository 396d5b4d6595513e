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


//! License checks run before a book is opened
//!
//! Only the verdict matters here; signature and license document formats
//! live with the check implementations.

use crate::error::{AudiobookError, Result};
use crate::manifest::Manifest;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of one license check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseVerdict {
    Pass,
    Fail { reason: String },
}

/// A pluggable license check
#[async_trait]
pub trait LicenseCheck: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self, manifest: &Manifest) -> LicenseVerdict;
}

/// Run `checks` in order, stopping at the first failure
pub async fn verify_all(manifest: &Manifest, checks: &[Arc<dyn LicenseCheck>]) -> Result<()> {
    for check in checks {
        match check.check(manifest).await {
            LicenseVerdict::Pass => {
                debug!(check = check.name(), book = %manifest.id, "license check passed");
            }
            LicenseVerdict::Fail { reason } => {
                warn!(check = check.name(), book = %manifest.id, %reason, "license check failed");
                return Err(AudiobookError::LicenseCheckFailed {
                    check: check.name().to_string(),
                    reason,
                });
            }
        }
    }
    Ok(())
}

/// Accepts unencrypted books and books using one of the supported schemes
#[derive(Debug, Clone, Default)]
pub struct EncryptionSchemeCheck {
    supported: Vec<String>,
}

impl EncryptionSchemeCheck {
    pub fn new<I, S>(supported: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            supported: supported.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl LicenseCheck for EncryptionSchemeCheck {
    fn name(&self) -> &str {
        "encryption-scheme"
    }

    async fn check(&self, manifest: &Manifest) -> LicenseVerdict {
        match &manifest.encrypted {
            None => LicenseVerdict::Pass,
            Some(encryption) if self.supported.iter().any(|s| s == &encryption.scheme) => {
                LicenseVerdict::Pass
            }
            Some(encryption) => LicenseVerdict::Fail {
                reason: format!("unsupported encryption scheme {}", encryption.scheme),
            },
        }
    }
}
