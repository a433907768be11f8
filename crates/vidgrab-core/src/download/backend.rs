//! Extraction backend seam
//!
//! The engine talks to the extraction library only through
//! [`ExtractionBackend`], which reports failures as structured
//! [`BackendError`] kinds.

use crate::credentials::CredentialStrategy;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by an extraction backend
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend refused the transfer because of its size guard
    #[error("size guard tripped: {0}")]
    SizeGuard(String),
    /// URL, platform or format not recognized
    #[error("unsupported URL: {0}")]
    Unsupported(String),
    /// A site extractor failed
    #[error("[{extractor}] {message}")]
    Extractor {
        /// Extractor name, e.g. `youtube`
        extractor: String,
        /// Message reported by the extractor
        message: String,
    },
    /// Any other backend failure
    #[error("{0}")]
    Generic(String),
    /// The backend could not write to its target (read-only filesystem)
    #[error("read-only storage: {0}")]
    ReadOnlyStorage(String),
    /// The backend executable could not be started
    #[error("failed to launch extraction backend: {0}")]
    Spawn(std::io::Error),
    /// Local I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Metadata could not be parsed
    #[error("JSON error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Metadata reported by the backend for one media item
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MediaInfo {
    /// Platform-specific media id
    #[serde(default)]
    pub id: Option<String>,
    /// Human-readable title
    #[serde(default)]
    pub title: Option<String>,
    /// Container extension the backend chose
    #[serde(default)]
    pub ext: Option<String>,
    /// Exact size in bytes, when known
    #[serde(default)]
    pub filesize: Option<f64>,
    /// Estimated size in bytes
    #[serde(default)]
    pub filesize_approx: Option<f64>,
    /// Playlist entries; only the first one is used
    #[serde(default)]
    pub entries: Vec<MediaInfo>,
}

impl MediaInfo {
    /// Collapse a playlist result into its first entry
    #[must_use]
    pub fn into_first_entry(mut self) -> Self {
        if self.entries.is_empty() {
            self
        } else {
            self.entries.swap_remove(0)
        }
    }

    /// Size declared by the platform, exact if available, else approximate
    #[must_use]
    pub fn declared_size(&self) -> Option<u64> {
        self.filesize
            .or(self.filesize_approx)
            .filter(|size| size.is_finite() && *size > 0.0)
            .map(|size| size.round() as u64)
    }
}

/// Parameters of one transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOptions {
    /// Directory the artifact must be written to
    pub output_dir: PathBuf,
    /// File stem of the artifact; the backend appends the extension
    pub file_stem: String,
    /// Ordered format preference
    pub format_selector: String,
    /// Abort transfers larger than this
    pub max_filesize: u64,
}

impl TransferOptions {
    /// Default transfer options for a request ceiling.
    ///
    /// Prefers variants up to 720p under the ceiling, then anything under the
    /// ceiling, then the best variant regardless of size.
    #[must_use]
    pub fn new(output_dir: PathBuf, ceiling_bytes: u64) -> Self {
        let ceiling_mib = ceiling_bytes.div_ceil(1024 * 1024).max(1);
        let max_height = crate::config::PREFERRED_MAX_HEIGHT;
        Self {
            output_dir,
            file_stem: "media".to_string(),
            format_selector: format!(
                "best[height<={max_height}][filesize<{ceiling_mib}M]/best[filesize<{ceiling_mib}M]/best"
            ),
            max_filesize: ceiling_bytes,
        }
    }
}

/// Interface for media extraction backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Query metadata without transferring media bytes
    async fn probe(
        &self,
        url: &str,
        strategy: &CredentialStrategy,
    ) -> Result<MediaInfo, BackendError>;

    /// Transfer the media into `options.output_dir`
    async fn transfer(
        &self,
        url: &str,
        strategy: &CredentialStrategy,
        options: &TransferOptions,
    ) -> Result<MediaInfo, BackendError>;
}
