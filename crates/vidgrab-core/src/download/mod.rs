//! Download engine
//!
//! Orchestrates one download: worker slot, scratch directory, credential
//! resolution, metadata probe with a size fail-fast, transfer, artifact
//! location and container reconciliation, and the final size check.

pub mod backend;
pub mod error;
pub mod scratch;
pub mod ytdlp;

pub use backend::{BackendError, ExtractionBackend, MediaInfo, TransferOptions};
pub use error::DownloadError;
pub use scratch::ScratchDir;
pub use ytdlp::YtDlpBackend;

use crate::config::{DownloaderSettings, MAX_FILE_SIZE_BYTES};
use crate::credentials::CredentialResolver;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Container every video is delivered in
const TARGET_VIDEO_EXTENSION: &str = "mp4";

/// Video containers probed when the expected artifact is missing
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "avi", "mov"];

/// Photo formats probed after the video containers
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// One download attempt for one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Unique id; names the scratch directory
    pub id: Uuid,
    /// Media URL
    pub url: String,
    /// Maximum artifact size in bytes
    pub size_ceiling_bytes: u64,
}

impl DownloadRequest {
    /// Request with a fresh id and the default 50 MiB ceiling
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            size_ceiling_bytes: MAX_FILE_SIZE_BYTES,
        }
    }

    /// Override the size ceiling
    #[must_use]
    pub const fn with_ceiling(mut self, size_ceiling_bytes: u64) -> Self {
        self.size_ceiling_bytes = size_ceiling_bytes;
        self
    }
}

/// Kind of media delivered to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Video clip
    Video,
    /// Still image
    Photo,
}

impl MediaKind {
    /// Guess the kind from the artifact extension, then the URL shape
    #[must_use]
    pub fn detect(url: &str, path: &Path) -> Self {
        let ext = extension_of(path);
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Self::Photo
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Self::Video
        } else if url.contains("/photo/") {
            Self::Photo
        } else {
            Self::Video
        }
    }
}

/// A downloaded artifact ready for delivery.
///
/// Owns the request scratch directory: dropping the result deletes the file.
#[derive(Debug)]
pub struct MediaResult {
    /// Path of the artifact
    pub path: PathBuf,
    /// Media title
    pub title: String,
    /// Video or photo
    pub kind: MediaKind,
    /// Size on disk
    pub size_bytes: u64,
    scratch: ScratchDir,
}

impl MediaResult {
    /// Scratch directory holding the artifact
    #[must_use]
    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }
}

/// Runs downloads through an [`ExtractionBackend`] on a bounded worker pool
pub struct DownloadEngine {
    backend: Arc<dyn ExtractionBackend>,
    resolver: CredentialResolver,
    scratch_root: PathBuf,
    workers: Arc<Semaphore>,
}

impl DownloadEngine {
    /// Create an engine allowing `max_concurrent` downloads at once
    #[must_use]
    pub fn new(
        backend: Arc<dyn ExtractionBackend>,
        resolver: CredentialResolver,
        scratch_root: PathBuf,
        max_concurrent: usize,
    ) -> Self {
        Self {
            backend,
            resolver,
            scratch_root,
            workers: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Engine backed by the yt-dlp executable
    #[must_use]
    pub fn from_settings(settings: &DownloaderSettings) -> Self {
        Self::new(
            Arc::new(YtDlpBackend::new(settings)),
            CredentialResolver::new(settings),
            settings.scratch_root(),
            settings.max_concurrent_downloads,
        )
    }

    /// Download the media behind `request.url`.
    ///
    /// When `deadline` elapses the attempt is abandoned, the child process is
    /// killed and the scratch directory removed.
    ///
    /// # Errors
    ///
    /// Returns the classified [`DownloadError`] of the attempt.
    pub async fn download(
        &self,
        request: &DownloadRequest,
        deadline: Option<Duration>,
    ) -> Result<MediaResult, DownloadError> {
        match deadline {
            Some(limit) => tokio::time::timeout(limit, self.run(request))
                .await
                .map_err(|_| {
                    warn!(request_id = %request.id, "Download deadline elapsed");
                    DownloadError::TimedOut(limit)
                })?,
            None => self.run(request).await,
        }
    }

    async fn run(&self, request: &DownloadRequest) -> Result<MediaResult, DownloadError> {
        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|_| DownloadError::DownloadFailed("worker pool closed".to_string()))?;

        let limit = request.size_ceiling_bytes;
        let scratch = ScratchDir::create(&self.scratch_root, request.id).await?;
        let strategy = self.resolver.resolve(scratch.path());
        debug!(
            request_id = %request.id,
            cookies = strategy.cookie_file.is_some(),
            po_tokens = strategy.po_tokens.len(),
            player_clients = ?strategy.player_clients,
            "Resolved credential strategy"
        );

        let probed = self
            .backend
            .probe(&request.url, &strategy)
            .await
            .map_err(|e| DownloadError::classify(e, limit))?;

        if let Some(size) = probed.declared_size().filter(|size| *size > limit) {
            info!(request_id = %request.id, size, limit, "Declared size over ceiling");
            return Err(DownloadError::SizeExceeded {
                size: Some(size),
                limit,
            });
        }

        let options = TransferOptions::new(scratch.path().to_path_buf(), limit);
        let transferred = self
            .backend
            .transfer(&request.url, &strategy, &options)
            .await
            .map_err(|e| DownloadError::classify(e, limit))?;

        let ext = transferred.ext.clone().or(probed.ext.clone());
        let selected_size = transferred.declared_size();
        let title = transferred
            .title
            .or(probed.title)
            .unwrap_or_else(|| "video".to_string());

        let Some(located) = locate_artifact(scratch.path(), &options.file_stem, ext.as_deref())
        else {
            // A skipped --max-filesize transfer exits cleanly and writes nothing
            if let Some(size) = selected_size.filter(|size| *size > limit) {
                info!(request_id = %request.id, size, limit, "Transfer skipped by size guard");
                return Err(DownloadError::SizeExceeded {
                    size: Some(size),
                    limit,
                });
            }
            return Err(DownloadError::ArtifactMissing);
        };
        let kind = MediaKind::detect(&request.url, &located);
        let path = match kind {
            MediaKind::Video => ensure_extension(located, TARGET_VIDEO_EXTENSION).await,
            MediaKind::Photo => located,
        };

        let size_bytes = tokio::fs::metadata(&path).await?.len();
        if size_bytes > limit {
            info!(request_id = %request.id, size_bytes, limit, "Artifact over ceiling, discarding");
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove oversized artifact");
            }
            return Err(DownloadError::SizeExceeded {
                size: Some(size_bytes),
                limit,
            });
        }

        info!(
            request_id = %request.id,
            path = %path.display(),
            size_bytes,
            kind = ?kind,
            "Download complete"
        );
        Ok(MediaResult {
            path,
            title,
            kind,
            size_bytes,
            scratch,
        })
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Find the artifact: the name derived from metadata first, then the fixed
/// alternate extensions.
fn locate_artifact(dir: &Path, stem: &str, ext: Option<&str>) -> Option<PathBuf> {
    ext.into_iter()
        .chain(VIDEO_EXTENSIONS.iter().copied())
        .chain(IMAGE_EXTENSIONS.iter().copied())
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|candidate| candidate.is_file())
}

/// Relabel the container by renaming; keeps the original name on failure.
async fn ensure_extension(path: PathBuf, ext: &str) -> PathBuf {
    if extension_of(&path) == ext {
        return path;
    }
    let renamed = path.with_extension(ext);
    match tokio::fs::rename(&path, &renamed).await {
        Ok(()) => renamed,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to relabel container, keeping name");
            path
        }
    }
}
