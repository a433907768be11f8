//! yt-dlp extraction backend
//!
//! Runs the yt-dlp executable as a child process. Metadata comes back as the
//! single-JSON dump on stdout; failures are read from stderr and sorted into
//! [`BackendError`] kinds.

use super::backend::{BackendError, ExtractionBackend, MediaInfo, TransferOptions};
use crate::config::{
    DownloaderSettings, DOWNLOAD_RETRIES, HTTP_CHUNK_SIZE_BYTES, SOCKET_TIMEOUT_SECS,
    TIKTOK_WEBPAGE_TIMEOUT_SECS,
};
use crate::credentials::CredentialStrategy;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Phrases yt-dlp prints when `--max-filesize` aborts a transfer
const SIZE_GUARD_PATTERNS: &[&str] = &["larger than max-filesize", "File is larger than"];

/// Phrases indicating the process could not write to its target
const READ_ONLY_PATTERNS: &[&str] = &["Read-only file system", "[Errno 30]"];

/// Backend driving the yt-dlp executable
#[derive(Debug, Clone)]
pub struct YtDlpBackend {
    bin: String,
    ffmpeg_location: Option<String>,
}

impl YtDlpBackend {
    /// Create a backend from settings
    #[must_use]
    pub fn new(settings: &DownloaderSettings) -> Self {
        Self {
            bin: settings.ytdlp_bin.clone(),
            ffmpeg_location: settings.ffmpeg_location.clone(),
        }
    }

    /// Arguments shared by probe and transfer
    fn common_args(&self, strategy: &CredentialStrategy) -> Vec<String> {
        let mut args = vec![
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
            "--no-playlist".to_string(),
            "--socket-timeout".to_string(),
            SOCKET_TIMEOUT_SECS.to_string(),
            "--retries".to_string(),
            DOWNLOAD_RETRIES.to_string(),
            "--user-agent".to_string(),
            strategy.user_agent.clone(),
        ];

        if let Some(proxy) = &strategy.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }
        if let Some(cookies) = &strategy.cookie_file {
            args.push("--cookies".to_string());
            args.push(cookies.display().to_string());
        }
        if let Some(ffmpeg) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.clone());
        }

        args.push("--extractor-args".to_string());
        args.push(youtube_extractor_args(strategy));
        args.push("--extractor-args".to_string());
        args.push(format!(
            "tiktok:webpage_download_timeout={TIKTOK_WEBPAGE_TIMEOUT_SECS}"
        ));
        args
    }

    fn probe_args(&self, url: &str, strategy: &CredentialStrategy) -> Vec<String> {
        let mut args = self.common_args(strategy);
        args.extend(["--dump-single-json", "--skip-download", "--"].map(String::from));
        args.push(url.to_string());
        args
    }

    fn transfer_args(
        &self,
        url: &str,
        strategy: &CredentialStrategy,
        options: &TransferOptions,
    ) -> Vec<String> {
        let output = options
            .output_dir
            .join(format!("{}.%(ext)s", options.file_stem));
        let mut args = self.common_args(strategy);
        args.extend([
            "--format".to_string(),
            options.format_selector.clone(),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
            "--max-filesize".to_string(),
            options.max_filesize.to_string(),
            "--http-chunk-size".to_string(),
            HTTP_CHUNK_SIZE_BYTES.to_string(),
            "--output".to_string(),
            output.display().to_string(),
            "--dump-single-json".to_string(),
            "--no-simulate".to_string(),
            "--".to_string(),
            url.to_string(),
        ]);
        args
    }

    /// Run yt-dlp and parse the JSON it prints on stdout
    async fn run(&self, args: Vec<String>) -> Result<MediaInfo, BackendError> {
        debug!(bin = %self.bin, args = ?redact_args(&args), "Executing yt-dlp");

        let output = Command::new(&self.bin)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(BackendError::Spawn)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if SIZE_GUARD_PATTERNS
            .iter()
            .any(|p| stdout.contains(p) || stderr.contains(p))
        {
            return Err(BackendError::SizeGuard(first_error_line(&stderr, &stdout)));
        }

        if !output.status.success() {
            let err = parse_stderr(&stderr);
            warn!(status = ?output.status.code(), error = %err, "yt-dlp failed");
            return Err(err);
        }

        // The JSON document is the last non-empty stdout line
        let json = stdout
            .lines()
            .rev()
            .find(|line| line.trim_start().starts_with('{'))
            .ok_or_else(|| BackendError::Generic("yt-dlp printed no metadata".to_string()))?;
        let info: MediaInfo = serde_json::from_str(json)?;
        Ok(info.into_first_entry())
    }
}

#[async_trait]
impl ExtractionBackend for YtDlpBackend {
    async fn probe(
        &self,
        url: &str,
        strategy: &CredentialStrategy,
    ) -> Result<MediaInfo, BackendError> {
        self.run(self.probe_args(url, strategy)).await
    }

    async fn transfer(
        &self,
        url: &str,
        strategy: &CredentialStrategy,
        options: &TransferOptions,
    ) -> Result<MediaInfo, BackendError> {
        self.run(self.transfer_args(url, strategy, options)).await
    }
}

/// `youtube:` extractor arguments: player clients and PO tokens
fn youtube_extractor_args(strategy: &CredentialStrategy) -> String {
    let mut value = format!("youtube:player_client={}", strategy.player_clients.join(","));
    if !strategy.po_tokens.is_empty() {
        value.push_str(";po_token=");
        value.push_str(&strategy.po_tokens.join(","));
    }
    value
}

/// Mask values that must not reach the logs
fn redact_args(args: &[String]) -> Vec<String> {
    let mut redacted = Vec::with_capacity(args.len());
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            redacted.push("[MASKED]".to_string());
            mask_next = false;
            continue;
        }
        if arg.contains("po_token=") {
            let (head, _) = arg.split_once("po_token=").unwrap_or((arg.as_str(), ""));
            redacted.push(format!("{head}po_token=[MASKED]"));
            continue;
        }
        mask_next = arg == "--proxy";
        redacted.push(arg.clone());
    }
    redacted
}

/// First non-empty line of output, stderr first
fn first_error_line(stderr: &str, stdout: &str) -> String {
    stderr
        .lines()
        .chain(stdout.lines())
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Sort a failed run's stderr into a [`BackendError`] kind.
pub(crate) fn parse_stderr(stderr: &str) -> BackendError {
    if READ_ONLY_PATTERNS.iter().any(|p| stderr.contains(p)) {
        return BackendError::ReadOnlyStorage(stderr.trim().to_string());
    }

    let errors: Vec<&str> = stderr
        .lines()
        .filter_map(|line| line.trim().strip_prefix("ERROR:"))
        .map(str::trim)
        .collect();

    let Some(message) = errors.first().copied() else {
        let raw = stderr.trim();
        return BackendError::Generic(if raw.is_empty() {
            "yt-dlp exited with an error and no output".to_string()
        } else {
            raw.to_string()
        });
    };

    if message.starts_with("Unsupported URL") || message.contains("Unsupported URL:") {
        return BackendError::Unsupported(message.to_string());
    }

    // Extractor failures look like `[youtube] <id>: <reason>`
    if let Some(rest) = message.strip_prefix('[') {
        if let Some((extractor, reason)) = rest.split_once(']') {
            return BackendError::Extractor {
                extractor: extractor.to_string(),
                message: reason.trim().to_string(),
            };
        }
    }

    BackendError::Generic(errors.join("\n"))
}
