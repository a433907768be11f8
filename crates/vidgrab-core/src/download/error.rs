//! Download failure taxonomy
//!
//! Every failure of the engine is reported as one [`DownloadError`] variant.
//! Backend messages are matched against the marker tables below only while
//! mapping a [`BackendError`] into a variant.

use super::backend::BackendError;
use std::time::Duration;
use thiserror::Error;

/// Stale or rotated cookies
const COOKIES_EXPIRED_MARKERS: &[&str] = &[
    "cookies are no longer valid",
    "cookies have likely been rotated",
];

/// Sign-in or bot-check challenges
const AUTH_MARKERS: &[&str] = &[
    "confirm you're not a bot",
    "confirm you’re not a bot",
    "use --cookies-from-browser or --cookies for the authentication",
    "login required",
    "requires login",
    "rate-limit reached or login required",
];

const FORMAT_MARKERS: &[&str] = &["requested format is not available"];

const AGE_MARKERS: &[&str] = &[
    "sign in to confirm your age",
    "age-restricted",
    "age restricted",
];

const PRIVATE_MARKERS: &[&str] = &["private video", "video is private", "account is private"];

const UNAVAILABLE_MARKERS: &[&str] = &[
    "video unavailable",
    "this video is not available",
    "video has been removed",
    "no longer available",
    "content isn't available",
    "post may have been removed",
];

fn matches_any(message: &str, markers: &[&str]) -> bool {
    let lower = message.to_lowercase();
    markers.iter().any(|marker| lower.contains(marker))
}

/// Classified download failure
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Media is over the size ceiling (declared before, or measured after, transfer)
    #[error("media exceeds the {limit}-byte limit")]
    SizeExceeded {
        /// Declared or measured size, when known
        size: Option<u64>,
        /// Ceiling that was applied
        limit: u64,
    },
    /// URL, platform or format not recognized by the extractor
    #[error("unsupported content: {0}")]
    UnsupportedContent(String),
    /// The platform demands sign-in or a PO token
    #[error("authentication required: {0}")]
    AuthRequired(String),
    /// No format satisfies the request
    #[error("requested format unavailable: {0}")]
    FormatUnavailable(String),
    /// Supplied cookies were rejected as stale
    #[error("cookies expired: {0}")]
    CredentialsExpired(String),
    /// Extractor failure without a more specific classification
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),
    /// Content removed or unavailable
    #[error("content unavailable: {0}")]
    ContentUnavailable(String),
    /// Content is private
    #[error("content is private: {0}")]
    ContentPrivate(String),
    /// Content is age restricted
    #[error("age restricted: {0}")]
    AgeRestricted(String),
    /// Any other failure
    #[error("download failed: {0}")]
    DownloadFailed(String),
    /// Local misconfiguration, e.g. a read-only target directory
    #[error("configuration error: {0}")]
    ConfigurationError(String),
    /// The backend reported success but no artifact was found
    #[error("file not found after download")]
    ArtifactMissing,
    /// The request deadline elapsed
    #[error("download timed out after {0:?}")]
    TimedOut(Duration),
}

impl DownloadError {
    /// Map a backend failure into the taxonomy; `limit` is the request ceiling.
    #[must_use]
    pub fn classify(error: BackendError, limit: u64) -> Self {
        match error {
            BackendError::SizeGuard(_) => Self::SizeExceeded { size: None, limit },
            BackendError::Unsupported(message) => Self::UnsupportedContent(message),
            BackendError::Extractor { extractor, message } => {
                Self::classify_extractor(format!("[{extractor}] {message}"))
            }
            BackendError::Generic(message) => Self::classify_generic(message),
            BackendError::ReadOnlyStorage(message) => Self::ConfigurationError(message),
            BackendError::Spawn(e) => {
                Self::DownloadFailed(format!("extraction backend is not runnable: {e}"))
            }
            BackendError::Io(e) => Self::from(e),
            BackendError::Parse(e) => Self::ExtractionFailed(format!("unreadable metadata: {e}")),
        }
    }

    fn classify_extractor(message: String) -> Self {
        if matches_any(&message, COOKIES_EXPIRED_MARKERS) {
            return Self::CredentialsExpired(message);
        }
        // Private and age-gated messages carry the generic cookies hint too
        let message = match Self::classify_content(message) {
            Ok(classified) => return classified,
            Err(message) => message,
        };
        if matches_any(&message, AUTH_MARKERS) {
            Self::AuthRequired(message)
        } else if matches_any(&message, FORMAT_MARKERS) {
            Self::FormatUnavailable(message)
        } else {
            Self::ExtractionFailed(message)
        }
    }

    fn classify_generic(message: String) -> Self {
        match Self::classify_content(message) {
            Ok(classified) => classified,
            Err(message) => Self::DownloadFailed(message),
        }
    }

    fn classify_content(message: String) -> Result<Self, String> {
        if matches_any(&message, AGE_MARKERS) {
            Ok(Self::AgeRestricted(message))
        } else if matches_any(&message, PRIVATE_MARKERS) {
            Ok(Self::ContentPrivate(message))
        } else if matches_any(&message, UNAVAILABLE_MARKERS) {
            Ok(Self::ContentUnavailable(message))
        } else {
            Err(message)
        }
    }

    /// Short sentence shown to the user
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::SizeExceeded { limit, .. } => format!(
                "The media is larger than the {} MB limit.",
                limit / (1024 * 1024)
            ),
            Self::UnsupportedContent(_) => "Unsupported platform or media format.".to_string(),
            Self::AuthRequired(_) => {
                "The platform requires authorization (sign-in or PO token).".to_string()
            }
            Self::FormatUnavailable(_) => {
                "The requested format is not available. Try another video.".to_string()
            }
            Self::CredentialsExpired(_) => "The stored cookies have expired.".to_string(),
            Self::ExtractionFailed(_) => "Failed to extract the media.".to_string(),
            Self::ContentUnavailable(_) => "The content is unavailable or was removed.".to_string(),
            Self::ContentPrivate(_) => "The content is private.".to_string(),
            Self::AgeRestricted(_) => "The content is age restricted.".to_string(),
            Self::DownloadFailed(_) => "Download failed.".to_string(),
            Self::ConfigurationError(_) => {
                "The bot is misconfigured: its storage is not writable.".to_string()
            }
            Self::ArtifactMissing => "File not found after download. Try another link.".to_string(),
            Self::TimedOut(_) => "The download took too long and was stopped.".to_string(),
        }
    }

    /// Actionable follow-up, if any
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::AuthRequired(_) => Some(
                "Refresh cookies.txt (Netscape format) and/or set YTDLP_PO_TOKENS.",
            ),
            Self::CredentialsExpired(_) => {
                Some("Re-export cookies.txt from a signed-in browser and restart the bot.")
            }
            Self::AgeRestricted(_) => Some("Age-restricted media needs a signed-in cookies.txt."),
            Self::ConfigurationError(_) => Some(
                "Point YTDLP_COOKIES_FILE and SCRATCH_DIR at a writable location.",
            ),
            Self::SizeExceeded { .. } | Self::FormatUnavailable(_) => {
                Some("Try a shorter clip or another link.")
            }
            _ => None,
        }
    }

    /// Raw backend text kept for operators
    #[must_use]
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::UnsupportedContent(raw)
            | Self::AuthRequired(raw)
            | Self::FormatUnavailable(raw)
            | Self::CredentialsExpired(raw)
            | Self::ExtractionFailed(raw)
            | Self::ContentUnavailable(raw)
            | Self::ContentPrivate(raw)
            | Self::AgeRestricted(raw)
            | Self::DownloadFailed(raw)
            | Self::ConfigurationError(raw) => Some(raw.as_str()),
            Self::SizeExceeded { .. } | Self::ArtifactMissing | Self::TimedOut(_) => None,
        }
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        if is_read_only(&e) {
            Self::ConfigurationError(format!("storage is read-only: {e}"))
        } else {
            Self::DownloadFailed(format!("IO error: {e}"))
        }
    }
}

/// EROFS on Linux and macOS
const EROFS: i32 = 30;

fn is_read_only(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::PermissionDenied
        || e.raw_os_error() == Some(EROFS)
        || e.to_string().contains("Read-only file system")
}
