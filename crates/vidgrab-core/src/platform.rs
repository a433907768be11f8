//! URL validation and platform detection

use lazy_regex::{lazy_regex, Lazy, Regex};
use std::fmt;

static YOUTUBE_URL: Lazy<Regex> = lazy_regex!(
    r"(?i)^(?:https?://)?(?:www\.|m\.)?(?:youtube\.com/(?:watch\?v=|embed/|v/|shorts/)|youtu\.be/)[\w-]+"
);
static TIKTOK_URL: Lazy<Regex> = lazy_regex!(
    r"(?i)^(?:https?://)?(?:www\.)?(?:tiktok\.com/@[\w.-]+/(?:video|photo)/\d+|vm\.tiktok\.com/[\w-]+|m\.tiktok\.com/v/\d+)"
);
static INSTAGRAM_URL: Lazy<Regex> =
    lazy_regex!(r"(?i)^(?:https?://)?(?:www\.)?instagram\.com/(?:p|reel|reels|tv)/[\w-]+");
static TWITTER_URL: Lazy<Regex> =
    lazy_regex!(r"(?i)^(?:https?://)?(?:www\.|mobile\.)?(?:twitter\.com|x\.com)/\w+/status/\d+");
static FACEBOOK_URL: Lazy<Regex> =
    lazy_regex!(r"(?i)^(?:https?://)?(?:www\.|m\.)?facebook\.com/.*?/videos/\d+");
static GENERIC_URL: Lazy<Regex> =
    lazy_regex!(r"(?i)^(?:https?://)?[\w.-]+\.\w{2,}(?:/\S*)?$");
static URL_HOST: Lazy<Regex> = lazy_regex!(r"(?i)^(?:[a-z][a-z0-9+.-]*://)?([^/?#:@\s]+)");

/// Returns true if the text looks like a link the bot can try to download.
///
/// # Examples
///
/// ```
/// use vidgrab_core::platform::is_supported_url;
///
/// assert!(is_supported_url("https://youtu.be/dQw4w9WgXcQ"));
/// assert!(!is_supported_url("not a link"));
/// ```
#[must_use]
pub fn is_supported_url(text: &str) -> bool {
    let url = text.trim();
    if url.is_empty() || url.contains(char::is_whitespace) {
        return false;
    }
    [
        &YOUTUBE_URL,
        &TIKTOK_URL,
        &INSTAGRAM_URL,
        &TWITTER_URL,
        &FACEBOOK_URL,
        &GENERIC_URL,
    ]
    .iter()
    .any(|re| re.is_match(url))
}

/// Content platform a URL belongs to, used for usage statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// youtube.com, youtu.be
    YouTube,
    /// tiktok.com
    TikTok,
    /// instagram.com
    Instagram,
    /// twitter.com, x.com
    TwitterX,
    /// facebook.com, fb.watch
    Facebook,
    /// Anything else
    Other,
}

impl Platform {
    /// Detect the platform from the URL host
    #[must_use]
    pub fn detect(url: &str) -> Self {
        let Some(host) = URL_HOST
            .captures(url.trim())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_ascii_lowercase())
        else {
            return Self::Other;
        };
        let is = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));

        if is("youtube.com") || is("youtu.be") {
            Self::YouTube
        } else if is("tiktok.com") {
            Self::TikTok
        } else if is("instagram.com") {
            Self::Instagram
        } else if is("twitter.com") || is("x.com") {
            Self::TwitterX
        } else if is("facebook.com") || is("fb.watch") {
            Self::Facebook
        } else {
            Self::Other
        }
    }

    /// Label stored in the usage ledger
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::YouTube => "YouTube",
            Self::TikTok => "TikTok",
            Self::Instagram => "Instagram",
            Self::TwitterX => "Twitter/X",
            Self::Facebook => "Facebook",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
