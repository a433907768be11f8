//! Download UI components
//!
//! Contains keyboards, text messages, and formatters for the download flow.

use chrono::{DateTime, Utc};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use vidgrab_core::config::MAX_FILE_SIZE_BYTES;
use vidgrab_core::download::DownloadError;
use vidgrab_core::ledger::UsageRecord;

// ─────────────────────────────────────────────────────────────────────────────
// Callback constants
// ─────────────────────────────────────────────────────────────────────────────

/// Callback data of the "My stats" button
pub const STATS_CALLBACK: &str = "show_stats";

/// Raw backend diagnostics are cut to this many characters
const MAX_DIAGNOSTICS_CHARS: usize = 600;

/// Telegram rejects media captions longer than this
const MAX_CAPTION_CHARS: usize = 1024;

const CAPTION_PREFIX: &str = "✅ Downloaded: ";

// ─────────────────────────────────────────────────────────────────────────────
// Trait definition
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for download view rendering
///
/// All texts are Telegram HTML.
pub trait DownloadView {
    /// Reply to `/start`
    fn welcome_message() -> String;

    /// Reply to a message that is not a media link
    fn invalid_url() -> &'static str;

    /// Status while the engine works
    fn processing() -> &'static str;

    /// Status while the artifact is uploaded
    fn sending() -> &'static str;

    /// Caption of the delivered media
    fn caption(title: &str) -> String;

    /// Status after a failed upload
    fn transmission_failed(error: &str) -> String;

    /// Status after a failed download
    fn download_failed(error: &DownloadError) -> String;

    /// Reply when the user has no recorded deliveries
    fn no_stats() -> &'static str;

    /// Reply when the ledger could not be read
    fn stats_unavailable() -> &'static str;

    /// Statistics card
    fn stats(record: &UsageRecord) -> String;
}

// ─────────────────────────────────────────────────────────────────────────────
// Default implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Default English implementation of `DownloadView`
pub struct DefaultDownloadView;

impl DownloadView for DefaultDownloadView {
    fn welcome_message() -> String {
        format!(
            "🎥 <b>Hi! I download videos for you.</b>\n\n\
             Supported: YouTube, TikTok, Instagram, Twitter/X, Facebook and more.\n\
             Send a link and I will fetch up to {} MB.\n\n\
             If YouTube asks to confirm you are not a bot, add cookies.txt and/or YTDLP_PO_TOKENS.",
            MAX_FILE_SIZE_BYTES / (1024 * 1024)
        )
    }

    fn invalid_url() -> &'static str {
        "❌ Send a valid video link.\n\
         Examples:\n\
         • https://www.youtube.com/watch?v=...\n\
         • https://www.tiktok.com/@user/video/...\n\
         • https://www.instagram.com/p/...\n\
         • https://twitter.com/user/status/..."
    }

    fn processing() -> &'static str {
        "⏳ Processing the link, downloading..."
    }

    fn sending() -> &'static str {
        "📤 Sending..."
    }

    fn caption(title: &str) -> String {
        let budget = MAX_CAPTION_CHARS - CAPTION_PREFIX.chars().count();
        format!("{CAPTION_PREFIX}{}", escape_within(title, budget))
    }

    fn transmission_failed(error: &str) -> String {
        format!(
            "❌ Could not send the file: {}. Try another link.",
            html_escape::encode_text(error)
        )
    }

    fn download_failed(error: &DownloadError) -> String {
        render_download_error(error)
    }

    fn no_stats() -> &'static str {
        "📊 You have no statistics yet. Download your first video!"
    }

    fn stats_unavailable() -> &'static str {
        "⚠️ Statistics are temporarily unavailable."
    }

    fn stats(record: &UsageRecord) -> String {
        format_stats(record)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper functions
// ─────────────────────────────────────────────────────────────────────────────

/// Human readable size with 1024-based units and one decimal
///
/// # Examples
///
/// ```
/// use vidgrab_transport_telegram::bot::views::format_file_size;
/// assert_eq!(format_file_size(0), "0 B");
/// assert_eq!(format_file_size(1536), "1.5 KB");
/// ```
#[must_use]
pub fn format_file_size(size_bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if size_bytes == 0 {
        return "0 B".to_string();
    }
    #[allow(clippy::cast_precision_loss)]
    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", UNITS[unit])
}

/// HTML-escape `text`, cutting it on a char boundary so the escaped result
/// stays within `max_chars`; a cut is marked with an ellipsis.
fn escape_within(text: &str, max_chars: usize) -> String {
    let escaped = html_escape::encode_text(text);
    if escaped.chars().count() <= max_chars {
        return escaped.into_owned();
    }

    let mut out = String::new();
    let mut used = 0;
    let mut buf = [0u8; 4];
    for ch in text.chars() {
        let piece = html_escape::encode_text(ch.encode_utf8(&mut buf));
        let len = piece.chars().count();
        if used + len >= max_chars {
            break;
        }
        out.push_str(&piece);
        used += len;
    }
    out.push('…');
    out
}

fn format_date(at: DateTime<Utc>) -> String {
    at.format("%d.%m.%Y").to_string()
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%d.%m.%Y %H:%M").to_string()
}

/// Render a usage record as an HTML statistics card
#[must_use]
pub fn format_stats(record: &UsageRecord) -> String {
    let favourite = record.favourite_platform().map_or_else(
        || "No data (0)".to_string(),
        |(name, count)| format!("{} ({count})", html_escape::encode_text(name)),
    );

    let mut text = format!(
        "📊 <b>Your statistics:</b>\n\n\
         📥 Downloads: <b>{}</b>\n\
         💾 Total size: <b>{}</b>\n\
         🏆 Favourite platform: <b>{favourite}</b>\n\
         📅 First use: <b>{}</b>\n\
         🕐 Last activity: <b>{}</b>\n\n\
         🎯 <b>By platform:</b>\n",
        record.downloads_count,
        format_file_size(record.total_size),
        format_date(record.first_use),
        format_timestamp(record.last_activity),
    );
    for (platform, count) in &record.platforms {
        text.push_str(&format!(
            "• {}: {count}\n",
            html_escape::encode_text(platform)
        ));
    }
    text
}

/// Render a classified failure: message, optional hint, optional details
#[must_use]
pub fn render_download_error(error: &DownloadError) -> String {
    let mut text = format!("❌ {}", html_escape::encode_text(&error.user_message()));
    if let Some(hint) = error.hint() {
        text.push_str(&format!("\n\n💡 {}", html_escape::encode_text(hint)));
    }
    if let Some(details) = error.diagnostics().filter(|d| !d.trim().is_empty()) {
        let details: String = details.chars().take(MAX_DIAGNOSTICS_CHARS).collect();
        text.push_str(&format!(
            "\n\n🔍 Details: <code>{}</code>",
            html_escape::encode_text(&details)
        ));
    }
    text
}

// ─────────────────────────────────────────────────────────────────────────────
// Keyboards
// ─────────────────────────────────────────────────────────────────────────────

/// Get the inline keyboard with the "My stats" button
#[must_use]
pub fn stats_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "📊 My stats",
        STATS_CALLBACK,
    )]])
}
