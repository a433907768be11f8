//! Resilient messaging utilities with automatic retry for Telegram API operations.
//!
//! These wrappers retry transient network failures using exponential backoff
//! with jitter.
//!
//! # Usage
//!
//! ```ignore
//! use vidgrab_transport_telegram::bot::resilient::{send_message_resilient, edit_message_safe_resilient};
//!
//! let msg = send_message_resilient(&bot, chat_id, "⏳ Processing...", Some(ParseMode::Html)).await?;
//! let success = edit_message_safe_resilient(&bot, chat_id, msg.id, "Updated!").await;
//! ```

use crate::config::{
    TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
};
use anyhow::Result;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InlineKeyboardMarkup, InputFile, Message, MessageId, ParseMode};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{debug, warn};
use vidgrab_core::download::{MediaKind, MediaResult};

/// Telegram rejects texts longer than 4096 characters
const MAX_TEXT_CHARS: usize = 4000;

/// Retry a Telegram API operation with exponential backoff and jitter.
///
/// Delays start at 500ms and are capped at 4s; at most three retries follow
/// the first attempt.
///
/// # Errors
///
/// Returns the last error once all attempts fail.
pub async fn retry_telegram_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Telegram API operation failed after {} retries: {}",
            TELEGRAM_API_MAX_RETRIES, e
        );
        e
    })
}

/// Send a message with automatic retry on network failures.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn send_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
    parse_mode: Option<ParseMode>,
    keyboard: Option<InlineKeyboardMarkup>,
) -> Result<Message> {
    let text = text.into();
    retry_telegram_operation(|| async {
        let mut req = bot.send_message(chat_id, text.clone());
        if let Some(pm) = parse_mode {
            req = req.parse_mode(pm);
        }
        if let Some(markup) = keyboard.clone() {
            req = req.reply_markup(markup);
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await
}

/// Edit a message with automatic retry on network failures.
///
/// Returns `Ok(None)` when Telegram reports the message as not modified.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn edit_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: impl Into<String>,
    keyboard: Option<InlineKeyboardMarkup>,
) -> Result<Option<Message>> {
    let text = text.into();
    retry_telegram_operation(|| async {
        let mut req = bot
            .edit_message_text(chat_id, msg_id, text.clone())
            .parse_mode(ParseMode::Html);
        if let Some(markup) = keyboard.clone() {
            req = req.reply_markup(markup);
        }
        match req.await {
            Ok(msg) => Ok(Some(msg)),
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("message is not modified") {
                    return Ok(None);
                }
                Err(anyhow::anyhow!("Telegram edit error: {e}"))
            }
        }
    })
    .await
}

/// Edit an HTML message with graceful degradation and automatic retry.
///
/// Long texts are truncated. Returns `false` when the edit failed after
/// retries or the message no longer exists.
pub async fn edit_message_safe_resilient(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: &str,
) -> bool {
    const ERROR_NOT_FOUND: &str = "message to edit not found";

    let truncated = truncate_for_telegram(text);
    match edit_message_resilient(bot, chat_id, msg_id, truncated, None).await {
        Ok(Some(_)) => true,
        Ok(None) => {
            debug!("Message update skipped: message is not modified");
            true
        }
        Err(e) => {
            let err_msg = e.to_string();
            if err_msg.contains(ERROR_NOT_FOUND) {
                debug!("Message update skipped: {err_msg}");
            } else {
                warn!("Failed to edit message after retries: {e}");
            }
            false
        }
    }
}

/// Upload a downloaded artifact as a video or photo with an HTML caption.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn send_media_resilient(
    bot: &Bot,
    chat_id: ChatId,
    media: &MediaResult,
    caption: &str,
    keyboard: InlineKeyboardMarkup,
) -> Result<Message> {
    retry_telegram_operation(|| async {
        let file = InputFile::file(media.path.clone());
        let sent = match media.kind {
            MediaKind::Video => {
                bot.send_video(chat_id, file)
                    .caption(caption)
                    .parse_mode(ParseMode::Html)
                    .supports_streaming(true)
                    .reply_markup(keyboard.clone())
                    .await
            }
            MediaKind::Photo => {
                bot.send_photo(chat_id, file)
                    .caption(caption)
                    .parse_mode(ParseMode::Html)
                    .reply_markup(keyboard.clone())
                    .await
            }
        };
        sent.map_err(|e| anyhow::anyhow!("Telegram upload error: {e}"))
    })
    .await
}

/// Delete a message, logging failures.
pub async fn delete_message_safe(bot: &Bot, chat_id: ChatId, msg_id: MessageId) {
    if let Err(e) = bot.delete_message(chat_id, msg_id).await {
        debug!("Failed to delete message {}: {e}", msg_id.0);
    }
}

fn truncate_for_telegram(text: &str) -> String {
    if text.chars().count() > MAX_TEXT_CHARS {
        let truncated: String = text.chars().take(MAX_TEXT_CHARS).collect();
        format!("{truncated}...\n\n<i>(message truncated)</i>")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient_failure() {
        let attempts = AtomicUsize::new(0);
        let result = retry_telegram_operation(|| async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(anyhow::anyhow!("connection reset"))
            } else {
                Ok("sent")
            }
        })
        .await;

        assert_eq!(result.ok(), Some("sent"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up() {
        let attempts = AtomicUsize::new(0);
        let result: Result<()> = retry_telegram_operation(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("network down"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), TELEGRAM_API_MAX_RETRIES + 1);
    }

    #[test]
    fn test_truncate_for_telegram() {
        assert_eq!(truncate_for_telegram("short"), "short");
        let long = "я".repeat(5000);
        let truncated = truncate_for_telegram(&long);
        assert!(truncated.ends_with("<i>(message truncated)</i>"));
        assert!(truncated.chars().count() < 4100);
    }
}
