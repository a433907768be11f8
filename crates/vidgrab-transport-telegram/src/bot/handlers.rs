//! Telegram update handlers: commands, the stats button and media links

use crate::bot::resilient::{
    delete_message_safe, edit_message_safe_resilient, send_media_resilient,
    send_message_resilient,
};
use crate::bot::views::{stats_keyboard, DefaultDownloadView, DownloadView};
use anyhow::Result;
use std::sync::Arc;
use teloxide::{prelude::*, types::ParseMode, utils::command::BotCommands};
use tracing::{debug, error, info, warn};
use vidgrab_core::context::AppContext;
use vidgrab_core::download::DownloadRequest;
use vidgrab_core::ledger::UsageLedger;
use vidgrab_core::platform::{is_supported_url, Platform};

type View = DefaultDownloadView;

// Helper function to get user name from Message
fn get_user_name(msg: &Message) -> String {
    if let Some(ref user) = msg.from {
        if let Some(ref username) = user.username {
            return username.clone();
        }
        if !user.first_name.is_empty() {
            return user.first_name.clone();
        }
    }
    "Unknown".to_string()
}

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Supported commands for the bot
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Show the welcome message
    #[command(description = "Start the bot.")]
    Start,
    /// Show the user's download statistics
    #[command(description = "Show your download statistics.")]
    Stats,
}

/// Start handler
///
/// # Errors
///
/// Returns an error if the welcome message cannot be sent.
pub async fn start(bot: Bot, msg: Message) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    let user_name = get_user_name(&msg);
    info!("User {user_id} ({user_name}) initiated /start command.");

    send_message_resilient(
        &bot,
        msg.chat.id,
        View::welcome_message(),
        Some(ParseMode::Html),
        Some(stats_keyboard()),
    )
    .await?;
    Ok(())
}

/// Render the statistics reply for `user_id`; ledger errors are logged.
pub async fn stats_text(ledger: &dyn UsageLedger, user_id: i64) -> String {
    match ledger.query(user_id).await {
        Ok(Some(record)) => View::stats(&record),
        Ok(None) => View::no_stats().to_string(),
        Err(e) => {
            error!(user_id, error = %e, "Failed to read usage ledger");
            View::stats_unavailable().to_string()
        }
    }
}

/// `/stats` handler
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn stats(bot: Bot, msg: Message, ctx: Arc<AppContext>) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    let text = stats_text(ctx.ledger.as_ref(), user_id).await;
    send_message_resilient(&bot, msg.chat.id, text, Some(ParseMode::Html), None).await?;
    Ok(())
}

/// "My stats" button handler.
///
/// Edits the message carrying the button; media messages have no text to
/// edit, so the card is sent as a new message instead.
///
/// # Errors
///
/// Returns an error if the fallback message cannot be sent.
pub async fn handle_stats_callback(bot: Bot, q: CallbackQuery, ctx: Arc<AppContext>) -> Result<()> {
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        debug!("Failed to answer callback query: {e}");
    }

    let user_id = q.from.id.0.cast_signed();
    let text = stats_text(ctx.ledger.as_ref(), user_id).await;
    let Some(message) = q.message.as_ref() else {
        return Ok(());
    };
    let chat_id = message.chat().id;

    let edited = bot
        .edit_message_text(chat_id, message.id(), text.clone())
        .parse_mode(ParseMode::Html)
        .await;
    if let Err(e) = edited {
        debug!("Stats edit not possible, sending new message: {e}");
        send_message_resilient(&bot, chat_id, text, Some(ParseMode::Html), None).await?;
    }
    Ok(())
}

/// Link handler: validate, download, deliver, record.
///
/// # Errors
///
/// Returns an error if the initial replies cannot be sent. Download and
/// delivery failures are reported to the user instead.
pub async fn handle_url(bot: Bot, msg: Message, ctx: Arc<AppContext>) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    let chat_id = msg.chat.id;
    let url = msg.text().map(str::trim).unwrap_or_default();

    if !is_supported_url(url) {
        debug!(user_id, "Rejected message without a media link");
        send_message_resilient(&bot, chat_id, View::invalid_url(), None, None).await?;
        return Ok(());
    }

    let request = DownloadRequest::new(url);
    info!(user_id, request_id = %request.id, url, "Download requested");
    let status = send_message_resilient(&bot, chat_id, View::processing(), None, None).await?;

    let media = match ctx
        .engine
        .download(&request, ctx.settings.download_deadline())
        .await
    {
        Ok(media) => media,
        Err(e) => {
            warn!(
                user_id,
                request_id = %request.id,
                error = %e,
                diagnostics = e.diagnostics().unwrap_or_default(),
                "Download failed"
            );
            edit_message_safe_resilient(&bot, chat_id, status.id, &View::download_failed(&e))
                .await;
            return Ok(());
        }
    };

    edit_message_safe_resilient(&bot, chat_id, status.id, View::sending()).await;
    let caption = View::caption(&media.title);
    match send_media_resilient(&bot, chat_id, &media, &caption, stats_keyboard()).await {
        Ok(_) => {
            let platform = Platform::detect(url);
            if let Err(e) = ctx
                .ledger
                .record(user_id, platform.label(), media.size_bytes)
                .await
            {
                error!(user_id, request_id = %request.id, error = %e, "Failed to record usage");
            }
            info!(
                user_id,
                request_id = %request.id,
                platform = %platform,
                size_bytes = media.size_bytes,
                "Media delivered"
            );
            drop(media);
            delete_message_safe(&bot, chat_id, status.id).await;
        }
        Err(e) => {
            error!(user_id, request_id = %request.id, error = %e, "Failed to send media");
            drop(media);
            edit_message_safe_resilient(
                &bot,
                chat_id,
                status.id,
                &View::transmission_failed(&e.to_string()),
            )
            .await;
        }
    }
    Ok(())
}
