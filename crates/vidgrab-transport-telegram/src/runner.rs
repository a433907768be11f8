//! Bot runner
//!
//! Builds the application context and drives the teloxide dispatcher.

use crate::bot;
use crate::bot::handlers::Command;
use crate::bot::views::STATS_CALLBACK;
use crate::config::BotSettings;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{error, info};
use vidgrab_core::context::AppContext;

/// Run the Telegram transport runtime.
///
/// # Errors
///
/// Returns an error if no bot token is configured.
pub async fn run_bot(settings: Arc<BotSettings>) -> Result<()> {
    let token = settings
        .telegram
        .token()
        .ok_or_else(|| anyhow!("TELEGRAM_TOKEN is not set"))?
        .to_string();

    let ctx = init_context(&settings);
    let bot = Bot::new(token);
    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![ctx])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    Ok(())
}

fn init_context(settings: &BotSettings) -> Arc<AppContext> {
    let downloader = settings.downloader.as_ref().clone();
    info!(
        ytdlp_bin = %downloader.ytdlp_bin,
        scratch_root = %downloader.scratch_root().display(),
        stats_file = %downloader.user_stats_file.display(),
        workers = downloader.max_concurrent_downloads,
        deadline = ?downloader.download_deadline(),
        "Download engine initialized."
    );
    Arc::new(AppContext::new(downloader))
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(
            Update::filter_callback_query()
                .filter(|q: CallbackQuery| q.data.as_deref() == Some(STATS_CALLBACK))
                .endpoint(handle_stats_callback),
        )
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_text)),
        )
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    ctx: Arc<AppContext>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => bot::handlers::start(bot, msg).await,
        Command::Stats => bot::handlers::stats(bot, msg, ctx).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_text(
    bot: Bot,
    msg: Message,
    ctx: Arc<AppContext>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_url(bot, msg, ctx).await {
        error!("Text handler error: {}", e);
    }
    respond(())
}

async fn handle_stats_callback(
    bot: Bot,
    q: CallbackQuery,
    ctx: Arc<AppContext>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_stats_callback(bot, q, ctx).await {
        error!("Stats callback handler error: {}", e);
    }
    respond(())
}
