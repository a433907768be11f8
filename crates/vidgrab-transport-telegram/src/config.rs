//! Telegram transport settings.

use config::ConfigError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vidgrab_core::config::DownloaderSettings;

/// Initial delay before retrying a failed Telegram API call.
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Upper bound for the retry delay.
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;
/// Retries after the first failed attempt.
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;

/// Telegram transport settings loaded from environment variables.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TelegramSettings {
    /// Telegram Bot API token.
    pub telegram_token: Option<String>,
    /// Legacy variable name for the token, used when `TELEGRAM_TOKEN` is unset.
    pub telegram_bot_token: Option<String>,
}

impl TelegramSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        vidgrab_core::config::build_config()?.try_deserialize()
    }

    /// Bot token, preferring `TELEGRAM_TOKEN` over `TELEGRAM_BOT_TOKEN`.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        [&self.telegram_token, &self.telegram_bot_token]
            .into_iter()
            .flatten()
            .map(|token| token.trim())
            .find(|token| !token.is_empty())
    }
}

/// Combined settings used by the Telegram transport layer.
#[derive(Clone)]
pub struct BotSettings {
    /// Downloader settings shared with the core engine.
    pub downloader: Arc<DownloaderSettings>,
    /// Telegram-specific settings.
    pub telegram: Arc<TelegramSettings>,
}

impl BotSettings {
    /// Create a new combined settings bundle.
    #[must_use]
    pub fn new(downloader: DownloaderSettings, telegram: TelegramSettings) -> Self {
        Self {
            downloader: Arc::new(downloader),
            telegram: Arc::new(telegram),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TelegramSettings;

    #[test]
    fn test_token_fallback() {
        let mut settings = TelegramSettings {
            telegram_token: None,
            telegram_bot_token: Some("123:legacy".to_string()),
        };
        assert_eq!(settings.token(), Some("123:legacy"));

        settings.telegram_token = Some("456:primary".to_string());
        assert_eq!(settings.token(), Some("456:primary"));

        // Blank primary falls through
        settings.telegram_token = Some("  ".to_string());
        assert_eq!(settings.token(), Some("123:legacy"));

        settings.telegram_bot_token = None;
        assert_eq!(settings.token(), None);
    }
}
