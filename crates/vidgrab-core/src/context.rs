//! Shared application state handed to every update handler

use crate::config::DownloaderSettings;
use crate::download::DownloadEngine;
use crate::ledger::{JsonFileLedger, UsageLedger};
use std::sync::Arc;

/// Engine, ledger and settings shared across handlers
#[derive(Clone)]
pub struct AppContext {
    /// Downloader settings
    pub settings: Arc<DownloaderSettings>,
    /// Download engine
    pub engine: Arc<DownloadEngine>,
    /// Usage ledger
    pub ledger: Arc<dyn UsageLedger>,
}

impl AppContext {
    /// Wire the yt-dlp engine and the JSON ledger from settings
    #[must_use]
    pub fn new(settings: DownloaderSettings) -> Self {
        let engine = Arc::new(DownloadEngine::from_settings(&settings));
        let ledger: Arc<dyn UsageLedger> =
            Arc::new(JsonFileLedger::new(settings.user_stats_file.clone()));
        Self::with_parts(Arc::new(settings), engine, ledger)
    }

    /// Assemble a context from existing parts
    #[must_use]
    pub fn with_parts(
        settings: Arc<DownloaderSettings>,
        engine: Arc<DownloadEngine>,
        ledger: Arc<dyn UsageLedger>,
    ) -> Self {
        Self {
            settings,
            engine,
            ledger,
        }
    }
}
