//! Per-user usage ledger
//!
//! Keeps download counters per user in a single JSON document.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Errors that can occur during ledger operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Usage counters of one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Successful deliveries
    pub downloads_count: u64,
    /// Sum of delivered artifact sizes in bytes
    pub total_size: u64,
    /// Deliveries per platform label
    #[serde(default)]
    pub platforms: BTreeMap<String, u64>,
    /// First recorded delivery
    pub first_use: DateTime<Utc>,
    /// Most recent recorded delivery
    pub last_activity: DateTime<Utc>,
}

impl UsageRecord {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            downloads_count: 0,
            total_size: 0,
            platforms: BTreeMap::new(),
            first_use: now,
            last_activity: now,
        }
    }

    /// Most used platform and its count; ties resolve to the first label
    #[must_use]
    pub fn favourite_platform(&self) -> Option<(&str, u64)> {
        self.platforms
            .iter()
            .fold(None, |best: Option<(&str, u64)>, (name, count)| match best {
                Some((_, best_count)) if best_count >= *count => best,
                _ => Some((name.as_str(), *count)),
            })
    }
}

/// Interface for usage ledgers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Count one delivery of `bytes` from `platform` for `user_id`
    async fn record(
        &self,
        user_id: i64,
        platform: &str,
        bytes: u64,
    ) -> Result<UsageRecord, StorageError>;
    /// Current record of `user_id`, if any delivery was recorded
    async fn query(&self, user_id: i64) -> Result<Option<UsageRecord>, StorageError>;
}

type LedgerDocument = BTreeMap<String, UsageRecord>;

/// Ledger persisted as one JSON object keyed by user id.
///
/// Every read-modify-write cycle holds the lock, so concurrent records never
/// lose updates within the process.
pub struct JsonFileLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileLedger {
    /// Ledger stored at `path`; the file is created on first record
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Location of the document
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<LedgerDocument, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(LedgerDocument::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LedgerDocument::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a sibling temp file, then rename over the document
    async fn save(&self, document: &LedgerDocument) -> Result<(), StorageError> {
        let body = serde_json::to_vec_pretty(document)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl UsageLedger for JsonFileLedger {
    async fn record(
        &self,
        user_id: i64,
        platform: &str,
        bytes: u64,
    ) -> Result<UsageRecord, StorageError> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;

        let now = Utc::now();
        let record = document
            .entry(user_id.to_string())
            .or_insert_with(|| UsageRecord::new(now));
        record.downloads_count += 1;
        record.total_size = record.total_size.saturating_add(bytes);
        record.last_activity = now;
        *record.platforms.entry(platform.to_string()).or_insert(0) += 1;
        let updated = record.clone();

        self.save(&document).await?;
        debug!(user_id, platform, bytes, "Recorded delivery");
        if updated.downloads_count == 1 {
            info!(user_id, "First delivery recorded for user");
        }
        Ok(updated)
    }

    async fn query(&self, user_id: i64) -> Result<Option<UsageRecord>, StorageError> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;
        Ok(document.remove(&user_id.to_string()))
    }
}
