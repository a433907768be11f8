use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vidgrab_core::config::{DownloaderSettings, MAX_FILE_SIZE_BYTES};
use vidgrab_core::credentials::{CredentialResolver, CredentialStrategy};
use vidgrab_core::download::{
    BackendError, DownloadEngine, DownloadError, DownloadRequest, ExtractionBackend, MediaInfo,
    MediaKind, TransferOptions,
};
use vidgrab_core::ledger::{JsonFileLedger, UsageLedger};
use vidgrab_core::platform::Platform;

/// Backend that reports a fixed size and writes a sparse artifact of that size
struct ScriptedBackend {
    declared_size: Option<f64>,
    artifact_len: u64,
    delay: Duration,
    transfers: AtomicUsize,
}

impl ScriptedBackend {
    fn new(declared_size: Option<f64>, artifact_len: u64) -> Self {
        Self {
            declared_size,
            artifact_len,
            delay: Duration::ZERO,
            transfers: AtomicUsize::new(0),
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(None, 16)
        }
    }

    fn info(&self) -> MediaInfo {
        MediaInfo {
            title: Some("Never Gonna Give You Up".to_string()),
            ext: Some("mp4".to_string()),
            filesize: self.declared_size,
            ..MediaInfo::default()
        }
    }
}

#[async_trait]
impl ExtractionBackend for ScriptedBackend {
    async fn probe(
        &self,
        _url: &str,
        _strategy: &CredentialStrategy,
    ) -> Result<MediaInfo, BackendError> {
        Ok(self.info())
    }

    async fn transfer(
        &self,
        _url: &str,
        _strategy: &CredentialStrategy,
        options: &TransferOptions,
    ) -> Result<MediaInfo, BackendError> {
        self.transfers.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let file = std::fs::File::create(options.output_dir.join("media.mp4"))?;
        file.set_len(self.artifact_len)?;
        Ok(self.info())
    }
}

fn engine(backend: Arc<ScriptedBackend>, scratch_root: &Path) -> DownloadEngine {
    let resolver =
        CredentialResolver::new(&DownloaderSettings::default()).with_cookie_candidates(vec![]);
    DownloadEngine::new(backend, resolver, scratch_root.to_path_buf(), 4)
}

/// What the chat gateway does after a successful download
async fn deliver(
    engine: &DownloadEngine,
    ledger: &dyn UsageLedger,
    user_id: i64,
    url: &str,
) -> Result<u64, DownloadError> {
    let media = engine.download(&DownloadRequest::new(url), None).await?;
    assert_eq!(media.kind, MediaKind::Video);
    ledger
        .record(user_id, Platform::detect(url).label(), media.size_bytes)
        .await
        .expect("ledger record");
    Ok(media.size_bytes)
}

#[tokio::test]
async fn video_download_is_recorded_for_new_user() {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = Arc::new(ScriptedBackend::new(Some(30_000_000.0), 30_000_000));
    let engine = engine(Arc::clone(&backend), &dir.path().join("scratch"));
    let ledger = JsonFileLedger::new(dir.path().join("user_stats.json"));

    let size = deliver(&engine, &ledger, 42, "https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        .await
        .expect("download");
    assert_eq!(size, 30_000_000);

    let record = ledger.query(42).await.expect("query").expect("record");
    assert_eq!(record.downloads_count, 1);
    assert_eq!(record.total_size, 30_000_000);
    assert_eq!(record.platforms.len(), 1);
    assert_eq!(record.platforms.get("YouTube"), Some(&1));

    // Delivery is over once the result is dropped
    let leftovers = std::fs::read_dir(dir.path().join("scratch"))
        .expect("scratch root")
        .count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn oversized_probe_leaves_ledger_untouched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = Arc::new(ScriptedBackend::new(Some(80.0 * 1024.0 * 1024.0), 0));
    let engine = engine(Arc::clone(&backend), &dir.path().join("scratch"));
    let ledger = JsonFileLedger::new(dir.path().join("user_stats.json"));

    let err = deliver(&engine, &ledger, 42, "https://youtu.be/dQw4w9WgXcQ")
        .await
        .expect_err("size ceiling");

    assert!(matches!(
        err,
        DownloadError::SizeExceeded {
            limit: MAX_FILE_SIZE_BYTES,
            ..
        }
    ));
    assert_eq!(backend.transfers.load(Ordering::SeqCst), 0);
    assert!(ledger.query(42).await.expect("query").is_none());
    assert!(!ledger.path().exists());
}

#[tokio::test]
async fn concurrent_users_keep_their_own_entries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = Arc::new(ScriptedBackend::new(None, 1_000));
    let engine = Arc::new(engine(backend, &dir.path().join("scratch")));
    let ledger = Arc::new(JsonFileLedger::new(dir.path().join("user_stats.json")));

    let run = |user_id: i64, url: &'static str| {
        let engine = Arc::clone(&engine);
        let ledger = Arc::clone(&ledger);
        tokio::spawn(async move { deliver(&engine, ledger.as_ref(), user_id, url).await })
    };
    let first = run(1, "https://www.tiktok.com/@someone/video/7234567890123456789");
    let second = run(2, "https://www.instagram.com/reel/Cabc123/");
    first.await.expect("join").expect("download");
    second.await.expect("join").expect("download");

    let one = ledger.query(1).await.expect("query").expect("user 1");
    let two = ledger.query(2).await.expect("query").expect("user 2");
    assert_eq!(one.downloads_count, 1);
    assert_eq!(one.platforms.get("TikTok"), Some(&1));
    assert_eq!(two.downloads_count, 1);
    assert_eq!(two.platforms.get("Instagram"), Some(&1));
}

#[tokio::test]
async fn deadline_abandons_slow_download() {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = Arc::new(ScriptedBackend::slow(Duration::from_secs(5)));
    let scratch = dir.path().join("scratch");
    let engine = engine(backend, &scratch);

    let err = engine
        .download(
            &DownloadRequest::new("https://x.com/user/status/1234567890"),
            Some(Duration::from_millis(50)),
        )
        .await
        .expect_err("deadline");

    assert!(matches!(err, DownloadError::TimedOut(_)));
    assert!(err.to_string().contains("timed out"));
    assert_eq!(std::fs::read_dir(&scratch).expect("scratch root").count(), 0);
}
