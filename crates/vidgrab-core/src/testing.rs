//! Testing helpers and mock utilities.
//!
//! Provides convenient constructors for mocked backends and ledgers.

use crate::download::backend::MockExtractionBackend;
use crate::download::MediaInfo;
use crate::ledger::{MockUsageLedger, StorageError};

/// Create a mock backend that probes `title` and writes `file_name` of `len`
/// bytes into the requested output directory on transfer.
///
/// # Example
///
/// ```rust,ignore
/// use vidgrab_core::testing::mock_backend_writing;
///
/// let backend = mock_backend_writing("Clip", "media.mp4", 1024);
/// ```
#[must_use]
pub fn mock_backend_writing(
    title: &'static str,
    file_name: &'static str,
    len: usize,
) -> MockExtractionBackend {
    let ext = file_name.rsplit('.').next().map(ToString::to_string);
    let info = MediaInfo {
        title: Some(title.to_string()),
        ext,
        ..MediaInfo::default()
    };

    let mut mock = MockExtractionBackend::new();
    let probed = info.clone();
    mock.expect_probe().returning(move |_, _| Ok(probed.clone()));
    mock.expect_transfer().returning(move |_, _, options| {
        std::fs::write(options.output_dir.join(file_name), vec![0u8; len])?;
        Ok(info.clone())
    });
    mock
}

/// Create a mock ledger whose every operation fails with an I/O error.
#[must_use]
pub fn mock_ledger_failing() -> MockUsageLedger {
    let mut mock = MockUsageLedger::new();
    mock.expect_record()
        .returning(|_, _, _| Err(StorageError::Io(std::io::Error::other("ledger offline"))));
    mock.expect_query()
        .returning(|_| Err(StorageError::Io(std::io::Error::other("ledger offline"))));
    mock
}
