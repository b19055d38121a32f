use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use super::transfer::{TransferError, TransferErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub file_name: String,
    pub path: PathBuf,
    pub kind: TransferErrorKind,
    pub detail: String,
}

/// Counters for one mirror run. Shared across download tasks through an
/// `Arc`; every update is commutative so the final snapshot does not
/// depend on completion order.
#[derive(Debug, Default)]
pub struct RunStats {
    downloaded: AtomicUsize,
    skipped: AtomicUsize,
    bytes_downloaded: AtomicU64,
    cancelled: AtomicBool,
    failures: Mutex<Vec<FailureRecord>>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_download(&self, bytes: u64) {
        self.downloaded.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_failure(&self, file_name: &str, path: PathBuf, err: &TransferError) {
        let record = FailureRecord {
            file_name: file_name.to_string(),
            path,
            kind: err.kind(),
            detail: err.to_string(),
        };
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }

    /// Folds a finished download attempt into the counters.
    pub fn record_outcome(
        &self,
        file_name: &str,
        path: PathBuf,
        outcome: &Result<u64, TransferError>,
    ) {
        match outcome {
            Ok(bytes) => self.record_download(*bytes),
            Err(err) => self.record_failure(file_name, path, err),
        }
    }

    pub fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunSummary {
        let mut failures = self
            .failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        failures.sort_by(|a, b| a.path.cmp(&b.path));
        RunSummary {
            downloaded: self.downloaded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            failures,
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub bytes_downloaded: u64,
    /// Sorted by destination path.
    pub failures: Vec<FailureRecord>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cancelled {
            writeln!(f, "Interrupted.")?;
        } else {
            writeln!(f, "Done.")?;
        }
        writeln!(
            f,
            "  downloaded: {} ({} bytes)",
            self.downloaded, self.bytes_downloaded
        )?;
        writeln!(f, "  skipped:    {}", self.skipped)?;
        write!(f, "  failed:     {}", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n    {}: {}", failure.file_name, failure.detail)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_counts_and_failures() {
        let stats = RunStats::new();
        stats.record_skip();
        stats.record_outcome("a.mp4", PathBuf::from("/m/a.mp4"), &Ok(10));
        stats.record_outcome(
            "b.mp4",
            PathBuf::from("/m/b.mp4"),
            &Err(TransferError::Cancelled),
        );

        let summary = stats.snapshot();
        assert_eq!(summary.downloaded, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.bytes_downloaded, 10);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].file_name, "b.mp4");
        assert_eq!(summary.failures[0].kind, TransferErrorKind::Cancelled);
        assert!(!summary.is_clean());
    }

    #[test]
    fn snapshot_orders_failures_by_path() {
        let stats = RunStats::new();
        for name in ["c", "a", "b"] {
            stats.record_failure(
                name,
                PathBuf::from(format!("/m/{name}")),
                &TransferError::Cancelled,
            );
        }
        let names: Vec<_> = stats
            .snapshot()
            .failures
            .into_iter()
            .map(|f| f.file_name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn display_lists_each_failure() {
        let stats = RunStats::new();
        stats.record_download(3);
        stats.record_failure("x.pdf", PathBuf::from("/m/x.pdf"), &TransferError::Cancelled);
        let text = stats.snapshot().to_string();
        assert!(text.starts_with("Done."));
        assert!(text.contains("downloaded: 1 (3 bytes)"));
        assert!(text.contains("failed:     1"));
        assert!(text.contains("x.pdf: download cancelled"));
    }
}
