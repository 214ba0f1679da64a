use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::targets::Locality;

/// Counters shared by every worker of a scan
#[derive(Debug, Clone)]
pub struct ScanMetrics {
    // Source metrics
    local_files: Arc<AtomicU64>,
    archived_files: Arc<AtomicU64>,
    remote_files: Arc<AtomicU64>,
    gzip_files: Arc<AtomicU64>,
    bytes_downloaded: Arc<AtomicU64>,
    remote_retries: Arc<AtomicU64>,

    // Scan metrics
    lines_scanned: Arc<AtomicU64>,
    matches: Arc<AtomicU64>,
    decode_errors: Arc<AtomicU64>,
    files_failed: Arc<AtomicU64>,
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self {
            local_files: Arc::new(AtomicU64::new(0)),
            archived_files: Arc::new(AtomicU64::new(0)),
            remote_files: Arc::new(AtomicU64::new(0)),
            gzip_files: Arc::new(AtomicU64::new(0)),
            bytes_downloaded: Arc::new(AtomicU64::new(0)),
            remote_retries: Arc::new(AtomicU64::new(0)),
            lines_scanned: Arc::new(AtomicU64::new(0)),
            matches: Arc::new(AtomicU64::new(0)),
            decode_errors: Arc::new(AtomicU64::new(0)),
            files_failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records a file that was opened for reading
    pub fn record_source(&self, locality: Locality, gzip: bool) {
        let counter = match locality {
            Locality::Local => &self.local_files,
            Locality::ArchivedLocal => &self.archived_files,
            Locality::Remote => &self.remote_files,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if gzip {
            self.gzip_files.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a completed download after `attempts` tries
    pub fn record_download(&self, bytes: u64, attempts: u32) {
        let total = self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.remote_retries
            .fetch_add(u64::from(attempts.saturating_sub(1)), Ordering::Relaxed);
        debug!("Downloaded {} bytes, total: {} bytes", bytes, total);
    }

    /// Records retries spent on a download that never succeeded
    pub fn record_retries(&self, attempts: u32) {
        self.remote_retries
            .fetch_add(u64::from(attempts.saturating_sub(1)), Ordering::Relaxed);
    }

    /// Records the totals of one scanned file
    pub fn record_file(&self, lines: u64, matches: u64, decode_errors: u64) {
        self.lines_scanned.fetch_add(lines, Ordering::Relaxed);
        self.matches.fetch_add(matches, Ordering::Relaxed);
        self.decode_errors.fetch_add(decode_errors, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            local_files: self.local_files.load(Ordering::Relaxed),
            archived_files: self.archived_files.load(Ordering::Relaxed),
            remote_files: self.remote_files.load(Ordering::Relaxed),
            gzip_files: self.gzip_files.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            remote_retries: self.remote_retries.load(Ordering::Relaxed),
            lines_scanned: self.lines_scanned.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
        }
    }

    /// Logs the current counters
    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Scan stats:\n\
             Files opened (local/archived/remote): {}/{}/{}\n\
             Gzip files: {}\n\
             Downloaded: {} bytes, {} retries\n\
             Lines scanned: {}\n\
             Matches: {}\n\
             Decode errors: {}\n\
             Failed files: {}",
            stats.local_files,
            stats.archived_files,
            stats.remote_files,
            stats.gzip_files,
            stats.bytes_downloaded,
            stats.remote_retries,
            stats.lines_scanned,
            stats.matches,
            stats.decode_errors,
            stats.files_failed
        );
    }
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`ScanMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub local_files: u64,
    pub archived_files: u64,
    pub remote_files: u64,
    pub gzip_files: u64,
    pub bytes_downloaded: u64,
    pub remote_retries: u64,
    pub lines_scanned: u64,
    pub matches: u64,
    pub decode_errors: u64,
    pub files_failed: u64,
}
