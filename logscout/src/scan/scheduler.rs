use dashmap::DashMap;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use super::{AggregateStats, CancelToken, ScanWorker};
use crate::config::ScannerOptions;
use crate::errors::{ScanError, ScanResult};
use crate::metrics::ScanMetrics;
use crate::registry::RegistrySnapshot;
use crate::results::{FileOutcome, FileStats, ScanReport};
use crate::source::remote::RemoteConnector;
use crate::source::SourceFetcher;
use crate::targets::{FileIdentity, FileTarget};

/// Runs one worker per target on a bounded pool and folds the results into a report
pub struct ParallelScheduler {
    fetcher: SourceFetcher,
    worker: ScanWorker,
    max_concurrency: usize,
    show_progress: bool,
    metrics: ScanMetrics,
}

impl ParallelScheduler {
    pub fn new(
        snapshot: RegistrySnapshot,
        connector: Arc<dyn RemoteConnector>,
        options: &ScannerOptions,
    ) -> Self {
        let metrics = ScanMetrics::new();
        Self {
            fetcher: SourceFetcher::new(connector, options, metrics.clone()),
            worker: ScanWorker::new(snapshot, options),
            max_concurrency: options.max_concurrency.get(),
            show_progress: options.show_progress,
            metrics,
        }
    }

    pub fn metrics(&self) -> &ScanMetrics {
        &self.metrics
    }

    /// Scans every target. Per-file failures become annotations; only a pool that cannot be
    /// built fails the run.
    pub fn run(&self, mut targets: Vec<FileTarget>, cancel: &CancelToken) -> ScanResult<ScanReport> {
        if targets.is_empty() {
            debug!("No targets to scan, returning empty report");
            return Ok(ScanReport::new());
        }

        let mut seen = HashSet::new();
        targets.retain(|target| {
            let fresh = seen.insert(target.identity());
            if !fresh {
                warn!("Ignoring duplicate target {}", target.identity());
            }
            fresh
        });

        let threads = targets.len().min(self.max_concurrency);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("logscout-worker-{}", i))
            .build()?;
        info!("Scanning {} file(s) on {} thread(s)", targets.len(), threads);

        let progress = self.progress_bar(targets.len());
        let results: DashMap<FileIdentity, FileStats> = DashMap::with_capacity(targets.len());
        let aggregate = Mutex::new(AggregateStats::new());

        pool.install(|| {
            targets.par_iter().for_each(|target| {
                let stats = self.scan_target(target, cancel);
                self.record_metrics(&stats);
                aggregate
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .absorb(&stats);
                results.insert(stats.identity.clone(), stats);
                progress.inc(1);
            });
        });
        progress.finish_and_clear();

        let per_file: BTreeMap<FileIdentity, FileStats> = results.into_iter().collect();
        let aggregate = aggregate
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let report = ScanReport::assemble(per_file, aggregate);

        self.metrics.log_stats();
        info!(
            "Scan complete. {} file(s) scanned, {} failed{}",
            report.aggregate.files_scanned,
            report.aggregate.files_failed,
            if report.cancelled { " (cancelled)" } else { "" }
        );

        Ok(report)
    }

    fn scan_target(&self, target: &FileTarget, cancel: &CancelToken) -> FileStats {
        let identity = target.identity();
        if cancel.is_cancelled() {
            return FileStats::failed(identity, &ScanError::Cancelled);
        }
        debug!("Scanning {}", identity);
        match self.fetcher.fetch(target, cancel) {
            Ok(source) => self.worker.scan(identity, source, cancel),
            Err(err) => {
                warn!("Could not read {}: {}", identity, err);
                FileStats::failed(identity, &err)
            }
        }
    }

    fn record_metrics(&self, stats: &FileStats) {
        let matches = stats.regexes.values().map(|r| r.total_hits).sum();
        self.metrics
            .record_file(stats.lines_scanned, matches, stats.decode_errors);
        if stats.outcome() == FileOutcome::Failed {
            self.metrics.record_failure();
        }
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let progress = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files")
        {
            progress.set_style(style.progress_chars("=>-"));
        }
        progress
    }
}
