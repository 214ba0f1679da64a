use serde::Serialize;
use std::collections::BTreeMap;

use crate::results::{FileOutcome, FileStats, RegexStats};

/// Counts summed across every file of a scan.
///
/// All merging is addition over ordered maps, so the result does not depend on the order in
/// which files are absorbed or aggregates are merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    /// regex name -> summed counts
    pub regexes: BTreeMap<String, RegexStats>,
    /// Files that contributed counts (complete or partial)
    pub files_scanned: u64,
    /// Files that contributed nothing
    pub files_failed: u64,
    pub decode_errors: u64,
}

impl AggregateStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Batch aggregation over a set of per-file stats
    pub fn from_files<'a>(files: impl IntoIterator<Item = &'a FileStats>) -> Self {
        let mut aggregate = Self::new();
        for stats in files {
            aggregate.absorb(stats);
        }
        aggregate
    }

    /// Adds one file's counts. Partial files contribute what they gathered.
    pub fn absorb(&mut self, stats: &FileStats) {
        if stats.outcome() == FileOutcome::Failed {
            self.files_failed += 1;
            return;
        }
        self.files_scanned += 1;
        self.decode_errors += stats.decode_errors;
        for (name, regex_stats) in &stats.regexes {
            self.regexes
                .entry(name.clone())
                .or_default()
                .merge(regex_stats);
        }
    }

    /// Adds another aggregate into this one
    pub fn merge(&mut self, other: &AggregateStats) {
        self.files_scanned += other.files_scanned;
        self.files_failed += other.files_failed;
        self.decode_errors += other.decode_errors;
        for (name, regex_stats) in &other.regexes {
            self.regexes
                .entry(name.clone())
                .or_default()
                .merge(regex_stats);
        }
    }

    /// Count for a (regex, group, value) key; 0 when absent
    pub fn count(&self, regex: &str, group: &str, value: &str) -> u64 {
        self.regexes
            .get(regex)
            .map_or(0, |stats| stats.count(group, value))
    }

    /// Total matches for a regex across all files
    pub fn total(&self, regex: &str) -> u64 {
        self.regexes.get(regex).map_or(0, |stats| stats.total_hits)
    }

    pub fn is_empty(&self) -> bool {
        self.regexes.is_empty() && self.files_scanned == 0 && self.files_failed == 0
    }
}
