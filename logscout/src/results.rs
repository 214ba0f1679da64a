/// Result types produced by a scan.
///
/// Every [`FileStats`] is owned by the worker that builds it until it is handed to the
/// scheduler, so no locking is needed while a file is scanned. Counts live in `BTreeMap`s so
/// that iteration and serialisation order are deterministic no matter which worker finished
/// first.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{ErrorKind, ScanError};
use crate::scan::aggregate::AggregateStats;
use crate::targets::FileIdentity;

/// One observed match event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRecord<'a> {
    pub regex: &'a str,
    pub line_number: usize,
    pub line: &'a str,
    /// The named group and captured value, or `None` for the match as a whole
    pub group: Option<(&'a str, &'a str)>,
}

/// A raw line retained because at least one pattern matched it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchedLine {
    pub line_number: usize,
    pub text: String,
}

/// Counts for one regex
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexStats {
    /// Number of matches, counted once per match whether or not the regex has groups
    pub total_hits: u64,
    /// group name -> captured value -> count
    pub group_hits: BTreeMap<String, BTreeMap<String, u64>>,
}

impl RegexStats {
    /// Creates stats with an empty bucket for each named group
    pub fn with_groups<'a>(groups: impl IntoIterator<Item = &'a String>) -> Self {
        Self {
            total_hits: 0,
            group_hits: groups
                .into_iter()
                .map(|g| (g.clone(), BTreeMap::new()))
                .collect(),
        }
    }

    /// Count for a (group, value) key
    pub fn count(&self, group: &str, value: &str) -> u64 {
        self.group_hits
            .get(group)
            .and_then(|values| values.get(value))
            .copied()
            .unwrap_or(0)
    }

    /// Adds every count in `other` to `self`
    pub fn merge(&mut self, other: &RegexStats) {
        self.total_hits += other.total_hits;
        for (group, values) in &other.group_hits {
            let target = self.group_hits.entry(group.clone()).or_default();
            for (value, count) in values {
                *target.entry(value.clone()).or_insert(0) += count;
            }
        }
    }

    /// Max, min and average hits per distinct value of `group`
    pub fn group_summary(&self, group: &str) -> Option<GroupSummary> {
        let values = self.group_hits.get(group)?;
        // First maximum / first minimum in key order, so ties resolve deterministically
        let mut iter = values.iter();
        let (first_key, first_count) = iter.next()?;
        let mut summary = GroupSummary {
            max_key: first_key.clone(),
            max_count: *first_count,
            min_key: first_key.clone(),
            min_count: *first_count,
            avg_count: 0.0,
        };
        let mut total = *first_count;
        for (key, &count) in iter {
            total += count;
            if count > summary.max_count {
                summary.max_key = key.clone();
                summary.max_count = count;
            }
            if count < summary.min_count {
                summary.min_key = key.clone();
                summary.min_count = count;
            }
        }
        summary.avg_count = total as f64 / values.len() as f64;
        Some(summary)
    }
}

/// Spread of counts across the values of one named group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub max_key: String,
    pub max_count: u64,
    pub min_key: String,
    pub min_count: u64,
    pub avg_count: f64,
}

/// Why a file was not (fully) scanned
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ScanError> for FileFailure {
    fn from(err: &ScanError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// How much of a file made it into the stats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOutcome {
    Complete,
    Partial,
    Failed,
}

/// Per-file statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileStats {
    pub identity: FileIdentity,
    /// regex name -> counts
    pub regexes: BTreeMap<String, RegexStats>,
    /// regex name -> retained matching lines, in line order
    pub matched_lines: BTreeMap<String, Vec<MatchedLine>>,
    pub lines_scanned: u64,
    pub decode_errors: u64,
    pub failure: Option<FileFailure>,
}

impl FileStats {
    pub fn new(identity: FileIdentity) -> Self {
        Self {
            identity,
            regexes: BTreeMap::new(),
            matched_lines: BTreeMap::new(),
            lines_scanned: 0,
            decode_errors: 0,
            failure: None,
        }
    }

    /// Stats for a file that produced no data at all
    pub fn failed(identity: FileIdentity, err: &ScanError) -> Self {
        let mut stats = Self::new(identity);
        stats.failure = Some(FileFailure::from(err));
        stats
    }

    /// Applies one match event
    pub fn record(&mut self, record: &MatchRecord<'_>) {
        let stats = self.regexes.entry(record.regex.to_string()).or_default();
        match record.group {
            None => stats.total_hits += 1,
            Some((group, value)) => {
                *stats
                    .group_hits
                    .entry(group.to_string())
                    .or_default()
                    .entry(value.to_string())
                    .or_insert(0) += 1;
            }
        }
    }

    /// Retains a matching line under `regex`, unless `cap` lines are already kept
    pub fn retain_line(&mut self, regex: &str, line_number: usize, text: &str, cap: Option<usize>) {
        let lines = self.matched_lines.entry(regex.to_string()).or_default();
        if cap.map_or(true, |cap| lines.len() < cap) {
            lines.push(MatchedLine {
                line_number,
                text: text.to_string(),
            });
        }
    }

    /// Count for a (regex, group, value) key
    pub fn count(&self, regex: &str, group: &str, value: &str) -> u64 {
        self.regexes
            .get(regex)
            .map_or(0, |stats| stats.count(group, value))
    }

    /// Total matches for a regex
    pub fn total(&self, regex: &str) -> u64 {
        self.regexes.get(regex).map_or(0, |stats| stats.total_hits)
    }

    pub fn outcome(&self) -> FileOutcome {
        match &self.failure {
            None => FileOutcome::Complete,
            Some(failure) if failure.kind == ErrorKind::Decode => FileOutcome::Partial,
            Some(_) if self.lines_scanned > 0 => FileOutcome::Partial,
            Some(_) => FileOutcome::Failed,
        }
    }
}

/// Everything a scan returns
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// Unmodified per-file view keyed by file identity
    pub per_file: BTreeMap<FileIdentity, FileStats>,
    /// Counts summed across all files
    pub aggregate: AggregateStats,
    /// Files carrying a failure annotation, in identity order
    pub failures: Vec<(FileIdentity, ErrorKind)>,
    /// Whether cancellation cut the run short
    pub cancelled: bool,
}

impl ScanReport {
    pub fn new() -> Self {
        Default::default()
    }

    /// Builds a report from per-file stats and their already folded aggregate.
    /// `failures` and `cancelled` are derived from the per-file annotations.
    pub fn assemble(
        per_file: BTreeMap<FileIdentity, FileStats>,
        aggregate: AggregateStats,
    ) -> Self {
        let failures: Vec<(FileIdentity, ErrorKind)> = per_file
            .iter()
            .filter_map(|(identity, stats)| {
                stats
                    .failure
                    .as_ref()
                    .map(|failure| (identity.clone(), failure.kind))
            })
            .collect();
        let cancelled = failures
            .iter()
            .any(|(_, kind)| *kind == ErrorKind::Cancelled);
        Self {
            per_file,
            aggregate,
            failures,
            cancelled,
        }
    }

    pub fn files_with_outcome(&self, outcome: FileOutcome) -> usize {
        self.per_file
            .values()
            .filter(|stats| stats.outcome() == outcome)
            .count()
    }

    /// Lines that matched any regex, per file, in line order without duplicates
    pub fn matching_lines(&self) -> Vec<(&FileIdentity, Vec<&MatchedLine>)> {
        self.per_file
            .iter()
            .filter_map(|(identity, stats)| {
                let mut lines: Vec<&MatchedLine> = stats.matched_lines.values().flatten().collect();
                if lines.is_empty() {
                    return None;
                }
                lines.sort();
                lines.dedup();
                Some((identity, lines))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn identity(name: &str) -> FileIdentity {
        FileIdentity::local(PathBuf::from(name))
    }

    #[test]
    fn test_record_match_and_groups() {
        let mut stats = FileStats::new(identity("app.log"));
        let line = "ERROR 500";
        stats.record(&MatchRecord {
            regex: "error",
            line_number: 1,
            line,
            group: None,
        });
        stats.record(&MatchRecord {
            regex: "error",
            line_number: 1,
            line,
            group: Some(("code", "500")),
        });

        assert_eq!(stats.total("error"), 1);
        assert_eq!(stats.count("error", "code", "500"), 1);
        assert_eq!(stats.count("error", "code", "404"), 0);
        assert_eq!(stats.count("missing", "code", "500"), 0);
    }

    #[test]
    fn test_retain_line_cap() {
        let mut stats = FileStats::new(identity("app.log"));
        for n in 1..=5 {
            stats.retain_line("error", n, "ERROR", Some(3));
        }
        assert_eq!(stats.matched_lines["error"].len(), 3);
        assert_eq!(stats.matched_lines["error"][2].line_number, 3);
    }

    #[test]
    fn test_outcome() {
        let mut stats = FileStats::new(identity("app.log"));
        assert_eq!(stats.outcome(), FileOutcome::Complete);

        stats.failure = Some(FileFailure {
            kind: ErrorKind::CorruptArchive,
            message: "bad trailer".to_string(),
        });
        assert_eq!(stats.outcome(), FileOutcome::Failed);

        stats.lines_scanned = 10;
        assert_eq!(stats.outcome(), FileOutcome::Partial);

        let failed = FileStats::failed(identity("gone.log"), &ScanError::Cancelled);
        assert_eq!(failed.outcome(), FileOutcome::Failed);
        assert_eq!(failed.failure.unwrap().kind, ErrorKind::Cancelled);
    }

    #[test]
    fn test_regex_stats_merge() {
        let mut a = RegexStats::default();
        a.total_hits = 2;
        a.group_hits
            .entry("code".to_string())
            .or_default()
            .insert("500".to_string(), 2);

        let mut b = RegexStats::default();
        b.total_hits = 3;
        let codes = b.group_hits.entry("code".to_string()).or_default();
        codes.insert("500".to_string(), 1);
        codes.insert("404".to_string(), 2);

        a.merge(&b);
        assert_eq!(a.total_hits, 5);
        assert_eq!(a.count("code", "500"), 3);
        assert_eq!(a.count("code", "404"), 2);
    }

    #[test]
    fn test_group_summary() {
        let mut stats = RegexStats::default();
        let codes = stats.group_hits.entry("code".to_string()).or_default();
        codes.insert("200".to_string(), 7);
        codes.insert("404".to_string(), 2);
        codes.insert("500".to_string(), 3);

        let summary = stats.group_summary("code").unwrap();
        assert_eq!(summary.max_key, "200");
        assert_eq!(summary.max_count, 7);
        assert_eq!(summary.min_key, "404");
        assert_eq!(summary.min_count, 2);
        assert!((summary.avg_count - 4.0).abs() < f64::EPSILON);

        assert!(stats.group_summary("missing").is_none());
        stats.group_hits.insert("empty".to_string(), BTreeMap::new());
        assert!(stats.group_summary("empty").is_none());
    }

    #[test]
    fn test_matching_lines_deduplicates() {
        let mut report = ScanReport::new();
        let mut stats = FileStats::new(identity("app.log"));
        stats.retain_line("error", 4, "ERROR 500 timeout", None);
        stats.retain_line("timeout", 4, "ERROR 500 timeout", None);
        stats.retain_line("timeout", 2, "slow timeout", None);
        report.per_file.insert(stats.identity.clone(), stats);
        report
            .per_file
            .insert(identity("quiet.log"), FileStats::new(identity("quiet.log")));

        let lines = report.matching_lines();
        assert_eq!(lines.len(), 1);
        let numbers: Vec<_> = lines[0].1.iter().map(|l| l.line_number).collect();
        assert_eq!(numbers, [2, 4]);
    }
}
