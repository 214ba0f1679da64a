use std::borrow::Cow;
use tracing::{debug, trace, warn};

use super::CancelToken;
use crate::config::{EncodingMode, ScannerOptions};
use crate::errors::{ErrorKind, ScanError, ScanResult};
use crate::registry::RegistrySnapshot;
use crate::results::{FileFailure, FileStats, MatchRecord, RegexStats};
use crate::source::RawLine;
use crate::targets::FileIdentity;

/// Applies every pattern of a registry snapshot to the lines of one file
#[derive(Debug, Clone)]
pub struct ScanWorker {
    snapshot: RegistrySnapshot,
    encoding_mode: EncodingMode,
    max_retained_lines: Option<usize>,
}

impl ScanWorker {
    pub fn new(snapshot: RegistrySnapshot, options: &ScannerOptions) -> Self {
        Self {
            snapshot,
            encoding_mode: options.encoding_mode,
            max_retained_lines: options.max_retained_lines,
        }
    }

    /// Scans `lines` to completion, to the first read error, or until cancelled.
    /// Stats gathered before a failure are kept; the failure is recorded on them.
    pub fn scan<I>(&self, identity: FileIdentity, lines: I, cancel: &CancelToken) -> FileStats
    where
        I: IntoIterator<Item = ScanResult<RawLine>>,
    {
        let mut stats = FileStats::new(identity);
        for spec in self.snapshot.iter() {
            stats.regexes.insert(
                spec.name().to_string(),
                RegexStats::with_groups(spec.groups()),
            );
        }

        let mut lines = lines.into_iter();
        loop {
            if cancel.is_cancelled() {
                debug!("Scan of {} cancelled after {} lines", stats.identity, stats.lines_scanned);
                stats.failure = Some(FileFailure::from(&ScanError::Cancelled));
                break;
            }
            let raw = match lines.next() {
                None => break,
                Some(Ok(raw)) => raw,
                Some(Err(err)) => {
                    warn!("Stopped reading {}: {}", stats.identity, err);
                    stats.failure = Some(FileFailure::from(&err));
                    break;
                }
            };

            stats.lines_scanned += 1;
            match self.decode(&raw.bytes) {
                Some(text) => self.scan_line(&mut stats, raw.number, &text),
                None => {
                    stats.decode_errors += 1;
                    trace!(
                        "{}: {}",
                        stats.identity,
                        ScanError::Decode {
                            line_number: raw.number
                        }
                    );
                }
            }
        }

        if stats.failure.is_none() && stats.decode_errors > 0 {
            warn!(
                "Skipped {} undecodable line(s) in {}",
                stats.decode_errors, stats.identity
            );
            stats.failure = Some(FileFailure {
                kind: ErrorKind::Decode,
                message: format!("{} undecodable line(s) skipped", stats.decode_errors),
            });
        }
        stats
    }

    fn decode<'a>(&self, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
        match self.encoding_mode {
            EncodingMode::Skip => std::str::from_utf8(bytes).ok().map(Cow::Borrowed),
            EncodingMode::Lossy => Some(String::from_utf8_lossy(bytes)),
        }
    }

    fn scan_line(&self, stats: &mut FileStats, line_number: usize, line: &str) {
        for spec in self.snapshot.iter() {
            let mut matched = false;
            if spec.has_groups() {
                for caps in spec.regex().captures_iter(line) {
                    matched = true;
                    stats.record(&MatchRecord {
                        regex: spec.name(),
                        line_number,
                        line,
                        group: None,
                    });
                    for group in spec.groups() {
                        if let Some(value) = caps.name(group) {
                            stats.record(&MatchRecord {
                                regex: spec.name(),
                                line_number,
                                line,
                                group: Some((group, value.as_str())),
                            });
                        }
                    }
                }
            } else {
                for _ in spec.regex().find_iter(line) {
                    matched = true;
                    stats.record(&MatchRecord {
                        regex: spec.name(),
                        line_number,
                        line,
                        group: None,
                    });
                }
            }

            if matched {
                trace!("{}:{} matched '{}'", stats.identity, line_number, spec.name());
                stats.retain_line(spec.name(), line_number, line, self.max_retained_lines);
            }
        }
    }
}
