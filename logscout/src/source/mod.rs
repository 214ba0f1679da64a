//! Turns a [`FileTarget`] into a stream of raw lines.
//!
//! Local files are opened directly. Remote files are first downloaded into a temporary
//! spool file which lives exactly as long as the [`LineSource`] reading it. Either way the
//! first bytes decide whether the stream is gzip: a `compressed` hint on the target without
//! the gzip magic is logged and read as plain text.

pub mod remote;

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, trace, warn};

use self::remote::{download_to_spool, RemoteConnector, RemoteErrorKind};
use crate::config::{RemoteOptions, ScannerOptions};
use crate::errors::{ScanError, ScanResult};
use crate::metrics::ScanMetrics;
use crate::scan::CancelToken;
use crate::targets::{FileTarget, Locality};

const BUFFER_CAPACITY: usize = 65536;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One line with its terminator stripped. Numbers start at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub number: usize,
    pub bytes: Vec<u8>,
}

/// Sequential reader over the lines of one file
pub struct LineSource {
    reader: Box<dyn BufRead + Send>,
    path: PathBuf,
    gzip: bool,
    line_number: usize,
    done: bool,
    // Declared after `reader` so the handle is closed before the spool is deleted
    _spool: Option<NamedTempFile>,
}

impl LineSource {
    /// Wraps `reader`, decompressing it when it starts with the gzip magic
    pub fn from_reader<R: Read + Send + 'static>(
        reader: R,
        path: impl Into<PathBuf>,
        compressed_hint: bool,
    ) -> ScanResult<Self> {
        let path = path.into();
        let mut buffered = BufReader::with_capacity(BUFFER_CAPACITY, reader);
        let head = buffered
            .fill_buf()
            .map_err(|e| ScanError::from_io(&path, e))?;
        let gzip = head.starts_with(&GZIP_MAGIC);

        if compressed_hint && !gzip && !head.is_empty() {
            warn!(
                "{} is marked compressed but has no gzip header, reading as plain text",
                path.display()
            );
        }
        trace!("Opened {} (gzip: {})", path.display(), gzip);

        let reader: Box<dyn BufRead + Send> = if gzip {
            Box::new(BufReader::with_capacity(
                BUFFER_CAPACITY,
                MultiGzDecoder::new(buffered),
            ))
        } else {
            Box::new(buffered)
        };

        Ok(Self {
            reader,
            path,
            gzip,
            line_number: 0,
            done: false,
            _spool: None,
        })
    }

    fn with_spool(mut self, spool: NamedTempFile) -> Self {
        self._spool = Some(spool);
        self
    }

    pub fn is_gzip(&self) -> bool {
        self.gzip
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for LineSource {
    type Item = ScanResult<RawLine>;

    /// Yields lines in order. A read error ends the stream after being yielded once.
    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut bytes = Vec::new();
        match self.reader.read_until(b'\n', &mut bytes) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => {
                if bytes.last() == Some(&b'\n') {
                    bytes.pop();
                    if bytes.last() == Some(&b'\r') {
                        bytes.pop();
                    }
                }
                self.line_number += 1;
                Some(Ok(RawLine {
                    number: self.line_number,
                    bytes,
                }))
            }
            Err(e) => {
                self.done = true;
                let err = if self.gzip {
                    ScanError::corrupt_archive(&self.path, e)
                } else {
                    ScanError::from_io(&self.path, e)
                };
                Some(Err(err))
            }
        }
    }
}

/// Opens targets for reading
pub struct SourceFetcher {
    connector: Arc<dyn RemoteConnector>,
    remote: RemoteOptions,
    tmp_path: Option<PathBuf>,
    metrics: ScanMetrics,
}

impl SourceFetcher {
    pub fn new(
        connector: Arc<dyn RemoteConnector>,
        options: &ScannerOptions,
        metrics: ScanMetrics,
    ) -> Self {
        Self {
            connector,
            remote: options.remote.clone(),
            tmp_path: options.tmp_path.clone(),
            metrics,
        }
    }

    /// Opens `target`. Remote targets are fully downloaded before this returns.
    pub fn fetch(&self, target: &FileTarget, cancel: &CancelToken) -> ScanResult<LineSource> {
        let source = match target.locality {
            Locality::Remote => self.fetch_remote(target, cancel)?,
            Locality::Local | Locality::ArchivedLocal => {
                let file = File::open(&target.path)
                    .map_err(|e| ScanError::from_io(&target.path, e))?;
                LineSource::from_reader(file, &target.path, target.compressed)?
            }
        };
        self.metrics.record_source(target.locality, source.is_gzip());
        Ok(source)
    }

    fn fetch_remote(&self, target: &FileTarget, cancel: &CancelToken) -> ScanResult<LineSource> {
        let endpoint = target.remote.as_ref().ok_or_else(|| {
            ScanError::config_error(format!("remote target {} has no endpoint", target.path.display()))
        })?;

        let downloaded = download_to_spool(
            self.connector.as_ref(),
            endpoint,
            &target.path,
            &self.remote,
            self.tmp_path.as_deref(),
            cancel,
        );
        let ((spool, bytes), attempts) = match downloaded {
            Ok(done) => done,
            Err((err, _)) if err.kind == RemoteErrorKind::Cancelled => {
                return Err(ScanError::Cancelled)
            }
            Err((err, attempts)) => {
                self.metrics.record_retries(attempts);
                return Err(ScanError::remote_fetch(
                    &endpoint.host,
                    &target.path,
                    attempts,
                    err,
                ));
            }
        };
        self.metrics.record_download(bytes, attempts);
        debug!(
            "Fetched {} from {} in {} attempt(s)",
            target.path.display(),
            endpoint.host,
            attempts
        );

        let file = spool
            .reopen()
            .map_err(|e| ScanError::from_io(spool.path(), e))?;
        Ok(LineSource::from_reader(file, &target.path, target.compressed)?.with_spool(spool))
    }
}
