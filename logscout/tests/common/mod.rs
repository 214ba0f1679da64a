#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use logscout::{
    CancelToken, RemoteConnector, RemoteCredentials, RemoteEndpoint, RemoteError, RemoteOptions,
    RemoteSession,
};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// What the mock host does when a file is requested
#[derive(Clone)]
pub enum RemoteFile {
    Serve(Vec<u8>),
    /// Every download attempt times out
    Timeout,
}

/// In-memory stand-in for an SSH host
#[derive(Default)]
pub struct MockConnector {
    files: Arc<HashMap<PathBuf, RemoteFile>>,
    cancel_on_download: Option<CancelToken>,
    pub connects: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        Arc::make_mut(&mut self.files).insert(PathBuf::from(path), RemoteFile::Serve(content.into()));
        self
    }

    pub fn timeout(mut self, path: &str) -> Self {
        Arc::make_mut(&mut self.files).insert(PathBuf::from(path), RemoteFile::Timeout);
        self
    }

    /// Trips `token` as soon as any file is downloaded
    pub fn cancel_on_download(mut self, token: CancelToken) -> Self {
        self.cancel_on_download = Some(token);
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl RemoteConnector for MockConnector {
    fn connect(
        &self,
        _endpoint: &RemoteEndpoint,
        _options: &RemoteOptions,
    ) -> Result<Box<dyn RemoteSession>, RemoteError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            files: Arc::clone(&self.files),
            cancel_on_download: self.cancel_on_download.clone(),
        }))
    }
}

struct MockSession {
    files: Arc<HashMap<PathBuf, RemoteFile>>,
    cancel_on_download: Option<CancelToken>,
}

impl RemoteSession for MockSession {
    fn list_dir(&mut self, dir: &Path) -> Result<Vec<String>, RemoteError> {
        let mut names: Vec<String> = self
            .files
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }

    fn download(&mut self, path: &Path, sink: &mut dyn Write) -> Result<u64, RemoteError> {
        match self.files.get(path) {
            Some(RemoteFile::Serve(content)) => {
                if let Some(token) = &self.cancel_on_download {
                    token.cancel();
                }
                sink.write_all(content)?;
                Ok(content.len() as u64)
            }
            Some(RemoteFile::Timeout) => Err(RemoteError::timeout("read timed out")),
            None => Err(RemoteError::not_found(format!(
                "no such file: {}",
                path.display()
            ))),
        }
    }
}

pub fn endpoint(host: &str) -> RemoteEndpoint {
    RemoteEndpoint {
        host: host.to_string(),
        port: 22,
        user: "logs".to_string(),
        credentials: RemoteCredentials::Agent,
    }
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("write to memory");
    encoder.finish().expect("finish gzip")
}

/// `count` lines of `ERROR <code>` cycling through `codes`
pub fn error_lines(codes: &[&str], count: usize) -> String {
    (0..count)
        .map(|n| format!("ERROR {} request {}\n", codes[n % codes.len()], n))
        .collect()
}
