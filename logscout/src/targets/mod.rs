mod resolver;

pub use resolver::PathResolver;

use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::source::remote::RemoteEndpoint;

/// Where a file is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Locality {
    Local,
    ArchivedLocal,
    Remote,
}

/// Identity of a resolved file; the key for per-file results
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileIdentity {
    pub locality: Locality,
    pub host: Option<String>,
    pub path: PathBuf,
}

impl FileIdentity {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            locality: Locality::Local,
            host: None,
            path: path.into(),
        }
    }
}

/// `path` for live files, `archive:path` for archive members and `host:path` for remote
/// files, so that no two distinct identities render the same
impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.host, self.locality) {
            (Some(host), _) => write!(f, "{}:{}", host, self.path.display()),
            (None, Locality::ArchivedLocal) => write!(f, "archive:{}", self.path.display()),
            (None, _) => write!(f, "{}", self.path.display()),
        }
    }
}

impl Serialize for FileIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One file to scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTarget {
    pub locality: Locality,
    pub path: PathBuf,
    /// Hint that the content is gzip-compressed; the magic bytes decide
    pub compressed: bool,
    pub remote: Option<RemoteEndpoint>,
}

impl FileTarget {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            locality: Locality::Local,
            compressed: has_gzip_suffix(&path),
            path,
            remote: None,
        }
    }

    pub fn archived(path: impl Into<PathBuf>) -> Self {
        Self {
            locality: Locality::ArchivedLocal,
            ..Self::local(path)
        }
    }

    pub fn remote(endpoint: RemoteEndpoint, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            locality: Locality::Remote,
            compressed: has_gzip_suffix(&path),
            path,
            remote: Some(endpoint),
        }
    }

    pub fn identity(&self) -> FileIdentity {
        FileIdentity {
            locality: self.locality,
            host: self.remote.as_ref().map(|r| r.host.clone()),
            path: self.path.clone(),
        }
    }
}

fn has_gzip_suffix(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}
