use chrono::{Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use super::FileTarget;
use crate::config::{RemoteOptions, TargetsConfig};
use crate::errors::{ScanError, ScanResult};
use crate::scan::CancelToken;
use crate::source::remote::{with_retries, RemoteConnector, RemoteEndpoint};

/// Splits `app.log.3.gz` / `app.log-20240101.gz` into base name and rotation index
static ROTATION_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<base>.*?)(?:[.-](?P<index>\d+))?(?:\.gz)?$")
        .expect("rotation suffix regex is valid")
});

/// Expands a [`TargetsConfig`] into the ordered list of files to scan
pub struct PathResolver<'a> {
    connector: &'a dyn RemoteConnector,
    remote_options: &'a RemoteOptions,
}

impl<'a> PathResolver<'a> {
    /// `connector` is only used to list remote directories when a remote filename is a glob
    pub fn new(connector: &'a dyn RemoteConnector, remote_options: &'a RemoteOptions) -> Self {
        Self {
            connector,
            remote_options,
        }
    }

    /// Resolves targets. Fails only when the configuration itself is unusable.
    pub fn resolve(&self, config: &TargetsConfig) -> ScanResult<Vec<FileTarget>> {
        let default_path = config
            .default_path
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| ScanError::config_error("missing required key `default_path`"))?;
        let default_filename = config
            .default_filename
            .as_deref()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| ScanError::config_error("missing required key `default_filename`"))?;

        let level_host = config.level_host()?;
        let names: Vec<String> = if config.filenames.is_empty() {
            vec![compose_filename(
                default_filename,
                level_host,
                config.log_date.as_deref(),
            )]
        } else {
            config.filenames.clone()
        };

        let aged_out = match (config.log_date.as_deref(), config.days_before_archiving) {
            (Some(log_date), Some(days)) => {
                let today = Local::now().date_naive();
                logs_archived(log_date, days, today)?
            }
            _ => false,
        };
        let archive_dir = config.archive_path.as_deref().unwrap_or(default_path);

        let mut targets = if aged_out {
            debug!(
                "Logs dated {} are past the archiving threshold, reading {}",
                config.log_date.as_deref().unwrap_or_default(),
                archive_dir.display()
            );
            resolve_archive(archive_dir, &names)?
        } else if config.is_remote || level_host.is_some() {
            let endpoint = RemoteEndpoint::from_targets(config)?;
            self.resolve_remote(&endpoint, default_path, &names)?
        } else if config.is_archive {
            resolve_archive(archive_dir, &names)?
        } else {
            resolve_local(default_path, &names)?
        };

        if config.is_gzip {
            for target in &mut targets {
                target.compressed = true;
            }
        }

        if targets.is_empty() {
            warn!(
                "No files found for {} in {}",
                names.join(","),
                default_path.display()
            );
        } else {
            info!("Resolved {} file target(s)", targets.len());
        }
        Ok(targets)
    }

    fn resolve_remote(
        &self,
        endpoint: &RemoteEndpoint,
        dir: &Path,
        names: &[String],
    ) -> ScanResult<Vec<FileTarget>> {
        let mut targets = Vec::new();
        for name in names {
            let path = dir.join(name);
            if !is_glob(name) {
                targets.push(FileTarget::remote(endpoint.clone(), path));
                continue;
            }
            targets.extend(self.list_remote(endpoint, &path)?);
        }
        targets.sort_by(|a, b| a.path.cmp(&b.path));
        targets.dedup_by(|a, b| a.path == b.path);
        Ok(targets)
    }

    /// Lists the directory of a remote glob and keeps matching names.
    /// A listing failure degrades to one target for the raw pattern so that the
    /// failure is reported per file when it is fetched.
    fn list_remote(
        &self,
        endpoint: &RemoteEndpoint,
        pattern_path: &Path,
    ) -> ScanResult<Vec<FileTarget>> {
        let dir = pattern_path.parent().unwrap_or_else(|| Path::new("/"));
        let file_glob = pattern_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let matcher = glob::Pattern::new(&file_glob)
            .map_err(|e| ScanError::config_error(format!("bad filename glob '{}': {}", file_glob, e)))?;

        let listing = with_retries(self.remote_options, &CancelToken::new(), || {
            let mut session = self.connector.connect(endpoint, self.remote_options)?;
            session.list_dir(dir)
        });

        match listing {
            Ok((mut names, _)) => {
                names.retain(|name| matcher.matches(name));
                names.sort();
                debug!(
                    "Matched {} remote file(s) for {}:{}",
                    names.len(),
                    endpoint.host,
                    pattern_path.display()
                );
                Ok(names
                    .into_iter()
                    .map(|name| FileTarget::remote(endpoint.clone(), dir.join(name)))
                    .collect())
            }
            Err((err, attempts)) => {
                warn!(
                    "Could not list {}:{} after {} attempt(s): {}",
                    endpoint.host,
                    dir.display(),
                    attempts,
                    err
                );
                Ok(vec![FileTarget::remote(endpoint.clone(), pattern_path)])
            }
        }
    }
}

/// `app.log` + `box1` + `20240101` -> `app-box1-20240101.log`; absent parts are left out
fn compose_filename(filename: &str, host: Option<&str>, log_date: Option<&str>) -> String {
    if host.is_none() && log_date.is_none() {
        return filename.to_string();
    }
    let path = Path::new(filename);
    let mut name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    for part in [host, log_date].into_iter().flatten() {
        name.push('-');
        name.push_str(part);
    }
    if let Some(ext) = path.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    name
}

/// Whether a `YYYYMMDD` log date is more than `days` days before `today`.
/// Never true when `days` is 0.
fn logs_archived(log_date: &str, days: u32, today: NaiveDate) -> ScanResult<bool> {
    if days == 0 {
        return Ok(false);
    }
    let date = NaiveDate::parse_from_str(log_date, "%Y%m%d").map_err(|e| {
        ScanError::config_error(format!("`log_date` '{}' is not YYYYMMDD: {}", log_date, e))
    })?;
    Ok((today - date).num_days() > i64::from(days))
}

fn is_glob(name: &str) -> bool {
    name.contains(['*', '?', '['])
}

fn glob_files(pattern: &Path) -> ScanResult<Vec<PathBuf>> {
    let pattern = pattern.to_string_lossy();
    let entries = glob::glob(&pattern)
        .map_err(|e| ScanError::config_error(format!("bad path pattern '{}': {}", pattern, e)))?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable path {}: {}", e.path().display(), e),
        }
    }
    Ok(files)
}

fn resolve_local(dir: &Path, names: &[String]) -> ScanResult<Vec<FileTarget>> {
    let mut files = Vec::new();
    for name in names {
        files.extend(glob_files(&dir.join(name))?);
    }
    files.sort();
    files.dedup();
    Ok(files.into_iter().map(FileTarget::local).collect())
}

fn resolve_archive(dir: &Path, names: &[String]) -> ScanResult<Vec<FileTarget>> {
    let mut files = Vec::new();
    for name in names {
        files.extend(glob_files(&dir.join(format!("{}*", name)))?);
    }
    files.sort();
    files.dedup();

    let mut keyed: Vec<_> = files
        .into_iter()
        .map(|path| (archive_sort_key(&path), path))
        .collect();
    keyed.sort();
    Ok(keyed
        .into_iter()
        .map(|(_, path)| FileTarget::archived(path))
        .collect())
}

/// (base name, rotation index, full name, mtime): `app.log.2` sorts before `app.log.10`
fn archive_sort_key(path: &Path) -> (String, u64, String, SystemTime) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (base, index) = match ROTATION_SUFFIX.captures(&name) {
        Some(caps) => (
            caps.name("base").map_or(name.as_str(), |m| m.as_str()).to_string(),
            caps.name("index")
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0),
        ),
        None => (name.clone(), 0),
    };
    let mtime = path
        .metadata()
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH);
    (base, index, name, mtime)
}
