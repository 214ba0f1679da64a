use config::{Config as ConfigBuilder, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{ScanError, ScanResult};

/// Top-level configuration for a scanner.
///
/// # Configuration Locations
///
/// Configuration is layered from, in increasing precedence:
/// 1. Global `$CONFIG_DIR/logscout/config.yaml`
/// 2. Local `.logscout.yaml` in the current directory
/// 3. A file given explicitly (the CLI `--config` flag)
///
/// # Configuration Format
///
/// ```yaml
/// targets:
///   default_path: /var/log/myapp
///   default_filename: app.log
///   is_archive: true
///   archive_path: /mnt/archive/myapp
///
/// patterns:
///   - name: error
///     pattern: 'ERROR (?P<code>\d+)'
///   - name: slow
///     pattern: 'took (?P<ms>\d{4,})ms'
///
/// scanner:
///   max_concurrency: 8
///   encoding_mode: skip
///   remote:
///     connect_timeout: 10s
///     max_retries: 2
/// ```
///
/// Unknown keys are ignored everywhere. Required target keys are checked when targets are
/// resolved, not when the file is loaded, so a config file may carry only scanner options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Where the log files live
    #[serde(default)]
    pub targets: TargetsConfig,

    /// Named patterns registered before any programmatic ones
    #[serde(default)]
    pub patterns: Vec<PatternConfig>,

    /// Execution options
    #[serde(default)]
    pub scanner: ScannerOptions,
}

/// A named pattern as written in a config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternConfig {
    pub name: String,
    pub pattern: String,
}

/// Declarative description of the files to scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetsConfig {
    /// Directory holding the live log files (required)
    #[serde(default)]
    pub default_path: Option<PathBuf>,

    /// Log file name; glob wildcards are allowed (required)
    #[serde(default)]
    pub default_filename: Option<String>,

    /// Read rotated/compressed archive members instead of the live file
    #[serde(default)]
    pub is_archive: bool,

    /// Directory holding archived files; defaults to `default_path`
    #[serde(default)]
    pub archive_path: Option<PathBuf>,

    /// Fetch files from `remote_host` over SSH
    #[serde(default)]
    pub is_remote: bool,

    #[serde(default)]
    pub remote_host: Option<String>,

    #[serde(default)]
    pub remote_port: Option<u16>,

    #[serde(default)]
    pub remote_user: Option<String>,

    /// `agent`, `password:<secret>` or `key:<path>`
    #[serde(default)]
    pub remote_credentials: Option<String>,

    /// Treat every resolved file as gzip-compressed
    #[serde(default)]
    pub is_gzip: bool,

    /// Date tag appended to the file stem: `app.log` becomes `app-<log_date>.log`
    #[serde(default)]
    pub log_date: Option<String>,

    /// Explicit file names or globs used instead of `default_filename`
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Days a dated log stays in `default_path`. A `log_date` older than this is read from
    /// `archive_path`; unset or 0 disables date routing.
    #[serde(default)]
    pub days_before_archiving: Option<u32>,

    /// Environment name looked up in `levels_to_boxes` to pick the host holding the logs
    #[serde(default)]
    pub level: Option<String>,

    #[serde(default)]
    pub levels_to_boxes: BTreeMap<String, String>,
}

impl TargetsConfig {
    /// A local target set rooted at `path` matching `filename`
    pub fn local(path: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            default_path: Some(path.into()),
            default_filename: Some(filename.into()),
            ..Default::default()
        }
    }

    /// Overlays explicitly set values from `overrides` (typically CLI flags) onto `self`
    pub fn merge(mut self, overrides: TargetsConfig) -> Self {
        if overrides.default_path.is_some() {
            self.default_path = overrides.default_path;
        }
        if overrides.default_filename.is_some() {
            self.default_filename = overrides.default_filename;
        }
        if overrides.archive_path.is_some() {
            self.archive_path = overrides.archive_path;
        }
        if overrides.remote_host.is_some() {
            self.remote_host = overrides.remote_host;
        }
        if overrides.remote_port.is_some() {
            self.remote_port = overrides.remote_port;
        }
        if overrides.remote_user.is_some() {
            self.remote_user = overrides.remote_user;
        }
        if overrides.remote_credentials.is_some() {
            self.remote_credentials = overrides.remote_credentials;
        }
        if overrides.log_date.is_some() {
            self.log_date = overrides.log_date;
        }
        if !overrides.filenames.is_empty() {
            self.filenames = overrides.filenames;
        }
        if overrides.days_before_archiving.is_some() {
            self.days_before_archiving = overrides.days_before_archiving;
        }
        if overrides.level.is_some() {
            self.level = overrides.level;
        }
        self.levels_to_boxes.extend(overrides.levels_to_boxes);
        self.is_archive |= overrides.is_archive;
        self.is_remote |= overrides.is_remote;
        self.is_gzip |= overrides.is_gzip;
        self
    }

    /// Host mapped to `level`, if a level is set
    pub fn level_host(&self) -> ScanResult<Option<&str>> {
        let Some(level) = self.level.as_deref() else {
            return Ok(None);
        };
        self.levels_to_boxes
            .get(level)
            .map(|host| Some(host.as_str()))
            .ok_or_else(|| {
                ScanError::config_error(format!(
                    "no entry for level '{}' in `levels_to_boxes`",
                    level
                ))
            })
    }
}

/// How undecodable lines are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Skip lines that are not valid UTF-8 and count them as decode errors
    #[default]
    Skip,
    /// Replace invalid sequences with U+FFFD and scan the line anyway
    Lossy,
}

/// Options controlling how a scan executes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerOptions {
    /// Upper bound on concurrently scanned files
    /// Defaults to the number of CPU cores
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: NonZeroUsize,

    #[serde(default)]
    pub encoding_mode: EncodingMode,

    /// Cap on retained matching lines per regex per file; `None` keeps all
    #[serde(default)]
    pub max_retained_lines: Option<usize>,

    /// Directory for remote spools; the system temp dir when unset
    #[serde(default)]
    pub tmp_path: Option<PathBuf>,

    /// Draw a progress bar on stderr while scanning
    #[serde(default)]
    pub show_progress: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub remote: RemoteOptions,
}

impl Default for ScannerOptions {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            encoding_mode: EncodingMode::default(),
            max_retained_lines: None,
            tmp_path: None,
            show_progress: false,
            log_level: default_log_level(),
            remote: RemoteOptions::default(),
        }
    }
}

/// Timeouts and retry policy for remote fetches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOptions {
    #[serde(default = "default_connect_timeout", with = "duration_str")]
    pub connect_timeout: Duration,

    /// Bounds the SSH handshake and authentication
    #[serde(default = "default_auth_timeout", with = "duration_str")]
    pub auth_timeout: Duration,

    /// Bounds each blocking read during the SFTP transfer
    #[serde(default = "default_transfer_timeout", with = "duration_str")]
    pub transfer_timeout: Duration,

    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry; doubled for each further retry
    #[serde(default = "default_retry_backoff", with = "duration_str")]
    pub retry_backoff: Duration,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            auth_timeout: default_auth_timeout(),
            transfer_timeout: default_transfer_timeout(),
            max_retries: default_max_retries(),
            retry_backoff: default_retry_backoff(),
        }
    }
}

fn default_max_concurrency() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_auth_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_transfer_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff() -> Duration {
    Duration::from_millis(500)
}

/// Human-readable durations such as `"30s"` or `"1m 30s"`
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

impl ScanConfig {
    /// Loads configuration from the default locations
    pub fn load() -> ScanResult<Self> {
        Self::load_from(None)
    }

    /// Loads configuration from the default locations plus a specific file.
    /// The specific file must exist; the default locations are optional.
    pub fn load_from(config_path: Option<&Path>) -> ScanResult<Self> {
        let mut builder = ConfigBuilder::builder();

        let default_files = [
            dirs::config_dir().map(|p| p.join("logscout/config.yaml")),
            Some(PathBuf::from(".logscout.yaml")),
        ];
        for path in default_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Parses configuration from YAML text
    pub fn from_yaml_str(yaml: &str) -> ScanResult<Self> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_config_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let config_content = r#"
targets:
  default_path: /var/log/myapp
  default_filename: app.log
  is_archive: true
  is_gzip: true
patterns:
  - name: error
    pattern: 'ERROR (?P<code>\d+)'
scanner:
  max_concurrency: 4
  encoding_mode: lossy
  max_retained_lines: 100
  log_level: debug
  remote:
    connect_timeout: 5s
    max_retries: 1
"#;
        fs::write(&config_path, config_content).unwrap();

        let config = ScanConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(
            config.targets.default_path,
            Some(PathBuf::from("/var/log/myapp"))
        );
        assert_eq!(config.targets.default_filename.as_deref(), Some("app.log"));
        assert!(config.targets.is_archive);
        assert!(config.targets.is_gzip);
        assert!(!config.targets.is_remote);
        assert_eq!(config.patterns.len(), 1);
        assert_eq!(config.patterns[0].name, "error");
        assert_eq!(config.scanner.max_concurrency.get(), 4);
        assert_eq!(config.scanner.encoding_mode, EncodingMode::Lossy);
        assert_eq!(config.scanner.max_retained_lines, Some(100));
        assert_eq!(config.scanner.log_level, "debug");
        assert_eq!(config.scanner.remote.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.scanner.remote.max_retries, 1);
        // Untouched remote fields keep their defaults
        assert_eq!(
            config.scanner.remote.transfer_timeout,
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_default_values() {
        let config = ScanConfig::from_yaml_str("targets:\n  default_path: /tmp\n").unwrap();
        assert_eq!(config.targets.default_filename, None);
        assert!(config.patterns.is_empty());
        assert_eq!(config.scanner.encoding_mode, EncodingMode::Skip);
        assert_eq!(config.scanner.max_retained_lines, None);
        assert_eq!(
            config.scanner.max_concurrency,
            NonZeroUsize::new(num_cpus::get()).unwrap()
        );
        assert_eq!(config.scanner.log_level, "warn");
        assert_eq!(config.scanner.remote, RemoteOptions::default());
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let yaml = r#"
targets:
  default_path: /var/log
  default_filename: app.log
  flavour: vanilla
colour: blue
"#;
        let config = ScanConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.targets, TargetsConfig::local("/var/log", "app.log"));
    }

    #[test]
    fn test_archiving_and_levels() {
        let yaml = r#"
targets:
  default_path: /var/log
  default_filename: app.log
  days_before_archiving: 7
  level: prod
  levels_to_boxes:
    prod: box1
    sandbox: box9
"#;
        let config = ScanConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.targets.days_before_archiving, Some(7));
        assert_eq!(config.targets.level_host().unwrap(), Some("box1"));

        let overrides = TargetsConfig {
            level: Some("sandbox".to_string()),
            ..Default::default()
        };
        let merged = config.targets.clone().merge(overrides);
        assert_eq!(merged.level_host().unwrap(), Some("box9"));
        assert_eq!(merged.days_before_archiving, Some(7));

        let unmapped = TargetsConfig {
            level: Some("staging".to_string()),
            ..config.targets
        };
        assert!(matches!(
            unmapped.level_host(),
            Err(ScanError::Configuration(ref m)) if m.contains("staging")
        ));
        assert_eq!(TargetsConfig::default().level_host().unwrap(), None);
    }

    #[test]
    fn test_invalid_config() {
        let yaml = r#"
scanner:
  max_concurrency: "many"
  remote:
    connect_timeout: "soon"
"#;
        assert!(ScanConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ScanConfig::load_from(Some(Path::new("nonexistent.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_with_overrides() {
        let file_targets = TargetsConfig {
            remote_user: Some("logs".to_string()),
            filenames: vec!["old.log".to_string()],
            ..TargetsConfig::local("/var/log", "app.log")
        };
        let cli_targets = TargetsConfig {
            default_filename: Some("worker.log".to_string()),
            is_gzip: true,
            ..Default::default()
        };

        let merged = file_targets.merge(cli_targets);
        assert_eq!(merged.default_path, Some(PathBuf::from("/var/log"))); // File value
        assert_eq!(merged.default_filename.as_deref(), Some("worker.log")); // CLI value
        assert_eq!(merged.remote_user.as_deref(), Some("logs")); // File value
        assert_eq!(merged.filenames, vec!["old.log".to_string()]); // CLI empty
        assert!(merged.is_gzip); // CLI value
    }
}
