use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::config::{ScanConfig, TargetsConfig};
use crate::errors::ScanResult;
use crate::registry::{RegexRegistry, RegexSpec};
use crate::results::ScanReport;
use crate::scan::{CancelToken, ParallelScheduler};
use crate::source::remote::{RemoteConnector, SshConnector};
use crate::targets::{FileTarget, PathResolver};

/// A configured scanner: patterns, target description and execution options.
///
/// ```rust,no_run
/// use logscout::{RegexSpec, ScanConfig, Scanner, TargetsConfig};
///
/// let config = ScanConfig {
///     targets: TargetsConfig::local("/var/log/myapp", "app.log"),
///     ..Default::default()
/// };
/// let errors = RegexSpec::new("error", r"ERROR (?P<code>\d+)")?;
/// let scanner = Scanner::new(config, vec![errors])?;
///
/// let report = scanner.scan()?;
/// println!("500s: {}", report.aggregate.count("error", "code", "500"));
/// # Ok::<(), logscout::ScanError>(())
/// ```
pub struct Scanner {
    config: ScanConfig,
    registry: RegexRegistry,
    connector: Arc<dyn RemoteConnector>,
}

impl Scanner {
    /// Registers the config's patterns, then `specs`. Any duplicate or invalid pattern fails.
    pub fn new(config: ScanConfig, specs: Vec<RegexSpec>) -> ScanResult<Self> {
        let mut registry = RegexRegistry::new();
        for pattern in &config.patterns {
            registry.register(&pattern.name, &pattern.pattern)?;
        }
        for spec in specs {
            registry.insert(spec)?;
        }
        Ok(Self {
            config,
            registry,
            connector: Arc::new(SshConnector),
        })
    }

    /// Replaces the SSH connector used for remote targets
    pub fn with_connector(mut self, connector: Arc<dyn RemoteConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn registry(&self) -> &RegexRegistry {
        &self.registry
    }

    /// Adds a pattern for subsequent scans
    pub fn register_pattern(&mut self, name: impl Into<String>, pattern: &str) -> ScanResult<()> {
        self.registry.register(name, pattern)
    }

    pub fn resolve_targets(&self, targets: &TargetsConfig) -> ScanResult<Vec<FileTarget>> {
        PathResolver::new(self.connector.as_ref(), &self.config.scanner.remote).resolve(targets)
    }

    /// Scans the configured targets
    pub fn scan(&self) -> ScanResult<ScanReport> {
        self.scan_config(&self.config.targets)
    }

    pub fn scan_config(&self, targets: &TargetsConfig) -> ScanResult<ScanReport> {
        self.scan_with_cancel(targets, &CancelToken::new())
    }

    pub fn scan_with_cancel(
        &self,
        targets: &TargetsConfig,
        cancel: &CancelToken,
    ) -> ScanResult<ScanReport> {
        let targets = self.resolve_targets(targets)?;
        self.scan_targets(targets, cancel)
    }

    /// Scans already-resolved targets with a snapshot of the current patterns
    pub fn scan_targets(
        &self,
        targets: Vec<FileTarget>,
        cancel: &CancelToken,
    ) -> ScanResult<ScanReport> {
        info!(
            "Starting scan of {} file(s) with {} pattern(s)",
            targets.len(),
            self.registry.len()
        );
        let scheduler = ParallelScheduler::new(
            self.registry.snapshot(),
            Arc::clone(&self.connector),
            &self.config.scanner,
        );
        scheduler.run(targets, cancel)
    }
}

impl fmt::Debug for Scanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scanner")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
