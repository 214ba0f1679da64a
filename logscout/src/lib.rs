pub mod config;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod results;
pub mod scan;
pub mod scanner;
pub mod source;
pub mod targets;

pub use config::{
    EncodingMode, PatternConfig, RemoteOptions, ScanConfig, ScannerOptions, TargetsConfig,
};
pub use errors::{ErrorKind, ScanError, ScanResult};
pub use metrics::ScanMetrics;
pub use registry::{RegexRegistry, RegexSpec, RegistrySnapshot};
pub use results::{FileOutcome, FileStats, GroupSummary, MatchedLine, RegexStats, ScanReport};
pub use scan::{AggregateStats, CancelToken};
pub use scanner::Scanner;
pub use source::remote::{
    RemoteConnector, RemoteCredentials, RemoteEndpoint, RemoteError, RemoteSession,
};
pub use targets::{FileIdentity, FileTarget, Locality};
