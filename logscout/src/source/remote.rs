use ssh2::{ErrorCode, Session, Sftp};
use std::fmt;
use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{RemoteOptions, TargetsConfig};
use crate::errors::{ScanError, ScanResult};
use crate::scan::CancelToken;

const DEFAULT_SSH_PORT: u16 = 22;

/// How often a backoff sleep checks for cancellation
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

// libssh2 error codes treated as transient
const LIBSSH2_ERROR_SOCKET_SEND: i32 = -7;
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
const LIBSSH2_ERROR_SOCKET_TIMEOUT: i32 = -30;
const LIBSSH2_ERROR_EAGAIN: i32 = -37;
const LIBSSH2_ERROR_SOCKET_RECV: i32 = -43;
const LIBSSH2_FX_NO_SUCH_FILE: i32 = 2;

/// How to authenticate against a remote host
#[derive(Clone, PartialEq, Eq)]
pub enum RemoteCredentials {
    /// Keys offered by a running ssh-agent
    Agent,
    Password(String),
    KeyFile(PathBuf),
}

impl fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteCredentials::Agent => f.write_str("Agent"),
            RemoteCredentials::Password(_) => f.write_str("Password(****)"),
            RemoteCredentials::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
        }
    }
}

impl FromStr for RemoteCredentials {
    type Err = ScanError;

    /// Parses `agent`, `password:<secret>` or `key:<path>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            None if s.eq_ignore_ascii_case("agent") => Ok(RemoteCredentials::Agent),
            Some(("password", secret)) => Ok(RemoteCredentials::Password(secret.to_string())),
            Some(("key", path)) if !path.is_empty() => {
                Ok(RemoteCredentials::KeyFile(PathBuf::from(path)))
            }
            _ => Err(ScanError::config_error(
                "remote_credentials must be `agent`, `password:<secret>` or `key:<path>`",
            )),
        }
    }
}

/// Host, port, user and credentials of a remote log box
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub credentials: RemoteCredentials,
}

impl RemoteEndpoint {
    /// Builds an endpoint from the remote keys of a targets config.
    /// The host falls back to the box mapped to `level`, the user to the current login name.
    pub fn from_targets(config: &TargetsConfig) -> ScanResult<Self> {
        let host = match config.remote_host.as_deref().filter(|h| !h.is_empty()) {
            Some(host) => host.to_string(),
            None => config
                .level_host()?
                .map(str::to_string)
                .ok_or_else(|| ScanError::config_error("`is_remote` requires `remote_host`"))?,
        };
        let user = config
            .remote_user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .ok_or_else(|| ScanError::config_error("`is_remote` requires `remote_user`"))?;
        let credentials = match &config.remote_credentials {
            Some(raw) => raw.parse()?,
            None => RemoteCredentials::Agent,
        };
        Ok(Self {
            host,
            port: config.remote_port.unwrap_or(DEFAULT_SSH_PORT),
            user,
            credentials,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    Timeout,
    NotAuthenticated,
    Connect,
    NotFound,
    Protocol,
    LocalIo,
    Cancelled,
}

/// A failure talking to a remote host
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Timeout, message)
    }

    pub fn not_authenticated(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotAuthenticated, message)
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Connect, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotFound, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Protocol, message)
    }

    /// Worth retrying: the host may answer on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            RemoteErrorKind::Timeout | RemoteErrorKind::NotAuthenticated | RemoteErrorKind::Connect
        )
    }
}

impl From<io::Error> for RemoteError {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => RemoteErrorKind::Timeout,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe => RemoteErrorKind::Connect,
            io::ErrorKind::NotFound => RemoteErrorKind::NotFound,
            _ => RemoteErrorKind::Protocol,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<ssh2::Error> for RemoteError {
    fn from(err: ssh2::Error) -> Self {
        let kind = match err.code() {
            ErrorCode::Session(
                LIBSSH2_ERROR_TIMEOUT | LIBSSH2_ERROR_SOCKET_TIMEOUT | LIBSSH2_ERROR_EAGAIN,
            ) => RemoteErrorKind::Timeout,
            ErrorCode::Session(LIBSSH2_ERROR_SOCKET_SEND | LIBSSH2_ERROR_SOCKET_RECV) => {
                RemoteErrorKind::Connect
            }
            ErrorCode::SFTP(LIBSSH2_FX_NO_SUCH_FILE) => RemoteErrorKind::NotFound,
            _ => RemoteErrorKind::Protocol,
        };
        Self::new(kind, err.message().to_string())
    }
}

/// Opens authenticated sessions to remote hosts
pub trait RemoteConnector: Send + Sync {
    fn connect(
        &self,
        endpoint: &RemoteEndpoint,
        options: &RemoteOptions,
    ) -> Result<Box<dyn RemoteSession>, RemoteError>;
}

/// An open, authenticated session
pub trait RemoteSession {
    /// Names of the regular files in `dir`
    fn list_dir(&mut self, dir: &Path) -> Result<Vec<String>, RemoteError>;

    /// Streams the file at `path` into `sink`, returning the number of bytes copied
    fn download(&mut self, path: &Path, sink: &mut dyn Write) -> Result<u64, RemoteError>;
}

/// Runs `op` until it succeeds, fails permanently, or transient retries are exhausted.
/// Returns the value with the number of attempts made, or the last error with the same count.
pub fn with_retries<T>(
    options: &RemoteOptions,
    cancel: &CancelToken,
    mut op: impl FnMut() -> Result<T, RemoteError>,
) -> Result<(T, u32), (RemoteError, u32)> {
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err((
                RemoteError::new(RemoteErrorKind::Cancelled, "cancelled"),
                attempt,
            ));
        }
        attempt += 1;
        match op() {
            Ok(value) => return Ok((value, attempt)),
            Err(err) if err.is_transient() && attempt <= options.max_retries => {
                let delay = backoff_delay(options.retry_backoff, attempt);
                warn!(
                    "Attempt {} failed ({}), retrying in {:?}",
                    attempt, err, delay
                );
                sleep_unless_cancelled(delay, cancel);
            }
            Err(err) => return Err((err, attempt)),
        }
    }
}

/// Sleeps for `delay` in short slices, waking early once `cancel` trips
fn sleep_unless_cancelled(delay: Duration, cancel: &CancelToken) {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        std::thread::sleep(remaining.min(CANCEL_POLL_INTERVAL));
    }
}

/// `base * 2^(attempt - 1)`, saturating
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
}

/// Downloads a remote file into a fresh temporary file, retrying transient failures.
/// A failed attempt's partial spool is dropped (and deleted) before the next attempt.
pub(crate) fn download_to_spool(
    connector: &dyn RemoteConnector,
    endpoint: &RemoteEndpoint,
    path: &Path,
    options: &RemoteOptions,
    tmp_dir: Option<&Path>,
    cancel: &CancelToken,
) -> Result<((NamedTempFile, u64), u32), (RemoteError, u32)> {
    with_retries(options, cancel, || {
        let mut builder = tempfile::Builder::new();
        builder.prefix("logscout-");
        let spool = match tmp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        let mut spool = spool.map_err(|e| {
            RemoteError::new(RemoteErrorKind::LocalIo, format!("cannot create spool: {}", e))
        })?;

        let mut session = connector.connect(endpoint, options)?;
        let bytes = session.download(path, spool.as_file_mut())?;
        spool.as_file_mut().flush()?;
        debug!(
            "Spooled {} bytes from {}:{} to {}",
            bytes,
            endpoint.host,
            path.display(),
            spool.path().display()
        );
        Ok((spool, bytes))
    })
}

/// SSH/SFTP connector backed by libssh2
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

impl RemoteConnector for SshConnector {
    fn connect(
        &self,
        endpoint: &RemoteEndpoint,
        options: &RemoteOptions,
    ) -> Result<Box<dyn RemoteSession>, RemoteError> {
        let addr = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| RemoteError::connect(format!("no address for {}", endpoint.host)))?;

        let tcp = TcpStream::connect_timeout(&addr, options.connect_timeout)?;
        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.set_timeout(millis(options.auth_timeout));
        session.handshake()?;

        match &endpoint.credentials {
            RemoteCredentials::Agent => session.userauth_agent(&endpoint.user)?,
            RemoteCredentials::Password(secret) => {
                session.userauth_password(&endpoint.user, secret)?
            }
            RemoteCredentials::KeyFile(key) => {
                session.userauth_pubkey_file(&endpoint.user, None, key, None)?
            }
        }
        if !session.authenticated() {
            return Err(RemoteError::not_authenticated(format!(
                "{}@{} not authenticated",
                endpoint.user, endpoint.host
            )));
        }

        session.set_timeout(millis(options.transfer_timeout));
        let sftp = session.sftp()?;
        debug!("Opened SFTP session to {}@{}", endpoint.user, endpoint.host);
        Ok(Box::new(SshSession {
            sftp,
            _session: session,
        }))
    }
}

fn millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

struct SshSession {
    sftp: Sftp,
    _session: Session,
}

impl RemoteSession for SshSession {
    fn list_dir(&mut self, dir: &Path) -> Result<Vec<String>, RemoteError> {
        Ok(self
            .sftp
            .readdir(dir)?
            .into_iter()
            .filter(|(_, stat)| stat.is_file())
            .filter_map(|(path, _)| {
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .collect())
    }

    fn download(&mut self, path: &Path, sink: &mut dyn Write) -> Result<u64, RemoteError> {
        let mut file = self.sftp.open(path)?;
        Ok(io::copy(&mut file, sink)?)
    }
}
