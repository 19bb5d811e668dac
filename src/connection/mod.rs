//! Connection layer for remote host communication.
//!
//! One [`Connection`] trait abstracts command execution and file transfer
//! across the three transports: local process spawn, SSH (russh + SFTP),
//! and WinRM (PowerShell remoting over WS-Man). Every operation is async;
//! the WinRM transport offloads its CPU-heavy chunk staging to the blocking
//! pool so the API stays uniformly suspending.

pub mod local;
pub mod ssh;
pub mod winrm;

use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::inventory::{Host, Transport};

/// Errors raised by connection operations.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The host could not be reached at all. Hosts failing this way are
    /// isolated from the remainder of the play.
    #[error("Host unreachable: {0}")]
    Unreachable(String),

    /// Authentication was rejected.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Command dispatch failed (distinct from a non-zero exit code).
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    /// File upload or download failed.
    #[error("File transfer failed: {0}")]
    TransferFailed(String),

    /// The connection was used before `connect` or after `close`.
    #[error("Connection closed")]
    Closed,

    /// The transport cannot perform the requested operation.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// I/O error during connection operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for connection operations.
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

/// Outcome of running a remote command.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    /// Exit code (124 for a timed-out command)
    pub rc: i32,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl RunResult {
    /// True when the command exited zero.
    pub fn success(&self) -> bool {
        self.rc == 0
    }

    /// The synthetic result produced when a command exceeds its timeout.
    pub fn timed_out() -> Self {
        Self {
            rc: 124,
            stdout: String::new(),
            stderr: "Command timed out".to_string(),
        }
    }
}

/// Options for a remote command.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Run through the platform shell (default). When false the command is
    /// split and executed directly (POSIX) or wrapped in `cmd.exe /c`
    /// (Windows).
    pub shell: bool,
    /// Per-call timeout in seconds
    pub timeout: Option<u64>,
    /// Working directory
    pub cwd: Option<String>,
    /// Environment variables
    pub env: IndexMap<String, String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            shell: true,
            timeout: None,
            cwd: None,
            env: IndexMap::new(),
        }
    }
}

impl RunOptions {
    /// Options with `shell` disabled.
    pub fn no_shell() -> Self {
        Self {
            shell: false,
            ..Default::default()
        }
    }
}

/// Remote file metadata, `None`-able at the call site when the path does
/// not exist.
#[derive(Debug, Clone, Default)]
pub struct RemoteStat {
    pub isfile: bool,
    pub isdir: bool,
    pub islink: bool,
    pub size: u64,
    pub mtime: i64,
    /// Permission bits (POSIX transports; zero on Windows)
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

/// Uniform capability over the three transports.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Inventory name of the host this connection belongs to.
    fn host_name(&self) -> &str;

    /// The transport variant.
    fn transport(&self) -> Transport;

    /// Establishes the connection. Idempotent.
    async fn connect(&self) -> ConnectionResult<()>;

    /// Closes the connection. Idempotent, best-effort.
    async fn close(&self) -> ConnectionResult<()>;

    /// Runs a command, honoring shell/cwd/env/timeout options. A timeout
    /// yields the synthetic `rc=124` result rather than an error.
    async fn run(&self, command: &str, options: &RunOptions) -> ConnectionResult<RunResult>;

    /// Uploads a local file.
    async fn put(&self, local: &Path, remote: &str, mode: Option<u32>) -> ConnectionResult<()>;

    /// Writes bytes to a remote file.
    async fn put_content(
        &self,
        content: &[u8],
        remote: &str,
        mode: Option<u32>,
    ) -> ConnectionResult<()>;

    /// Downloads a remote file.
    async fn get(&self, remote: &str, local: &Path) -> ConnectionResult<()>;

    /// Reads a remote file into memory.
    async fn get_content(&self, remote: &str) -> ConnectionResult<Vec<u8>>;

    /// Creates a directory (and parents).
    async fn mkdir(&self, remote: &str, mode: Option<u32>) -> ConnectionResult<()>;

    /// Stats a remote path; `Ok(None)` when it does not exist.
    async fn stat(&self, remote: &str) -> ConnectionResult<Option<RemoteStat>>;
}

/// Builds the connection variant for a host per `ansible_connection`.
/// The connection is not yet established.
pub fn create_connection(host: &Host) -> Arc<dyn Connection> {
    match host.transport() {
        Transport::Local => Arc::new(local::LocalConnection::new(&host.name)),
        Transport::Ssh => Arc::new(ssh::SshConnection::from_host(host)),
        Transport::WinRm => Arc::new(winrm::WinRmConnection::from_host(host)),
    }
}

/// Runner-owned cache of live connections, keyed by host name.
///
/// Insertions happen during task execution; the cache is shared across the
/// scheduler's host coroutines and serialized by its internal lock.
#[derive(Default)]
pub struct ConnectionCache {
    inner: Mutex<HashMap<String, Arc<dyn Connection>>>,
}

impl ConnectionCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached connection for a host, creating and connecting
    /// one when absent. Only successfully connected entries are cached.
    pub async fn get_or_connect(&self, host: &Host) -> ConnectionResult<Arc<dyn Connection>> {
        {
            let cache = self.inner.lock().await;
            if let Some(conn) = cache.get(&host.name) {
                return Ok(conn.clone());
            }
        }

        let conn = create_connection(host);
        conn.connect().await?;
        debug!(host = %host.name, "Connection established");

        let mut cache = self.inner.lock().await;
        let entry = cache.entry(host.name.clone()).or_insert_with(|| conn.clone());
        Ok(entry.clone())
    }

    /// Best-effort close of every cached connection.
    pub async fn close_all(&self) {
        let connections: Vec<Arc<dyn Connection>> = {
            let mut cache = self.inner.lock().await;
            cache.drain().map(|(_, c)| c).collect()
        };
        for conn in connections {
            if let Err(e) = conn.close().await {
                debug!(host = %conn.host_name(), error = %e, "Error closing connection");
            }
        }
    }
}

/// Quotes a string for POSIX shell use.
pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_result_flags() {
        assert!(RunResult { rc: 0, ..Default::default() }.success());
        assert!(!RunResult::timed_out().success());
        assert_eq!(RunResult::timed_out().rc, 124);
        assert_eq!(RunResult::timed_out().stderr, "Command timed out");
    }

    #[test]
    fn default_options_use_shell() {
        assert!(RunOptions::default().shell);
        assert!(!RunOptions::no_shell().shell);
    }

    #[test]
    fn shell_quoting() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), "'it'\"'\"'s'");
    }
}
