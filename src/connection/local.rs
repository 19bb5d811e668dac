//! Local connection: direct process spawn on the control node.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, trace};

use super::{
    Connection, ConnectionError, ConnectionResult, RemoteStat, RunOptions, RunResult,
};
use crate::inventory::Transport;

/// Executes commands and file operations on the local machine.
#[derive(Debug, Clone)]
pub struct LocalConnection {
    host_name: String,
}

impl LocalConnection {
    /// Creates a local connection for the named inventory host.
    pub fn new(host_name: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
        }
    }

    fn build_command(&self, command: &str, options: &RunOptions) -> ConnectionResult<Command> {
        let mut cmd = if options.shell {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command);
            c
        } else {
            let args = shell_words::split(command).map_err(|e| {
                ConnectionError::ExecutionFailed(format!("Cannot split command: {}", e))
            })?;
            let (program, rest) = args.split_first().ok_or_else(|| {
                ConnectionError::ExecutionFailed("Empty command".to_string())
            })?;
            let mut c = Command::new(program);
            c.args(rest);
            c
        };

        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &options.env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

#[async_trait]
impl Connection for LocalConnection {
    fn host_name(&self) -> &str {
        &self.host_name
    }

    fn transport(&self) -> Transport {
        Transport::Local
    }

    async fn connect(&self) -> ConnectionResult<()> {
        Ok(())
    }

    async fn close(&self) -> ConnectionResult<()> {
        Ok(())
    }

    async fn run(&self, command: &str, options: &RunOptions) -> ConnectionResult<RunResult> {
        debug!(command = %command, shell = options.shell, "Executing local command");

        let mut cmd = self.build_command(command, options)?;
        let child = cmd.spawn().map_err(|e| {
            ConnectionError::ExecutionFailed(format!("Failed to spawn process: {}", e))
        })?;

        let wait = child.wait_with_output();
        let output = if let Some(secs) = options.timeout {
            match tokio::time::timeout(std::time::Duration::from_secs(secs), wait).await {
                Ok(result) => result.map_err(|e| {
                    ConnectionError::ExecutionFailed(format!("Failed to wait for process: {}", e))
                })?,
                Err(_) => return Ok(RunResult::timed_out()),
            }
        } else {
            wait.await.map_err(|e| {
                ConnectionError::ExecutionFailed(format!("Failed to wait for process: {}", e))
            })?
        };

        let rc = output.status.code().unwrap_or(-1);
        trace!(rc = rc, "Local command completed");
        Ok(RunResult {
            rc,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn put(&self, local: &Path, remote: &str, mode: Option<u32>) -> ConnectionResult<()> {
        let dest = Path::new(remote);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ConnectionError::TransferFailed(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        tokio::fs::copy(local, dest).await.map_err(|e| {
            ConnectionError::TransferFailed(format!(
                "Failed to copy {} to {}: {}",
                local.display(),
                remote,
                e
            ))
        })?;
        set_mode(dest, mode).await
    }

    async fn put_content(
        &self,
        content: &[u8],
        remote: &str,
        mode: Option<u32>,
    ) -> ConnectionResult<()> {
        let dest = Path::new(remote);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ConnectionError::TransferFailed(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        tokio::fs::write(dest, content).await.map_err(|e| {
            ConnectionError::TransferFailed(format!("Failed to write {}: {}", remote, e))
        })?;
        set_mode(dest, mode).await
    }

    async fn get(&self, remote: &str, local: &Path) -> ConnectionResult<()> {
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ConnectionError::TransferFailed(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        tokio::fs::copy(remote, local).await.map_err(|e| {
            ConnectionError::TransferFailed(format!(
                "Failed to copy {} to {}: {}",
                remote,
                local.display(),
                e
            ))
        })?;
        Ok(())
    }

    async fn get_content(&self, remote: &str) -> ConnectionResult<Vec<u8>> {
        tokio::fs::read(remote).await.map_err(|e| {
            ConnectionError::TransferFailed(format!("Failed to read {}: {}", remote, e))
        })
    }

    async fn mkdir(&self, remote: &str, mode: Option<u32>) -> ConnectionResult<()> {
        let path = Path::new(remote);
        tokio::fs::create_dir_all(path).await.map_err(|e| {
            ConnectionError::TransferFailed(format!("Failed to create {}: {}", remote, e))
        })?;
        set_mode(path, mode).await
    }

    async fn stat(&self, remote: &str) -> ConnectionResult<Option<RemoteStat>> {
        let path = Path::new(remote);
        let symlink_meta = match tokio::fs::symlink_metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ConnectionError::TransferFailed(format!(
                    "Failed to stat {}: {}",
                    remote, e
                )))
            }
        };
        let meta = tokio::fs::metadata(path).await.unwrap_or(symlink_meta.clone());

        #[cfg(unix)]
        let (mode, uid, gid, mtime) = {
            use std::os::unix::fs::MetadataExt;
            (meta.mode(), meta.uid(), meta.gid(), meta.mtime())
        };
        #[cfg(not(unix))]
        let (mode, uid, gid, mtime) = (0u32, 0u32, 0u32, 0i64);

        Ok(Some(RemoteStat {
            isfile: meta.is_file(),
            isdir: meta.is_dir(),
            islink: symlink_meta.is_symlink(),
            size: meta.len(),
            mtime,
            mode,
            uid,
            gid,
        }))
    }
}

async fn set_mode(path: &Path, mode: Option<u32>) -> ConnectionResult<()> {
    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(|e| {
                ConnectionError::TransferFailed(format!(
                    "Failed to set permissions on {}: {}",
                    path.display(),
                    e
                ))
            })?;
    }
    #[cfg(not(unix))]
    let _ = (path, mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shell_command() {
        let conn = LocalConnection::new("localhost");
        let result = conn
            .run("echo hello && echo oops >&2", &RunOptions::default())
            .await
            .unwrap();
        assert!(result.success());
        assert!(result.stdout.contains("hello"));
        assert!(result.stderr.contains("oops"));
    }

    #[tokio::test]
    async fn no_shell_command_is_split() {
        let conn = LocalConnection::new("localhost");
        let result = conn
            .run("echo 'one two'", &RunOptions::no_shell())
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "one two");
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_result_not_error() {
        let conn = LocalConnection::new("localhost");
        let result = conn.run("exit 42", &RunOptions::default()).await.unwrap();
        assert_eq!(result.rc, 42);
    }

    #[tokio::test]
    async fn timeout_produces_synthetic_result() {
        let conn = LocalConnection::new("localhost");
        let opts = RunOptions {
            timeout: Some(1),
            ..Default::default()
        };
        let result = conn.run("sleep 10", &opts).await.unwrap();
        assert_eq!(result.rc, 124);
        assert_eq!(result.stderr, "Command timed out");
    }

    #[tokio::test]
    async fn env_and_cwd() {
        let conn = LocalConnection::new("localhost");
        let mut opts = RunOptions::default();
        opts.cwd = Some("/tmp".into());
        opts.env.insert("MARKER".into(), "x1".into());
        let result = conn.run("echo $MARKER; pwd", &opts).await.unwrap();
        assert!(result.stdout.contains("x1"));
        assert!(result.stdout.contains("/tmp"));
    }

    #[tokio::test]
    async fn file_round_trip_and_stat() {
        let conn = LocalConnection::new("localhost");
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("sub/out.txt");
        let dest_str = dest.to_string_lossy().to_string();

        conn.put_content(b"payload", &dest_str, Some(0o644))
            .await
            .unwrap();
        assert_eq!(conn.get_content(&dest_str).await.unwrap(), b"payload");

        let stat = conn.stat(&dest_str).await.unwrap().unwrap();
        assert!(stat.isfile);
        assert_eq!(stat.size, 7);

        assert!(conn.stat("/no/such/path/anywhere").await.unwrap().is_none());
    }
}
