//! SSH connection using russh.
//!
//! One multiplexed session per host; commands run on short-lived channels,
//! file transfer goes through a single lazily-created SFTP channel.
//! Authentication tries, in order: an explicit private key file, a
//! password, then the SSH agent.

use async_trait::async_trait;
use russh::client::{Handle, Handler};
use russh::keys::key::PublicKey;
use russh::keys::load_secret_key;
use russh::ChannelMsg;
use russh_keys::agent::client::AgentClient;
use russh_sftp::client::SftpSession;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use super::{
    shell_quote, Connection, ConnectionError, ConnectionResult, RemoteStat, RunOptions,
    RunResult,
};
use crate::inventory::{Host, Transport};

/// Wrapper so russh errors can flow through the Handler associated type.
#[derive(Debug)]
pub struct SshError(pub russh::Error);

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        SshError(err)
    }
}

impl std::fmt::Display for SshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SSH error: {}", self.0)
    }
}

impl std::error::Error for SshError {}

/// One entry from a `known_hosts` file.
struct KnownHostEntry {
    patterns: Vec<String>,
    key: PublicKey,
}

/// Client handler implementing host key verification.
struct ClientHandler {
    host: String,
    port: u16,
    checking: bool,
    known_hosts: Vec<KnownHostEntry>,
}

impl ClientHandler {
    fn new(host: &str, port: u16, checking: bool) -> Self {
        let known_hosts = if checking {
            Self::load_known_hosts()
        } else {
            Vec::new()
        };
        Self {
            host: host.to_string(),
            port,
            checking,
            known_hosts,
        }
    }

    fn load_known_hosts() -> Vec<KnownHostEntry> {
        let Some(home) = std::env::var_os("HOME") else {
            return Vec::new();
        };
        let path = PathBuf::from(home).join(".ssh/known_hosts");
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Vec::new();
        };

        let mut entries = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 {
                continue;
            }
            let Ok(key_bytes) = base64::Engine::decode(
                &base64::engine::general_purpose::STANDARD,
                parts[2],
            ) else {
                continue;
            };
            let Ok(key) = russh::keys::key::parse_public_key(&key_bytes, None) else {
                continue;
            };
            entries.push(KnownHostEntry {
                patterns: parts[0].split(',').map(String::from).collect(),
                key,
            });
        }
        entries
    }

    fn pattern_matches(pattern: &str, host: &str, port: u16) -> bool {
        if let Some(rest) = pattern.strip_prefix('[') {
            if let Some((pattern_host, pattern_port)) = rest.split_once("]:") {
                return pattern_host == host
                    && pattern_port.parse::<u16>().map(|p| p == port).unwrap_or(false);
            }
        }
        port == 22 && pattern == host
    }
}

#[async_trait]
impl Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        if !self.checking {
            return Ok(true);
        }

        for entry in &self.known_hosts {
            for pattern in &entry.patterns {
                if Self::pattern_matches(pattern, &self.host, self.port) {
                    if entry.key.fingerprint() == server_public_key.fingerprint() {
                        debug!(host = %self.host, "Host key verified against known_hosts");
                        return Ok(true);
                    }
                    warn!(
                        host = %self.host,
                        "Host key mismatch: server key differs from known_hosts"
                    );
                    return Ok(false);
                }
            }
        }

        // accept-new: unknown hosts are accepted on first contact
        debug!(host = %self.host, "Host not in known_hosts, accepting");
        Ok(true)
    }
}

/// SSH connection over a single multiplexed russh session.
pub struct SshConnection {
    host_name: String,
    address: String,
    port: u16,
    user: String,
    password: Option<String>,
    key_file: Option<String>,
    host_key_checking: bool,
    connect_timeout: u64,
    handle: RwLock<Option<Handle<ClientHandler>>>,
    sftp: Mutex<Option<SftpSession>>,
}

impl SshConnection {
    /// Builds an unconnected SSH connection from a host's variables.
    pub fn from_host(host: &Host) -> Self {
        let password = host
            .var_str("ansible_password")
            .or_else(|| host.var_str("ansible_ssh_pass"));
        let key_file = host.var_str("ansible_ssh_private_key_file");
        let host_key_checking = match host.vars.get("ansible_ssh_host_key_checking") {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) => {
                !matches!(s.to_lowercase().as_str(), "false" | "no")
            }
            _ => true,
        };
        let connect_timeout = host
            .var_str("ansible_ssh_timeout")
            .and_then(|t| t.parse().ok())
            .unwrap_or(30);
        let user = host
            .user()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "root".to_string());

        Self {
            host_name: host.name.clone(),
            address: host.address(),
            port: host.port().unwrap_or(22),
            user,
            password,
            key_file,
            host_key_checking,
            connect_timeout,
            handle: RwLock::new(None),
            sftp: Mutex::new(None),
        }
    }

    async fn authenticate(&self, session: &mut Handle<ClientHandler>) -> ConnectionResult<()> {
        // 1. Explicit key file
        if let Some(key_file) = &self.key_file {
            let key_path = PathBuf::from(shellexpand::tilde(key_file).to_string());
            if key_path.exists() {
                match load_secret_key(&key_path, None) {
                    Ok(key_pair) => {
                        let ok = session
                            .authenticate_publickey(&self.user, Arc::new(key_pair))
                            .await
                            .map_err(|e| {
                                ConnectionError::AuthenticationFailed(e.to_string())
                            })?;
                        if ok {
                            debug!(key = %key_path.display(), "Authenticated with private key");
                            return Ok(());
                        }
                    }
                    Err(e) => {
                        warn!(key = %key_path.display(), error = %e, "Failed to load private key");
                    }
                }
            } else {
                warn!(key = %key_path.display(), "Private key file not found");
            }
        }

        // 2. Password
        if let Some(password) = &self.password {
            let ok = session
                .authenticate_password(&self.user, password)
                .await
                .map_err(|e| ConnectionError::AuthenticationFailed(e.to_string()))?;
            if ok {
                debug!("Authenticated with password");
                return Ok(());
            }
        }

        // 3. SSH agent
        if let Ok(mut agent) = AgentClient::connect_env().await {
            if let Ok(identities) = agent.request_identities().await {
                for identity in identities {
                    let (returned_agent, result) = session
                        .authenticate_future(self.user.clone(), identity, agent)
                        .await;
                    agent = returned_agent;
                    if let Ok(true) = result {
                        debug!("Authenticated via SSH agent");
                        return Ok(());
                    }
                }
            }
        }

        Err(ConnectionError::AuthenticationFailed(format!(
            "All authentication methods failed for {}@{}",
            self.user, self.address
        )))
    }

    fn build_command(&self, command: &str, options: &RunOptions) -> String {
        let mut full = command.to_string();
        if let Some(cwd) = &options.cwd {
            full = format!("cd {} && {}", cwd, full);
        }
        if options.shell {
            full = format!("/bin/sh -c {}", shell_quote(&full));
        }
        if !options.env.is_empty() {
            let prefix: Vec<String> = options
                .env
                .iter()
                .map(|(k, v)| format!("{}={}", k, shell_quote(v)))
                .collect();
            full = format!("{} {}", prefix.join(" "), full);
        }
        full
    }

    async fn exec(&self, command: &str) -> ConnectionResult<RunResult> {
        let handle_guard = self.handle.read().await;
        let handle = handle_guard.as_ref().ok_or(ConnectionError::Closed)?;

        let mut channel = handle.channel_open_session().await.map_err(|e| {
            ConnectionError::ExecutionFailed(format!("Failed to open channel: {}", e))
        })?;
        drop(handle_guard);

        channel.exec(true, command).await.map_err(|e| {
            ConnectionError::ExecutionFailed(format!("Failed to execute command: {}", e))
        })?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code: Option<u32> = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext } => {
                    if ext == 1 {
                        stderr.extend_from_slice(data);
                    }
                }
                ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status),
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        let rc = exit_code.map(|c| c as i32).unwrap_or(-1);
        trace!(rc = rc, "Remote command completed");
        Ok(RunResult {
            rc,
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
        })
    }

    /// Ensures the single SFTP channel exists, creating it on first use.
    async fn with_sftp<'a>(
        &self,
        guard: &'a mut Option<SftpSession>,
    ) -> ConnectionResult<&'a SftpSession> {
        if guard.is_none() {
            let handle_guard = self.handle.read().await;
            let handle = handle_guard.as_ref().ok_or(ConnectionError::Closed)?;
            let channel = handle.channel_open_session().await.map_err(|e| {
                ConnectionError::TransferFailed(format!("Failed to open channel: {}", e))
            })?;
            channel.request_subsystem(true, "sftp").await.map_err(|e| {
                ConnectionError::TransferFailed(format!("Failed to request SFTP: {}", e))
            })?;
            let session = SftpSession::new(channel.into_stream()).await.map_err(|e| {
                ConnectionError::TransferFailed(format!("Failed to start SFTP session: {}", e))
            })?;
            *guard = Some(session);
        }
        Ok(guard.as_ref().expect("sftp session created"))
    }

    async fn sftp_mkdirs(&self, sftp: &SftpSession, path: &str) -> ConnectionResult<()> {
        let mut current = String::new();
        for component in Path::new(path).components() {
            match component {
                std::path::Component::RootDir => current.push('/'),
                std::path::Component::Normal(part) => {
                    if !current.ends_with('/') && !current.is_empty() {
                        current.push('/');
                    }
                    current.push_str(&part.to_string_lossy());
                    // Exists already or truly failed; the final write decides.
                    let _ = sftp.create_dir(&current).await;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for SshConnection {
    fn host_name(&self) -> &str {
        &self.host_name
    }

    fn transport(&self) -> Transport {
        Transport::Ssh
    }

    async fn connect(&self) -> ConnectionResult<()> {
        if self.handle.read().await.is_some() {
            return Ok(());
        }

        let timeout = Duration::from_secs(self.connect_timeout);
        let config = Arc::new(russh::client::Config {
            inactivity_timeout: None,
            ..Default::default()
        });

        let addr = format!("{}:{}", self.address, self.port);
        debug!(addr = %addr, user = %self.user, "Connecting over SSH");

        let socket = tokio::time::timeout(timeout, tokio::net::TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                ConnectionError::Unreachable(format!("Connection to {} timed out", addr))
            })?
            .map_err(|e| {
                ConnectionError::Unreachable(format!("Failed to connect to {}: {}", addr, e))
            })?;
        socket.set_nodelay(true).ok();

        let handler = ClientHandler::new(&self.address, self.port, self.host_key_checking);
        let mut session = russh::client::connect_stream(config, socket, handler)
            .await
            .map_err(|e| {
                ConnectionError::Unreachable(format!("SSH handshake failed: {}", e))
            })?;

        self.authenticate(&mut session).await?;

        *self.handle.write().await = Some(session);
        Ok(())
    }

    async fn close(&self) -> ConnectionResult<()> {
        *self.sftp.lock().await = None;
        if let Some(handle) = self.handle.write().await.take() {
            let _ = handle
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await;
        }
        Ok(())
    }

    async fn run(&self, command: &str, options: &RunOptions) -> ConnectionResult<RunResult> {
        let full_command = self.build_command(command, options);
        trace!(command = %full_command, "Executing SSH command");

        if let Some(secs) = options.timeout {
            match tokio::time::timeout(Duration::from_secs(secs), self.exec(&full_command)).await
            {
                Ok(result) => result,
                Err(_) => Ok(RunResult::timed_out()),
            }
        } else {
            self.exec(&full_command).await
        }
    }

    async fn put(&self, local: &Path, remote: &str, mode: Option<u32>) -> ConnectionResult<()> {
        let content = tokio::fs::read(local).await.map_err(|e| {
            ConnectionError::TransferFailed(format!(
                "Failed to read local file {}: {}",
                local.display(),
                e
            ))
        })?;
        self.put_content(&content, remote, mode).await
    }

    async fn put_content(
        &self,
        content: &[u8],
        remote: &str,
        mode: Option<u32>,
    ) -> ConnectionResult<()> {
        let mut guard = self.sftp.lock().await;
        let sftp = self.with_sftp(&mut guard).await?;

        if let Some(parent) = Path::new(remote).parent() {
            self.sftp_mkdirs(sftp, &parent.to_string_lossy()).await?;
        }

        let mut file = sftp.create(remote).await.map_err(|e| {
            ConnectionError::TransferFailed(format!("Failed to create {}: {}", remote, e))
        })?;
        file.write_all(content).await.map_err(|e| {
            ConnectionError::TransferFailed(format!("Failed to write {}: {}", remote, e))
        })?;
        file.shutdown().await.ok();
        drop(file);

        if let Some(mode) = mode {
            let attrs = russh_sftp::protocol::FileAttributes {
                permissions: Some(mode),
                ..Default::default()
            };
            sftp.set_metadata(remote, attrs).await.map_err(|e| {
                ConnectionError::TransferFailed(format!(
                    "Failed to set permissions on {}: {}",
                    remote, e
                ))
            })?;
        }
        Ok(())
    }

    async fn get(&self, remote: &str, local: &Path) -> ConnectionResult<()> {
        let content = self.get_content(remote).await?;
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        tokio::fs::write(local, content).await.map_err(|e| {
            ConnectionError::TransferFailed(format!(
                "Failed to write {}: {}",
                local.display(),
                e
            ))
        })
    }

    async fn get_content(&self, remote: &str) -> ConnectionResult<Vec<u8>> {
        let mut guard = self.sftp.lock().await;
        let sftp = self.with_sftp(&mut guard).await?;

        let mut file = sftp.open(remote).await.map_err(|e| {
            ConnectionError::TransferFailed(format!("Failed to open {}: {}", remote, e))
        })?;
        let mut content = Vec::new();
        file.read_to_end(&mut content).await.map_err(|e| {
            ConnectionError::TransferFailed(format!("Failed to read {}: {}", remote, e))
        })?;
        Ok(content)
    }

    async fn mkdir(&self, remote: &str, mode: Option<u32>) -> ConnectionResult<()> {
        let mut guard = self.sftp.lock().await;
        let sftp = self.with_sftp(&mut guard).await?;
        self.sftp_mkdirs(sftp, remote).await?;

        if let Some(mode) = mode {
            let attrs = russh_sftp::protocol::FileAttributes {
                permissions: Some(mode),
                ..Default::default()
            };
            sftp.set_metadata(remote, attrs).await.map_err(|e| {
                ConnectionError::TransferFailed(format!(
                    "Failed to set permissions on {}: {}",
                    remote, e
                ))
            })?;
        }
        Ok(())
    }

    async fn stat(&self, remote: &str) -> ConnectionResult<Option<RemoteStat>> {
        let mut guard = self.sftp.lock().await;
        let sftp = self.with_sftp(&mut guard).await?;

        let islink = match sftp.symlink_metadata(remote).await {
            Ok(attrs) => attrs.is_symlink(),
            Err(_) => false,
        };

        match sftp.metadata(remote).await {
            Ok(attrs) => Ok(Some(RemoteStat {
                isfile: attrs.is_regular(),
                isdir: attrs.is_dir(),
                islink,
                size: attrs.size.unwrap_or(0),
                mtime: attrs.mtime.map(|t| t as i64).unwrap_or(0),
                mode: attrs.permissions.unwrap_or(0) & 0o7777,
                uid: attrs.uid.unwrap_or(0),
                gid: attrs.gid.unwrap_or(0),
            })),
            Err(e) => {
                let msg = e.to_string().to_lowercase();
                if msg.contains("no such file") || msg.contains("not found") {
                    Ok(None)
                } else {
                    Err(ConnectionError::TransferFailed(format!(
                        "Failed to stat {}: {}",
                        remote, e
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::Vars;
    use serde_json::json;

    fn host_with(vars: Vars) -> Host {
        Host::new("web01", vars)
    }

    #[test]
    fn from_host_reads_connection_vars() {
        let mut vars = Vars::new();
        vars.insert("ansible_host".into(), json!("10.1.2.3"));
        vars.insert("ansible_port".into(), json!(2222));
        vars.insert("ansible_user".into(), json!("deploy"));
        vars.insert("ansible_ssh_host_key_checking".into(), json!(false));

        let conn = SshConnection::from_host(&host_with(vars));
        assert_eq!(conn.address, "10.1.2.3");
        assert_eq!(conn.port, 2222);
        assert_eq!(conn.user, "deploy");
        assert!(!conn.host_key_checking);
    }

    #[test]
    fn command_shaping() {
        let conn = SshConnection::from_host(&host_with(Vars::new()));

        let mut opts = RunOptions::default();
        opts.cwd = Some("/srv/app".into());
        opts.env.insert("MODE".into(), "prod".into());
        let cmd = conn.build_command("ls -la", &opts);
        assert_eq!(cmd, "MODE='prod' /bin/sh -c 'cd /srv/app && ls -la'");

        let cmd = conn.build_command("uname -a", &RunOptions::no_shell());
        assert_eq!(cmd, "uname -a");
    }

    #[test]
    fn known_hosts_pattern_matching() {
        assert!(ClientHandler::pattern_matches("web01", "web01", 22));
        assert!(!ClientHandler::pattern_matches("web01", "web01", 2222));
        assert!(ClientHandler::pattern_matches("[web01]:2222", "web01", 2222));
        assert!(!ClientHandler::pattern_matches("[web01]:2222", "web02", 2222));
    }
}
