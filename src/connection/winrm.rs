//! WinRM connection: PowerShell remoting over WS-Man SOAP.
//!
//! Commands are wrapped as PowerShell scripts and dispatched through a
//! WS-Man command shell (`powershell.exe -EncodedCommand`). File transfer
//! uses a chunked base64 scheme: roughly 700 KiB per chunk, each chunk
//! decoded and appended remotely by a small PowerShell fragment. `stat`
//! runs a PowerShell expression that emits JSON.
//!
//! The transport itself (reqwest) is async; CPU-heavy base64 staging of
//! transfer chunks runs on the blocking pool so large uploads do not stall
//! the scheduler's event loop.

use async_trait::async_trait;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, trace};
use uuid::Uuid;

use super::{
    Connection, ConnectionError, ConnectionResult, RemoteStat, RunOptions, RunResult,
};
use crate::inventory::{Host, Transport};

/// Chunk size for file transfers; stays under WinRM envelope limits.
const CHUNK_SIZE: usize = 700 * 1024;

/// Default WinRM HTTP port.
const DEFAULT_PORT: u16 = 5985;

/// Default WinRM HTTPS port.
const DEFAULT_TLS_PORT: u16 = 5986;

const SOAP_CONTENT_TYPE: &str = "application/soap+xml;charset=UTF-8";
const SHELL_RESOURCE_URI: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/cmd";
const ACTION_CREATE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Create";
const ACTION_DELETE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Delete";
const ACTION_COMMAND: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Command";
const ACTION_RECEIVE: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Receive";
const ACTION_SIGNAL: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Signal";

static SHELL_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"Name="ShellId"[^>]*>([^<]+)<|<rsp:ShellId>([^<]+)<"#).expect("shell id regex"));
static COMMAND_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<rsp:CommandId>([^<]+)</rsp:CommandId>").expect("command id regex"));
static STREAM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<rsp:Stream[^>]*Name="(stdout|stderr)"[^>]*>([^<]*)</rsp:Stream>"#)
        .expect("stream regex")
});
static EXIT_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<rsp:ExitCode>(-?\d+)</rsp:ExitCode>").expect("exit code regex"));

/// WinRM connection for Windows hosts.
pub struct WinRmConnection {
    host_name: String,
    endpoint: String,
    user: String,
    password: String,
    client: reqwest::Client,
    shell_id: RwLock<Option<String>>,
}

impl WinRmConnection {
    /// Builds an unconnected WinRM connection from a host's variables.
    pub fn from_host(host: &Host) -> Self {
        let use_tls = host
            .var_str("ansible_winrm_scheme")
            .map(|s| s == "https")
            .unwrap_or(false);
        let port = host
            .port()
            .unwrap_or(if use_tls { DEFAULT_TLS_PORT } else { DEFAULT_PORT });
        let scheme = if use_tls { "https" } else { "http" };
        let endpoint = format!("{}://{}:{}/wsman", scheme, host.address(), port);

        let cert_validation = match host.vars.get("ansible_winrm_server_cert_validation") {
            Some(serde_json::Value::String(s)) => s != "ignore",
            Some(serde_json::Value::Bool(b)) => *b,
            _ => true,
        };

        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!cert_validation)
            .timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_default();

        Self {
            host_name: host.name.clone(),
            endpoint,
            user: host.user().unwrap_or_else(|| "Administrator".to_string()),
            password: host
                .var_str("ansible_password")
                .or_else(|| host.var_str("ansible_winrm_password"))
                .unwrap_or_default(),
            client,
            shell_id: RwLock::new(None),
        }
    }

    fn envelope(
        &self,
        action: &str,
        shell_id: Option<&str>,
        body: &str,
        options: &str,
    ) -> String {
        let message_id = Uuid::new_v4();
        let selector = shell_id
            .map(|id| {
                format!(
                    r#"<w:SelectorSet><w:Selector Name="ShellId">{}</w:Selector></w:SelectorSet>"#,
                    id
                )
            })
            .unwrap_or_default();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:a="http://schemas.xmlsoap.org/ws/2004/08/addressing" xmlns:w="http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd" xmlns:rsp="http://schemas.microsoft.com/wbem/wsman/1/windows/shell">
  <s:Header>
    <a:To>{endpoint}</a:To>
    <a:ReplyTo><a:Address s:mustUnderstand="true">http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous</a:Address></a:ReplyTo>
    <w:MaxEnvelopeSize s:mustUnderstand="true">153600000</w:MaxEnvelopeSize>
    <a:MessageID>uuid:{message_id}</a:MessageID>
    <w:ResourceURI s:mustUnderstand="true">{resource}</w:ResourceURI>
    <a:Action s:mustUnderstand="true">{action}</a:Action>
    <w:OperationTimeout>PT60S</w:OperationTimeout>
    {selector}
    {options}
  </s:Header>
  <s:Body>{body}</s:Body>
</s:Envelope>"#,
            endpoint = self.endpoint,
            message_id = message_id,
            resource = SHELL_RESOURCE_URI,
            action = action,
            selector = selector,
            options = options,
        )
    }

    async fn post(&self, envelope: String) -> ConnectionResult<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.user, Some(&self.password))
            .header(reqwest::header::CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body(envelope)
            .send()
            .await
            .map_err(|e| ConnectionError::Unreachable(format!("WinRM request failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            ConnectionError::ExecutionFailed(format!("Failed to read WinRM response: {}", e))
        })?;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ConnectionError::AuthenticationFailed(format!(
                "WinRM authentication rejected for user '{}'",
                self.user
            )));
        }
        if !status.is_success() {
            return Err(ConnectionError::ExecutionFailed(format!(
                "WinRM returned HTTP {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }
        Ok(text)
    }

    async fn open_shell(&self) -> ConnectionResult<String> {
        let body = r#"<rsp:Shell><rsp:InputStreams>stdin</rsp:InputStreams><rsp:OutputStreams>stdout stderr</rsp:OutputStreams></rsp:Shell>"#;
        let options = r#"<w:OptionSet><w:Option Name="WINRS_NOPROFILE">TRUE</w:Option><w:Option Name="WINRS_CODEPAGE">65001</w:Option></w:OptionSet>"#;
        let response = self
            .post(self.envelope(ACTION_CREATE, None, body, options))
            .await?;

        let caps = SHELL_ID_RE.captures(&response).ok_or_else(|| {
            ConnectionError::Unreachable("WinRM shell creation returned no ShellId".to_string())
        })?;
        let shell_id = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                ConnectionError::Unreachable("WinRM shell creation returned no ShellId".into())
            })?;
        debug!(shell_id = %shell_id, "WinRM shell created");
        Ok(shell_id)
    }

    /// Wraps a command as a PowerShell script per the calling convention:
    /// `Set-Location` for cwd, `$env:` assignments for environment, and
    /// `cmd.exe /c` when shell execution was not requested.
    fn build_script(&self, command: &str, options: &RunOptions) -> String {
        let mut script = String::new();
        if let Some(cwd) = &options.cwd {
            script.push_str(&format!("Set-Location -Path '{}'\n", ps_quote(cwd)));
        }
        for (key, value) in &options.env {
            script.push_str(&format!("$env:{} = '{}'\n", key, ps_quote(value)));
        }
        if options.shell {
            script.push_str(command);
        } else {
            script.push_str(&format!("cmd.exe /c \"{}\"", command));
        }
        script
    }

    async fn run_script(&self, script: &str) -> ConnectionResult<RunResult> {
        let shell_id = {
            let guard = self.shell_id.read().await;
            guard.clone().ok_or(ConnectionError::Closed)?
        };

        // powershell.exe -EncodedCommand takes base64 over UTF-16LE
        let utf16: Vec<u8> = script
            .encode_utf16()
            .flat_map(|unit| unit.to_le_bytes())
            .collect();
        let encoded = base64::engine::general_purpose::STANDARD.encode(utf16);

        let command_body = format!(
            r#"<rsp:CommandLine><rsp:Command>powershell.exe</rsp:Command><rsp:Arguments>-NoProfile</rsp:Arguments><rsp:Arguments>-NonInteractive</rsp:Arguments><rsp:Arguments>-EncodedCommand</rsp:Arguments><rsp:Arguments>{}</rsp:Arguments></rsp:CommandLine>"#,
            encoded
        );
        let response = self
            .post(self.envelope(ACTION_COMMAND, Some(&shell_id), &command_body, ""))
            .await?;

        let command_id = COMMAND_ID_RE
            .captures(&response)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                ConnectionError::ExecutionFailed("WinRM returned no CommandId".to_string())
            })?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut rc = 0i32;

        loop {
            let receive_body = format!(
                r#"<rsp:Receive><rsp:DesiredStream CommandId="{}">stdout stderr</rsp:DesiredStream></rsp:Receive>"#,
                command_id
            );
            let response = self
                .post(self.envelope(ACTION_RECEIVE, Some(&shell_id), &receive_body, ""))
                .await?;

            for caps in STREAM_RE.captures_iter(&response) {
                let payload = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
                if payload.is_empty() {
                    continue;
                }
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(payload)
                    .unwrap_or_default();
                match caps.get(1).map(|m| m.as_str()) {
                    Some("stdout") => stdout.extend_from_slice(&decoded),
                    Some("stderr") => stderr.extend_from_slice(&decoded),
                    _ => {}
                }
            }

            if response.contains("CommandState/Done") {
                if let Some(caps) = EXIT_CODE_RE.captures(&response) {
                    rc = caps[1].parse().unwrap_or(1);
                }
                break;
            }
        }

        // Release the command's resources
        let signal_body = format!(
            r#"<rsp:Signal CommandId="{}"><rsp:Code>http://schemas.microsoft.com/wbem/wsman/1/windows/shell/signal/terminate</rsp:Code></rsp:Signal>"#,
            command_id
        );
        let _ = self
            .post(self.envelope(ACTION_SIGNAL, Some(&shell_id), &signal_body, ""))
            .await;

        trace!(rc = rc, "WinRM command completed");
        Ok(RunResult {
            rc,
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
        })
    }

    async fn run_ps(&self, script: &str) -> ConnectionResult<RunResult> {
        self.run(script, &RunOptions::default()).await
    }
}

#[async_trait]
impl Connection for WinRmConnection {
    fn host_name(&self) -> &str {
        &self.host_name
    }

    fn transport(&self) -> Transport {
        Transport::WinRm
    }

    async fn connect(&self) -> ConnectionResult<()> {
        if self.shell_id.read().await.is_some() {
            return Ok(());
        }
        let shell_id = self.open_shell().await?;
        *self.shell_id.write().await = Some(shell_id);
        Ok(())
    }

    async fn close(&self) -> ConnectionResult<()> {
        if let Some(shell_id) = self.shell_id.write().await.take() {
            let _ = self
                .post(self.envelope(ACTION_DELETE, Some(&shell_id), "", ""))
                .await;
        }
        Ok(())
    }

    async fn run(&self, command: &str, options: &RunOptions) -> ConnectionResult<RunResult> {
        let script = self.build_script(command, options);
        if let Some(secs) = options.timeout {
            match tokio::time::timeout(Duration::from_secs(secs), self.run_script(&script)).await
            {
                Ok(result) => result,
                Err(_) => Ok(RunResult::timed_out()),
            }
        } else {
            self.run_script(&script).await
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
        _mode: Option<u32>,
    ) -> ConnectionResult<()> {
        let remote = win_path(remote);

        // Ensure the destination directory exists
        if let Some(parent) = Path::new(&remote.replace('\\', "/")).parent() {
            let parent = win_path(&parent.to_string_lossy());
            if !parent.is_empty() {
                self.run_ps(&format!(
                    "New-Item -ItemType Directory -Force -Path '{}' | Out-Null",
                    ps_quote(&parent)
                ))
                .await?;
            }
        }

        if content.is_empty() {
            self.run_ps(&format!(
                "Set-Content -Path '{}' -Value '' -NoNewline",
                ps_quote(&remote)
            ))
            .await?;
            return Ok(());
        }

        // Remove any pre-existing target before appending chunks
        self.run_ps(&format!(
            "if (Test-Path '{p}') {{ Remove-Item '{p}' -Force }}",
            p = ps_quote(&remote)
        ))
        .await?;

        let mut offset = 0;
        while offset < content.len() {
            let end = (offset + CHUNK_SIZE).min(content.len());
            let chunk = content[offset..end].to_vec();
            let b64_chunk = tokio::task::spawn_blocking(move || {
                base64::engine::general_purpose::STANDARD.encode(chunk)
            })
            .await
            .map_err(|e| ConnectionError::TransferFailed(e.to_string()))?;

            let script = format!(
                r#"$bytes = [Convert]::FromBase64String('{b64}')
$stream = [System.IO.File]::Open('{path}', [System.IO.FileMode]::Append)
$stream.Write($bytes, 0, $bytes.Length)
$stream.Close()"#,
                b64 = b64_chunk,
                path = ps_quote(&remote)
            );
            let result = self.run_ps(&script).await?;
            if !result.success() {
                return Err(ConnectionError::TransferFailed(format!(
                    "File upload failed: {}",
                    result.stderr
                )));
            }
            offset = end;
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
        let remote = win_path(remote);

        let size_result = self
            .run_ps(&format!("(Get-Item '{}').Length", ps_quote(&remote)))
            .await?;
        if !size_result.success() {
            return Err(ConnectionError::TransferFailed(format!(
                "Failed to stat remote file {}: {}",
                remote, size_result.stderr
            )));
        }
        let file_size: usize = size_result.stdout.trim().parse().unwrap_or(0);

        let mut content = Vec::with_capacity(file_size);
        let mut offset = 0;
        while offset < file_size {
            let chunk_size = CHUNK_SIZE.min(file_size - offset);
            let script = format!(
                r#"$stream = [System.IO.File]::OpenRead('{path}')
$stream.Seek({offset}, [System.IO.SeekOrigin]::Begin) | Out-Null
$buffer = New-Object byte[] {size}
$stream.Read($buffer, 0, {size}) | Out-Null
$stream.Close()
[Convert]::ToBase64String($buffer)"#,
                path = ps_quote(&remote),
                offset = offset,
                size = chunk_size
            );
            let result = self.run_ps(&script).await?;
            if !result.success() {
                return Err(ConnectionError::TransferFailed(format!(
                    "File download failed: {}",
                    result.stderr
                )));
            }
            let payload = result.stdout.trim().to_string();
            let decoded = tokio::task::spawn_blocking(move || {
                base64::engine::general_purpose::STANDARD.decode(payload)
            })
            .await
            .map_err(|e| ConnectionError::TransferFailed(e.to_string()))?
            .map_err(|e| {
                ConnectionError::TransferFailed(format!("Invalid chunk encoding: {}", e))
            })?;
            content.extend_from_slice(&decoded);
            offset += chunk_size;
        }
        Ok(content)
    }

    async fn mkdir(&self, remote: &str, _mode: Option<u32>) -> ConnectionResult<()> {
        let remote = win_path(remote);
        let result = self
            .run_ps(&format!(
                "New-Item -ItemType Directory -Force -Path '{}' | Out-Null",
                ps_quote(&remote)
            ))
            .await?;
        if !result.success() {
            return Err(ConnectionError::TransferFailed(format!(
                "Failed to create directory {}: {}",
                remote, result.stderr
            )));
        }
        Ok(())
    }

    async fn stat(&self, remote: &str) -> ConnectionResult<Option<RemoteStat>> {
        let remote = win_path(remote);
        let script = format!(
            r#"if (Test-Path '{p}') {{
    $item = Get-Item '{p}'
    @{{
        exists = $true
        isdir = $item.PSIsContainer
        isfile = -not $item.PSIsContainer
        size = if ($item.PSIsContainer) {{ 0 }} else {{ $item.Length }}
        mtime = ([DateTimeOffset]$item.LastWriteTime).ToUnixTimeSeconds()
    }} | ConvertTo-Json
}} else {{
    'null'
}}"#,
            p = ps_quote(&remote)
        );
        let result = self.run_ps(&script).await?;

        let body = result.stdout.trim();
        if !result.success() || body.is_empty() || body == "null" {
            return Ok(None);
        }

        let data: serde_json::Value = serde_json::from_str(body).map_err(|e| {
            ConnectionError::TransferFailed(format!("Invalid stat output: {}", e))
        })?;
        Ok(Some(RemoteStat {
            isfile: data["isfile"].as_bool().unwrap_or(false),
            isdir: data["isdir"].as_bool().unwrap_or(false),
            islink: false,
            size: data["size"].as_u64().unwrap_or(0),
            mtime: data["mtime"].as_i64().unwrap_or(0),
            mode: 0,
            uid: 0,
            gid: 0,
        }))
    }
}

/// Normalizes a path to Windows separators.
fn win_path(path: &str) -> String {
    path.replace('/', "\\")
}

/// Escapes a string for a single-quoted PowerShell literal.
fn ps_quote(s: &str) -> String {
    s.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::Vars;
    use serde_json::json;

    #[test]
    fn endpoint_from_host_vars() {
        let mut vars = Vars::new();
        vars.insert("ansible_connection".into(), json!("winrm"));
        vars.insert("ansible_host".into(), json!("win1.example.com"));
        vars.insert("ansible_user".into(), json!("admin"));
        vars.insert("ansible_password".into(), json!("pw"));
        let conn = WinRmConnection::from_host(&Host::new("win1", vars));
        assert_eq!(conn.endpoint, "http://win1.example.com:5985/wsman");
        assert_eq!(conn.user, "admin");
    }

    #[test]
    fn https_scheme_switches_port() {
        let mut vars = Vars::new();
        vars.insert("ansible_connection".into(), json!("winrm"));
        vars.insert("ansible_winrm_scheme".into(), json!("https"));
        let conn = WinRmConnection::from_host(&Host::new("win1", vars));
        assert_eq!(conn.endpoint, "https://win1:5986/wsman");
    }

    #[test]
    fn script_wrapping() {
        let conn = WinRmConnection::from_host(&Host::new("win1", Vars::new()));

        let mut opts = RunOptions::default();
        opts.cwd = Some(r"C:\app".into());
        opts.env.insert("MODE".into(), "prod".into());
        let script = conn.build_script("Get-Process", &opts);
        assert!(script.starts_with("Set-Location -Path 'C:\\app'\n"));
        assert!(script.contains("$env:MODE = 'prod'\n"));
        assert!(script.ends_with("Get-Process"));

        let script = conn.build_script("dir", &RunOptions::no_shell());
        assert_eq!(script, "cmd.exe /c \"dir\"");
    }

    #[test]
    fn path_and_quote_helpers() {
        assert_eq!(win_path("C:/temp/file.txt"), r"C:\temp\file.txt");
        assert_eq!(ps_quote("it's"), "it''s");
    }

    #[test]
    fn stream_regex_extracts_payload() {
        let response = r#"<rsp:Stream Name="stdout" CommandId="x">aGk=</rsp:Stream><rsp:Stream Name="stderr" CommandId="x">b29wcw==</rsp:Stream>"#;
        let caps: Vec<(String, String)> = STREAM_RE
            .captures_iter(response)
            .map(|c| (c[1].to_string(), c[2].to_string()))
            .collect();
        assert_eq!(caps.len(), 2);
        assert_eq!(caps[0].0, "stdout");
        assert_eq!(caps[0].1, "aGk=");
    }
}
