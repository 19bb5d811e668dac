//! Module system: the uniform leaf contract and the static registry.
//!
//! Every module is a named leaf exposing `validate_args`, `run` and an
//! optional `check` (called in check mode instead of `run`; must not mutate
//! remote state). Modules are registered in one static table; there is no
//! import-time registration magic. Fully-qualified collection names with no
//! native implementation fall through to the galaxy passthrough module.

pub mod apt;
pub mod assert;
pub mod blockinfile;
pub mod command;
pub mod copy;
pub mod cron;
pub mod debug;
pub mod dnf;
pub mod fail;
pub mod file;
pub mod find;
pub mod galaxy;
pub mod get_url;
pub mod git;
pub mod group;
pub mod hostname;
pub mod known_hosts;
pub mod lineinfile;
pub mod package;
pub mod ping;
pub mod pip;
pub mod script;
pub mod service;
pub mod set_fact;
pub mod setup;
pub mod shell;
pub mod slurp;
pub mod stat;
pub mod template;
pub mod uri;
pub mod user;
pub mod wait_for;
pub mod windows;
pub mod yum;

use async_trait::async_trait;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::connection::{Connection, ConnectionResult, RunOptions, RunResult};
use crate::inventory::Transport;
use crate::results::{TaskResult, TaskStatus};
use crate::template::TemplateEngine;
use crate::vars::Vars;

/// Module arguments after recursive template rendering.
pub type ModuleArgs = Vars;

/// Result of a module execution, convertible 1:1 into a [`TaskResult`].
#[derive(Debug, Clone, Default)]
pub struct ModuleOutput {
    pub changed: bool,
    pub failed: bool,
    pub skipped: bool,
    pub rc: i32,
    pub stdout: String,
    pub stderr: String,
    pub msg: String,
    /// Free-form module payload merged into the registered result
    pub results: Vars,
}

impl ModuleOutput {
    /// Success without changes.
    pub fn ok(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            ..Default::default()
        }
    }

    /// Success with changes.
    pub fn changed(msg: impl Into<String>) -> Self {
        Self {
            changed: true,
            msg: msg.into(),
            ..Default::default()
        }
    }

    /// Failure.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self {
            failed: true,
            rc: 1,
            msg: msg.into(),
            ..Default::default()
        }
    }

    /// Skipped.
    pub fn skipped(msg: impl Into<String>) -> Self {
        Self {
            skipped: true,
            msg: msg.into(),
            ..Default::default()
        }
    }

    /// Builds an output from a finished command, failed when rc is nonzero.
    pub fn from_run(result: &RunResult, changed: bool) -> Self {
        Self {
            changed: changed && result.success(),
            failed: !result.success(),
            rc: result.rc,
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
            msg: if result.success() {
                String::new()
            } else {
                format!("Command failed with rc={}", result.rc)
            },
            ..Default::default()
        }
    }

    /// Attaches a payload entry.
    pub fn with_result(mut self, key: impl Into<String>, value: Value) -> Self {
        self.results.insert(key.into(), value);
        self
    }

    /// Converts into the scheduler's result type.
    pub fn to_task_result(&self, host: &str, task_name: &str) -> TaskResult {
        let status = if self.skipped {
            TaskStatus::Skipped
        } else if self.failed {
            TaskStatus::Failed
        } else if self.changed {
            TaskStatus::Changed
        } else {
            TaskStatus::Ok
        };
        let mut result = TaskResult::new(host, task_name, status);
        result.changed = self.changed;
        result.rc = self.rc;
        result.stdout = self.stdout.clone();
        result.stderr = self.stderr.clone();
        result.msg = self.msg.clone();
        result.results = self.results.clone();
        result
    }
}

/// Per-invocation context handed to a module.
#[derive(Clone)]
pub struct ModuleCtx {
    /// Inventory name of the host the result is attributed to
    pub host_name: String,
    /// The connection to execute against (the delegate's when delegated)
    pub connection: Arc<dyn Connection>,
    /// Dry-run mode
    pub check_mode: bool,
    /// Emit diffs for file-mutating modules
    pub diff_mode: bool,
    /// Privilege escalation
    pub r#become: bool,
    pub become_user: String,
    pub become_method: String,
    /// Effective environment for commands
    pub environment: IndexMap<String, String>,
    /// Effective variables of this execution (for debug/assert/template)
    pub vars: Vars,
    /// Shared template engine
    pub engine: Arc<TemplateEngine>,
    /// Directory of the playbook, for resolving local src paths
    pub playbook_dir: std::path::PathBuf,
}

impl ModuleCtx {
    /// True when the target is remoted over WinRM.
    pub fn is_windows(&self) -> bool {
        self.connection.transport() == Transport::WinRm
    }

    /// Prepends privilege escalation when the context's become flag is set.
    /// Windows targets are never wrapped.
    pub fn wrap_become(&self, cmd: &str) -> String {
        if !self.r#become || self.is_windows() {
            return cmd.to_string();
        }
        match self.become_method.as_str() {
            "su" => format!("su - {} -c '{}'", self.become_user, cmd),
            _ => format!("sudo -u {} {}", self.become_user, cmd),
        }
    }

    /// Runs a command through the connection with the context's environment
    /// and become settings applied.
    pub async fn command(&self, cmd: &str, shell: bool) -> ConnectionResult<RunResult> {
        let wrapped = self.wrap_become(cmd);
        let options = RunOptions {
            shell,
            env: self.environment.clone(),
            ..Default::default()
        };
        self.connection.run(&wrapped, &options).await
    }
}

/// The uniform module contract.
#[async_trait]
pub trait Module: Send + Sync {
    /// Registered short name.
    fn name(&self) -> &'static str;

    /// Arguments that must be present.
    fn required_args(&self) -> &'static [&'static str] {
        &[]
    }

    /// Static argument check before running. Returns an error message on
    /// rejection.
    fn validate_args(&self, args: &ModuleArgs) -> Option<String> {
        self.required_args()
            .iter()
            .find(|req| !args.contains_key(**req))
            .map(|req| format!("Missing required argument: {}", req))
    }

    /// Performs the action. Idempotent where the semantics allow.
    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput;

    /// Called in check mode instead of `run`; must not mutate remote state.
    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let _ = (args, ctx);
        ModuleOutput {
            changed: true,
            msg: "(check mode)".to_string(),
            ..Default::default()
        }
    }
}

/// Argument extraction helpers shared by all modules.
pub trait ArgsExt {
    fn get_str(&self, key: &str) -> Option<String>;
    fn get_required_str(&self, key: &str) -> Result<String, String>;
    fn get_bool_or(&self, key: &str, default: bool) -> bool;
    fn get_i64(&self, key: &str) -> Option<i64>;
    /// File mode: an octal string like `"0644"` or a raw integer.
    fn get_mode(&self, key: &str) -> Option<u32>;
    /// A string-or-list argument flattened to strings.
    fn get_str_list(&self, key: &str) -> Vec<String>;
}

impl ArgsExt for ModuleArgs {
    fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    fn get_required_str(&self, key: &str) -> Result<String, String> {
        self.get_str(key)
            .ok_or_else(|| format!("Missing required argument: {}", key))
    }

    fn get_bool_or(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => crate::template::coerce_bool(s),
            Some(Value::Number(n)) => n.as_i64().map(|i| i != 0).unwrap_or(default),
            _ => default,
        }
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn get_mode(&self, key: &str) -> Option<u32> {
        match self.get(key) {
            Some(Value::String(s)) => {
                let s = s.trim();
                u32::from_str_radix(s.trim_start_matches("0o"), 8).ok()
            }
            Some(Value::Number(n)) => {
                // YAML `0644` without quotes arrives as decimal 644; treat
                // digit sequences as octal notation.
                let raw = n.as_u64()?;
                u32::from_str_radix(&raw.to_string(), 8).ok()
            }
            _ => None,
        }
    }

    fn get_str_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Hex MD5 digest, used for content-compare idempotence in the file
/// modules.
pub(crate) fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Unified diff attached to results when `--diff` is active.
pub(crate) fn unified_diff(before: &str, after: &str) -> String {
    similar::TextDiff::from_lines(before, after)
        .unified_diff()
        .header("before", "after")
        .to_string()
}

/// The static registry: short name to implementation.
static REGISTRY: Lazy<HashMap<&'static str, Arc<dyn Module>>> = Lazy::new(|| {
    let modules: Vec<Arc<dyn Module>> = vec![
        // Exec family
        Arc::new(command::CommandModule),
        Arc::new(shell::ShellModule),
        Arc::new(shell::RawModule),
        Arc::new(script::ScriptModule),
        // Logic
        Arc::new(debug::DebugModule),
        Arc::new(set_fact::SetFactModule),
        Arc::new(fail::FailModule),
        Arc::new(assert::AssertModule),
        Arc::new(ping::PingModule),
        // Files
        Arc::new(copy::CopyModule),
        Arc::new(file::FileModule),
        Arc::new(template::TemplateModule),
        Arc::new(lineinfile::LineinfileModule),
        Arc::new(blockinfile::BlockinfileModule),
        Arc::new(stat::StatModule),
        Arc::new(slurp::SlurpModule),
        Arc::new(slurp::FetchModule),
        Arc::new(find::FindModule),
        // Network
        Arc::new(uri::UriModule),
        Arc::new(get_url::GetUrlModule),
        Arc::new(wait_for::WaitForModule),
        Arc::new(wait_for::WaitForConnectionModule),
        Arc::new(wait_for::PauseModule),
        // System
        Arc::new(service::ServiceModule),
        Arc::new(service::SystemdModule),
        Arc::new(user::UserModule),
        Arc::new(group::GroupModule),
        Arc::new(cron::CronModule),
        Arc::new(hostname::HostnameModule),
        Arc::new(known_hosts::KnownHostsModule),
        Arc::new(file::UnarchiveModule),
        Arc::new(git::GitModule),
        Arc::new(package::PackageModule),
        Arc::new(apt::AptModule),
        Arc::new(yum::YumModule),
        Arc::new(dnf::DnfModule),
        Arc::new(pip::PipModule),
        // Facts
        Arc::new(setup::SetupModule),
        // Windows
        Arc::new(windows::win_command::WinCommandModule),
        Arc::new(windows::win_command::WinShellModule),
        Arc::new(windows::win_command::WinPingModule),
        Arc::new(windows::win_copy::WinCopyModule),
        Arc::new(windows::win_file::WinFileModule),
        Arc::new(windows::win_file::WinStatModule),
        Arc::new(windows::win_service::WinServiceModule),
        Arc::new(windows::win_user::WinUserModule),
        Arc::new(windows::win_user::WinGroupModule),
    ];
    modules.into_iter().map(|m| (m.name(), m)).collect()
});

/// True when a native module with this short name exists.
pub fn is_registered(name: &str) -> bool {
    REGISTRY.contains_key(name)
}

/// Registered short names, for diagnostics.
pub fn module_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = REGISTRY.keys().copied().collect();
    names.sort_unstable();
    names
}

/// Resolves a module name: short names hit the registry directly; unmapped
/// three-part FQCNs fall through to the galaxy passthrough.
pub fn resolve(name: &str) -> Option<Arc<dyn Module>> {
    if let Some(module) = REGISTRY.get(name) {
        return Some(module.clone());
    }
    if name.split('.').count() == 3 {
        return Some(Arc::new(galaxy::GalaxyModule::new(name)));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_contains_core_modules() {
        for name in [
            "command", "shell", "raw", "script", "debug", "set_fact", "fail", "assert",
            "ping", "copy", "file", "template", "lineinfile", "blockinfile", "stat", "slurp",
            "fetch", "find", "uri", "get_url", "wait_for", "wait_for_connection", "pause",
            "service", "systemd", "user", "group", "cron", "hostname", "known_hosts",
            "unarchive", "git", "package", "apt", "yum", "dnf", "pip", "setup",
            "win_command", "win_shell", "win_ping", "win_copy", "win_file", "win_stat",
            "win_service", "win_user", "win_group",
        ] {
            assert!(is_registered(name), "missing module: {}", name);
        }
    }

    #[test]
    fn fqcn_resolves_to_passthrough() {
        let module = resolve("community.general.ufw").unwrap();
        assert_eq!(module.name(), "galaxy");
        assert!(resolve("not_a_module").is_none());
    }

    #[test]
    fn args_ext_coercions() {
        let mut args = ModuleArgs::new();
        args.insert("s".into(), json!("text"));
        args.insert("n".into(), json!(7));
        args.insert("b".into(), json!("yes"));
        args.insert("mode".into(), json!("0644"));
        args.insert("mode_num".into(), json!(644));
        args.insert("list".into(), json!(["a", "b"]));

        assert_eq!(args.get_str("s").unwrap(), "text");
        assert_eq!(args.get_i64("n").unwrap(), 7);
        assert!(args.get_bool_or("b", false));
        assert_eq!(args.get_mode("mode").unwrap(), 0o644);
        assert_eq!(args.get_mode("mode_num").unwrap(), 0o644);
        assert_eq!(args.get_str_list("list"), vec!["a", "b"]);
        assert_eq!(args.get_str_list("s"), vec!["text"]);
        assert!(args.get_required_str("absent").is_err());
    }

    #[test]
    fn output_to_task_result_status_mapping() {
        let host = "h1";
        assert_eq!(
            ModuleOutput::ok("x").to_task_result(host, "t").status,
            TaskStatus::Ok
        );
        assert_eq!(
            ModuleOutput::changed("x").to_task_result(host, "t").status,
            TaskStatus::Changed
        );
        assert_eq!(
            ModuleOutput::failed("x").to_task_result(host, "t").status,
            TaskStatus::Failed
        );
        assert_eq!(
            ModuleOutput::skipped("x").to_task_result(host, "t").status,
            TaskStatus::Skipped
        );
    }
}
