//! Reporting seam: human console output vs silent machine mode.
//!
//! The runner holds exactly one boxed reporter. The human reporter prints
//! colored play/task banners, per-host status lines and the final recap;
//! the JSON reporter stays silent so the only stdout of a `--json` run is
//! the final document.

use colored::Colorize;
use is_terminal::IsTerminal;
use std::collections::BTreeMap;

use crate::results::{HostStats, TaskResult, TaskStatus};

/// Receives execution events for reporting.
pub trait Callback: Send + Sync {
    fn on_playbook_start(&self, path: &str) {
        let _ = path;
    }
    fn on_play_start(&self, name: &str) {
        let _ = name;
    }
    fn on_task_start(&self, name: &str, is_handler: bool) {
        let _ = (name, is_handler);
    }
    fn on_host_result(&self, result: &TaskResult) {
        let _ = result;
    }
    fn on_recap(&self, stats: &BTreeMap<String, HostStats>) {
        let _ = stats;
    }
    fn warning(&self, msg: &str) {
        let _ = msg;
    }
}

/// Colored, Ansible-style console reporter.
pub struct HumanCallback {
    verbosity: u8,
}

impl HumanCallback {
    /// Creates the reporter, disabling color when stdout is not a
    /// terminal.
    pub fn new(verbosity: u8) -> Self {
        if !std::io::stdout().is_terminal() {
            colored::control::set_override(false);
        }
        Self { verbosity }
    }

    fn banner(prefix: &str, name: &str, fill: char) -> String {
        let head = format!("{} [{}] ", prefix, name);
        let fill_len = 72usize.saturating_sub(head.len());
        format!("{}{}", head, std::iter::repeat(fill).take(fill_len).collect::<String>())
    }
}

impl Callback for HumanCallback {
    fn on_playbook_start(&self, path: &str) {
        println!("\n{}", Self::banner("PLAYBOOK", path, '*'));
    }

    fn on_play_start(&self, name: &str) {
        println!("\n{}", Self::banner("PLAY", name, '*'));
    }

    fn on_task_start(&self, name: &str, is_handler: bool) {
        let prefix = if is_handler { "RUNNING HANDLER" } else { "TASK" };
        println!("\n{}", Self::banner(prefix, name, '-'));
    }

    fn on_host_result(&self, result: &TaskResult) {
        let status = result.status.to_string();
        let line = format!("{}: [{}]", status, result.host);
        let colored_line = match result.status {
            TaskStatus::Ok => line.green(),
            TaskStatus::Changed => line.yellow(),
            TaskStatus::Failed | TaskStatus::Unreachable => line.red(),
            TaskStatus::Skipped => line.cyan(),
        };

        let show_msg = !result.msg.is_empty()
            && (result.is_failed() || self.verbosity > 0 || !result.results.is_empty());
        if show_msg {
            println!("{} => {}", colored_line, result.msg);
        } else {
            println!("{}", colored_line);
        }

        if self.verbosity >= 2 && !result.stdout.is_empty() {
            println!("  stdout: {}", result.stdout.trim_end());
        }
        if self.verbosity >= 1 && !result.stderr.is_empty() {
            println!("  stderr: {}", result.stderr.trim_end());
        }
    }

    fn on_recap(&self, stats: &BTreeMap<String, HostStats>) {
        println!("\n{}", Self::banner("PLAY RECAP", "", '*'));
        for (host, s) in stats {
            println!(
                "{:<40} : {}  {}  {}  {}  {}",
                host,
                format!("ok={}", s.ok).green(),
                format!("changed={}", s.changed).yellow(),
                format!("unreachable={}", s.unreachable).red(),
                format!("failed={}", s.failed).red(),
                format!("skipped={}", s.skipped).cyan(),
            );
        }
    }

    fn warning(&self, msg: &str) {
        eprintln!("{}", format!("[WARNING]: {}", msg).yellow());
    }
}

/// Silent reporter for `--json` mode; the runner prints the one final
/// document itself.
pub struct JsonCallback;

impl Callback for JsonCallback {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_is_fixed_width() {
        let banner = HumanCallback::banner("TASK", "deploy", '-');
        assert!(banner.starts_with("TASK [deploy] "));
        assert_eq!(banner.len(), 72);
    }

    #[test]
    fn json_callback_is_silent_noop() {
        // Must not panic or print; the default impls are all no-ops.
        let cb = JsonCallback;
        cb.on_play_start("p");
        cb.on_task_start("t", false);
        cb.warning("w");
    }
}
