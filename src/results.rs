//! Task, play, and playbook result aggregation.
//!
//! [`TaskResult`] is the single output of the scheduler for one task on one
//! host; module failures, template errors and timeouts all become statuses
//! here rather than control-flow exceptions. [`PlaybookResult`] renders the
//! stable machine-output JSON document.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::vars::Vars;

/// Status of a task execution on one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Ran successfully without changes
    Ok,
    /// Ran successfully and changed state
    Changed,
    /// Failed
    Failed,
    /// Skipped (condition false, host failed earlier, tag filter)
    Skipped,
    /// Connection could not be established
    Unreachable,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Ok => "ok",
            TaskStatus::Changed => "changed",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
            TaskStatus::Unreachable => "unreachable",
        };
        write!(f, "{}", s)
    }
}

/// Result of executing a single task on a single host. Immutable once the
/// scheduler has post-processed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Host the task ran on (the original host when delegated)
    pub host: String,
    /// Task name
    pub task_name: String,
    /// Final status
    pub status: TaskStatus,
    /// Whether remote state changed
    #[serde(default)]
    pub changed: bool,
    /// Exit code of the underlying command, when any
    #[serde(default)]
    pub rc: i32,
    /// Captured stdout
    #[serde(default)]
    pub stdout: String,
    /// Captured stderr
    #[serde(default)]
    pub stderr: String,
    /// Human message
    #[serde(default)]
    pub msg: String,
    /// Module-specific payload
    #[serde(default)]
    pub results: Vars,
    /// Per-iteration results for loop tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_results: Option<Vec<TaskResult>>,
}

impl TaskResult {
    /// Creates a result with the given status and empty payload.
    pub fn new(host: impl Into<String>, task_name: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            host: host.into(),
            task_name: task_name.into(),
            status,
            changed: false,
            rc: 0,
            stdout: String::new(),
            stderr: String::new(),
            msg: String::new(),
            results: Vars::new(),
            loop_results: None,
        }
    }

    /// Convenience constructor for a skipped result.
    pub fn skipped(
        host: impl Into<String>,
        task_name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        let mut r = Self::new(host, task_name, TaskStatus::Skipped);
        r.msg = msg.into();
        r
    }

    /// Convenience constructor for a failed result.
    pub fn failed(
        host: impl Into<String>,
        task_name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        let mut r = Self::new(host, task_name, TaskStatus::Failed);
        r.msg = msg.into();
        r
    }

    /// True for failed or unreachable.
    pub fn is_failed(&self) -> bool {
        matches!(self.status, TaskStatus::Failed | TaskStatus::Unreachable)
    }

    /// True for ok or changed.
    pub fn is_ok(&self) -> bool {
        matches!(self.status, TaskStatus::Ok | TaskStatus::Changed)
    }

    /// JSON view used in machine output and in `changed_when`/`failed_when`
    /// evaluation (bound as `result`).
    pub fn to_value(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("host".into(), json!(self.host));
        obj.insert("task".into(), json!(self.task_name));
        obj.insert("status".into(), json!(self.status.to_string()));
        obj.insert("changed".into(), json!(self.changed));
        obj.insert("rc".into(), json!(self.rc));
        if !self.stdout.is_empty() {
            obj.insert("stdout".into(), json!(self.stdout));
        }
        if !self.stderr.is_empty() {
            obj.insert("stderr".into(), json!(self.stderr));
        }
        if !self.msg.is_empty() {
            obj.insert("msg".into(), json!(self.msg));
        }
        if !self.results.is_empty() {
            for (k, v) in &self.results {
                obj.insert(k.clone(), v.clone());
            }
        }
        if let Some(loop_results) = &self.loop_results {
            obj.insert(
                "loop_results".into(),
                Value::Array(loop_results.iter().map(|r| r.to_value()).collect()),
            );
        }
        Value::Object(obj)
    }

    /// The canonical registered-variable view: `changed, rc, stdout, stderr,
    /// stdout_lines, stderr_lines, failed, msg` plus the module payload.
    pub fn to_registered(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("changed".into(), json!(self.changed));
        obj.insert("rc".into(), json!(self.rc));
        obj.insert("stdout".into(), json!(self.stdout));
        obj.insert("stderr".into(), json!(self.stderr));
        obj.insert(
            "stdout_lines".into(),
            json!(self.stdout.lines().collect::<Vec<_>>()),
        );
        obj.insert(
            "stderr_lines".into(),
            json!(self.stderr.lines().collect::<Vec<_>>()),
        );
        obj.insert("failed".into(), json!(self.is_failed()));
        obj.insert("skipped".into(), json!(self.status == TaskStatus::Skipped));
        obj.insert("msg".into(), json!(self.msg));
        for (k, v) in &self.results {
            obj.insert(k.clone(), v.clone());
        }
        if let Some(loop_results) = &self.loop_results {
            obj.insert(
                "results".into(),
                Value::Array(loop_results.iter().map(|r| r.to_registered()).collect()),
            );
        }
        Value::Object(obj)
    }
}

/// Running per-host status totals. Mergeable across plays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostStats {
    pub ok: u32,
    pub changed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub unreachable: u32,
}

impl HostStats {
    /// Records one task status.
    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Ok => self.ok += 1,
            TaskStatus::Changed => self.changed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Skipped => self.skipped += 1,
            TaskStatus::Unreachable => self.unreachable += 1,
        }
    }

    /// Merges another host's totals into this one.
    pub fn merge(&mut self, other: &HostStats) {
        self.ok += other.ok;
        self.changed += other.changed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.unreachable += other.unreachable;
    }

    /// True when any task failed or the host was unreachable.
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.unreachable > 0
    }

    fn to_value(&self) -> Value {
        json!({
            "ok": self.ok,
            "changed": self.changed,
            "failed": self.failed,
            "skipped": self.skipped,
            "unreachable": self.unreachable,
        })
    }
}

/// Result of one play: the selected hosts, every task result, per-host
/// totals, and the hosts that ended the play in a failed state.
///
/// A block failure that was rescued leaves its failed task result in the
/// stats but does not put the host into `failed_hosts`; the exit code is
/// derived from the final host state, not from per-task counts.
#[derive(Debug, Clone, Default)]
pub struct PlayResult {
    pub play_name: String,
    pub hosts: Vec<String>,
    pub task_results: Vec<TaskResult>,
    pub host_stats: BTreeMap<String, HostStats>,
    pub failed_hosts: std::collections::BTreeSet<String>,
}

impl PlayResult {
    /// Creates an empty play result.
    pub fn new(play_name: impl Into<String>, hosts: Vec<String>) -> Self {
        Self {
            play_name: play_name.into(),
            hosts,
            task_results: Vec::new(),
            host_stats: BTreeMap::new(),
            failed_hosts: std::collections::BTreeSet::new(),
        }
    }

    /// Records that a host ended the play failed or unreachable.
    pub fn mark_host_failed(&mut self, host: impl Into<String>) {
        self.failed_hosts.insert(host.into());
    }

    /// Appends a task result and updates the host's totals.
    pub fn add_result(&mut self, result: TaskResult) {
        self.host_stats
            .entry(result.host.clone())
            .or_default()
            .record(result.status);
        self.task_results.push(result);
    }

    /// True when any host ended the play failed or unreachable.
    pub fn has_failures(&self) -> bool {
        !self.failed_hosts.is_empty()
    }

    fn to_value(&self) -> Value {
        json!({
            "play": self.play_name,
            "hosts": self.hosts,
            "tasks": self.task_results.iter().map(|r| r.to_value()).collect::<Vec<_>>(),
            "stats": self.host_stats.iter()
                .map(|(h, s)| (h.clone(), s.to_value()))
                .collect::<serde_json::Map<String, Value>>(),
        })
    }
}

/// Result of a whole run: the playbook path plus ordered play results.
#[derive(Debug, Clone, Default)]
pub struct PlaybookResult {
    pub playbook_path: String,
    pub play_results: Vec<PlayResult>,
}

impl PlaybookResult {
    /// Creates an empty result for the given playbook path.
    pub fn new(playbook_path: impl Into<String>) -> Self {
        Self {
            playbook_path: playbook_path.into(),
            play_results: Vec::new(),
        }
    }

    /// Appends a play result.
    pub fn add_play_result(&mut self, result: PlayResult) {
        self.play_results.push(result);
    }

    /// Merged per-host totals across every play.
    pub fn final_stats(&self) -> BTreeMap<String, HostStats> {
        let mut merged: BTreeMap<String, HostStats> = BTreeMap::new();
        for play in &self.play_results {
            for (host, stats) in &play.host_stats {
                merged.entry(host.clone()).or_default().merge(stats);
            }
        }
        merged
    }

    /// True when no host failed anywhere in the run.
    pub fn success(&self) -> bool {
        !self.play_results.iter().any(|p| p.has_failures())
    }

    /// Process exit code derived from the results: 0 or 2.
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            2
        }
    }

    /// The stable machine-output document:
    /// `{playbook, plays: [...], stats: {...}}`.
    pub fn to_value(&self) -> Value {
        json!({
            "playbook": self.playbook_path,
            "plays": self.play_results.iter().map(|p| p.to_value()).collect::<Vec<_>>(),
            "stats": self.final_stats().iter()
                .map(|(h, s)| (h.clone(), s.to_value()))
                .collect::<serde_json::Map<String, Value>>(),
        })
    }

    /// Pretty JSON string of [`Self::to_value`].
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.to_value()).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_record_and_merge() {
        let mut a = HostStats::default();
        a.record(TaskStatus::Ok);
        a.record(TaskStatus::Changed);
        let mut b = HostStats::default();
        b.record(TaskStatus::Failed);
        a.merge(&b);

        assert_eq!(a.ok, 1);
        assert_eq!(a.changed, 1);
        assert_eq!(a.failed, 1);
        assert!(a.has_failures());
    }

    #[test]
    fn registered_view_has_line_splits() {
        let mut r = TaskResult::new("h1", "t", TaskStatus::Ok);
        r.stdout = "a\nb".into();
        let reg = r.to_registered();
        assert_eq!(reg["stdout_lines"], json!(["a", "b"]));
        assert_eq!(reg["failed"], json!(false));
    }

    #[test]
    fn machine_output_shape() {
        let mut play = PlayResult::new("site", vec!["h1".into()]);
        let mut r = TaskResult::new("h1", "echo", TaskStatus::Changed);
        r.changed = true;
        play.add_result(r);

        let mut pb = PlaybookResult::new("site.yml");
        pb.add_play_result(play);

        let doc = pb.to_value();
        assert_eq!(doc["playbook"], json!("site.yml"));
        assert_eq!(doc["plays"][0]["play"], json!("site"));
        assert_eq!(doc["plays"][0]["stats"]["h1"]["changed"], json!(1));
        assert_eq!(doc["stats"]["h1"]["changed"], json!(1));
        assert_eq!(pb.exit_code(), 0);
    }

    #[test]
    fn exit_code_two_on_failures() {
        let mut play = PlayResult::new("p", vec!["h1".into()]);
        play.add_result(TaskResult::failed("h1", "t", "boom"));
        play.mark_host_failed("h1");
        let mut pb = PlaybookResult::new("x.yml");
        pb.add_play_result(play);
        assert_eq!(pb.exit_code(), 2);
    }

    #[test]
    fn rescued_failure_does_not_fail_the_run() {
        // A failed task result whose host recovered: stats keep the count,
        // but the run still succeeds.
        let mut play = PlayResult::new("p", vec!["h1".into()]);
        play.add_result(TaskResult::failed("h1", "boom", "rescued later"));
        let mut ok = TaskResult::new("h1", "rescue", TaskStatus::Ok);
        ok.msg = "recovered".into();
        play.add_result(ok);
        let mut pb = PlaybookResult::new("x.yml");
        pb.add_play_result(play);
        assert_eq!(pb.exit_code(), 0);
    }
}
