//! Shared fixtures for the integration tests: write an inventory and a
//! playbook into a temp dir, drive the real runner, and hand back the
//! machine result for assertions.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use runbook::results::{PlaybookResult, TaskResult};
use runbook::runner::{Runner, RunnerOptions};

/// Two local hosts; enough for fan-out and ordering checks.
pub const LOCAL_PAIR_INVENTORY: &str =
    "h1 ansible_connection=local\nh2 ansible_connection=local\n";

/// The classic single-host inventory.
pub const LOCALHOST_INVENTORY: &str = "localhost ansible_connection=local\n";

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// Runs a playbook against an inventory, both given as strings, with
/// optional tweaks to the runner options. Returns the aggregated result.
pub async fn run_playbook_with(
    inventory: &str,
    playbook: &str,
    tweak: impl FnOnce(&mut RunnerOptions),
) -> runbook::error::Result<PlaybookResult> {
    let dir = tempfile::tempdir().unwrap();
    let inventory_path = write_file(dir.path(), "hosts.ini", inventory);
    let playbook_path = write_file(dir.path(), "site.yml", playbook);

    let mut options = RunnerOptions {
        inventory: inventory_path,
        playbooks: vec![playbook_path],
        json_output: true,
        ..Default::default()
    };
    tweak(&mut options);

    let runner = Runner::new(options)?;
    let accumulator = Arc::new(Mutex::new(PlaybookResult::new("site.yml")));
    runner.run_async(accumulator).await
}

/// Runs with default options.
pub async fn run_playbook(
    inventory: &str,
    playbook: &str,
) -> runbook::error::Result<PlaybookResult> {
    run_playbook_with(inventory, playbook, |_| {}).await
}

/// All results for a given task name, across hosts, in completion order.
pub fn results_for<'a>(result: &'a PlaybookResult, task_name: &str) -> Vec<&'a TaskResult> {
    result
        .play_results
        .iter()
        .flat_map(|p| p.task_results.iter())
        .filter(|r| r.task_name == task_name)
        .collect()
}

/// The single result of a task on a host; panics when absent.
pub fn result_of<'a>(
    result: &'a PlaybookResult,
    host: &str,
    task_name: &str,
) -> &'a TaskResult {
    results_for(result, task_name)
        .into_iter()
        .find(|r| r.host == host)
        .unwrap_or_else(|| panic!("no result for task '{}' on host '{}'", task_name, host))
}
