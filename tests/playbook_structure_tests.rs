//! Playbook structure end-to-end: roles, includes, vars_files, facts.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use runbook::results::{PlaybookResult, TaskStatus};
use runbook::runner::{Runner, RunnerOptions};
use std::sync::Arc;
use tokio::sync::Mutex;

async fn run_in_dir(
    dir: &std::path::Path,
    playbook_name: &str,
) -> runbook::error::Result<PlaybookResult> {
    let options = RunnerOptions {
        inventory: dir.join("hosts.ini"),
        playbooks: vec![dir.join(playbook_name)],
        json_output: true,
        ..Default::default()
    };
    let runner = Runner::new(options)?;
    let accumulator = Arc::new(Mutex::new(PlaybookResult::new(playbook_name)));
    runner.run_async(accumulator).await
}

#[tokio::test]
async fn role_tasks_run_with_role_defaults() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "hosts.ini", LOCALHOST_INVENTORY);
    write_file(dir.path(), "roles/web/defaults/main.yml", "greeting: from-defaults\n");
    write_file(
        dir.path(),
        "roles/web/tasks/main.yml",
        "- name: role speaks\n  debug:\n    msg: \"{{ greeting }}\"\n",
    );
    write_file(
        dir.path(),
        "site.yml",
        "- name: With role\n  hosts: all\n  roles:\n    - web\n  tasks:\n    - name: after roles\n      debug: {msg: done}\n",
    );

    let result = run_in_dir(dir.path(), "site.yml").await.unwrap();
    assert_eq!(result.exit_code(), 0);
    assert_eq!(
        result_of(&result, "localhost", "role speaks").msg,
        "from-defaults"
    );

    // Role tasks precede the play's tasks section.
    let names: Vec<&str> = result.play_results[0]
        .task_results
        .iter()
        .map(|r| r.task_name.as_str())
        .collect();
    let role_pos = names.iter().position(|n| *n == "role speaks").unwrap();
    let after_pos = names.iter().position(|n| *n == "after roles").unwrap();
    assert!(role_pos < after_pos);
}

#[tokio::test]
async fn play_vars_override_role_defaults() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "hosts.ini", LOCALHOST_INVENTORY);
    write_file(dir.path(), "roles/web/defaults/main.yml", "greeting: from-defaults\n");
    write_file(
        dir.path(),
        "roles/web/tasks/main.yml",
        "- name: role speaks\n  debug:\n    msg: \"{{ greeting }}\"\n",
    );
    write_file(
        dir.path(),
        "site.yml",
        "- name: Override\n  hosts: all\n  vars:\n    greeting: from-play\n  roles:\n    - web\n",
    );

    let result = run_in_dir(dir.path(), "site.yml").await.unwrap();
    assert_eq!(
        result_of(&result, "localhost", "role speaks").msg,
        "from-play"
    );
}

#[tokio::test]
async fn vars_files_merge_with_later_overriding() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "hosts.ini", LOCALHOST_INVENTORY);
    write_file(dir.path(), "first.yml", "a: one\nb: one\n");
    write_file(dir.path(), "second.yml", "b: two\n");
    write_file(
        dir.path(),
        "site.yml",
        "- name: Vars files\n  hosts: all\n  vars_files:\n    - first.yml\n    - second.yml\n  tasks:\n    - name: read\n      debug:\n        msg: \"a={{ a }} b={{ b }}\"\n",
    );

    let result = run_in_dir(dir.path(), "site.yml").await.unwrap();
    let read = result_of(&result, "localhost", "read");
    assert!(read.msg.contains("a=one"));
    assert!(read.msg.contains("b=two"));
}

#[tokio::test]
async fn include_tasks_spliced_into_flow() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "hosts.ini", LOCALHOST_INVENTORY);
    write_file(
        dir.path(),
        "extra.yml",
        "- name: included\n  debug: {msg: spliced}\n",
    );
    write_file(
        dir.path(),
        "site.yml",
        "- name: Includes\n  hosts: all\n  tasks:\n    - name: before\n      debug: {msg: a}\n    - include_tasks: extra.yml\n    - name: after\n      debug: {msg: b}\n",
    );

    let result = run_in_dir(dir.path(), "site.yml").await.unwrap();
    let names: Vec<&str> = result.play_results[0]
        .task_results
        .iter()
        .map(|r| r.task_name.as_str())
        .collect();
    assert_eq!(names, vec!["before", "included", "after"]);
}

#[tokio::test]
async fn gather_facts_exposes_subset() {
    let result = run_playbook(
        LOCALHOST_INVENTORY,
        r#"
- name: Facts
  hosts: all
  gather_facts: true
  tasks:
    - name: uses facts
      debug:
        msg: "family={{ ansible_os_family }} host={{ ansible_hostname }}"
    - name: nested view
      debug:
        msg: "{{ ansible_facts.ansible_system }}"
"#,
    )
    .await
    .unwrap();

    assert_eq!(result.exit_code(), 0);
    let uses = result_of(&result, "localhost", "uses facts");
    assert!(uses.msg.contains("family="), "{}", uses.msg);
    let gather = results_for(&result, "Gathering Facts");
    assert_eq!(gather.len(), 1);
    assert_eq!(gather[0].status, TaskStatus::Ok);
}

#[tokio::test]
async fn multiple_plays_share_connection_state() {
    let result = run_playbook(
        LOCALHOST_INVENTORY,
        r#"
- name: First play
  hosts: all
  tasks:
    - name: one
      debug: {msg: a}

- name: Second play
  hosts: all
  tasks:
    - name: two
      debug: {msg: b}
"#,
    )
    .await
    .unwrap();

    assert_eq!(result.play_results.len(), 2);
    assert_eq!(result.exit_code(), 0);
    // Recap merges both plays for the host.
    assert_eq!(result.final_stats()["localhost"].ok, 2);
}

#[tokio::test]
async fn environment_reaches_commands() {
    let result = run_playbook(
        LOCALHOST_INVENTORY,
        r#"
- name: Env
  hosts: all
  environment:
    PLAY_LEVEL: from-play
  tasks:
    - name: echo env
      shell: "echo $PLAY_LEVEL-$TASK_LEVEL"
      environment:
        TASK_LEVEL: from-task
      register: out
    - name: verify
      assert:
        that:
          - "'from-play-from-task' in out.stdout"
"#,
    )
    .await
    .unwrap();

    assert_eq!(result.exit_code(), 0);
}
