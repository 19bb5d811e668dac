//! Scheduler ordering and concurrency bounds.

mod common;

use common::*;
use serial_test::serial;
use std::time::Instant;

/// Four local hosts for fan-out measurements.
const FOUR_HOSTS: &str = "\
n1 ansible_connection=local
n2 ansible_connection=local
n3 ansible_connection=local
n4 ansible_connection=local
";

#[tokio::test]
async fn linear_ordering_between_tasks() {
    // Every host appends its T1 line before any host appends a T2 line:
    // the inter-task barrier guarantees all T1 lines precede all T2 lines.
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("order.log");

    let playbook = format!(
        r#"
- name: Ordering
  hosts: all
  tasks:
    - name: first wave
      shell: "echo T1-{{{{ inventory_hostname }}}} >> {log}"
    - name: second wave
      shell: "echo T2-{{{{ inventory_hostname }}}} >> {log}"
"#,
        log = log.display()
    );

    let result = run_playbook_with(LOCAL_PAIR_INVENTORY, &playbook, |o| o.forks = 2)
        .await
        .unwrap();
    assert_eq!(result.exit_code(), 0);

    let content = std::fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 4);
    let last_t1 = lines.iter().rposition(|l| l.starts_with("T1")).unwrap();
    let first_t2 = lines.iter().position(|l| l.starts_with("T2")).unwrap();
    assert!(
        last_t1 < first_t2,
        "task barrier violated: {:?}",
        lines
    );
}

#[tokio::test]
async fn registered_results_visible_to_next_task_per_host() {
    let result = run_playbook(
        LOCAL_PAIR_INVENTORY,
        r#"
- name: Per-host registers
  hosts: all
  tasks:
    - name: record identity
      shell: "echo ident-{{ inventory_hostname }}"
      register: ident
    - name: read back
      debug:
        msg: "{{ ident.stdout }}"
"#,
    )
    .await
    .unwrap();

    assert!(result_of(&result, "h1", "read back").msg.contains("ident-h1"));
    assert!(result_of(&result, "h2", "read back").msg.contains("ident-h2"));
}

#[tokio::test]
#[serial]
async fn forks_bound_limits_in_flight_executions() {
    // With forks=2, four 500ms sleeps need at least two waves (~1s).
    let playbook = r#"
- name: Sleepers
  hosts: all
  tasks:
    - name: nap
      shell: sleep 0.5
"#;

    let started = Instant::now();
    run_playbook_with(FOUR_HOSTS, playbook, |o| o.forks = 2)
        .await
        .unwrap();
    let bounded = started.elapsed();
    assert!(
        bounded.as_millis() >= 900,
        "forks=2 finished too fast: {:?}",
        bounded
    );

    // With forks=4 all sleeps overlap into one wave.
    let started = Instant::now();
    run_playbook_with(FOUR_HOSTS, playbook, |o| o.forks = 4)
        .await
        .unwrap();
    let parallel = started.elapsed();
    assert!(
        parallel.as_millis() < 900,
        "forks=4 did not run in parallel: {:?}",
        parallel
    );
}

#[tokio::test]
async fn hosts_fail_independently_within_a_task() {
    // One host failing mid-task never aborts the sibling coroutines.
    let result = run_playbook(
        FOUR_HOSTS,
        r#"
- name: Partial failure
  hosts: all
  tasks:
    - name: n3 explodes
      shell: test "{{ inventory_hostname }}" != "n3"
    - name: survivors continue
      debug: {msg: on}
"#,
    )
    .await
    .unwrap();

    let survivors: Vec<&str> = results_for(&result, "survivors continue")
        .iter()
        .filter(|r| r.status == runbook::results::TaskStatus::Ok)
        .map(|r| r.host.as_str())
        .collect();
    assert_eq!(survivors.len(), 3);
    assert!(!survivors.contains(&"n3"));
}
