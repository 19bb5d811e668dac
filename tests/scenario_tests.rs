//! End-to-end scenarios driving the real runner against localhost.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use runbook::results::TaskStatus;

#[tokio::test]
async fn localhost_shell_reports_one_ok() {
    let result = run_playbook(
        LOCALHOST_INVENTORY,
        r#"
- name: Smoke
  hosts: all
  tasks:
    - name: Say hello
      shell: echo hello
      changed_when: false
"#,
    )
    .await
    .unwrap();

    assert_eq!(result.exit_code(), 0);
    let stats = result.final_stats();
    assert_eq!(stats["localhost"].ok, 1);
    assert_eq!(stats["localhost"].failed, 0);

    let hello = result_of(&result, "localhost", "Say hello");
    assert!(hello.stdout.contains("hello"));
}

#[tokio::test]
async fn failure_skips_remaining_tasks_and_exits_two() {
    let result = run_playbook(
        LOCALHOST_INVENTORY,
        r#"
- name: Failing play
  hosts: all
  tasks:
    - name: Boom
      command: /bin/false
    - name: after
      debug:
        msg: "after"
"#,
    )
    .await
    .unwrap();

    assert_eq!(result.exit_code(), 2);
    assert_eq!(
        result_of(&result, "localhost", "Boom").status,
        TaskStatus::Failed
    );
    assert_eq!(
        result_of(&result, "localhost", "after").status,
        TaskStatus::Skipped
    );
}

#[tokio::test]
async fn rescue_recovers_the_host() {
    let result = run_playbook(
        LOCALHOST_INVENTORY,
        r#"
- name: Rescued play
  hosts: all
  tasks:
    - name: guarded
      block:
        - name: Boom
          command: /bin/false
      rescue:
        - name: Recover
          debug:
            msg: rescued
    - name: continues
      debug:
        msg: still running
"#,
    )
    .await
    .unwrap();

    assert_eq!(result.exit_code(), 0);
    assert_eq!(
        result_of(&result, "localhost", "Boom").status,
        TaskStatus::Failed
    );
    assert_eq!(
        result_of(&result, "localhost", "Recover").status,
        TaskStatus::Ok
    );
    // The host is not failed anymore: later tasks run.
    assert_eq!(
        result_of(&result, "localhost", "continues").status,
        TaskStatus::Ok
    );
}

#[tokio::test]
async fn loop_with_partial_change() {
    let dir = tempfile::tempdir().unwrap();
    // Two of the three destinations already carry the desired content.
    std::fs::write(dir.path().join("a.txt"), "payload-a\n").unwrap();
    std::fs::write(dir.path().join("b.txt"), "payload-b\n").unwrap();

    let playbook = format!(
        r#"
- name: Loop copy
  hosts: all
  tasks:
    - name: Place files
      copy:
        content: "payload-{{{{ item }}}}\n"
        dest: "{}/{{{{ item }}}}.txt"
      loop: [a, b, c]
"#,
        dir.path().display()
    );

    let result = run_playbook(LOCALHOST_INVENTORY, &playbook).await.unwrap();
    assert_eq!(result.exit_code(), 0);

    let combined = result_of(&result, "localhost", "Place files");
    assert!(combined.changed);
    assert_eq!(combined.status, TaskStatus::Changed);

    let sub = combined.loop_results.as_ref().unwrap();
    assert_eq!(sub.len(), 3);
    assert_eq!(sub[0].status, TaskStatus::Ok);
    assert_eq!(sub[1].status, TaskStatus::Ok);
    assert_eq!(sub[2].status, TaskStatus::Changed);
}

#[tokio::test]
async fn check_mode_makes_no_changes_and_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("conf.txt");

    let playbook = format!(
        r#"
- name: Check mode
  hosts: all
  tasks:
    - name: Would copy
      copy:
        content: "data"
        dest: "{}"
"#,
        dest.display()
    );

    for _ in 0..2 {
        let result = run_playbook_with(LOCALHOST_INVENTORY, &playbook, |o| {
            o.check_mode = true;
        })
        .await
        .unwrap();

        assert_eq!(result.exit_code(), 0);
        let r = result_of(&result, "localhost", "Would copy");
        assert!(r.changed);
        assert!(r.msg.contains("check mode"), "{}", r.msg);
        assert!(!dest.exists(), "check mode must not write the file");
    }
}

#[tokio::test]
async fn tags_filter_tasks() {
    let result = run_playbook_with(
        LOCALHOST_INVENTORY,
        r#"
- name: Tagged
  hosts: all
  tasks:
    - name: wanted
      debug: {msg: in}
      tags: [deploy]
    - name: unwanted
      debug: {msg: out}
      tags: [cleanup]
    - name: pinned
      debug: {msg: always}
      tags: [always]
"#,
        |o| o.tags = vec!["deploy".to_string()],
    )
    .await
    .unwrap();

    assert_eq!(results_for(&result, "wanted").len(), 1);
    assert!(results_for(&result, "unwanted").is_empty());
    assert_eq!(results_for(&result, "pinned").len(), 1);
}

#[tokio::test]
async fn limit_restricts_hosts() {
    let result = run_playbook_with(
        LOCAL_PAIR_INVENTORY,
        r#"
- name: Limited
  hosts: all
  tasks:
    - name: touchpoint
      debug: {msg: hi}
"#,
        |o| o.limit = Some("h1".to_string()),
    )
    .await
    .unwrap();

    let touched = results_for(&result, "touchpoint");
    assert_eq!(touched.len(), 1);
    assert_eq!(touched[0].host, "h1");
}

#[tokio::test]
async fn register_flows_between_tasks() {
    let result = run_playbook(
        LOCALHOST_INVENTORY,
        r#"
- name: Register
  hosts: all
  tasks:
    - name: probe
      shell: echo marker-value
      register: probe_out
    - name: echo registered
      debug:
        msg: "got {{ probe_out.stdout }}"
    - name: conditional on rc
      debug:
        msg: ran
      when: probe_out.rc == 0
    - name: conditional against stdout
      debug:
        msg: skipped branch
      when: "'other' in probe_out.stdout"
"#,
    )
    .await
    .unwrap();

    assert_eq!(result.exit_code(), 0);
    assert!(result_of(&result, "localhost", "echo registered")
        .msg
        .contains("marker-value"));
    assert_eq!(
        result_of(&result, "localhost", "conditional on rc").status,
        TaskStatus::Ok
    );
    assert_eq!(
        result_of(&result, "localhost", "conditional against stdout").status,
        TaskStatus::Skipped
    );
}

#[tokio::test]
async fn set_fact_and_vars_precedence() {
    let result = run_playbook_with(
        LOCALHOST_INVENTORY,
        r#"
- name: Facts
  hosts: all
  vars:
    color: play
  tasks:
    - name: override
      set_fact:
        color: fact
    - name: read
      debug:
        msg: "color={{ color }} extra={{ level }}"
"#,
        |o| o.extra_vars = vec!["level=extra".to_string()],
    )
    .await
    .unwrap();

    let read = result_of(&result, "localhost", "read");
    assert!(read.msg.contains("color=fact"), "{}", read.msg);
    assert!(read.msg.contains("extra=extra"), "{}", read.msg);
}

#[tokio::test]
async fn unsupported_feature_aborts_with_exit_four() {
    let err = run_playbook(
        LOCALHOST_INVENTORY,
        "- hosts: all\n  tasks:\n    - shell: ls\n      async: 10\n",
    )
    .await
    .unwrap_err();
    assert_eq!(err.exit_code(), 4);
}

#[tokio::test]
async fn parse_error_exits_three() {
    let err = run_playbook(LOCALHOST_INVENTORY, "- name: no hosts key\n  tasks: []\n")
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn delegate_failure_marks_original_host() {
    let result = run_playbook(
        LOCAL_PAIR_INVENTORY,
        r#"
- name: Delegation
  hosts: h1
  tasks:
    - name: fail on delegate
      command: /bin/false
      delegate_to: h2
    - name: after delegate
      debug: {msg: hi}
"#,
    )
    .await
    .unwrap();

    assert_eq!(result.exit_code(), 2);
    let failed = result_of(&result, "h1", "fail on delegate");
    assert_eq!(failed.status, TaskStatus::Failed);
    // The result is attributed to the original host and the host is dead.
    assert_eq!(
        result_of(&result, "h1", "after delegate").status,
        TaskStatus::Skipped
    );
}

#[tokio::test]
async fn delegate_keeps_original_vars() {
    let result = run_playbook(
        LOCAL_PAIR_INVENTORY,
        r#"
- name: Delegation vars
  hosts: h1
  tasks:
    - name: where am i
      debug:
        msg: "{{ inventory_hostname }}"
      delegate_to: h2
"#,
    )
    .await
    .unwrap();

    // Templating still sees the original host's variables.
    assert_eq!(result_of(&result, "h1", "where am i").msg, "h1");
}
