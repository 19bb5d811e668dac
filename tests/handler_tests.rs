//! Handler semantics: dedupe, declaration order, listen, and same-phase
//! re-notification.

mod common;

use common::*;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn handler_runs_once_despite_multiple_notifications() {
    let result = run_playbook(
        LOCALHOST_INVENTORY,
        r#"
- name: Notify twice
  hosts: all
  tasks:
    - name: change one
      shell: echo one
      notify: restart svc
    - name: change two
      shell: echo two
      notify: restart svc
    - name: no change
      debug: {msg: quiet}
      notify: restart svc
  handlers:
    - name: restart svc
      debug:
        msg: restarting
"#,
    )
    .await
    .unwrap();

    assert_eq!(result.exit_code(), 0);
    assert_eq!(results_for(&result, "restart svc").len(), 1);
}

#[tokio::test]
async fn unnotified_handler_never_runs() {
    let result = run_playbook(
        LOCALHOST_INVENTORY,
        r#"
- name: No changes
  hosts: all
  tasks:
    - name: quiet
      debug: {msg: nothing changed}
      notify: restart svc
  handlers:
    - name: restart svc
      debug: {msg: restarting}
"#,
    )
    .await
    .unwrap();

    assert!(results_for(&result, "restart svc").is_empty());
}

#[tokio::test]
async fn handlers_run_in_declaration_order() {
    let result = run_playbook(
        LOCALHOST_INVENTORY,
        r#"
- name: Order
  hosts: all
  tasks:
    - name: notify second first
      shell: echo x
      notify:
        - handler two
        - handler one
  handlers:
    - name: handler one
      debug: {msg: first declared}
    - name: handler two
      debug: {msg: second declared}
"#,
    )
    .await
    .unwrap();

    let order: Vec<&str> = result.play_results[0]
        .task_results
        .iter()
        .map(|r| r.task_name.as_str())
        .filter(|name| name.starts_with("handler"))
        .collect();
    assert_eq!(order, vec!["handler one", "handler two"]);
}

#[tokio::test]
async fn listen_names_trigger_handlers() {
    let result = run_playbook(
        LOCALHOST_INVENTORY,
        r#"
- name: Listen
  hosts: all
  tasks:
    - name: broadcast
      shell: echo x
      notify: web stack restart
  handlers:
    - name: restart nginx
      debug: {msg: nginx}
      listen: web stack restart
    - name: restart app
      debug: {msg: app}
      listen: web stack restart
"#,
    )
    .await
    .unwrap();

    assert_eq!(results_for(&result, "restart nginx").len(), 1);
    assert_eq!(results_for(&result, "restart app").len(), 1);
}

#[tokio::test]
async fn handler_renotification_drains_in_same_phase() {
    let result = run_playbook(
        LOCALHOST_INVENTORY,
        r#"
- name: Chained handlers
  hosts: all
  tasks:
    - name: trigger
      shell: echo x
      notify: first handler
  handlers:
    - name: first handler
      shell: echo chained
      notify: second handler
    - name: second handler
      debug: {msg: reached}
"#,
    )
    .await
    .unwrap();

    assert_eq!(result.exit_code(), 0);
    assert_eq!(results_for(&result, "first handler").len(), 1);
    // The notification raised inside the first handler is drained in the
    // same handler phase, not postponed to a later play.
    assert_eq!(results_for(&result, "second handler").len(), 1);
}

#[tokio::test]
async fn handler_cycle_is_bounded() {
    // Two handlers notifying each other: the once-per-host rule plus the
    // round ceiling stop the drain.
    let result = run_playbook(
        LOCALHOST_INVENTORY,
        r#"
- name: Cycle
  hosts: all
  tasks:
    - name: trigger
      shell: echo x
      notify: ping handler
  handlers:
    - name: ping handler
      shell: echo ping
      notify: pong handler
    - name: pong handler
      shell: echo pong
      notify: ping handler
"#,
    )
    .await
    .unwrap();

    assert_eq!(results_for(&result, "ping handler").len(), 1);
    assert_eq!(results_for(&result, "pong handler").len(), 1);
}

#[tokio::test]
async fn handler_runs_per_notifying_host_only() {
    let result = run_playbook(
        LOCAL_PAIR_INVENTORY,
        r#"
- name: Partial notify
  hosts: all
  tasks:
    - name: change on h1 only
      shell: echo changing
      when: inventory_hostname == 'h1'
      notify: restart svc
  handlers:
    - name: restart svc
      debug: {msg: restarting}
"#,
    )
    .await
    .unwrap();

    let runs = results_for(&result, "restart svc");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].host, "h1");
}
