//! Per-host, per-run execution state.

use indexmap::IndexSet;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::connection::Connection;
use crate::inventory::Host;
use crate::results::TaskResult;
use crate::vars::{LayeredVars, Precedence, Vars};

/// Mutable per-host state for the lifetime of one play.
///
/// Each host coroutine owns its context for the duration of a task; between
/// tasks the scheduler holds them. Registered results become visible to the
/// next task only.
pub struct HostContext {
    /// The inventory host this context belongs to
    pub host: Host,
    /// Layered variables (inventory, facts, play vars, registered, extra)
    pub vars: LayeredVars,
    /// Established connection; absent until the play connects
    pub connection: Option<Arc<dyn Connection>>,
    /// Dry-run mode
    pub check_mode: bool,
    /// Diff mode
    pub diff_mode: bool,
    /// A non-ignored failure occurred; only rescue/always tasks still run
    pub failed: bool,
    /// The connection could never be established; terminal
    pub unreachable: bool,
    /// Play-level become defaults (tasks may override)
    pub r#become: bool,
    pub become_user: String,
    pub become_method: String,
    /// Handler names notified by changed tasks, pending the handler phase
    pub notified_handlers: IndexSet<String>,
    /// Blocks that failed on this host (enables their rescue sections)
    pub failed_blocks: BTreeSet<String>,
    /// Blocks whose rescue completed on this host
    pub rescued_blocks: BTreeSet<String>,
}

impl HostContext {
    /// Creates a context for a host, seeded with its inventory variables.
    pub fn new(host: Host, host_vars: Vars, check_mode: bool, diff_mode: bool) -> Self {
        let mut vars = LayeredVars::new();
        vars.extend(Precedence::HostVars, host_vars);
        Self {
            host,
            vars,
            connection: None,
            check_mode,
            diff_mode,
            failed: false,
            unreachable: false,
            r#become: false,
            become_user: "root".to_string(),
            become_method: "sudo".to_string(),
            notified_handlers: IndexSet::new(),
            failed_blocks: BTreeSet::new(),
            rescued_blocks: BTreeSet::new(),
        }
    }

    /// The flattened variable view used for templating.
    pub fn effective_vars(&self) -> Vars {
        self.vars.flatten()
    }

    /// Stores a task result under `name` in its canonical registered shape.
    pub fn register(&mut self, name: &str, result: &TaskResult) {
        self.vars
            .set(Precedence::Registered, name, result.to_registered());
    }

    /// Merges gathered facts: nested under `ansible_facts` and flattened at
    /// the top level.
    pub fn merge_facts(&mut self, facts: &Value) {
        if let Value::Object(map) = facts {
            for (k, v) in map {
                self.vars.set(Precedence::Facts, k.clone(), v.clone());
            }
        }
        self.vars
            .set(Precedence::Facts, "ansible_facts", facts.clone());
    }

    /// Merges `set_fact` output (above facts, below registered results).
    pub fn merge_set_facts(&mut self, facts: &Value) {
        if let Value::Object(map) = facts {
            for (k, v) in map {
                self.vars.set(Precedence::SetFacts, k.clone(), v.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::TaskStatus;
    use serde_json::json;

    fn context() -> HostContext {
        let host = Host::new("web01", Vars::new());
        let mut host_vars = Vars::new();
        host_vars.insert("color".into(), json!("blue"));
        HostContext::new(host, host_vars, false, false)
    }

    #[test]
    fn registered_results_visible_in_vars() {
        let mut ctx = context();
        let mut result = TaskResult::new("web01", "probe", TaskStatus::Changed);
        result.changed = true;
        result.stdout = "out".into();
        ctx.register("probe_result", &result);

        let vars = ctx.effective_vars();
        assert_eq!(vars["probe_result"]["changed"], json!(true));
        assert_eq!(vars["probe_result"]["stdout"], json!("out"));
        assert_eq!(vars["color"], json!("blue"));
    }

    #[test]
    fn facts_merge_nested_and_flat() {
        let mut ctx = context();
        ctx.merge_facts(&json!({"ansible_os_family": "Debian"}));

        let vars = ctx.effective_vars();
        assert_eq!(vars["ansible_os_family"], json!("Debian"));
        assert_eq!(vars["ansible_facts"]["ansible_os_family"], json!("Debian"));
    }

    #[test]
    fn set_facts_override_gathered_facts() {
        let mut ctx = context();
        ctx.merge_facts(&json!({"release": "gathered"}));
        ctx.merge_set_facts(&json!({"release": "explicit"}));
        assert_eq!(ctx.effective_vars()["release"], json!("explicit"));
    }
}
