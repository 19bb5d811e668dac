//! The execution engine: linear strategy over per-host contexts.
//!
//! For each task the executor fans out across the play's hosts under a
//! counting semaphore (`forks` permits), waits for every host to finish,
//! then moves to the next task. Registered results from task N are visible
//! to task N+1 on the same host. At play end, notified handlers run in
//! declaration order, once per notifying host, drained until stable.

mod context;

pub use context::HostContext;

use futures::future::join_all;
use indexmap::{IndexMap, IndexSet};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

use crate::callback::Callback;
use crate::connection::{Connection, ConnectionCache};
use crate::error::Result;
use crate::inventory::{Host, InventoryManager};
use crate::modules::{self, ModuleCtx};
use crate::playbook::{Play, Task};
use crate::results::{PlayResult, TaskResult, TaskStatus};
use crate::template::TemplateEngine;
use crate::vars::{Precedence, Vars};

/// Ceiling on handler re-notification rounds within one play.
const MAX_HANDLER_ROUNDS: usize = 10;

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Concurrency ceiling for per-host fan-out within one task
    pub forks: usize,
    /// Dry-run mode
    pub check_mode: bool,
    /// Emit diffs from file-mutating modules
    pub diff_mode: bool,
    /// Only run tasks carrying one of these tags (plus `always`)
    pub tags: Vec<String>,
    /// Skip tasks carrying one of these tags
    pub skip_tags: Vec<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            forks: 5,
            check_mode: false,
            diff_mode: false,
            tags: Vec::new(),
            skip_tags: Vec::new(),
        }
    }
}

/// Drives plays across hosts with the linear strategy.
pub struct Executor {
    config: ExecutorConfig,
    engine: Arc<TemplateEngine>,
    cache: Arc<ConnectionCache>,
    inventory: Arc<InventoryManager>,
    callback: Arc<dyn Callback>,
    extra_vars: Vars,
    playbook_dir: PathBuf,
}

impl Executor {
    /// Creates an executor wired to the runner's shared components.
    pub fn new(
        config: ExecutorConfig,
        inventory: Arc<InventoryManager>,
        cache: Arc<ConnectionCache>,
        callback: Arc<dyn Callback>,
        extra_vars: Vars,
        playbook_dir: PathBuf,
    ) -> Self {
        Self {
            config,
            engine: Arc::new(TemplateEngine::new()),
            cache,
            inventory,
            callback,
            extra_vars,
            playbook_dir,
        }
    }

    /// Runs one play against the given (already limited) host selection.
    pub async fn run_play(&self, play: &Play, hosts: Vec<Host>) -> Result<PlayResult> {
        self.callback.on_play_start(&play.name);

        let host_names: Vec<String> = hosts.iter().map(|h| h.name.clone()).collect();
        let mut play_result = PlayResult::new(&play.name, host_names);

        if hosts.is_empty() {
            self.callback
                .warning(&format!("No hosts matched for play pattern '{}'", play.hosts));
            return Ok(play_result);
        }

        // Per-host contexts, seeded low to high: host+group vars, play
        // vars, extra-vars.
        let mut contexts: IndexMap<String, Arc<Mutex<HostContext>>> = IndexMap::new();
        for host in &hosts {
            let mut host = host.clone();
            if let Some(connection) = &play.connection {
                host.vars
                    .insert("ansible_connection".into(), json!(connection));
            }
            let host_vars = self.inventory.get_host_vars(&host.name);
            let mut ctx =
                HostContext::new(host, host_vars, self.config.check_mode, self.config.diff_mode);
            ctx.vars.extend(Precedence::PlayVars, play.vars.clone());
            ctx.vars
                .extend(Precedence::ExtraVars, self.extra_vars.clone());
            ctx.r#become = play.r#become;
            ctx.become_user = play.become_user.clone();
            ctx.become_method = play.become_method.clone();
            contexts.insert(ctx.host.name.clone(), Arc::new(Mutex::new(ctx)));
        }

        // Connection establishment, bounded by the same forks semaphore.
        for result in self.establish_connections(&contexts).await {
            self.callback.on_host_result(&result);
            play_result.add_result(result);
        }

        if play.gather_facts {
            let gather = Task {
                name: "Gathering Facts".to_string(),
                module: "setup".to_string(),
                ..Default::default()
            };
            self.callback.on_task_start(&gather.name, false);
            for result in self.run_task(&gather, &contexts, play, None).await {
                play_result.add_result(result);
            }
        }

        // The task loop: strictly ordered, one fan-out barrier per task.
        for task in &play.tasks {
            if !self.tags_allow(task) {
                debug!(task = %task.name, "Task filtered by tags");
                continue;
            }
            self.callback.on_task_start(&task.name, false);
            for result in self.run_task(task, &contexts, play, None).await {
                play_result.add_result(result);
            }
        }

        self.run_handlers(play, &contexts, &mut play_result).await;

        // Final per-host state drives the exit code; a rescued block does
        // not leave its host failed.
        for (name, ctx_arc) in &contexts {
            let ctx = ctx_arc.lock().await;
            if ctx.failed || ctx.unreachable {
                play_result.mark_host_failed(name.clone());
            }
        }

        Ok(play_result)
    }

    /// True when the task passes `--tags` / `--skip-tags` filtering.
    fn tags_allow(&self, task: &Task) -> bool {
        if task.tags.iter().any(|t| self.config.skip_tags.contains(t)) {
            return false;
        }
        if self.config.tags.is_empty() {
            return true;
        }
        task.tags.iter().any(|t| t == "always" || self.config.tags.contains(t))
    }

    async fn establish_connections(
        &self,
        contexts: &IndexMap<String, Arc<Mutex<HostContext>>>,
    ) -> Vec<TaskResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.forks.max(1)));
        let futures = contexts.values().map(|ctx_arc| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                let mut ctx = ctx_arc.lock().await;
                if ctx.connection.is_some() {
                    return None;
                }
                match self.cache.get_or_connect(&ctx.host).await {
                    Ok(conn) => {
                        ctx.connection = Some(conn);
                        None
                    }
                    Err(e) => {
                        ctx.unreachable = true;
                        ctx.failed = true;
                        let mut result = TaskResult::new(
                            &ctx.host.name,
                            "Establish connection",
                            TaskStatus::Unreachable,
                        );
                        result.msg = e.to_string();
                        Some(result)
                    }
                }
            }
        });
        join_all(futures).await.into_iter().flatten().collect()
    }

    /// Runs one task across all (optionally restricted) hosts, fan-out
    /// bounded by the forks semaphore, fan-in as the inter-task barrier.
    async fn run_task(
        &self,
        task: &Task,
        contexts: &IndexMap<String, Arc<Mutex<HostContext>>>,
        play: &Play,
        restrict: Option<&IndexSet<String>>,
    ) -> Vec<TaskResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.forks.max(1)));
        let futures = contexts
            .iter()
            .filter(|(name, _)| restrict.map(|set| set.contains(*name)).unwrap_or(true))
            .map(|(_, ctx_arc)| {
                let semaphore = semaphore.clone();
                let ctx_arc = ctx_arc.clone();
                async move {
                    let _permit = semaphore.acquire().await.expect("semaphore never closed");
                    let result = self.execute_on_host(task, &ctx_arc, play).await;
                    self.callback.on_host_result(&result);
                    result
                }
            });
        join_all(futures).await
    }

    /// The per-host task execution protocol.
    async fn execute_on_host(
        &self,
        task: &Task,
        ctx_arc: &Arc<Mutex<HostContext>>,
        play: &Play,
    ) -> TaskResult {
        let mut ctx = ctx_arc.lock().await;
        let host_name = ctx.host.name.clone();

        // Eligibility: failed hosts only run matching rescue tasks or
        // always tasks; unreachable hosts run nothing.
        if ctx.unreachable {
            return TaskResult::skipped(&host_name, &task.name, "Host unreachable");
        }
        if task.is_rescue {
            let eligible = task
                .block_name
                .as_ref()
                .map(|block| {
                    ctx.failed_blocks.contains(block) && !ctx.rescued_blocks.contains(block)
                })
                .unwrap_or(false);
            if !eligible {
                return TaskResult::skipped(&host_name, &task.name, "Rescue not required");
            }
        } else if ctx.failed && !task.is_always {
            return TaskResult::skipped(&host_name, &task.name, "Host previously failed");
        }

        // Effective variables: context layers plus role and task vars.
        let mut layered = ctx.vars.clone();
        if !task.role_vars.is_empty() {
            layered.extend(Precedence::RoleVars, task.role_vars.clone());
        }
        if !task.vars.is_empty() {
            layered.extend(Precedence::TaskVars, task.vars.clone());
        }
        let base_vars = layered.flatten();

        // Conditional
        if let Some(when) = &task.when {
            match self.engine.evaluate_when(when, &base_vars) {
                Ok(false) => {
                    return TaskResult::skipped(&host_name, &task.name, "Conditional check failed")
                }
                Ok(true) => {}
                Err(e) => {
                    let result = TaskResult::failed(
                        &host_name,
                        &task.name,
                        format!("Error evaluating 'when': {}", e),
                    );
                    return self.finish(task, &mut ctx, result, &base_vars);
                }
            }
        }

        // Delegation: swap the connection, keep the original host's vars.
        let connection = match &task.delegate_to {
            Some(delegate) => {
                let target = match self.engine.render(delegate, &base_vars) {
                    Ok(target) => target.trim().to_string(),
                    Err(e) => {
                        let result =
                            TaskResult::failed(&host_name, &task.name, e.to_string());
                        return self.finish(task, &mut ctx, result, &base_vars);
                    }
                };
                match self.delegate_connection(&target).await {
                    Ok(conn) => conn,
                    Err(e) => {
                        let result = TaskResult::failed(
                            &host_name,
                            &task.name,
                            format!("Delegation to {} failed: {}", target, e),
                        );
                        return self.finish(task, &mut ctx, result, &base_vars);
                    }
                }
            }
            None => match &ctx.connection {
                Some(conn) => conn.clone(),
                None => {
                    let result =
                        TaskResult::failed(&host_name, &task.name, "No connection established");
                    return self.finish(task, &mut ctx, result, &base_vars);
                }
            },
        };

        let result = if task.loop_items.is_some() {
            self.run_loop(task, &ctx, play, &base_vars, connection).await
        } else {
            self.run_once(task, &ctx, play, &base_vars, connection).await
        };

        let mut result = result;
        if task.delegate_to.is_some() {
            result
                .results
                .insert("delegate_to".into(), json!(task.delegate_to));
        }
        self.finish(task, &mut ctx, result, &base_vars)
    }

    /// Result post-processing: changed_when / failed_when / ignore_errors /
    /// register / notify / fact merge / failure bookkeeping.
    fn finish(
        &self,
        task: &Task,
        ctx: &mut HostContext,
        mut result: TaskResult,
        vars: &Vars,
    ) -> TaskResult {
        if result.status != TaskStatus::Skipped {
            // changed_when / failed_when see the result both as `result`
            // and, when the task registers, under the register name.
            let eval_vars = |result: &TaskResult| {
                let mut eval_vars = vars.clone();
                eval_vars.insert("result".into(), result.to_value());
                if let Some(register) = &task.register {
                    eval_vars.insert(register.clone(), result.to_registered());
                }
                eval_vars
            };

            if let Some(changed_when) = &task.changed_when {
                if result.is_ok() {
                    if let Ok(changed) =
                        self.engine.evaluate_when(changed_when, &eval_vars(&result))
                    {
                        result.changed = changed;
                        result.status = if changed {
                            TaskStatus::Changed
                        } else {
                            TaskStatus::Ok
                        };
                    }
                }
            }

            if let Some(failed_when) = &task.failed_when {
                if let Ok(failed) = self.engine.evaluate_when(failed_when, &eval_vars(&result)) {
                    if failed {
                        result.status = TaskStatus::Failed;
                    } else if result.status == TaskStatus::Failed {
                        result.status = if result.changed {
                            TaskStatus::Changed
                        } else {
                            TaskStatus::Ok
                        };
                    }
                }
            }

            if result.status == TaskStatus::Failed && task.ignore_errors {
                result.status = if result.changed {
                    TaskStatus::Changed
                } else {
                    TaskStatus::Ok
                };
                result.msg = format!("(ignored) {}", result.msg);
            }
        }

        if let Some(register) = &task.register {
            ctx.register(register, &result);
        }

        if let Some(facts) = result.results.get("ansible_facts").cloned() {
            if task.module == "set_fact" {
                ctx.merge_set_facts(&facts);
            } else {
                ctx.merge_facts(&facts);
            }
        }

        if result.is_ok() && result.changed {
            for handler in &task.notify {
                ctx.notified_handlers.insert(handler.clone());
            }
        }

        if result.is_failed() {
            ctx.failed = true;
            if let Some(block) = &task.block_name {
                ctx.failed_blocks.insert(block.clone());
            }
        } else if task.is_rescue && result.status != TaskStatus::Skipped {
            ctx.failed = false;
            if let Some(block) = &task.block_name {
                ctx.rescued_blocks.insert(block.clone());
            }
        }

        result
    }

    /// Single (non-loop) module invocation.
    async fn run_once(
        &self,
        task: &Task,
        ctx: &HostContext,
        play: &Play,
        vars: &Vars,
        connection: Arc<dyn Connection>,
    ) -> TaskResult {
        let host_name = ctx.host.name.clone();

        let rendered_args = match self.engine.render_value(&Value::Object(
            task.args.clone().into_iter().collect(),
        ), vars)
        {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            Ok(_) => Vars::new(),
            Err(e) => {
                return TaskResult::failed(
                    &host_name,
                    &task.name,
                    format!("Template error in task args: {}", e),
                )
            }
        };

        let Some(module) = modules::resolve(&task.module) else {
            return TaskResult::failed(
                &host_name,
                &task.name,
                format!("Unknown module: {}", task.module),
            );
        };

        if let Some(error) = module.validate_args(&rendered_args) {
            return TaskResult::failed(&host_name, &task.name, error);
        }

        // Environment: play-level entries overlaid with task-level ones,
        // both templated.
        let mut environment = IndexMap::new();
        for (k, v) in play.environment.iter().chain(task.environment.iter()) {
            match self.engine.render(v, vars) {
                Ok(rendered) => {
                    environment.insert(k.clone(), rendered);
                }
                Err(e) => {
                    return TaskResult::failed(
                        &host_name,
                        &task.name,
                        format!("Template error in environment: {}", e),
                    )
                }
            }
        }

        let module_ctx = ModuleCtx {
            host_name: host_name.clone(),
            connection,
            check_mode: ctx.check_mode,
            diff_mode: ctx.diff_mode,
            r#become: task.r#become.unwrap_or(ctx.r#become),
            become_user: task
                .become_user
                .clone()
                .unwrap_or_else(|| ctx.become_user.clone()),
            become_method: task
                .become_method
                .clone()
                .unwrap_or_else(|| ctx.become_method.clone()),
            environment,
            vars: vars.clone(),
            engine: self.engine.clone(),
            playbook_dir: self.playbook_dir.clone(),
        };

        let output = if module_ctx.check_mode {
            module.check(&rendered_args, &module_ctx).await
        } else {
            module.run(&rendered_args, &module_ctx).await
        };
        output.to_task_result(&host_name, &task.name)
    }

    /// Loop execution: render the loop source to a list, iterate
    /// sequentially with `loop_var` and `ansible_loop` bound, combine into
    /// one result.
    async fn run_loop(
        &self,
        task: &Task,
        ctx: &HostContext,
        play: &Play,
        vars: &Vars,
        connection: Arc<dyn Connection>,
    ) -> TaskResult {
        let host_name = ctx.host.name.clone();
        let loop_spec = task.loop_items.as_ref().expect("caller checked");

        let items: Vec<Value> = match loop_spec {
            Value::String(expr) => match self.engine.render(expr, vars) {
                Ok(rendered) => match serde_json::from_str::<Value>(&rendered) {
                    Ok(Value::Array(items)) => items,
                    _ => vec![Value::String(rendered)],
                },
                Err(e) => {
                    return TaskResult::failed(
                        &host_name,
                        &task.name,
                        format!("Template error in loop: {}", e),
                    )
                }
            },
            Value::Array(items) => {
                match self
                    .engine
                    .render_value(&Value::Array(items.clone()), vars)
                {
                    Ok(Value::Array(items)) => items,
                    Ok(other) => vec![other],
                    Err(e) => {
                        return TaskResult::failed(
                            &host_name,
                            &task.name,
                            format!("Template error in loop: {}", e),
                        )
                    }
                }
            }
            other => vec![other.clone()],
        };

        let length = items.len();
        let mut iteration_results: Vec<TaskResult> = Vec::with_capacity(length);
        let mut overall_changed = false;
        let mut overall_failed = false;
        let mut failure_msg = String::new();

        for (idx, item) in items.into_iter().enumerate() {
            let mut iter_vars = vars.clone();
            iter_vars.insert(task.loop_var.clone(), item);
            iter_vars.insert(
                "ansible_loop".into(),
                json!({
                    "index": idx + 1,
                    "index0": idx,
                    "first": idx == 0,
                    "last": idx + 1 == length,
                    "length": length,
                }),
            );

            let mut result = self
                .run_once(task, ctx, play, &iter_vars, connection.clone())
                .await;

            if result.changed {
                overall_changed = true;
            }
            if result.is_failed() {
                if task.ignore_errors {
                    result.msg = format!("(ignored) {}", result.msg);
                    result.status = if result.changed {
                        TaskStatus::Changed
                    } else {
                        TaskStatus::Ok
                    };
                    iteration_results.push(result);
                    continue;
                }
                failure_msg = result.msg.clone();
                overall_failed = true;
                iteration_results.push(result);
                break;
            }
            iteration_results.push(result);
        }

        let status = if overall_failed {
            TaskStatus::Failed
        } else if overall_changed {
            TaskStatus::Changed
        } else {
            TaskStatus::Ok
        };
        let mut combined = TaskResult::new(&host_name, &task.name, status);
        combined.changed = overall_changed;
        combined.msg = if overall_failed {
            failure_msg
        } else {
            format!("Loop completed with {} iterations", iteration_results.len())
        };
        combined.loop_results = Some(iteration_results);
        combined
    }

    /// Resolves the delegate target to a connection through the shared
    /// cache: a known inventory host, localhost, or an ad-hoc SSH host.
    async fn delegate_connection(
        &self,
        target: &str,
    ) -> crate::connection::ConnectionResult<Arc<dyn Connection>> {
        if let Some(host) = self.inventory.get_host(target) {
            return self.cache.get_or_connect(host).await;
        }
        let mut vars = Vars::new();
        if target == "localhost" || target == "127.0.0.1" {
            vars.insert("ansible_connection".into(), json!("local"));
        }
        let host = Host::new(target, vars);
        self.cache.get_or_connect(&host).await
    }

    /// Handler phase: run the union of notified handlers in declaration
    /// order, once per notifying host; handlers may notify further
    /// handlers, drained until stable with a hard ceiling.
    async fn run_handlers(
        &self,
        play: &Play,
        contexts: &IndexMap<String, Arc<Mutex<HostContext>>>,
        play_result: &mut PlayResult,
    ) {
        if play.handlers.is_empty() {
            return;
        }

        let mut ran: HashSet<(String, String)> = HashSet::new();

        for round in 0..MAX_HANDLER_ROUNDS {
            let mut fired_this_round = false;

            for handler in &play.handlers {
                // Dedupe comes from the ran-set (at most once per host per
                // play); notifications are not consumed, so several
                // handlers can listen to the same name.
                let mut notified_hosts: IndexSet<String> = IndexSet::new();
                for (name, ctx_arc) in contexts {
                    let ctx = ctx_arc.lock().await;
                    if ctx.failed || ctx.unreachable {
                        continue;
                    }
                    let notified = handler
                        .handler_names()
                        .iter()
                        .any(|n| ctx.notified_handlers.contains(*n));
                    if notified && !ran.contains(&(handler.name.clone(), name.clone())) {
                        notified_hosts.insert(name.clone());
                    }
                }

                if notified_hosts.is_empty() {
                    continue;
                }
                fired_this_round = true;

                self.callback.on_task_start(&handler.name, true);
                let results = self
                    .run_task(handler, contexts, play, Some(&notified_hosts))
                    .await;
                for host in &notified_hosts {
                    ran.insert((handler.name.clone(), host.clone()));
                }
                for result in results {
                    play_result.add_result(result);
                }
            }

            if !fired_this_round {
                return;
            }
            if round == MAX_HANDLER_ROUNDS - 1 {
                warn!("Handler notification ceiling reached; remaining notifications dropped");
                self.callback
                    .warning("Handler notification ceiling reached; stopping handler drain");
            }
        }
    }
}
