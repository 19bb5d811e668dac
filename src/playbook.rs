//! Playbook parsing and lowering.
//!
//! Loads a YAML playbook into an ordered list of [`Play`]s whose task lists
//! are already fully lowered: roles and includes are spliced in, blocks are
//! flattened into tasks carrying rescue/always provenance, and every task
//! has a resolved module name. Anything outside the supported surface
//! fails loading with a dedicated unsupported-feature error.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::modules;
use crate::vars::{yaml_to_json, Vars};
use crate::vault::{read_maybe_encrypted, VaultLib};

/// Pattern for fully-qualified collection module names
/// (`namespace.collection.module`).
static FQCN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z_][a-z0-9_]*\.[a-z_][a-z0-9_]*\.[a-z_][a-z0-9_]*$").expect("fqcn regex")
});

/// Pattern for inline `key=value` module arguments with quoted values.
static INLINE_ARGS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(\w+)=(?:"([^"]*)"|'([^']*)'|(\S+))"#).expect("inline args regex"));

/// Task keys that are control keywords rather than module names.
static TASK_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "name", "hosts", "vars", "vars_files", "tasks", "handlers", "roles", "pre_tasks",
        "post_tasks", "gather_facts", "become", "become_user", "become_method", "connection",
        "environment", "strategy", "serial", "max_fail_percentage", "any_errors_fatal",
        "ignore_errors", "ignore_unreachable", "module_defaults", "collections", "tags", "when",
        "register", "loop", "loop_control", "with_items", "with_list", "with_dict",
        "with_fileglob", "with_sequence", "until", "retries", "delay", "changed_when",
        "failed_when", "notify", "listen", "delegate_to", "delegate_facts", "run_once", "block",
        "rescue", "always", "args", "async", "poll", "throttle", "timeout", "no_log", "diff",
        "check_mode", "local_action", "action", "include", "include_tasks", "import_tasks",
        "include_role", "import_role",
    ]
    .into_iter()
    .collect()
});

/// Task/play keys outside the supported surface; their presence aborts the
/// whole load.
const UNSUPPORTED_KEYS: &[&str] = &["async", "poll", "delegate_facts", "local_action", "include"];

/// FQCN aliases that map onto native short module names.
static MODULE_ALIASES: Lazy<IndexMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut map = IndexMap::new();
    for (fqcn, short) in [
        ("ansible.builtin.copy", "copy"),
        ("ansible.builtin.command", "command"),
        ("ansible.builtin.shell", "shell"),
        ("ansible.builtin.raw", "raw"),
        ("ansible.builtin.script", "script"),
        ("ansible.builtin.debug", "debug"),
        ("ansible.builtin.set_fact", "set_fact"),
        ("ansible.builtin.fail", "fail"),
        ("ansible.builtin.assert", "assert"),
        ("ansible.builtin.file", "file"),
        ("ansible.builtin.template", "template"),
        ("ansible.builtin.lineinfile", "lineinfile"),
        ("ansible.builtin.blockinfile", "blockinfile"),
        ("ansible.builtin.stat", "stat"),
        ("ansible.builtin.wait_for", "wait_for"),
        ("ansible.builtin.pause", "pause"),
        ("ansible.builtin.setup", "setup"),
        ("ansible.builtin.service", "service"),
        ("ansible.builtin.systemd", "systemd"),
        ("ansible.builtin.systemd_service", "systemd"),
        ("systemd_service", "systemd"),
        ("ansible.builtin.user", "user"),
        ("ansible.builtin.group", "group"),
        ("ansible.builtin.package", "package"),
        ("ansible.builtin.apt", "apt"),
        ("ansible.builtin.yum", "yum"),
        ("ansible.builtin.dnf", "dnf"),
        ("ansible.builtin.pip", "pip"),
        ("ansible.builtin.git", "git"),
        ("ansible.builtin.uri", "uri"),
        ("ansible.builtin.get_url", "get_url"),
        ("ansible.builtin.unarchive", "unarchive"),
        ("ansible.builtin.cron", "cron"),
        ("ansible.builtin.hostname", "hostname"),
        ("ansible.builtin.known_hosts", "known_hosts"),
        ("ansible.builtin.slurp", "slurp"),
        ("ansible.builtin.find", "find"),
        ("ansible.builtin.ping", "ping"),
        ("ansible.builtin.wait_for_connection", "wait_for_connection"),
        ("ansible.windows.win_copy", "win_copy"),
        ("ansible.windows.win_command", "win_command"),
        ("ansible.windows.win_shell", "win_shell"),
        ("ansible.windows.win_file", "win_file"),
        ("ansible.windows.win_stat", "win_stat"),
        ("ansible.windows.win_service", "win_service"),
        ("ansible.windows.win_user", "win_user"),
        ("ansible.windows.win_group", "win_group"),
        ("ansible.windows.win_ping", "win_ping"),
    ] {
        map.insert(fqcn, short);
    }
    map
});

/// Modules whose free-form string argument becomes `_raw_params`.
const RAW_PARAM_MODULES: &[&str] = &[
    "command",
    "shell",
    "raw",
    "script",
    "win_command",
    "win_shell",
];

/// A fully lowered unit of work.
#[derive(Debug, Clone, Default)]
pub struct Task {
    /// Task name (generated from the module when missing)
    pub name: String,
    /// Resolved module name (short name or FQCN for passthrough)
    pub module: String,
    /// Module arguments; may contain template expressions
    pub args: Vars,
    /// Store the result under this variable name
    pub register: Option<String>,
    /// Conditional expression
    pub when: Option<String>,
    /// Loop source: a list or a template expression yielding one
    pub loop_items: Option<Value>,
    /// Loop variable name (default `item`)
    pub loop_var: String,
    /// Demote failures to ok
    pub ignore_errors: bool,
    /// Re-evaluate changed state against this expression
    pub changed_when: Option<String>,
    /// Re-evaluate failed state against this expression
    pub failed_when: Option<String>,
    /// Per-task environment variables
    pub environment: IndexMap<String, String>,
    /// Tags for `--tags` / `--skip-tags` filtering
    pub tags: Vec<String>,
    /// Task-level variables
    pub vars: Vars,
    /// Handler names to notify on change
    pub notify: Vec<String>,
    /// Additional trigger names (handlers only)
    pub listen: Vec<String>,
    /// Run against this host's connection instead
    pub delegate_to: Option<String>,
    /// Privilege escalation override (None inherits from the play)
    pub r#become: Option<bool>,
    /// Become user override
    pub become_user: Option<String>,
    /// Become method override
    pub become_method: Option<String>,
    /// Variables attached by the enclosing role
    pub role_vars: Vars,
    /// Name of the enclosing block, when lowered from one
    pub block_name: Option<String>,
    /// Lowered from a block's `rescue` section
    pub is_rescue: bool,
    /// Lowered from a block's `always` section
    pub is_always: bool,
}

impl Task {
    /// All names that notify this task when used as a handler.
    pub fn handler_names(&self) -> Vec<&str> {
        let mut names = vec![self.name.as_str()];
        names.extend(self.listen.iter().map(String::as_str));
        names
    }
}

/// A play: a host pattern bound to an ordered, fully lowered task list.
#[derive(Debug, Clone, Default)]
pub struct Play {
    pub name: String,
    pub hosts: String,
    /// pre_tasks, role tasks, tasks and post_tasks, flattened in order
    pub tasks: Vec<Task>,
    pub handlers: Vec<Task>,
    pub vars: Vars,
    pub vars_files: Vec<String>,
    pub gather_facts: bool,
    pub connection: Option<String>,
    pub environment: IndexMap<String, String>,
    pub tags: Vec<String>,
    pub r#become: bool,
    pub become_user: String,
    pub become_method: String,
}

/// Loads and lowers playbooks.
pub struct PlaybookLoader<'a> {
    pub(crate) path: PathBuf,
    pub(crate) base_dir: PathBuf,
    pub(crate) vault: &'a VaultLib,
}

impl<'a> PlaybookLoader<'a> {
    /// Creates a loader for the given playbook path.
    pub fn new(path: impl Into<PathBuf>, vault: &'a VaultLib) -> Self {
        let path = path.into();
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            path,
            base_dir,
            vault,
        }
    }

    /// Parses the playbook into its plays.
    pub fn load(&self) -> Result<Vec<Play>> {
        if !self.path.exists() {
            return Err(Error::playbook_parse(&self.path, "Playbook not found"));
        }
        let content = read_maybe_encrypted(&self.path, self.vault)?;
        self.load_str(&content)
    }

    /// Parses playbook content. Each YAML document is a list of plays; a
    /// bare mapping is accepted as a single play.
    pub fn load_str(&self, content: &str) -> Result<Vec<Play>> {
        use serde::Deserialize;

        let mut play_values: Vec<Value> = Vec::new();
        for document in serde_yaml::Deserializer::from_str(content) {
            let doc = serde_yaml::Value::deserialize(document)
                .map_err(|e| Error::playbook_parse(&self.path, e.to_string()))?;
            if doc.is_null() {
                continue;
            }
            match yaml_to_json(doc) {
                Value::Array(plays) => play_values.extend(plays),
                Value::Object(map) => play_values.push(Value::Object(map)),
                _ => {
                    return Err(Error::playbook_parse(
                        &self.path,
                        "Playbook must be a list of plays",
                    ))
                }
            }
        }

        let mut plays = Vec::new();
        for value in play_values {
            let Value::Object(map) = value else {
                return Err(Error::playbook_parse(&self.path, "Play must be a mapping"));
            };
            plays.push(self.parse_play(&map)?);
        }
        Ok(plays)
    }

    fn parse_play(&self, data: &serde_json::Map<String, Value>) -> Result<Play> {
        self.reject_unsupported(data)?;

        let hosts = data
            .get("hosts")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::playbook_parse(&self.path, "Play missing required 'hosts' field")
            })?
            .to_string();

        let mut play = Play {
            name: data
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("Unnamed play")
                .to_string(),
            hosts,
            gather_facts: data
                .get("gather_facts")
                .map(value_to_bool)
                .unwrap_or(false),
            connection: data
                .get("connection")
                .and_then(Value::as_str)
                .map(String::from),
            environment: string_map(data.get("environment")),
            tags: string_list(data.get("tags")),
            r#become: data.get("become").map(value_to_bool).unwrap_or(false),
            become_user: data
                .get("become_user")
                .and_then(Value::as_str)
                .unwrap_or("root")
                .to_string(),
            become_method: data
                .get("become_method")
                .and_then(Value::as_str)
                .unwrap_or("sudo")
                .to_string(),
            ..Default::default()
        };

        if let Some(vars) = data.get("vars") {
            match vars {
                Value::Object(map) => {
                    play.vars = map.clone().into_iter().collect();
                }
                _ => {
                    return Err(Error::playbook_parse(
                        &self.path,
                        "'vars' must be a mapping",
                    ))
                }
            }
        }

        // vars_files merge into play vars immediately; later files override
        for file in string_list(data.get("vars_files")) {
            play.vars_files.push(file.clone());
            let vars_path = self.base_dir.join(&file);
            if !vars_path.exists() {
                return Err(Error::playbook_parse(
                    &self.path,
                    format!("vars_file not found: {}", file),
                ));
            }
            let content = read_maybe_encrypted(&vars_path, self.vault)?;
            let vars = crate::vars::vars_from_yaml_str(&content)
                .map_err(|e| Error::playbook_parse(&vars_path, e.to_string()))?;
            for (k, v) in vars {
                play.vars.insert(k, v);
            }
        }

        let mut tasks: Vec<Task> = Vec::new();
        for section in ["pre_tasks"] {
            tasks.extend(self.parse_task_list(data.get(section))?);
        }
        if let Some(roles) = data.get("roles") {
            for role_entry in as_list(roles) {
                tasks.extend(self.load_role_entry(&role_entry)?);
            }
        }
        for section in ["tasks", "post_tasks"] {
            tasks.extend(self.parse_task_list(data.get(section))?);
        }
        play.tasks = tasks;

        if let Some(Value::Array(handlers)) = data.get("handlers") {
            for handler_data in handlers {
                if let Value::Object(map) = handler_data {
                    let mut handler = self.parse_task(map)?;
                    handler.listen = string_list(map.get("listen"));
                    play.handlers.push(handler);
                }
            }
        }

        Ok(play)
    }

    /// Parses a task section into lowered tasks, expanding blocks and
    /// includes along the way.
    pub(crate) fn parse_task_list(&self, data: Option<&Value>) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        let Some(Value::Array(entries)) = data else {
            return Ok(tasks);
        };
        for entry in entries {
            if let Value::Object(map) = entry {
                tasks.extend(self.parse_task_or_block(map)?);
            }
        }
        Ok(tasks)
    }

    pub(crate) fn parse_task_or_block(
        &self,
        data: &serde_json::Map<String, Value>,
    ) -> Result<Vec<Task>> {
        if data.contains_key("block") {
            return self.parse_block(data);
        }
        if data.contains_key("include_tasks") || data.contains_key("import_tasks") {
            return self.parse_include_tasks(data);
        }
        if data.contains_key("include_role") || data.contains_key("import_role") {
            return self.parse_include_role(data);
        }
        Ok(vec![self.parse_task(data)?])
    }

    /// Lowers a block into its tasks: block items first (with block-level
    /// when/become/tags pushed in where not overridden), then rescue items,
    /// then always items, each carrying the block name.
    fn parse_block(&self, data: &serde_json::Map<String, Value>) -> Result<Vec<Task>> {
        self.reject_unsupported(data)?;

        let block_name = data
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("block")
            .to_string();
        let block_when = data.get("when").map(when_to_string);
        let block_become = data.get("become").map(value_to_bool);
        let block_become_user = data
            .get("become_user")
            .and_then(Value::as_str)
            .map(String::from);
        let block_tags = string_list(data.get("tags"));

        let apply = |mut task: Task, rescue: bool, always: bool| -> Task {
            if task.when.is_none() {
                task.when = block_when.clone();
            }
            if task.r#become.is_none() {
                task.r#become = block_become;
            }
            if task.become_user.is_none() {
                task.become_user = block_become_user.clone();
            }
            for tag in &block_tags {
                if !task.tags.contains(tag) {
                    task.tags.push(tag.clone());
                }
            }
            task.block_name = Some(block_name.clone());
            task.is_rescue = rescue;
            task.is_always = always;
            task
        };

        let mut tasks = Vec::new();
        for task in self.parse_task_list(data.get("block"))? {
            tasks.push(apply(task, false, false));
        }
        for task in self.parse_task_list(data.get("rescue"))? {
            tasks.push(apply(task, true, false));
        }
        for task in self.parse_task_list(data.get("always"))? {
            tasks.push(apply(task, false, true));
        }
        Ok(tasks)
    }

    /// Parses one plain task mapping into a lowered [`Task`].
    pub(crate) fn parse_task(&self, data: &serde_json::Map<String, Value>) -> Result<Task> {
        self.reject_unsupported(data)?;

        // The module key is the single key outside the control-keyword set.
        let mut module_name: Option<String> = None;
        let mut module_args: Option<&Value> = None;

        for (key, value) in data {
            if TASK_KEYWORDS.contains(key.as_str()) {
                continue;
            }
            let normalized = MODULE_ALIASES
                .get(key.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| key.clone());

            if modules::is_registered(&normalized) {
                module_name = Some(normalized);
                module_args = Some(value);
                break;
            }
            if FQCN_RE.is_match(key) {
                module_name = Some(key.clone());
                module_args = Some(value);
                break;
            }
            return Err(Error::Unsupported(format!(
                "Module '{}' is not supported",
                key
            )));
        }

        let module = module_name.ok_or_else(|| {
            Error::playbook_parse(
                &self.path,
                format!(
                    "Task has no recognized module: {:?}",
                    data.keys().collect::<Vec<_>>()
                ),
            )
        })?;

        let args = self.normalize_args(&module, module_args)?;

        let loop_items = data
            .get("loop")
            .or_else(|| data.get("with_items"))
            .or_else(|| data.get("with_list"))
            .cloned();
        let loop_var = data
            .get("loop_control")
            .and_then(|lc| lc.get("loop_var"))
            .and_then(Value::as_str)
            .unwrap_or("item")
            .to_string();

        Ok(Task {
            name: data
                .get("name")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| format!("{} task", module)),
            module,
            args,
            register: data
                .get("register")
                .and_then(Value::as_str)
                .map(String::from),
            when: data.get("when").map(when_to_string),
            loop_items,
            loop_var,
            ignore_errors: data.get("ignore_errors").map(value_to_bool).unwrap_or(false),
            changed_when: data.get("changed_when").map(when_to_string),
            failed_when: data.get("failed_when").map(when_to_string),
            environment: string_map(data.get("environment")),
            tags: string_list(data.get("tags")),
            vars: match data.get("vars") {
                Some(Value::Object(map)) => map.clone().into_iter().collect(),
                _ => Vars::new(),
            },
            notify: string_list(data.get("notify")),
            listen: Vec::new(),
            delegate_to: data
                .get("delegate_to")
                .and_then(Value::as_str)
                .map(String::from),
            r#become: data.get("become").map(value_to_bool),
            become_user: data
                .get("become_user")
                .and_then(Value::as_str)
                .map(String::from),
            become_method: data
                .get("become_method")
                .and_then(Value::as_str)
                .map(String::from),
            role_vars: Vars::new(),
            block_name: None,
            is_rescue: false,
            is_always: false,
        })
    }

    /// Normalizes module arguments: a mapping passes through, an inline
    /// `key=value` string is parsed, and a free-form string becomes
    /// `_raw_params` for the shell family.
    fn normalize_args(&self, module: &str, args: Option<&Value>) -> Result<Vars> {
        let Some(args) = args else {
            return Ok(Vars::new());
        };
        match args {
            Value::Null => Ok(Vars::new()),
            Value::Object(map) => Ok(map.clone().into_iter().collect()),
            Value::String(s) => {
                let mut parsed = Vars::new();
                for caps in INLINE_ARGS_RE.captures_iter(s) {
                    let key = caps[1].to_string();
                    let value = caps
                        .get(2)
                        .or_else(|| caps.get(3))
                        .or_else(|| caps.get(4))
                        .map(|m| m.as_str())
                        .unwrap_or_default();
                    parsed.insert(key, Value::String(value.to_string()));
                }
                if parsed.is_empty() && RAW_PARAM_MODULES.contains(&module) {
                    parsed.insert("_raw_params".into(), Value::String(s.clone()));
                }
                Ok(parsed)
            }
            other => {
                let mut parsed = Vars::new();
                parsed.insert("_raw_params".into(), other.clone());
                Ok(parsed)
            }
        }
    }

    fn reject_unsupported(&self, data: &serde_json::Map<String, Value>) -> Result<()> {
        for key in UNSUPPORTED_KEYS {
            if data.contains_key(*key) {
                return Err(Error::Unsupported(format!("'{}' in playbooks", key)));
            }
        }
        Ok(())
    }
}

/// AND-composes two conditions: `(outer) and (inner)`.
pub(crate) fn compose_when(outer: &str, inner: Option<&str>) -> String {
    match inner {
        Some(inner) if !inner.is_empty() => format!("({}) and ({})", outer, inner),
        _ => outer.to_string(),
    }
}

/// Normalizes a `when` value: strings pass through, lists AND-join, other
/// scalars stringify.
fn when_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" and "),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn value_to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => crate::template::coerce_bool(s),
        Value::Number(n) => n.as_i64().map(|i| i != 0).unwrap_or(false),
        _ => false,
    }
}

/// A string-or-list value flattened to a list of strings.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    }
}

fn string_map(value: Option<&Value>) -> IndexMap<String, String> {
    let mut map = IndexMap::new();
    if let Some(Value::Object(obj)) = value {
        for (k, v) in obj {
            let s = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            map.insert(k.clone(), s);
        }
    }
    map
}

fn as_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loader(vault: &VaultLib) -> PlaybookLoader<'_> {
        PlaybookLoader::new("site.yml", vault)
    }

    #[test]
    fn parse_minimal_play() {
        let vault = VaultLib::new();
        let plays = loader(&vault)
            .load_str(
                r#"
- name: Web setup
  hosts: web
  tasks:
    - name: Say hello
      debug:
        msg: hello
"#,
            )
            .unwrap();
        assert_eq!(plays.len(), 1);
        assert_eq!(plays[0].name, "Web setup");
        assert_eq!(plays[0].hosts, "web");
        assert_eq!(plays[0].tasks.len(), 1);
        assert_eq!(plays[0].tasks[0].module, "debug");
        assert!(!plays[0].gather_facts);
    }

    #[test]
    fn missing_hosts_is_parse_error() {
        let vault = VaultLib::new();
        let err = loader(&vault)
            .load_str("- name: nope\n  tasks: []\n")
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn unsupported_keys_rejected() {
        let vault = VaultLib::new();
        for snippet in [
            "- hosts: all\n  tasks:\n    - shell: ls\n      async: 10\n",
            "- hosts: all\n  tasks:\n    - shell: ls\n      poll: 5\n",
            "- hosts: all\n  tasks:\n    - local_action: shell ls\n",
            "- hosts: all\n  tasks:\n    - include: other.yml\n",
            "- hosts: all\n  tasks:\n    - shell: ls\n      delegate_facts: true\n",
        ] {
            let err = loader(&vault).load_str(snippet).unwrap_err();
            assert_eq!(err.exit_code(), 4, "snippet: {}", snippet);
        }
    }

    #[test]
    fn unknown_module_is_unsupported() {
        let vault = VaultLib::new();
        let err = loader(&vault)
            .load_str("- hosts: all\n  tasks:\n    - frobnicate:\n        x: 1\n")
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn fqcn_alias_maps_to_short_name() {
        let vault = VaultLib::new();
        let plays = loader(&vault)
            .load_str(
                "- hosts: all\n  tasks:\n    - ansible.builtin.copy:\n        src: a\n        dest: b\n",
            )
            .unwrap();
        assert_eq!(plays[0].tasks[0].module, "copy");
    }

    #[test]
    fn unmapped_fqcn_passes_through() {
        let vault = VaultLib::new();
        let plays = loader(&vault)
            .load_str(
                "- hosts: all\n  tasks:\n    - community.general.ufw:\n        rule: allow\n",
            )
            .unwrap();
        assert_eq!(plays[0].tasks[0].module, "community.general.ufw");
    }

    #[test]
    fn inline_args_parsed() {
        let vault = VaultLib::new();
        let plays = loader(&vault)
            .load_str("- hosts: all\n  tasks:\n    - copy: src=a.txt dest=\"/tmp/b c.txt\"\n")
            .unwrap();
        let args = &plays[0].tasks[0].args;
        assert_eq!(args["src"], json!("a.txt"));
        assert_eq!(args["dest"], json!("/tmp/b c.txt"));
    }

    #[test]
    fn free_form_shell_becomes_raw_params() {
        let vault = VaultLib::new();
        let plays = loader(&vault)
            .load_str("- hosts: all\n  tasks:\n    - shell: echo hello | wc -c\n")
            .unwrap();
        assert_eq!(
            plays[0].tasks[0].args["_raw_params"],
            json!("echo hello | wc -c")
        );
    }

    #[test]
    fn when_list_joins_with_and() {
        let vault = VaultLib::new();
        let plays = loader(&vault)
            .load_str(
                "- hosts: all\n  tasks:\n    - debug:\n        msg: hi\n      when:\n        - a > 1\n        - b < 2\n",
            )
            .unwrap();
        assert_eq!(plays[0].tasks[0].when.as_deref(), Some("a > 1 and b < 2"));
    }

    #[test]
    fn notify_string_becomes_list() {
        let vault = VaultLib::new();
        let plays = loader(&vault)
            .load_str(
                "- hosts: all\n  tasks:\n    - shell: ls\n      notify: restart svc\n  handlers:\n    - name: restart svc\n      shell: systemctl restart svc\n",
            )
            .unwrap();
        assert_eq!(plays[0].tasks[0].notify, vec!["restart svc"]);
        assert_eq!(plays[0].handlers.len(), 1);
    }

    #[test]
    fn block_lowering_order_and_flags() {
        let vault = VaultLib::new();
        let plays = loader(&vault)
            .load_str(
                r#"
- hosts: all
  tasks:
    - name: deploy
      block:
        - name: step1
          shell: do-it
      rescue:
        - name: cleanup
          debug:
            msg: rescued
      always:
        - name: report
          debug:
            msg: done
"#,
            )
            .unwrap();

        let tasks = &plays[0].tasks;
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].name, "step1");
        assert_eq!(tasks[0].block_name.as_deref(), Some("deploy"));
        assert!(!tasks[0].is_rescue && !tasks[0].is_always);
        assert!(tasks[1].is_rescue);
        assert!(tasks[2].is_always);
    }

    #[test]
    fn block_when_pushed_into_tasks() {
        let vault = VaultLib::new();
        let plays = loader(&vault)
            .load_str(
                r#"
- hosts: all
  tasks:
    - block:
        - shell: one
        - shell: two
          when: override_cond
      when: block_cond
      become: true
"#,
            )
            .unwrap();
        let tasks = &plays[0].tasks;
        assert_eq!(tasks[0].when.as_deref(), Some("block_cond"));
        assert_eq!(tasks[1].when.as_deref(), Some("override_cond"));
        assert_eq!(tasks[0].r#become, Some(true));
    }

    #[test]
    fn play_order_pre_tasks_roles_tasks_post() {
        let vault = VaultLib::new();
        let plays = loader(&vault)
            .load_str(
                r#"
- hosts: all
  pre_tasks:
    - name: pre
      debug: {msg: pre}
  tasks:
    - name: mid
      debug: {msg: mid}
  post_tasks:
    - name: post
      debug: {msg: post}
"#,
            )
            .unwrap();
        let names: Vec<&str> = plays[0].tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["pre", "mid", "post"]);
    }

    #[test]
    fn multi_document_stream() {
        let vault = VaultLib::new();
        let plays = loader(&vault)
            .load_str("---\n- hosts: a\n  tasks: []\n---\n- hosts: b\n  tasks: []\n")
            .unwrap();
        assert_eq!(plays.len(), 2);
    }
}
