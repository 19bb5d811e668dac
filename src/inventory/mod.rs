//! Host and group inventory management.
//!
//! Parses INI, YAML and JSON inventories, directories of those, and dynamic
//! inventory scripts into one Host/Group graph, then resolves host patterns
//! against it. Adjacent `host_vars/` and `group_vars/` directories
//! contribute variables, transparently decrypting vault-encrypted files.

mod group;
mod host;

pub use group::Group;
pub use host::{Host, Transport};

use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::vars::{vars_from_yaml_str, yaml_to_json, Vars};
use crate::vault::{read_maybe_encrypted, VaultLib};

/// Pattern for numeric host ranges: `web[01:03].example.com`.
static RANGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+):(\d+)\]").expect("range regex"));

/// Pattern for inline INI variable assignments: `key=value`, quoted values
/// allowed.
static VAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(\w+)=(?:"([^"]*)"|'([^']*)'|(\S+))"#).expect("var regex"));

/// The parsed inventory: hosts, groups, and pattern resolution.
#[derive(Debug, Default)]
pub struct InventoryManager {
    hosts: IndexMap<String, Host>,
    groups: IndexMap<String, Group>,
}

impl InventoryManager {
    /// Creates an empty inventory with the implicit `all` and `ungrouped`
    /// groups.
    pub fn new() -> Self {
        let mut inv = Self::default();
        inv.groups.insert("all".into(), Group::new("all"));
        inv.groups.insert("ungrouped".into(), Group::new("ungrouped"));
        inv
    }

    /// Parses an inventory source: a file (INI/YAML/JSON or executable
    /// dynamic script), or a directory of such files.
    pub async fn parse(source: &Path, vault: &VaultLib) -> Result<Self> {
        let mut inv = Self::new();

        if !source.exists() {
            return Err(Error::inventory(
                source,
                "Inventory path does not exist".to_string(),
            ));
        }

        let vars_base = if source.is_file() {
            inv.parse_file(source, vault).await?;
            source.parent().map(Path::to_path_buf)
        } else if source.is_dir() {
            inv.parse_directory(source, vault).await?;
            Some(source.to_path_buf())
        } else {
            return Err(Error::inventory(source, "Invalid inventory source".to_string()));
        };

        if let Some(base) = vars_base {
            inv.load_vars_directories(&base, vault)?;
        }

        inv.finalize();
        Ok(inv)
    }

    /// All hosts in declaration order.
    pub fn all_hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    /// Looks up a host by name.
    pub fn get_host(&self, name: &str) -> Option<&Host> {
        self.hosts.get(name)
    }

    /// Looks up a group by name.
    pub fn get_group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    /// Group names in declaration order.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Resolves a host pattern.
    ///
    /// Supports `all`, comma-separated unions, `!pattern` difference,
    /// `a:&b` intersection, group names (child closure) and single host
    /// names. Unknown tokens yield the empty set. The result order follows
    /// inventory declaration order and contains no duplicates.
    pub fn get_hosts(&self, pattern: &str) -> Vec<&Host> {
        let names = self.resolve_pattern(pattern);
        self.hosts
            .values()
            .filter(|h| names.contains(&h.name))
            .collect()
    }

    fn resolve_pattern(&self, pattern: &str) -> IndexSet<String> {
        let pattern = pattern.trim();
        if pattern.is_empty() || pattern == "all" || pattern == "*" {
            return self.hosts.keys().cloned().collect();
        }

        // Comma union (difference tokens apply to the union built so far)
        if pattern.contains(',') {
            let mut result = IndexSet::new();
            for token in pattern.split(',') {
                let token = token.trim();
                if token.is_empty() {
                    continue;
                }
                if let Some(excluded) = token.strip_prefix('!') {
                    let exclude = self.resolve_pattern(excluded);
                    result.retain(|name| !exclude.contains(name));
                } else {
                    result.extend(self.resolve_pattern(token));
                }
            }
            return result;
        }

        // Colon-separated with difference/intersection segments
        if pattern.contains(':') {
            let mut result = IndexSet::new();
            for token in pattern.split(':') {
                let token = token.trim();
                if token.is_empty() {
                    continue;
                }
                if let Some(intersected) = token.strip_prefix('&') {
                    let other = self.resolve_pattern(intersected);
                    result.retain(|name| other.contains(name));
                } else if let Some(excluded) = token.strip_prefix('!') {
                    let exclude = self.resolve_pattern(excluded);
                    result.retain(|name| !exclude.contains(name));
                } else {
                    result.extend(self.resolve_pattern(token));
                }
            }
            return result;
        }

        // Bare difference: everything except the excluded set
        if let Some(excluded) = pattern.strip_prefix('!') {
            let exclude = self.resolve_pattern(excluded);
            return self
                .hosts
                .keys()
                .filter(|name| !exclude.contains(*name))
                .cloned()
                .collect();
        }

        // Group (with child closure) or single host
        if self.groups.contains_key(pattern) {
            return self.group_hosts_recursive(pattern);
        }
        if self.hosts.contains_key(pattern) {
            let mut set = IndexSet::new();
            set.insert(pattern.to_string());
            return set;
        }

        IndexSet::new()
    }

    fn group_hosts_recursive(&self, group_name: &str) -> IndexSet<String> {
        let mut result = IndexSet::new();
        let mut stack = vec![group_name.to_string()];
        let mut seen = IndexSet::new();

        while let Some(name) = stack.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(group) = self.groups.get(&name) {
                for host in group.hosts() {
                    result.insert(host.to_string());
                }
                for child in group.children() {
                    stack.push(child.to_string());
                }
            }
        }

        result
    }

    /// Layered variables for a host: group `all`, then the host's other
    /// groups, then host vars (with computed names). Extra-vars and play
    /// vars sit above this at execution time.
    pub fn get_host_vars(&self, host_name: &str) -> Vars {
        let mut merged = Vars::new();
        let Some(host) = self.hosts.get(host_name) else {
            return merged;
        };

        if let Some(all) = self.groups.get("all") {
            for (k, v) in &all.vars {
                merged.insert(k.clone(), v.clone());
            }
        }
        for group_name in host.groups() {
            if group_name == "all" {
                continue;
            }
            if let Some(group) = self.groups.get(group_name) {
                for (k, v) in &group.vars {
                    merged.insert(k.clone(), v.clone());
                }
            }
        }
        for (k, v) in host.all_vars() {
            merged.insert(k, v);
        }
        merged
    }

    // ------------------------------------------------------------------
    // Parsing
    // ------------------------------------------------------------------

    async fn parse_file(&mut self, path: &Path, vault: &VaultLib) -> Result<()> {
        if is_executable_script(path) {
            return self.parse_dynamic(path).await;
        }

        let content = read_maybe_encrypted(path, vault)
            .map_err(|e| Error::inventory(path, e.to_string()))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yml") | Some("yaml") => self.parse_yaml_str(&content, path),
            Some("json") => {
                let data: Value = serde_json::from_str(&content)
                    .map_err(|e| Error::inventory(path, format!("Invalid JSON: {}", e)))?;
                self.parse_structured(&data, path)
            }
            _ => {
                let trimmed = content.trim_start();
                if trimmed.starts_with("---")
                    || trimmed.starts_with("all:")
                    || trimmed.starts_with("ungrouped:")
                {
                    if self.parse_yaml_str(&content, path).is_ok() {
                        return Ok(());
                    }
                }
                self.parse_ini_str(&content, path)
            }
        }
    }

    async fn parse_directory(&mut self, path: &Path, vault: &VaultLib) -> Result<()> {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
            .map_err(|e| Error::inventory(path, e.to_string()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        entries.sort();

        for entry in entries {
            if !entry.is_file() {
                continue;
            }
            let name = entry
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if name.starts_with('.') || name == "host_vars" || name == "group_vars" {
                continue;
            }
            if matches!(
                entry.extension().and_then(|e| e.to_str()),
                Some("bak") | Some("orig")
            ) {
                continue;
            }
            Box::pin(self.parse_file(&entry, vault)).await?;
        }
        Ok(())
    }

    /// Runs an executable inventory script with `--list` and parses its
    /// JSON output.
    async fn parse_dynamic(&mut self, path: &Path) -> Result<()> {
        debug!(script = %path.display(), "Running dynamic inventory script");

        let output = tokio::process::Command::new(path)
            .arg("--list")
            .output()
            .await
            .map_err(|e| Error::inventory(path, format!("Failed to run script: {}", e)))?;

        if !output.status.success() {
            return Err(Error::inventory(
                path,
                format!(
                    "Dynamic inventory script exited with {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr)
                ),
            ));
        }

        let data: Value = serde_json::from_slice(&output.stdout).map_err(|e| {
            Error::inventory(path, format!("Dynamic inventory emitted invalid JSON: {}", e))
        })?;
        self.parse_structured(&data, path)
    }

    /// Parses a structured (YAML/JSON/dynamic) inventory document.
    ///
    /// Two shapes are accepted per group: a bare list of host names, or a
    /// mapping with `hosts`, `vars` and `children`. A top-level `_meta`
    /// mapping contributes `hostvars`.
    fn parse_structured(&mut self, data: &Value, source: &Path) -> Result<()> {
        let Value::Object(map) = data else {
            return Err(Error::inventory(source, "Inventory root must be a mapping".to_string()));
        };

        let mut meta_hostvars: Option<&Value> = None;

        for (group_name, group_data) in map {
            if group_name == "_meta" {
                meta_hostvars = group_data.get("hostvars");
                continue;
            }
            self.parse_structured_group(group_name, group_data);
        }

        if let Some(Value::Object(hostvars)) = meta_hostvars {
            for (host_name, vars) in hostvars {
                if let Some(host) = self.hosts.get_mut(host_name) {
                    if let Value::Object(vars) = vars {
                        for (k, v) in vars {
                            host.set_var(k.clone(), v.clone());
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn parse_structured_group(&mut self, name: &str, data: &Value) {
        self.ensure_group(name);

        match data {
            // {group: [h1, h2]}
            Value::Array(host_names) => {
                for host_name in host_names {
                    if let Value::String(host_name) = host_name {
                        self.add_host_to_group(host_name, Vars::new(), name);
                    }
                }
            }
            // {group: {hosts: ..., vars: ..., children: ...}}
            Value::Object(map) => {
                match map.get("hosts") {
                    Some(Value::Object(hosts)) => {
                        for (host_name, host_vars) in hosts {
                            let vars = match host_vars {
                                Value::Object(m) => m.clone().into_iter().collect(),
                                _ => Vars::new(),
                            };
                            self.add_host_to_group(host_name, vars, name);
                        }
                    }
                    Some(Value::Array(hosts)) => {
                        for host_name in hosts {
                            if let Value::String(host_name) = host_name {
                                self.add_host_to_group(host_name, Vars::new(), name);
                            }
                        }
                    }
                    _ => {}
                }

                if let Some(Value::Object(vars)) = map.get("vars") {
                    for (k, v) in vars {
                        self.groups
                            .get_mut(name)
                            .expect("group ensured")
                            .set_var(k.clone(), v.clone());
                    }
                }

                match map.get("children") {
                    Some(Value::Object(children)) => {
                        for (child_name, child_data) in children {
                            self.groups
                                .get_mut(name)
                                .expect("group ensured")
                                .add_child(child_name.clone());
                            self.parse_structured_group(child_name, child_data);
                            if let Some(child) = self.groups.get_mut(child_name) {
                                child.add_parent(name.to_string());
                            }
                        }
                    }
                    Some(Value::Array(children)) => {
                        for child_name in children {
                            if let Value::String(child_name) = child_name {
                                self.ensure_group(child_name);
                                self.groups
                                    .get_mut(name)
                                    .expect("group ensured")
                                    .add_child(child_name.clone());
                                self.groups
                                    .get_mut(child_name)
                                    .expect("group ensured")
                                    .add_parent(name.to_string());
                            }
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn parse_yaml_str(&mut self, content: &str, source: &Path) -> Result<()> {
        let data: serde_yaml::Value = serde_yaml::from_str(content)
            .map_err(|e| Error::inventory(source, format!("Invalid YAML: {}", e)))?;
        if data.is_null() {
            return Ok(());
        }
        let data = yaml_to_json(data);
        self.parse_structured(&data, source)
    }

    fn parse_ini_str(&mut self, content: &str, source: &Path) -> Result<()> {
        #[derive(PartialEq)]
        enum Section {
            Hosts,
            Vars,
            Children,
        }

        let mut current_group: Option<String> = None;
        let mut section = Section::Hosts;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let header = line[1..line.len() - 1].trim();
                if let Some(group) = header.strip_suffix(":vars") {
                    section = Section::Vars;
                    current_group = Some(group.trim().to_string());
                    self.ensure_group(group.trim());
                } else if let Some(group) = header.strip_suffix(":children") {
                    section = Section::Children;
                    current_group = Some(group.trim().to_string());
                    self.ensure_group(group.trim());
                } else {
                    section = Section::Hosts;
                    current_group = Some(header.to_string());
                    self.ensure_group(header);
                }
                continue;
            }

            match section {
                Section::Vars => {
                    if let Some((key, value)) = parse_ini_var_line(line) {
                        if let Some(group) = &current_group {
                            self.groups
                                .get_mut(group)
                                .expect("group ensured")
                                .set_var(key, value);
                        }
                    }
                }
                Section::Children => {
                    if let Some(parent) = &current_group {
                        let parent = parent.clone();
                        self.ensure_group(line);
                        self.groups
                            .get_mut(&parent)
                            .expect("group ensured")
                            .add_child(line.to_string());
                        self.groups
                            .get_mut(line)
                            .expect("group ensured")
                            .add_parent(parent);
                    }
                }
                Section::Hosts => {
                    let (pattern, vars) = parse_ini_host_line(line);
                    let names = expand_host_range(&pattern)
                        .map_err(|msg| Error::inventory(source, msg))?;
                    for name in names {
                        let group = current_group.clone();
                        self.add_host_to_group(
                            &name,
                            vars.clone(),
                            group.as_deref().unwrap_or("ungrouped"),
                        );
                    }
                }
            }
        }

        Ok(())
    }

    fn load_vars_directories(&mut self, base: &Path, vault: &VaultLib) -> Result<()> {
        let group_vars = base.join("group_vars");
        if group_vars.is_dir() {
            for (name, vars) in load_vars_dir(&group_vars, vault)? {
                self.ensure_group(&name);
                let group = self.groups.get_mut(&name).expect("group ensured");
                for (k, v) in vars {
                    group.set_var(k, v);
                }
            }
        }

        let host_vars = base.join("host_vars");
        if host_vars.is_dir() {
            for (name, vars) in load_vars_dir(&host_vars, vault)? {
                if let Some(host) = self.hosts.get_mut(&name) {
                    for (k, v) in vars {
                        host.set_var(k, v);
                    }
                } else {
                    warn!(host = %name, "host_vars entry for unknown host");
                }
            }
        }

        Ok(())
    }

    fn ensure_group(&mut self, name: &str) {
        if !self.groups.contains_key(name) {
            self.groups.insert(name.to_string(), Group::new(name));
        }
    }

    fn add_host_to_group(&mut self, host_name: &str, vars: Vars, group: &str) {
        self.ensure_group(group);
        let host = self
            .hosts
            .entry(host_name.to_string())
            .or_insert_with(|| Host::new(host_name, Vars::new()));
        for (k, v) in vars {
            host.set_var(k, v);
        }
        host.add_group(group);
        self.groups
            .get_mut(group)
            .expect("group ensured")
            .add_host(host_name);
    }

    /// Puts every host into `all` and parks hosts without an explicit group
    /// in `ungrouped`.
    fn finalize(&mut self) {
        let host_names: Vec<String> = self.hosts.keys().cloned().collect();
        for name in host_names {
            let explicit: Vec<String> = {
                let host = &self.hosts[&name];
                host.groups()
                    .filter(|g| *g != "all" && *g != "ungrouped")
                    .map(String::from)
                    .collect()
            };

            let host = self.hosts.get_mut(&name).expect("host exists");
            host.add_group("all");
            self.groups.get_mut("all").expect("implicit group").add_host(&name);

            if explicit.is_empty() {
                host.add_group("ungrouped");
                self.groups
                    .get_mut("ungrouped")
                    .expect("implicit group")
                    .add_host(&name);
            }
        }
    }

    // ------------------------------------------------------------------
    // Inventory tool output
    // ------------------------------------------------------------------

    /// The full inventory as the dynamic-inventory JSON shape, with
    /// `_meta.hostvars`.
    pub fn to_list_json(&self) -> Value {
        let mut doc = serde_json::Map::new();

        let mut hostvars = serde_json::Map::new();
        for host in self.hosts.values() {
            hostvars.insert(
                host.name.clone(),
                Value::Object(self.get_host_vars(&host.name).into_iter().collect()),
            );
        }
        doc.insert("_meta".into(), json!({ "hostvars": hostvars }));

        for group in self.groups.values() {
            let mut entry = serde_json::Map::new();
            let hosts: Vec<&str> = group.hosts().collect();
            if !hosts.is_empty() {
                entry.insert("hosts".into(), json!(hosts));
            }
            let children: Vec<&str> = group.children().collect();
            if group.name == "all" {
                let mut all_children: Vec<&str> = self
                    .groups
                    .keys()
                    .filter(|g| *g != "all")
                    .map(String::as_str)
                    .collect();
                all_children.sort_unstable();
                entry.insert("children".into(), json!(all_children));
            } else if !children.is_empty() {
                entry.insert("children".into(), json!(children));
            }
            if !group.vars.is_empty() {
                entry.insert(
                    "vars".into(),
                    Value::Object(group.vars.clone().into_iter().collect()),
                );
            }
            doc.insert(group.name.clone(), Value::Object(entry));
        }

        Value::Object(doc)
    }

    /// Text tree of the group graph rooted at `@all`.
    pub fn to_graph(&self) -> String {
        let mut out = String::from("@all:\n");
        let mut top_level: Vec<&Group> = self
            .groups
            .values()
            .filter(|g| g.name != "all" && g.parents().next().is_none())
            .collect();
        top_level.sort_by(|a, b| a.name.cmp(&b.name));

        for group in top_level {
            self.graph_group(group, 1, &mut out);
        }
        out
    }

    fn graph_group(&self, group: &Group, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        out.push_str(&format!("{}|--@{}:\n", indent, group.name));
        for child in group.children() {
            if let Some(child_group) = self.groups.get(child) {
                self.graph_group(child_group, depth + 1, out);
            }
        }
        for host in group.hosts() {
            out.push_str(&format!("{}  |--{}\n", indent, host));
        }
    }
}

/// Expands numeric ranges in a host pattern, preserving the declared zero
/// padding. Multiple spans expand recursively. An inverted range is an
/// error.
pub fn expand_host_range(pattern: &str) -> std::result::Result<Vec<String>, String> {
    let Some(caps) = RANGE_RE.captures(pattern) else {
        return Ok(vec![pattern.to_string()]);
    };
    let full = caps.get(0).expect("match exists");
    let start_str = &caps[1];
    let start: u64 = start_str.parse().map_err(|_| "Invalid range start".to_string())?;
    let end: u64 = caps[2].parse().map_err(|_| "Invalid range end".to_string())?;

    if end < start {
        return Err(format!("Invalid host range in '{}': end before start", pattern));
    }

    let width = start_str.len();
    let mut results = Vec::new();
    for i in start..=end {
        let expanded = format!(
            "{}{:0width$}{}",
            &pattern[..full.start()],
            i,
            &pattern[full.end()..],
            width = width
        );
        results.extend(expand_host_range(&expanded)?);
    }
    Ok(results)
}

fn parse_ini_host_line(line: &str) -> (String, Vars) {
    let mut parts = line.split_whitespace();
    let pattern = parts.next().unwrap_or_default().to_string();
    let rest: String = parts.collect::<Vec<_>>().join(" ");

    let mut vars = Vars::new();
    for caps in VAR_RE.captures_iter(&rest) {
        let key = caps[1].to_string();
        let raw = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str())
            .unwrap_or_default();
        vars.insert(key, coerce_ini_value(raw));
    }
    (pattern, vars)
}

fn parse_ini_var_line(line: &str) -> Option<(String, Value)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim().to_string();
    let mut value = value.trim();
    if (value.starts_with('"') && value.ends_with('"') && value.len() >= 2)
        || (value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2)
    {
        value = &value[1..value.len() - 1];
    }
    Some((key, coerce_ini_value(value)))
}

/// Coerces an INI value string to bool/int/float/null when recognizable.
fn coerce_ini_value(value: &str) -> Value {
    match value.to_lowercase().as_str() {
        "true" | "yes" => return Value::Bool(true),
        "false" | "no" => return Value::Bool(false),
        "null" | "none" | "~" => return Value::Null,
        _ => {}
    }
    if let Ok(i) = value.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = value.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(value.to_string())
}

/// Loads every YAML file under a `host_vars/` or `group_vars/` directory.
/// The stem of each file (or the name of each subdirectory) is the host or
/// group name.
fn load_vars_dir(dir: &Path, vault: &VaultLib) -> Result<Vec<(String, Vars)>> {
    let mut out = Vec::new();
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| Error::inventory(dir, e.to_string()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for entry in entries {
        let Some(stem) = entry.file_stem().map(|s| s.to_string_lossy().to_string()) else {
            continue;
        };
        if stem.starts_with('.') {
            continue;
        }

        if entry.is_file() {
            if matches!(
                entry.extension().and_then(|e| e.to_str()),
                Some("yml") | Some("yaml")
            ) {
                let content = read_maybe_encrypted(&entry, vault)?;
                let vars = vars_from_yaml_str(&content)
                    .map_err(|e| Error::inventory(&entry, e.to_string()))?;
                out.push((stem, vars));
            }
        } else if entry.is_dir() {
            let mut merged = Vars::new();
            let mut files: Vec<PathBuf> = std::fs::read_dir(&entry)
                .map_err(|e| Error::inventory(&entry, e.to_string()))?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| {
                    matches!(
                        p.extension().and_then(|e| e.to_str()),
                        Some("yml") | Some("yaml")
                    )
                })
                .collect();
            files.sort();
            for file in files {
                let content = read_maybe_encrypted(&file, vault)?;
                let vars = vars_from_yaml_str(&content)
                    .map_err(|e| Error::inventory(&file, e.to_string()))?;
                for (k, v) in vars {
                    merged.insert(k, v);
                }
            }
            out.push((stem, merged));
        }
    }
    Ok(out)
}

/// True when the path is a regular file with the executable bit set (POSIX
/// only; on other platforms dynamic scripts are not detected).
fn is_executable_script(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.is_file()
            && std::fs::metadata(path)
                .map(|m| m.permissions().mode() & 0o111 != 0)
                .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        false
    }
}
