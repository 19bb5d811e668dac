//! Role loading.
//!
//! A role is located under `<playbook_dir>/roles/<name>` or
//! `<cwd>/roles/<name>`. Its `defaults/main.yml` (lowest precedence) and
//! `vars/main.yml` (higher) feed the role variable mapping attached to each
//! loaded task; `tasks/main.yml` provides the ordered task list and must
//! exist.

use serde_json::Value;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::playbook::{compose_when, PlaybookLoader, Task};
use crate::vars::{vars_from_yaml_str, Vars};
use crate::vault::read_maybe_encrypted;

/// A parsed `roles:` entry: bare name, or a mapping with extra role
/// variables plus split-out `tags` and `when`.
#[derive(Debug, Clone, Default)]
pub struct RoleRef {
    pub name: String,
    pub vars: Vars,
    pub tags: Vec<String>,
    pub when: Option<String>,
}

impl RoleRef {
    /// Parses a single `roles:` list entry.
    pub fn parse(entry: &Value) -> Result<Self> {
        match entry {
            Value::String(name) => Ok(Self {
                name: name.clone(),
                ..Default::default()
            }),
            Value::Object(map) => {
                let name = map
                    .get("role")
                    .or_else(|| map.get("name"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::Other("Role entry must have 'role' or 'name' key".to_string())
                    })?
                    .to_string();

                let mut vars = Vars::new();
                for (k, v) in map {
                    if !matches!(k.as_str(), "role" | "name" | "tags" | "when") {
                        vars.insert(k.clone(), v.clone());
                    }
                }

                let tags = match map.get("tags") {
                    Some(Value::String(s)) => vec![s.clone()],
                    Some(Value::Array(items)) => items
                        .iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect(),
                    _ => Vec::new(),
                };

                Ok(Self {
                    name,
                    vars,
                    tags,
                    when: map.get("when").and_then(Value::as_str).map(String::from),
                })
            }
            other => Err(Error::Other(format!(
                "Invalid role entry: {}",
                other
            ))),
        }
    }
}

impl PlaybookLoader<'_> {
    /// Loads the tasks of one `roles:` entry.
    pub(crate) fn load_role_entry(&self, entry: &Value) -> Result<Vec<Task>> {
        let role_ref = RoleRef::parse(entry)?;
        self.load_role(&role_ref)
    }

    /// Loads a role's tasks, composing role-level tags and `when` onto each
    /// task and attaching the merged role variables.
    pub(crate) fn load_role(&self, role_ref: &RoleRef) -> Result<Vec<Task>> {
        let role_path = self.find_role_path(&role_ref.name).ok_or_else(|| Error::Role {
            role: role_ref.name.clone(),
            message: "Role not found".to_string(),
        })?;

        // defaults < role params < vars/main.yml
        let mut role_vars = self.load_role_vars_file(&role_path.join("defaults/main.yml"))?;
        for (k, v) in &role_ref.vars {
            role_vars.insert(k.clone(), v.clone());
        }
        for (k, v) in self.load_role_vars_file(&role_path.join("vars/main.yml"))? {
            role_vars.insert(k, v);
        }

        let tasks_file = role_path.join("tasks/main.yml");
        if !tasks_file.exists() {
            return Err(Error::Role {
                role: role_ref.name.clone(),
                message: format!("Role tasks file not found: {}", tasks_file.display()),
            });
        }

        let content = read_maybe_encrypted(&tasks_file, self.vault)?;
        let data: serde_yaml::Value = serde_yaml::from_str(&content)
            .map_err(|e| Error::playbook_parse(&tasks_file, e.to_string()))?;
        let data = crate::vars::yaml_to_json(data);
        if data.is_null() {
            return Ok(Vec::new());
        }

        let mut tasks = self.parse_task_list(Some(&data))?;
        for task in &mut tasks {
            for tag in &role_ref.tags {
                if !task.tags.contains(tag) {
                    task.tags.push(tag.clone());
                }
            }
            if let Some(role_when) = &role_ref.when {
                task.when = Some(compose_when(role_when, task.when.as_deref()));
            }
            for (k, v) in &role_vars {
                task.role_vars.insert(k.clone(), v.clone());
            }
        }
        Ok(tasks)
    }

    fn load_role_vars_file(&self, path: &PathBuf) -> Result<Vars> {
        if !path.exists() {
            return Ok(Vars::new());
        }
        let content = read_maybe_encrypted(path, self.vault)?;
        vars_from_yaml_str(&content).map_err(|e| Error::playbook_parse(path, e.to_string()))
    }

    fn find_role_path(&self, name: &str) -> Option<PathBuf> {
        let candidates = [
            self.base_dir.join("roles").join(name),
            std::env::current_dir().ok()?.join("roles").join(name),
        ];
        candidates.into_iter().find(|p| p.is_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::VaultLib;
    use serde_json::json;

    fn write_role(dir: &std::path::Path, name: &str) {
        let role = dir.join("roles").join(name);
        std::fs::create_dir_all(role.join("tasks")).unwrap();
        std::fs::create_dir_all(role.join("defaults")).unwrap();
        std::fs::create_dir_all(role.join("vars")).unwrap();
        std::fs::write(role.join("defaults/main.yml"), "pkg: nginx\nport: 80\n").unwrap();
        std::fs::write(role.join("vars/main.yml"), "port: 8080\n").unwrap();
        std::fs::write(
            role.join("tasks/main.yml"),
            "- name: install\n  debug:\n    msg: \"{{ pkg }}\"\n",
        )
        .unwrap();
    }

    #[test]
    fn role_ref_shapes() {
        let bare = RoleRef::parse(&json!("common")).unwrap();
        assert_eq!(bare.name, "common");

        let full = RoleRef::parse(&json!({
            "role": "web",
            "http_port": 8080,
            "tags": ["web"],
            "when": "deploy_web"
        }))
        .unwrap();
        assert_eq!(full.name, "web");
        assert_eq!(full.vars["http_port"], json!(8080));
        assert_eq!(full.tags, vec!["web"]);
        assert_eq!(full.when.as_deref(), Some("deploy_web"));
    }

    #[test]
    fn role_loading_merges_vars_and_applies_when() {
        let dir = tempfile::tempdir().unwrap();
        write_role(dir.path(), "web");
        std::fs::write(dir.path().join("site.yml"), "").unwrap();

        let vault = VaultLib::new();
        let loader = PlaybookLoader::new(dir.path().join("site.yml"), &vault);
        let role_ref = RoleRef {
            name: "web".into(),
            vars: Vars::new(),
            tags: vec!["setup".into()],
            when: Some("run_roles".into()),
        };
        let tasks = loader.load_role(&role_ref).unwrap();

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].role_vars["pkg"], json!("nginx"));
        // vars/main.yml overrides defaults
        assert_eq!(tasks[0].role_vars["port"], json!(8080));
        assert!(tasks[0].tags.contains(&"setup".to_string()));
        assert_eq!(tasks[0].when.as_deref(), Some("run_roles"));
    }

    #[test]
    fn missing_role_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("site.yml"), "").unwrap();
        let vault = VaultLib::new();
        let loader = PlaybookLoader::new(dir.path().join("site.yml"), &vault);
        let err = loader
            .load_role(&RoleRef {
                name: "ghost".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::Role { .. }));
    }

    #[test]
    fn missing_tasks_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("roles/empty/defaults")).unwrap();
        std::fs::write(dir.path().join("site.yml"), "").unwrap();
        let vault = VaultLib::new();
        let loader = PlaybookLoader::new(dir.path().join("site.yml"), &vault);
        let err = loader
            .load_role(&RoleRef {
                name: "empty".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::Role { .. }));
    }
}
