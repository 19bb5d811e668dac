//! Task and role inclusion.
//!
//! `include_tasks` and `import_tasks` are both resolved statically at load
//! time: the referenced file's tasks are spliced into the flat task list,
//! with include-level `when` AND-composed into each task and include-level
//! tags unioned. `include_role` / `import_role` splice the named role's
//! task list the same way.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::playbook::{compose_when, PlaybookLoader, Task};
use crate::roles::RoleRef;
use crate::vars::Vars;
use crate::vault::read_maybe_encrypted;

impl PlaybookLoader<'_> {
    pub(crate) fn parse_include_tasks(
        &self,
        data: &serde_json::Map<String, Value>,
    ) -> Result<Vec<Task>> {
        let spec = data
            .get("include_tasks")
            .or_else(|| data.get("import_tasks"))
            .expect("caller checked for include key");

        let file = match spec {
            Value::String(path) => path.clone(),
            Value::Object(map) => map
                .get("file")
                .and_then(Value::as_str)
                .map(String::from)
                .ok_or_else(|| {
                    Error::playbook_parse(
                        &self.path,
                        "include_tasks/import_tasks requires a file path",
                    )
                })?,
            _ => {
                return Err(Error::playbook_parse(
                    &self.path,
                    "include_tasks/import_tasks requires a file path",
                ))
            }
        };

        let tasks_path = self.base_dir.join(&file);
        if !tasks_path.exists() {
            return Err(Error::playbook_parse(
                &self.path,
                format!("Tasks file not found: {}", file),
            ));
        }

        let content = read_maybe_encrypted(&tasks_path, self.vault)?;
        let parsed: serde_yaml::Value = serde_yaml::from_str(&content)
            .map_err(|e| Error::playbook_parse(&tasks_path, e.to_string()))?;
        let parsed = crate::vars::yaml_to_json(parsed);
        if parsed.is_null() {
            return Ok(Vec::new());
        }
        if !parsed.is_array() {
            return Err(Error::playbook_parse(
                &tasks_path,
                "Tasks file must contain a list",
            ));
        }

        let mut tasks = self.parse_task_list(Some(&parsed))?;
        apply_include_modifiers(&mut tasks, data);
        Ok(tasks)
    }

    pub(crate) fn parse_include_role(
        &self,
        data: &serde_json::Map<String, Value>,
    ) -> Result<Vec<Task>> {
        let spec = data
            .get("include_role")
            .or_else(|| data.get("import_role"))
            .expect("caller checked for include key");

        let mut role_ref = match spec {
            Value::String(name) => RoleRef {
                name: name.clone(),
                ..Default::default()
            },
            Value::Object(map) => {
                let name = map
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::playbook_parse(
                            &self.path,
                            "include_role/import_role requires 'name'",
                        )
                    })?
                    .to_string();
                let mut vars = Vars::new();
                for (k, v) in map {
                    if k != "name" {
                        vars.insert(k.clone(), v.clone());
                    }
                }
                RoleRef {
                    name,
                    vars,
                    ..Default::default()
                }
            }
            _ => {
                return Err(Error::playbook_parse(
                    &self.path,
                    "include_role/import_role requires a role name",
                ))
            }
        };

        // Task-level vars become role params
        if let Some(Value::Object(vars)) = data.get("vars") {
            for (k, v) in vars {
                role_ref.vars.insert(k.clone(), v.clone());
            }
        }

        let mut tasks = self.load_role(&role_ref)?;
        apply_include_modifiers(&mut tasks, data);
        Ok(tasks)
    }
}

fn apply_include_modifiers(tasks: &mut [Task], data: &serde_json::Map<String, Value>) {
    let include_when = data.get("when").and_then(Value::as_str).map(String::from);
    let include_tags: Vec<String> = match data.get("tags") {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    };

    for task in tasks.iter_mut() {
        if let Some(when) = &include_when {
            task.when = Some(compose_when(when, task.when.as_deref()));
        }
        for tag in &include_tags {
            if !task.tags.contains(tag) {
                task.tags.push(tag.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::VaultLib;

    #[test]
    fn include_tasks_spliced_with_when() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("extra.yml"),
            "- name: included one\n  debug:\n    msg: one\n- name: included two\n  debug:\n    msg: two\n  when: inner_cond\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("site.yml"),
            "- hosts: all\n  tasks:\n    - include_tasks: extra.yml\n      when: outer_cond\n      tags: [extra]\n",
        )
        .unwrap();

        let vault = VaultLib::new();
        let loader = PlaybookLoader::new(dir.path().join("site.yml"), &vault);
        let plays = loader.load().unwrap();

        let tasks = &plays[0].tasks;
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].when.as_deref(), Some("outer_cond"));
        assert_eq!(
            tasks[1].when.as_deref(),
            Some("(outer_cond) and (inner_cond)")
        );
        assert!(tasks[0].tags.contains(&"extra".to_string()));
    }

    #[test]
    fn import_tasks_missing_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("site.yml"),
            "- hosts: all\n  tasks:\n    - import_tasks: absent.yml\n",
        )
        .unwrap();
        let vault = VaultLib::new();
        let loader = PlaybookLoader::new(dir.path().join("site.yml"), &vault);
        let err = loader.load().unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn include_role_splices_role_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let role = dir.path().join("roles/base/tasks");
        std::fs::create_dir_all(&role).unwrap();
        std::fs::write(role.join("main.yml"), "- name: base task\n  debug:\n    msg: hi\n").unwrap();
        std::fs::write(
            dir.path().join("site.yml"),
            "- hosts: all\n  tasks:\n    - include_role:\n        name: base\n",
        )
        .unwrap();

        let vault = VaultLib::new();
        let loader = PlaybookLoader::new(dir.path().join("site.yml"), &vault);
        let plays = loader.load().unwrap();
        assert_eq!(plays[0].tasks.len(), 1);
        assert_eq!(plays[0].tasks[0].name, "base task");
    }

    #[test]
    fn nested_includes_expand_recursively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("inner.yml"), "- name: deepest\n  debug:\n    msg: x\n")
            .unwrap();
        std::fs::write(
            dir.path().join("outer.yml"),
            "- include_tasks: inner.yml\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("site.yml"),
            "- hosts: all\n  tasks:\n    - include_tasks: outer.yml\n",
        )
        .unwrap();

        let vault = VaultLib::new();
        let loader = PlaybookLoader::new(dir.path().join("site.yml"), &vault);
        let plays = loader.load().unwrap();
        assert_eq!(plays[0].tasks.len(), 1);
        assert_eq!(plays[0].tasks[0].name, "deepest");
    }
}
