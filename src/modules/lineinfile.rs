//! lineinfile module: ensure a single line's presence or absence.

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use super::{unified_diff, ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Ensures a line is present (optionally replacing a `regexp` match, with
/// `insertafter`/`insertbefore` placement) or removes matching lines.
pub struct LineinfileModule;

struct Plan {
    lines: Vec<String>,
    changed: bool,
}

fn apply_present(
    mut lines: Vec<String>,
    line: &str,
    regexp: Option<&Regex>,
    insert_after: Option<&str>,
    insert_before: Option<&str>,
) -> Plan {
    // Replace the last regexp match when one exists
    if let Some(re) = regexp {
        if let Some(idx) = lines.iter().rposition(|l| re.is_match(l)) {
            if lines[idx] == line {
                return Plan {
                    lines,
                    changed: false,
                };
            }
            lines[idx] = line.to_string();
            return Plan {
                lines,
                changed: true,
            };
        }
    }

    if lines.iter().any(|l| l == line) {
        return Plan {
            lines,
            changed: false,
        };
    }

    let position = match (insert_after, insert_before) {
        (Some("EOF"), _) | (None, None) => lines.len(),
        (_, Some("BOF")) => 0,
        (Some(pattern), _) => Regex::new(pattern)
            .ok()
            .and_then(|re| lines.iter().rposition(|l| re.is_match(l)).map(|i| i + 1))
            .unwrap_or(lines.len()),
        (_, Some(pattern)) => Regex::new(pattern)
            .ok()
            .and_then(|re| lines.iter().position(|l| re.is_match(l)))
            .unwrap_or(lines.len()),
    };
    lines.insert(position, line.to_string());
    Plan {
        lines,
        changed: true,
    }
}

fn apply_absent(lines: Vec<String>, line: Option<&str>, regexp: Option<&Regex>) -> Plan {
    let before = lines.len();
    let kept: Vec<String> = lines
        .into_iter()
        .filter(|l| {
            let matches = regexp.map(|re| re.is_match(l)).unwrap_or(false)
                || line.map(|want| l == want).unwrap_or(false);
            !matches
        })
        .collect();
    Plan {
        changed: kept.len() != before,
        lines: kept,
    }
}

async fn plan(args: &ModuleArgs, ctx: &ModuleCtx) -> Result<(String, Option<Plan>, String), ModuleOutput> {
    let path = args
        .get_required_str("path")
        .or_else(|_| args.get_required_str("dest"))
        .map_err(ModuleOutput::failed)?;
    let state = args.get_str("state").unwrap_or_else(|| "present".to_string());
    let create = args.get_bool_or("create", false);

    let regexp = match args.get_str("regexp") {
        Some(pattern) => Some(
            Regex::new(&pattern)
                .map_err(|e| ModuleOutput::failed(format!("Invalid regexp: {}", e)))?,
        ),
        None => None,
    };

    let current = match ctx.connection.stat(&path).await {
        Ok(Some(_)) => match ctx.connection.get_content(&path).await {
            Ok(content) => Some(String::from_utf8_lossy(&content).to_string()),
            Err(e) => {
                return Err(ModuleOutput::failed(format!(
                    "Failed to read {}: {}",
                    path, e
                )))
            }
        },
        Ok(None) => None,
        Err(e) => {
            return Err(ModuleOutput::failed(format!(
                "Failed to stat {}: {}",
                path, e
            )))
        }
    };

    let original = match &current {
        Some(content) => content.clone(),
        None => {
            if state == "absent" {
                return Ok((path, None, String::new()));
            }
            if !create {
                return Err(ModuleOutput::failed(format!(
                    "{} does not exist (use create: true)",
                    path
                )));
            }
            String::new()
        }
    };

    let lines: Vec<String> = original.lines().map(String::from).collect();
    let plan = match state.as_str() {
        "present" => {
            let line = args
                .get_required_str("line")
                .map_err(ModuleOutput::failed)?;
            apply_present(
                lines,
                &line,
                regexp.as_ref(),
                args.get_str("insertafter").as_deref(),
                args.get_str("insertbefore").as_deref(),
            )
        }
        "absent" => apply_absent(lines, args.get_str("line").as_deref(), regexp.as_ref()),
        other => {
            return Err(ModuleOutput::failed(format!("Unknown state: {}", other)));
        }
    };

    Ok((path, Some(plan), original))
}

#[async_trait]
impl Module for LineinfileModule {
    fn name(&self) -> &'static str {
        "lineinfile"
    }

    fn validate_args(&self, args: &ModuleArgs) -> Option<String> {
        if !args.contains_key("path") && !args.contains_key("dest") {
            return Some("Missing required argument: path".to_string());
        }
        None
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let (path, plan, original) = match plan(args, ctx).await {
            Ok(r) => r,
            Err(out) => return out,
        };
        let Some(plan) = plan else {
            return ModuleOutput::ok(format!("{} is absent", path));
        };
        if !plan.changed {
            return ModuleOutput::ok(format!("{} unchanged", path));
        }

        let mut content = plan.lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        let mode = args.get_mode("mode");
        if let Err(e) = ctx.connection.put_content(content.as_bytes(), &path, mode).await {
            return ModuleOutput::failed(format!("Failed to write {}: {}", path, e));
        }

        let mut output = ModuleOutput::changed(format!("{} updated", path));
        if ctx.diff_mode {
            output = output.with_result("diff", json!(unified_diff(&original, &content)));
        }
        output
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        match plan(args, ctx).await {
            Ok((path, Some(plan), _)) if plan.changed => ModuleOutput {
                changed: true,
                msg: format!("would update {} (check mode)", path),
                ..Default::default()
            },
            Ok((path, _, _)) => ModuleOutput::ok(format!("{} unchanged", path)),
            Err(out) => out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::debug::tests::test_ctx;
    use serde_json::json;

    fn args_for(path: &str, extra: &[(&str, serde_json::Value)]) -> ModuleArgs {
        let mut args = ModuleArgs::new();
        args.insert("path".into(), json!(path));
        for (k, v) in extra {
            args.insert((*k).into(), v.clone());
        }
        args
    }

    #[tokio::test]
    async fn appends_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hosts");
        std::fs::write(&file, "one\ntwo\n").unwrap();
        let path = file.to_string_lossy().to_string();

        let args = args_for(&path, &[("line", json!("three"))]);
        let ctx = test_ctx();

        assert!(LineinfileModule.run(&args, &ctx).await.changed);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "one\ntwo\nthree\n");
        assert!(!LineinfileModule.run(&args, &ctx).await.changed);
    }

    #[tokio::test]
    async fn regexp_replaces_existing_line() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("conf");
        std::fs::write(&file, "port=80\nname=x\n").unwrap();
        let path = file.to_string_lossy().to_string();

        let args = args_for(
            &path,
            &[("regexp", json!("^port=")), ("line", json!("port=8080"))],
        );
        let out = LineinfileModule.run(&args, &test_ctx()).await;
        assert!(out.changed);
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "port=8080\nname=x\n"
        );
    }

    #[tokio::test]
    async fn absent_removes_matches() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("conf");
        std::fs::write(&file, "keep\ndrop me\nkeep2\n").unwrap();
        let path = file.to_string_lossy().to_string();

        let args = args_for(
            &path,
            &[("regexp", json!("^drop")), ("state", json!("absent"))],
        );
        let out = LineinfileModule.run(&args, &test_ctx()).await;
        assert!(out.changed);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "keep\nkeep2\n");
    }

    #[tokio::test]
    async fn insertafter_places_line() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("conf");
        std::fs::write(&file, "[section]\nold=1\n").unwrap();
        let path = file.to_string_lossy().to_string();

        let args = args_for(
            &path,
            &[
                ("line", json!("new=2")),
                ("insertafter", json!("^\\[section\\]")),
            ],
        );
        LineinfileModule.run(&args, &test_ctx()).await;
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "[section]\nnew=2\nold=1\n"
        );
    }

    #[tokio::test]
    async fn create_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new").to_string_lossy().to_string();

        let args = args_for(&path, &[("line", json!("first")), ("create", json!(true))]);
        let out = LineinfileModule.run(&args, &test_ctx()).await;
        assert!(out.changed);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\n");

        let no_create = args_for(
            &(path + ".other"),
            &[("line", json!("x"))],
        );
        assert!(LineinfileModule.run(&no_create, &test_ctx()).await.failed);
    }
}
