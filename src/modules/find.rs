//! find module: enumerate remote files.

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use super::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};
use crate::connection::shell_quote;

/// Lists files (or directories) under `paths` on the target, filtered by
/// shell-glob `patterns`. Read-only.
pub struct FindModule;

fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut out = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c if "\\.+()[]{}^$|".contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    Regex::new(&out).ok()
}

#[async_trait]
impl Module for FindModule {
    fn name(&self) -> &'static str {
        "find"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["paths"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let paths = args.get_str_list("paths");
        let patterns: Vec<Regex> = args
            .get_str_list("patterns")
            .iter()
            .filter_map(|p| glob_to_regex(p))
            .collect();
        let file_type = args
            .get_str("file_type")
            .unwrap_or_else(|| "file".to_string());
        let recurse = args.get_bool_or("recurse", false);

        let type_flag = match file_type.as_str() {
            "directory" => "d",
            "any" => "",
            _ => "f",
        };

        let mut files = Vec::new();
        for path in &paths {
            let depth = if recurse { "" } else { " -maxdepth 1" };
            let type_filter = if type_flag.is_empty() {
                String::new()
            } else {
                format!(" -type {}", type_flag)
            };
            let cmd = format!("find {}{}{}", shell_quote(path), depth, type_filter);
            match ctx.command(&cmd, true).await {
                Ok(result) if result.success() => {
                    for line in result.stdout.lines() {
                        let line = line.trim();
                        if line.is_empty() || line == path.as_str() {
                            continue;
                        }
                        let name = line.rsplit('/').next().unwrap_or(line);
                        if patterns.is_empty() || patterns.iter().any(|re| re.is_match(name)) {
                            files.push(json!({ "path": line }));
                        }
                    }
                }
                Ok(result) => {
                    return ModuleOutput::failed(format!(
                        "find failed on {}: {}",
                        path, result.stderr
                    ))
                }
                Err(e) => return ModuleOutput::failed(e.to_string()),
            }
        }

        let matched = files.len();
        ModuleOutput::ok(format!("{} file(s) matched", matched))
            .with_result("files", json!(files))
            .with_result("matched", json!(matched))
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        self.run(args, ctx).await
    }
}
