//! win_file and win_stat modules.

use async_trait::async_trait;
use serde_json::json;

use super::ps_quote;
use crate::connection::RunOptions;
use crate::modules::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Manages path state on a Windows target: `directory`, `touch`, `absent`.
pub struct WinFileModule;

#[async_trait]
impl Module for WinFileModule {
    fn name(&self) -> &'static str {
        "win_file"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["path"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let path = args.get_str("path").expect("validated");
        let state = args
            .get_str("state")
            .unwrap_or_else(|| "file".to_string());

        let exists = matches!(ctx.connection.stat(&path).await, Ok(Some(_)));

        let (script, changed, msg) = match state.as_str() {
            "absent" => {
                if !exists {
                    return ModuleOutput::ok(format!("{} is absent", path));
                }
                (
                    format!(
                        "Remove-Item -Path '{}' -Recurse -Force",
                        ps_quote(&path)
                    ),
                    true,
                    format!("{} removed", path),
                )
            }
            "directory" => {
                if exists {
                    return ModuleOutput::ok(format!("{} already exists", path));
                }
                (
                    format!(
                        "New-Item -ItemType Directory -Force -Path '{}' | Out-Null",
                        ps_quote(&path)
                    ),
                    true,
                    format!("{} created", path),
                )
            }
            "touch" => (
                format!(
                    "if (Test-Path '{p}') {{ (Get-Item '{p}').LastWriteTime = Get-Date }} else {{ New-Item -ItemType File -Path '{p}' | Out-Null }}",
                    p = ps_quote(&path)
                ),
                true,
                format!("{} touched", path),
            ),
            "file" => {
                if exists {
                    return ModuleOutput::ok(format!("{} exists", path));
                }
                return ModuleOutput::failed(format!("{} does not exist", path));
            }
            other => return ModuleOutput::failed(format!("Unknown state: {}", other)),
        };

        match ctx.connection.run(&script, &RunOptions::default()).await {
            Ok(result) if result.success() => {
                let mut output = ModuleOutput::ok(msg);
                output.changed = changed;
                output
            }
            Ok(result) => ModuleOutput::failed(format!("win_file failed: {}", result.stderr)),
            Err(e) => ModuleOutput::failed(e.to_string()),
        }
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let path = args.get_str("path").expect("validated");
        let state = args
            .get_str("state")
            .unwrap_or_else(|| "file".to_string());
        let exists = matches!(ctx.connection.stat(&path).await, Ok(Some(_)));
        let would_change = match state.as_str() {
            "absent" => exists,
            "directory" => !exists,
            "touch" => true,
            _ => false,
        };
        if would_change {
            ModuleOutput {
                changed: true,
                msg: format!("would set {} to {} (check mode)", path, state),
                ..Default::default()
            }
        } else {
            ModuleOutput::ok(format!("{} already in desired state", path))
        }
    }
}

/// Stats a path on a Windows target.
pub struct WinStatModule;

#[async_trait]
impl Module for WinStatModule {
    fn name(&self) -> &'static str {
        "win_stat"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["path"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let path = args.get_str("path").expect("validated");
        match ctx.connection.stat(&path).await {
            Ok(None) => ModuleOutput::ok("").with_result("stat", json!({ "exists": false })),
            Ok(Some(stat)) => ModuleOutput::ok("").with_result(
                "stat",
                json!({
                    "exists": true,
                    "isdir": stat.isdir,
                    "isreg": stat.isfile,
                    "size": stat.size,
                    "mtime": stat.mtime,
                }),
            ),
            Err(e) => ModuleOutput::failed(format!("Failed to stat {}: {}", path, e)),
        }
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        self.run(args, ctx).await
    }
}
