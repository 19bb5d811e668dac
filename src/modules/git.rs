//! git module: manage a git checkout on the target.

use async_trait::async_trait;
use serde_json::json;

use super::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};
use crate::connection::shell_quote;

/// Clones `repo` into `dest`, or fetches and checks out `version` when the
/// checkout already exists. Changed when HEAD moves.
pub struct GitModule;

async fn head_of(ctx: &ModuleCtx, dest: &str) -> Option<String> {
    let cmd = format!("git -C {} rev-parse HEAD", shell_quote(dest));
    match ctx.command(&cmd, true).await {
        Ok(result) if result.success() => Some(result.stdout.trim().to_string()),
        _ => None,
    }
}

#[async_trait]
impl Module for GitModule {
    fn name(&self) -> &'static str {
        "git"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["repo", "dest"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let repo = args.get_str("repo").expect("validated");
        let dest = args.get_str("dest").expect("validated");
        let version = args.get_str("version").unwrap_or_else(|| "HEAD".to_string());
        let update = args.get_bool_or("update", true);
        let depth = args.get_i64("depth");

        let existing = matches!(
            ctx.connection.stat(&format!("{}/.git", dest)).await,
            Ok(Some(_))
        );

        if !existing {
            let depth_flag = depth.map(|d| format!("--depth {} ", d)).unwrap_or_default();
            let cmd = format!(
                "git clone {}{} {}",
                depth_flag,
                shell_quote(&repo),
                shell_quote(&dest)
            );
            match ctx.command(&cmd, true).await {
                Ok(r) if r.success() => {}
                Ok(r) => return ModuleOutput::failed(format!("git clone failed: {}", r.stderr)),
                Err(e) => return ModuleOutput::failed(e.to_string()),
            }
            if version != "HEAD" {
                let cmd = format!(
                    "git -C {} checkout {}",
                    shell_quote(&dest),
                    shell_quote(&version)
                );
                if let Ok(r) = ctx.command(&cmd, true).await {
                    if !r.success() {
                        return ModuleOutput::failed(format!(
                            "git checkout {} failed: {}",
                            version, r.stderr
                        ));
                    }
                }
            }
            let after = head_of(ctx, &dest).await.unwrap_or_default();
            return ModuleOutput::changed(format!("{} cloned to {}", repo, dest))
                .with_result("after", json!(after));
        }

        let before = head_of(ctx, &dest).await.unwrap_or_default();
        if !update {
            return ModuleOutput::ok(format!("{} already cloned", dest))
                .with_result("before", json!(before));
        }

        let cmd = format!(
            "git -C {d} fetch --all --quiet && git -C {d} checkout {v} --quiet && git -C {d} pull --ff-only --quiet 2>/dev/null || true",
            d = shell_quote(&dest),
            v = shell_quote(&version)
        );
        match ctx.command(&cmd, true).await {
            Ok(r) if r.success() => {}
            Ok(r) => return ModuleOutput::failed(format!("git update failed: {}", r.stderr)),
            Err(e) => return ModuleOutput::failed(e.to_string()),
        }

        let after = head_of(ctx, &dest).await.unwrap_or_default();
        let mut output = if before != after {
            ModuleOutput::changed(format!("{} updated {} -> {}", dest, &before[..7.min(before.len())], &after[..7.min(after.len())]))
        } else {
            ModuleOutput::ok(format!("{} already at {}", dest, version))
        };
        output.results.insert("before".into(), json!(before));
        output.results.insert("after".into(), json!(after));
        output
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let dest = args.get_str("dest").expect("validated");
        let existing = matches!(
            ctx.connection.stat(&format!("{}/.git", dest)).await,
            Ok(Some(_))
        );
        if existing {
            ModuleOutput::ok(format!("{} exists (update not verified in check mode)", dest))
        } else {
            ModuleOutput {
                changed: true,
                msg: format!("would clone into {} (check mode)", dest),
                ..Default::default()
            }
        }
    }
}
