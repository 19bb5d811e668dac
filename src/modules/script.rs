//! script module: upload a local script and run it on the target.

use async_trait::async_trait;
use uuid::Uuid;

use super::command::check_creates_removes;
use super::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Transfers a local script to the target, executes it, and removes it.
/// The free-form argument is the script path followed by its arguments.
pub struct ScriptModule;

#[async_trait]
impl Module for ScriptModule {
    fn name(&self) -> &'static str {
        "script"
    }

    fn validate_args(&self, args: &ModuleArgs) -> Option<String> {
        if args.get_str("_raw_params").is_none() && args.get_str("cmd").is_none() {
            return Some("No script given".to_string());
        }
        None
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let raw = args
            .get_str("_raw_params")
            .or_else(|| args.get_str("cmd"))
            .unwrap_or_default();
        let mut parts = match shell_words::split(&raw) {
            Ok(parts) if !parts.is_empty() => parts,
            _ => return ModuleOutput::failed("No script given"),
        };
        let script_path = parts.remove(0);
        let script_args = shell_words::join(parts);

        if let Some(guard) = check_creates_removes(args, ctx).await {
            return guard;
        }

        let local = ctx.playbook_dir.join(&script_path);
        let local = if local.exists() {
            local
        } else {
            std::path::PathBuf::from(&script_path)
        };
        if !local.exists() {
            return ModuleOutput::failed(format!("Script not found: {}", script_path));
        }

        let remote = format!("/tmp/.runbook-script-{}", Uuid::new_v4());
        if let Err(e) = ctx.connection.put(&local, &remote, Some(0o700)).await {
            return ModuleOutput::failed(format!("Failed to upload script: {}", e));
        }

        let cmd = if script_args.is_empty() {
            remote.clone()
        } else {
            format!("{} {}", remote, script_args)
        };
        let result = ctx.command(&cmd, true).await;

        // Remove the staged script regardless of the outcome
        let cleanup = format!("rm -f {}", crate::connection::shell_quote(&remote));
        let _ = ctx
            .connection
            .run(&cleanup, &crate::connection::RunOptions::default())
            .await;

        match result {
            Ok(result) => ModuleOutput::from_run(&result, true),
            Err(e) => ModuleOutput::failed(e.to_string()),
        }
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        if let Some(guard) = check_creates_removes(args, ctx).await {
            return guard;
        }
        ModuleOutput {
            changed: true,
            msg: "Would run script (check mode)".to_string(),
            ..Default::default()
        }
    }
}
