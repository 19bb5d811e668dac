//! shell and raw modules: run a command through the remote shell.

use async_trait::async_trait;

use super::command::{check_creates_removes, extract_command, run_command};
use super::{Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Runs a command through `/bin/sh -c`, so pipes, redirects and variable
/// expansion work.
pub struct ShellModule;

#[async_trait]
impl Module for ShellModule {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn validate_args(&self, args: &ModuleArgs) -> Option<String> {
        extract_command(args).err()
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        run_command(args, ctx, true).await
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        if let Some(guard) = check_creates_removes(args, ctx).await {
            return guard;
        }
        let cmd = extract_command(args).unwrap_or_default();
        ModuleOutput {
            changed: true,
            msg: format!("Would run: {} (check mode)", cmd),
            ..Default::default()
        }
    }
}

/// Runs a command with no shell processing and no become wrapping; the
/// lowest-level escape hatch.
pub struct RawModule;

#[async_trait]
impl Module for RawModule {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn validate_args(&self, args: &ModuleArgs) -> Option<String> {
        extract_command(args).err()
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let cmd = match extract_command(args) {
            Ok(cmd) => cmd,
            Err(msg) => return ModuleOutput::failed(msg),
        };
        // raw bypasses become and environment shaping entirely
        let options = crate::connection::RunOptions::default();
        match ctx.connection.run(&cmd, &options).await {
            Ok(result) => ModuleOutput::from_run(&result, true),
            Err(e) => ModuleOutput::failed(e.to_string()),
        }
    }

    async fn check(&self, args: &ModuleArgs, _ctx: &ModuleCtx) -> ModuleOutput {
        let cmd = extract_command(args).unwrap_or_default();
        ModuleOutput {
            changed: true,
            msg: format!("Would run: {} (check mode)", cmd),
            ..Default::default()
        }
    }
}
