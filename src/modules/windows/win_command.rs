//! win_command, win_shell and win_ping modules.

use async_trait::async_trait;
use serde_json::json;

use crate::connection::RunOptions;
use crate::modules::command::extract_command;
use crate::modules::{Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Runs a command through `cmd.exe /c` on a Windows target.
pub struct WinCommandModule;

#[async_trait]
impl Module for WinCommandModule {
    fn name(&self) -> &'static str {
        "win_command"
    }

    fn validate_args(&self, args: &ModuleArgs) -> Option<String> {
        extract_command(args).err()
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let cmd = match extract_command(args) {
            Ok(cmd) => cmd,
            Err(msg) => return ModuleOutput::failed(msg),
        };
        match ctx.connection.run(&cmd, &RunOptions::no_shell()).await {
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

/// Runs a PowerShell script on a Windows target.
pub struct WinShellModule;

#[async_trait]
impl Module for WinShellModule {
    fn name(&self) -> &'static str {
        "win_shell"
    }

    fn validate_args(&self, args: &ModuleArgs) -> Option<String> {
        extract_command(args).err()
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let cmd = match extract_command(args) {
            Ok(cmd) => cmd,
            Err(msg) => return ModuleOutput::failed(msg),
        };
        match ctx.connection.run(&cmd, &RunOptions::default()).await {
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

/// Trivial reachability check for Windows targets.
pub struct WinPingModule;

#[async_trait]
impl Module for WinPingModule {
    fn name(&self) -> &'static str {
        "win_ping"
    }

    async fn run(&self, _args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        match ctx.connection.run("'pong'", &RunOptions::default()).await {
            Ok(result) if result.success() => {
                ModuleOutput::ok("").with_result("ping", json!("pong"))
            }
            Ok(result) => ModuleOutput::failed(result.stderr),
            Err(e) => ModuleOutput::failed(e.to_string()),
        }
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        self.run(args, ctx).await
    }
}
