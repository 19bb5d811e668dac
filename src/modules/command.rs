//! command module: execute a command without going through a shell.

use async_trait::async_trait;
use serde_json::json;

use super::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Executes a command directly (no shell interpolation). Supports
/// `_raw_params`/`cmd`/`argv`, `chdir`, and the `creates`/`removes`
/// idempotence guards.
pub struct CommandModule;

/// Extracts the command string from `_raw_params`, `cmd` or `argv`.
pub(crate) fn extract_command(args: &ModuleArgs) -> Result<String, String> {
    if let Some(raw) = args.get_str("_raw_params") {
        return Ok(raw);
    }
    if let Some(cmd) = args.get_str("cmd") {
        return Ok(cmd);
    }
    let argv = args.get_str_list("argv");
    if !argv.is_empty() {
        return Ok(shell_words::join(argv));
    }
    Err("No command given".to_string())
}

/// Evaluates `creates`/`removes` guards against the remote filesystem.
/// Returns a skip result when the guard says there is nothing to do.
pub(crate) async fn check_creates_removes(
    args: &ModuleArgs,
    ctx: &ModuleCtx,
) -> Option<ModuleOutput> {
    if let Some(creates) = args.get_str("creates") {
        if let Ok(Some(_)) = ctx.connection.stat(&creates).await {
            return Some(ModuleOutput::ok(format!("skipped, since {} exists", creates)));
        }
    }
    if let Some(removes) = args.get_str("removes") {
        if let Ok(None) = ctx.connection.stat(&removes).await {
            return Some(ModuleOutput::ok(format!(
                "skipped, since {} does not exist",
                removes
            )));
        }
    }
    None
}

pub(crate) async fn run_command(
    args: &ModuleArgs,
    ctx: &ModuleCtx,
    shell: bool,
) -> ModuleOutput {
    let cmd = match extract_command(args) {
        Ok(cmd) => cmd,
        Err(msg) => return ModuleOutput::failed(msg),
    };

    if let Some(guard) = check_creates_removes(args, ctx).await {
        return guard;
    }

    let cmd = match args.get_str("chdir") {
        Some(chdir) => format!("cd {} && {}", crate::connection::shell_quote(&chdir), cmd),
        None => cmd,
    };

    match ctx.command(&cmd, shell).await {
        Ok(result) => {
            let mut output = ModuleOutput::from_run(&result, true);
            output.results.insert("cmd".into(), json!(cmd));
            output
        }
        Err(e) => ModuleOutput::failed(e.to_string()),
    }
}

#[async_trait]
impl Module for CommandModule {
    fn name(&self) -> &'static str {
        "command"
    }

    fn validate_args(&self, args: &ModuleArgs) -> Option<String> {
        extract_command(args).err()
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        run_command(args, ctx, false).await
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
