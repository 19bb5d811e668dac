//! win_user and win_group modules: manage local Windows accounts.

use async_trait::async_trait;

use super::ps_quote;
use crate::connection::RunOptions;
use crate::modules::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Manages a local Windows user via the `LocalAccounts` cmdlets.
pub struct WinUserModule;

async fn ps(ctx: &ModuleCtx, script: &str) -> Result<crate::connection::RunResult, ModuleOutput> {
    ctx.connection
        .run(script, &RunOptions::default())
        .await
        .map_err(|e| ModuleOutput::failed(e.to_string()))
}

#[async_trait]
impl Module for WinUserModule {
    fn name(&self) -> &'static str {
        "win_user"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["name"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let name = args.get_str("name").expect("validated");
        let state = args
            .get_str("state")
            .unwrap_or_else(|| "present".to_string());

        let probe = format!(
            "[bool](Get-LocalUser -Name '{}' -ErrorAction SilentlyContinue)",
            ps_quote(&name)
        );
        let exists = match ps(ctx, &probe).await {
            Ok(result) => result.stdout.trim().eq_ignore_ascii_case("true"),
            Err(out) => return out,
        };

        match state.as_str() {
            "present" => {
                if exists {
                    if let Some(password) = args.get_str("password") {
                        let script = format!(
                            "Set-LocalUser -Name '{}' -Password (ConvertTo-SecureString '{}' -AsPlainText -Force)",
                            ps_quote(&name),
                            ps_quote(&password)
                        );
                        return match ps(ctx, &script).await {
                            Ok(r) if r.success() => {
                                ModuleOutput::changed(format!("user {} password set", name))
                            }
                            Ok(r) => ModuleOutput::failed(r.stderr),
                            Err(out) => out,
                        };
                    }
                    return ModuleOutput::ok(format!("user {} already exists", name));
                }
                let password_clause = match args.get_str("password") {
                    Some(password) => format!(
                        " -Password (ConvertTo-SecureString '{}' -AsPlainText -Force)",
                        ps_quote(&password)
                    ),
                    None => " -NoPassword".to_string(),
                };
                let script = format!(
                    "New-LocalUser -Name '{}'{} | Out-Null",
                    ps_quote(&name),
                    password_clause
                );
                match ps(ctx, &script).await {
                    Ok(r) if r.success() => {
                        ModuleOutput::changed(format!("user {} created", name))
                    }
                    Ok(r) => ModuleOutput::failed(r.stderr),
                    Err(out) => out,
                }
            }
            "absent" => {
                if !exists {
                    return ModuleOutput::ok(format!("user {} is absent", name));
                }
                let script = format!("Remove-LocalUser -Name '{}'", ps_quote(&name));
                match ps(ctx, &script).await {
                    Ok(r) if r.success() => {
                        ModuleOutput::changed(format!("user {} removed", name))
                    }
                    Ok(r) => ModuleOutput::failed(r.stderr),
                    Err(out) => out,
                }
            }
            other => ModuleOutput::failed(format!("Unknown state: {}", other)),
        }
    }
}

/// Manages a local Windows group.
pub struct WinGroupModule;

#[async_trait]
impl Module for WinGroupModule {
    fn name(&self) -> &'static str {
        "win_group"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["name"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let name = args.get_str("name").expect("validated");
        let state = args
            .get_str("state")
            .unwrap_or_else(|| "present".to_string());

        let probe = format!(
            "[bool](Get-LocalGroup -Name '{}' -ErrorAction SilentlyContinue)",
            ps_quote(&name)
        );
        let exists = match ps(ctx, &probe).await {
            Ok(result) => result.stdout.trim().eq_ignore_ascii_case("true"),
            Err(out) => return out,
        };

        match state.as_str() {
            "present" => {
                if exists {
                    return ModuleOutput::ok(format!("group {} already exists", name));
                }
                let script = format!("New-LocalGroup -Name '{}' | Out-Null", ps_quote(&name));
                match ps(ctx, &script).await {
                    Ok(r) if r.success() => {
                        ModuleOutput::changed(format!("group {} created", name))
                    }
                    Ok(r) => ModuleOutput::failed(r.stderr),
                    Err(out) => out,
                }
            }
            "absent" => {
                if !exists {
                    return ModuleOutput::ok(format!("group {} is absent", name));
                }
                let script = format!("Remove-LocalGroup -Name '{}'", ps_quote(&name));
                match ps(ctx, &script).await {
                    Ok(r) if r.success() => {
                        ModuleOutput::changed(format!("group {} removed", name))
                    }
                    Ok(r) => ModuleOutput::failed(r.stderr),
                    Err(out) => out,
                }
            }
            other => ModuleOutput::failed(format!("Unknown state: {}", other)),
        }
    }
}
