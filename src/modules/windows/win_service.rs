//! win_service module: manage Windows services.

use async_trait::async_trait;
use serde_json::json;

use super::ps_quote;
use crate::connection::RunOptions;
use crate::modules::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Manages a Windows service through `Get-Service`/`Start-Service`/
/// `Stop-Service`/`Restart-Service` plus the startup type.
pub struct WinServiceModule;

async fn service_status(ctx: &ModuleCtx, name: &str) -> Result<Option<String>, ModuleOutput> {
    let script = format!(
        "(Get-Service -Name '{}' -ErrorAction SilentlyContinue).Status",
        ps_quote(name)
    );
    match ctx.connection.run(&script, &RunOptions::default()).await {
        Ok(result) => {
            let status = result.stdout.trim().to_string();
            Ok(if status.is_empty() { None } else { Some(status) })
        }
        Err(e) => Err(ModuleOutput::failed(e.to_string())),
    }
}

#[async_trait]
impl Module for WinServiceModule {
    fn name(&self) -> &'static str {
        "win_service"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["name"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let name = args.get_str("name").expect("validated");
        let state = args.get_str("state");
        let start_mode = args.get_str("start_mode");

        let current = match service_status(ctx, &name).await {
            Ok(Some(status)) => status,
            Ok(None) => return ModuleOutput::failed(format!("Service '{}' not found", name)),
            Err(out) => return out,
        };

        let mut changed = false;
        let mut actions = Vec::new();

        if let Some(state) = &state {
            let verb = match state.as_str() {
                "started" if current != "Running" => Some("Start-Service"),
                "stopped" if current == "Running" => Some("Stop-Service"),
                "restarted" => Some("Restart-Service"),
                "started" | "stopped" => None,
                other => return ModuleOutput::failed(format!("Unknown state: {}", other)),
            };
            if let Some(verb) = verb {
                let script = format!("{} -Name '{}'", verb, ps_quote(&name));
                match ctx.connection.run(&script, &RunOptions::default()).await {
                    Ok(r) if r.success() => {
                        changed = true;
                        actions.push(verb.to_string());
                    }
                    Ok(r) => {
                        return ModuleOutput::failed(format!("{} failed: {}", verb, r.stderr))
                    }
                    Err(e) => return ModuleOutput::failed(e.to_string()),
                }
            }
        }

        if let Some(mode) = start_mode {
            let script = format!(
                "Set-Service -Name '{}' -StartupType {}",
                ps_quote(&name),
                mode
            );
            match ctx.connection.run(&script, &RunOptions::default()).await {
                Ok(r) if r.success() => {
                    changed = true;
                    actions.push(format!("start_mode={}", mode));
                }
                Ok(r) => {
                    return ModuleOutput::failed(format!("Set-Service failed: {}", r.stderr))
                }
                Err(e) => return ModuleOutput::failed(e.to_string()),
            }
        }

        let mut output = if changed {
            ModuleOutput::changed(format!("{}: {}", name, actions.join(", ")))
        } else {
            ModuleOutput::ok(format!("{} already in desired state", name))
        };
        output.results.insert("name".into(), json!(name));
        output.results.insert("state".into(), json!(current));
        output
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let name = args.get_str("name").expect("validated");
        let state = args.get_str("state");
        let current = match service_status(ctx, &name).await {
            Ok(Some(status)) => status,
            Ok(None) => return ModuleOutput::failed(format!("Service '{}' not found", name)),
            Err(out) => return out,
        };
        let would_change = match state.as_deref() {
            Some("started") => current != "Running",
            Some("stopped") => current == "Running",
            Some("restarted") => true,
            _ => false,
        };
        if would_change {
            ModuleOutput {
                changed: true,
                msg: format!("would change {} (check mode)", name),
                ..Default::default()
            }
        } else {
            ModuleOutput::ok(format!("{} already in desired state", name))
        }
    }
}
