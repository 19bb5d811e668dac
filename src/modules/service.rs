//! service and systemd modules: manage system services.

use async_trait::async_trait;
use serde_json::json;

use super::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Manages a service through `systemctl`: `state` of started / stopped /
/// restarted / reloaded plus `enabled`. Idempotent: current state is
/// queried before acting.
pub struct ServiceModule;

pub(crate) async fn manage_service(
    module: &'static str,
    args: &ModuleArgs,
    ctx: &ModuleCtx,
) -> ModuleOutput {
    let name = match args.get_required_str("name") {
        Ok(name) => name,
        Err(msg) => return ModuleOutput::failed(msg),
    };
    let state = args.get_str("state");
    let enabled = args.get("enabled").map(|_| args.get_bool_or("enabled", false));
    let daemon_reload = args.get_bool_or("daemon_reload", false);

    if state.is_none() && enabled.is_none() && !daemon_reload {
        return ModuleOutput::failed(format!(
            "{} requires 'state', 'enabled' or 'daemon_reload'",
            module
        ));
    }

    let mut changed = false;
    let mut actions: Vec<String> = Vec::new();

    if daemon_reload {
        if let Err(out) = systemctl(ctx, "daemon-reload", "").await {
            return out;
        }
        changed = true;
        actions.push("daemon-reload".into());
    }

    if let Some(state) = &state {
        let is_active = match ctx.command(&format!("systemctl is-active {}", name), true).await {
            Ok(result) => result.stdout.trim() == "active",
            Err(e) => return ModuleOutput::failed(e.to_string()),
        };

        let action = match state.as_str() {
            "started" if !is_active => Some("start"),
            "started" => None,
            "stopped" if is_active => Some("stop"),
            "stopped" => None,
            "restarted" => Some("restart"),
            "reloaded" => Some("reload"),
            other => {
                return ModuleOutput::failed(format!("Unknown state: {}", other));
            }
        };

        if let Some(action) = action {
            if let Err(out) = systemctl(ctx, action, &name).await {
                return out;
            }
            changed = true;
            actions.push(action.into());
        }
    }

    if let Some(want_enabled) = enabled {
        let is_enabled = match ctx
            .command(&format!("systemctl is-enabled {}", name), true)
            .await
        {
            Ok(result) => result.stdout.trim() == "enabled",
            Err(e) => return ModuleOutput::failed(e.to_string()),
        };
        if want_enabled != is_enabled {
            let action = if want_enabled { "enable" } else { "disable" };
            if let Err(out) = systemctl(ctx, action, &name).await {
                return out;
            }
            changed = true;
            actions.push(action.into());
        }
    }

    let mut output = if changed {
        ModuleOutput::changed(format!("{}: {}", name, actions.join(", ")))
    } else {
        ModuleOutput::ok(format!("{} already in desired state", name))
    };
    output.results.insert("name".into(), json!(name));
    output
}

async fn systemctl(
    ctx: &ModuleCtx,
    action: &str,
    name: &str,
) -> Result<(), ModuleOutput> {
    let cmd = if name.is_empty() {
        format!("systemctl {}", action)
    } else {
        format!("systemctl {} {}", action, name)
    };
    match ctx.command(&cmd, true).await {
        Ok(result) if result.success() => Ok(()),
        Ok(result) => Err(ModuleOutput::failed(format!(
            "systemctl {} failed: {}",
            action, result.stderr
        ))),
        Err(e) => Err(ModuleOutput::failed(e.to_string())),
    }
}

pub(crate) async fn check_service(args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
    let name = match args.get_required_str("name") {
        Ok(name) => name,
        Err(msg) => return ModuleOutput::failed(msg),
    };
    let Some(state) = args.get_str("state") else {
        return ModuleOutput::ok(format!("{} (check mode)", name));
    };

    let is_active = ctx
        .command(&format!("systemctl is-active {}", name), true)
        .await
        .map(|r| r.stdout.trim() == "active")
        .unwrap_or(false);
    let would_change = match state.as_str() {
        "started" => !is_active,
        "stopped" => is_active,
        _ => true,
    };
    if would_change {
        ModuleOutput {
            changed: true,
            msg: format!("would set {} to {} (check mode)", name, state),
            ..Default::default()
        }
    } else {
        ModuleOutput::ok(format!("{} already {}", name, state))
    }
}

#[async_trait]
impl Module for ServiceModule {
    fn name(&self) -> &'static str {
        "service"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["name"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        manage_service("service", args, ctx).await
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        check_service(args, ctx).await
    }
}

/// systemd module: same operations as `service`, plus `daemon_reload`.
/// Registered for both `systemd` and the `systemd_service` alias.
pub struct SystemdModule;

#[async_trait]
impl Module for SystemdModule {
    fn name(&self) -> &'static str {
        "systemd"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["name"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        manage_service("systemd", args, ctx).await
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        check_service(args, ctx).await
    }
}
