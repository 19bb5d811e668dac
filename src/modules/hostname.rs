//! hostname module: set the system hostname.

use async_trait::async_trait;

use super::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};
use crate::connection::shell_quote;

/// Sets the hostname via `hostnamectl` (falling back to `hostname`).
pub struct HostnameModule;

#[async_trait]
impl Module for HostnameModule {
    fn name(&self) -> &'static str {
        "hostname"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["name"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let name = args.get_str("name").expect("validated");

        let current = match ctx.command("hostname", true).await {
            Ok(result) => result.stdout.trim().to_string(),
            Err(e) => return ModuleOutput::failed(e.to_string()),
        };
        if current == name {
            return ModuleOutput::ok(format!("hostname already {}", name));
        }

        let cmd = format!(
            "hostnamectl set-hostname {n} 2>/dev/null || hostname {n}",
            n = shell_quote(&name)
        );
        match ctx.command(&cmd, true).await {
            Ok(r) if r.success() => {
                ModuleOutput::changed(format!("hostname set to {}", name))
            }
            Ok(r) => ModuleOutput::failed(format!("Failed to set hostname: {}", r.stderr)),
            Err(e) => ModuleOutput::failed(e.to_string()),
        }
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let name = args.get_str("name").expect("validated");
        let current = ctx
            .command("hostname", true)
            .await
            .map(|r| r.stdout.trim().to_string())
            .unwrap_or_default();
        if current == name {
            ModuleOutput::ok(format!("hostname already {}", name))
        } else {
            ModuleOutput {
                changed: true,
                msg: format!("would set hostname to {} (check mode)", name),
                ..Default::default()
            }
        }
    }
}
