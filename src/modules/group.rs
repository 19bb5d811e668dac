//! group module: manage system groups.

use async_trait::async_trait;

use super::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};
use crate::connection::shell_quote;

/// Creates or removes a group via `groupadd`/`groupdel`.
pub struct GroupModule;

async fn group_exists(ctx: &ModuleCtx, name: &str) -> Result<bool, ModuleOutput> {
    match ctx
        .command(
            &format!("getent group {} >/dev/null 2>&1", shell_quote(name)),
            true,
        )
        .await
    {
        Ok(result) => Ok(result.success()),
        Err(e) => Err(ModuleOutput::failed(e.to_string())),
    }
}

#[async_trait]
impl Module for GroupModule {
    fn name(&self) -> &'static str {
        "group"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["name"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let name = args.get_str("name").expect("validated");
        let state = args
            .get_str("state")
            .unwrap_or_else(|| "present".to_string());

        let exists = match group_exists(ctx, &name).await {
            Ok(exists) => exists,
            Err(out) => return out,
        };

        match state.as_str() {
            "present" => {
                if exists {
                    return ModuleOutput::ok(format!("group {} already exists", name));
                }
                let gid = args
                    .get_i64("gid")
                    .map(|gid| format!("-g {} ", gid))
                    .unwrap_or_default();
                let system = if args.get_bool_or("system", false) {
                    "-r "
                } else {
                    ""
                };
                let cmd = format!("groupadd {}{}{}", system, gid, shell_quote(&name));
                match ctx.command(&cmd, true).await {
                    Ok(r) if r.success() => {
                        ModuleOutput::changed(format!("group {} created", name))
                    }
                    Ok(r) => ModuleOutput::failed(format!("groupadd failed: {}", r.stderr)),
                    Err(e) => ModuleOutput::failed(e.to_string()),
                }
            }
            "absent" => {
                if !exists {
                    return ModuleOutput::ok(format!("group {} is absent", name));
                }
                let cmd = format!("groupdel {}", shell_quote(&name));
                match ctx.command(&cmd, true).await {
                    Ok(r) if r.success() => {
                        ModuleOutput::changed(format!("group {} removed", name))
                    }
                    Ok(r) => ModuleOutput::failed(format!("groupdel failed: {}", r.stderr)),
                    Err(e) => ModuleOutput::failed(e.to_string()),
                }
            }
            other => ModuleOutput::failed(format!("Unknown state: {}", other)),
        }
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let name = args.get_str("name").expect("validated");
        let state = args
            .get_str("state")
            .unwrap_or_else(|| "present".to_string());
        let exists = group_exists(ctx, &name).await.unwrap_or(false);
        let would_change = (state == "present") != exists;
        if would_change {
            ModuleOutput {
                changed: true,
                msg: format!("would set group {} to {} (check mode)", name, state),
                ..Default::default()
            }
        } else {
            ModuleOutput::ok(format!("group {} already in desired state", name))
        }
    }
}
