//! user module: manage system accounts.

use async_trait::async_trait;
use serde_json::json;

use super::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};
use crate::connection::shell_quote;

/// Creates, updates or removes a user via `useradd`/`usermod`/`userdel`.
pub struct UserModule;

async fn user_exists(ctx: &ModuleCtx, name: &str) -> Result<bool, ModuleOutput> {
    match ctx
        .command(&format!("id -u {} >/dev/null 2>&1", shell_quote(name)), true)
        .await
    {
        Ok(result) => Ok(result.success()),
        Err(e) => Err(ModuleOutput::failed(e.to_string())),
    }
}

fn user_flags(args: &ModuleArgs) -> Vec<String> {
    let mut flags = Vec::new();
    if let Some(shell) = args.get_str("shell") {
        flags.push(format!("-s {}", shell_quote(&shell)));
    }
    if let Some(home) = args.get_str("home") {
        flags.push(format!("-d {}", shell_quote(&home)));
    }
    if let Some(uid) = args.get_i64("uid") {
        flags.push(format!("-u {}", uid));
    }
    let groups = args.get_str_list("groups");
    if !groups.is_empty() {
        flags.push(format!("-G {}", shell_quote(&groups.join(","))));
        if args.get_bool_or("append", false) {
            flags.push("-a".to_string());
        }
    }
    if let Some(comment) = args.get_str("comment") {
        flags.push(format!("-c {}", shell_quote(&comment)));
    }
    flags
}

#[async_trait]
impl Module for UserModule {
    fn name(&self) -> &'static str {
        "user"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["name"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let name = args.get_str("name").expect("validated");
        let state = args
            .get_str("state")
            .unwrap_or_else(|| "present".to_string());

        let exists = match user_exists(ctx, &name).await {
            Ok(exists) => exists,
            Err(out) => return out,
        };

        match state.as_str() {
            "absent" => {
                if !exists {
                    return ModuleOutput::ok(format!("user {} is absent", name));
                }
                let remove = if args.get_bool_or("remove", false) {
                    "-r "
                } else {
                    ""
                };
                let cmd = format!("userdel {}{}", remove, shell_quote(&name));
                match ctx.command(&cmd, true).await {
                    Ok(r) if r.success() => {
                        ModuleOutput::changed(format!("user {} removed", name))
                    }
                    Ok(r) => ModuleOutput::failed(format!("userdel failed: {}", r.stderr)),
                    Err(e) => ModuleOutput::failed(e.to_string()),
                }
            }
            "present" => {
                let flags = user_flags(args);
                if exists {
                    if flags.is_empty() {
                        return ModuleOutput::ok(format!("user {} already exists", name))
                            .with_result("name", json!(name));
                    }
                    let cmd = format!("usermod {} {}", flags.join(" "), shell_quote(&name));
                    match ctx.command(&cmd, true).await {
                        Ok(r) if r.success() => {
                            ModuleOutput::changed(format!("user {} updated", name))
                        }
                        Ok(r) => {
                            ModuleOutput::failed(format!("usermod failed: {}", r.stderr))
                        }
                        Err(e) => ModuleOutput::failed(e.to_string()),
                    }
                } else {
                    let create_home = if args.get_bool_or("create_home", true) {
                        "-m "
                    } else {
                        ""
                    };
                    let cmd = format!(
                        "useradd {}{} {}",
                        create_home,
                        flags.join(" "),
                        shell_quote(&name)
                    );
                    match ctx.command(&cmd, true).await {
                        Ok(r) if r.success() => {
                            ModuleOutput::changed(format!("user {} created", name))
                        }
                        Ok(r) => {
                            ModuleOutput::failed(format!("useradd failed: {}", r.stderr))
                        }
                        Err(e) => ModuleOutput::failed(e.to_string()),
                    }
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
        let exists = user_exists(ctx, &name).await.unwrap_or(false);
        let would_change = match state.as_str() {
            "absent" => exists,
            _ => !exists || !user_flags(args).is_empty(),
        };
        if would_change {
            ModuleOutput {
                changed: true,
                msg: format!("would set user {} to {} (check mode)", name, state),
                ..Default::default()
            }
        } else {
            ModuleOutput::ok(format!("user {} already in desired state", name))
        }
    }
}
