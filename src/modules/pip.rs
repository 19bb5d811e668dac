//! pip module: Python package management.

use async_trait::async_trait;

use super::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};
use crate::connection::shell_quote;

/// Installs or removes Python packages, optionally inside a virtualenv.
pub struct PipModule;

fn pip_binary(args: &ModuleArgs) -> String {
    if let Some(venv) = args.get_str("virtualenv") {
        return format!("{}/bin/pip", venv.trim_end_matches('/'));
    }
    args.get_str("executable")
        .unwrap_or_else(|| "pip3".to_string())
}

async fn is_installed(ctx: &ModuleCtx, pip: &str, package: &str) -> bool {
    // `pip show` exits nonzero for missing packages
    let name = package
        .split(['=', '>', '<', '['])
        .next()
        .unwrap_or(package);
    let cmd = format!("{} show {} >/dev/null 2>&1", pip, shell_quote(name));
    ctx.command(&cmd, true)
        .await
        .map(|r| r.success())
        .unwrap_or(false)
}

#[async_trait]
impl Module for PipModule {
    fn name(&self) -> &'static str {
        "pip"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["name"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let names = args.get_str_list("name");
        let state = args
            .get_str("state")
            .unwrap_or_else(|| "present".to_string());
        let pip = pip_binary(args);

        let mut pending = Vec::new();
        for name in &names {
            let installed = is_installed(ctx, &pip, name).await;
            let needs = match state.as_str() {
                "present" => !installed,
                "latest" => true,
                "absent" => installed,
                other => return ModuleOutput::failed(format!("Unknown state: {}", other)),
            };
            if needs {
                pending.push(name.clone());
            }
        }

        if pending.is_empty() {
            return ModuleOutput::ok(format!("{} already in desired state", names.join(", ")));
        }

        let quoted: Vec<String> = pending.iter().map(|p| shell_quote(p)).collect();
        let cmd = match state.as_str() {
            "absent" => format!("{} uninstall -y {}", pip, quoted.join(" ")),
            "latest" => format!("{} install --upgrade {}", pip, quoted.join(" ")),
            _ => format!("{} install {}", pip, quoted.join(" ")),
        };

        match ctx.command(&cmd, true).await {
            Ok(result) if result.success() => {
                ModuleOutput::changed(format!("{}: {}", state, pending.join(", ")))
            }
            Ok(result) => ModuleOutput::failed(format!(
                "pip failed (rc={}): {}",
                result.rc, result.stderr
            )),
            Err(e) => ModuleOutput::failed(e.to_string()),
        }
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let names = args.get_str_list("name");
        let state = args
            .get_str("state")
            .unwrap_or_else(|| "present".to_string());
        let pip = pip_binary(args);

        for name in &names {
            let installed = is_installed(ctx, &pip, name).await;
            let would_change = match state.as_str() {
                "present" => !installed,
                "latest" => true,
                "absent" => installed,
                _ => false,
            };
            if would_change {
                return ModuleOutput {
                    changed: true,
                    msg: format!("would {} {} (check mode)", state, name),
                    ..Default::default()
                };
            }
        }
        ModuleOutput::ok(format!("{} already in desired state", names.join(", ")))
    }
}
