//! package module: generic package management with backend detection.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};
use crate::connection::shell_quote;

/// Package names are restricted to a safe character set before reaching a
/// shell command line.
static PACKAGE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._+-]+$").expect("package name regex"));

/// The package-manager backend a host uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PkgBackend {
    Apt,
    Dnf,
    Yum,
}

impl PkgBackend {
    fn install_cmd(&self, packages: &str) -> String {
        match self {
            PkgBackend::Apt => format!(
                "DEBIAN_FRONTEND=noninteractive apt-get install -y {}",
                packages
            ),
            PkgBackend::Dnf => format!("dnf install -y {}", packages),
            PkgBackend::Yum => format!("yum install -y {}", packages),
        }
    }

    fn remove_cmd(&self, packages: &str) -> String {
        match self {
            PkgBackend::Apt => format!(
                "DEBIAN_FRONTEND=noninteractive apt-get remove -y {}",
                packages
            ),
            PkgBackend::Dnf => format!("dnf remove -y {}", packages),
            PkgBackend::Yum => format!("yum remove -y {}", packages),
        }
    }

    fn update_cache_cmd(&self) -> &'static str {
        match self {
            PkgBackend::Apt => "apt-get update -qq",
            PkgBackend::Dnf => "dnf makecache -q",
            PkgBackend::Yum => "yum makecache -q",
        }
    }

    async fn is_installed(&self, ctx: &ModuleCtx, package: &str) -> bool {
        let cmd = match self {
            PkgBackend::Apt => format!(
                "dpkg-query -W -f='${{Status}}' {} 2>/dev/null | grep -q 'install ok installed'",
                shell_quote(package)
            ),
            PkgBackend::Dnf | PkgBackend::Yum => {
                format!("rpm -q {} >/dev/null 2>&1", shell_quote(package))
            }
        };
        ctx.command(&cmd, true)
            .await
            .map(|r| r.success())
            .unwrap_or(false)
    }
}

pub(crate) async fn detect_backend(ctx: &ModuleCtx) -> Option<PkgBackend> {
    for (probe, backend) in [
        ("apt-get", PkgBackend::Apt),
        ("dnf", PkgBackend::Dnf),
        ("yum", PkgBackend::Yum),
    ] {
        let cmd = format!("command -v {} >/dev/null 2>&1", probe);
        if let Ok(result) = ctx.command(&cmd, true).await {
            if result.success() {
                return Some(backend);
            }
        }
    }
    None
}

fn validate_names(names: &[String]) -> Option<String> {
    names
        .iter()
        .find(|n| !PACKAGE_NAME_RE.is_match(n))
        .map(|bad| format!("Invalid package name: '{}'", bad))
}

/// Shared implementation for package/apt/yum/dnf: figure out the missing
/// (or surplus) packages, then run one backend command for them.
pub(crate) async fn manage_packages(
    backend: PkgBackend,
    args: &ModuleArgs,
    ctx: &ModuleCtx,
    check_only: bool,
) -> ModuleOutput {
    let names = args.get_str_list("name");
    if names.is_empty() {
        return ModuleOutput::failed("Missing required argument: name");
    }
    if let Some(msg) = validate_names(&names) {
        return ModuleOutput::failed(msg);
    }
    let state = args
        .get_str("state")
        .unwrap_or_else(|| "present".to_string());

    if !check_only && args.get_bool_or("update_cache", false) {
        if let Ok(result) = ctx.command(backend.update_cache_cmd(), true).await {
            if !result.success() {
                return ModuleOutput::failed(format!(
                    "Cache update failed: {}",
                    result.stderr
                ));
            }
        }
    }

    let mut pending = Vec::new();
    for name in &names {
        let installed = backend.is_installed(ctx, name).await;
        let needs_action = match state.as_str() {
            "present" | "installed" => !installed,
            "latest" => true,
            "absent" | "removed" => installed,
            other => {
                return ModuleOutput::failed(format!("Unknown state: {}", other));
            }
        };
        if needs_action {
            pending.push(name.clone());
        }
    }

    if pending.is_empty() {
        return ModuleOutput::ok(format!("{} already in desired state", names.join(", ")));
    }

    if check_only {
        return ModuleOutput {
            changed: true,
            msg: format!("would {} {} (check mode)", state, pending.join(", ")),
            ..Default::default()
        };
    }

    let quoted: Vec<String> = pending.iter().map(|p| shell_quote(p)).collect();
    let packages = quoted.join(" ");
    let cmd = match state.as_str() {
        "absent" | "removed" => backend.remove_cmd(&packages),
        _ => backend.install_cmd(&packages),
    };

    match ctx.command(&cmd, true).await {
        Ok(result) if result.success() => {
            ModuleOutput::changed(format!("{}: {}", state, pending.join(", ")))
        }
        Ok(result) => ModuleOutput::failed(format!(
            "Package operation failed (rc={}): {}",
            result.rc, result.stderr
        )),
        Err(e) => ModuleOutput::failed(e.to_string()),
    }
}

/// Auto-detects apt/dnf/yum on the target and delegates.
pub struct PackageModule;

#[async_trait]
impl Module for PackageModule {
    fn name(&self) -> &'static str {
        "package"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["name"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        match detect_backend(ctx).await {
            Some(backend) => manage_packages(backend, args, ctx, false).await,
            None => ModuleOutput::failed("No supported package manager found on target"),
        }
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        match detect_backend(ctx).await {
            Some(backend) => manage_packages(backend, args, ctx, true).await,
            None => ModuleOutput::failed("No supported package manager found on target"),
        }
    }
}
