//! setup module: gather a documented subset of system facts.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Gathers facts from the target by running a handful of shell probes.
/// The subset: OS family and distribution, hostname, architecture, kernel,
/// processor count, total memory, default IPv4 address, and the remote
/// user's HOME/USER environment. Results come back under `ansible_facts`
/// and are merged into the host's variables by the executor.
pub struct SetupModule;

fn os_family(distribution: &str, system: &str) -> &'static str {
    let d = distribution.to_lowercase();
    match d.as_str() {
        "ubuntu" | "debian" | "linuxmint" | "raspbian" => "Debian",
        "fedora" | "centos" | "rhel" | "redhat" | "rocky" | "almalinux" | "amzn" => "RedHat",
        "opensuse" | "sles" | "suse" => "Suse",
        "arch" | "archlinux" | "manjaro" => "Archlinux",
        "alpine" => "Alpine",
        _ => {
            if system.eq_ignore_ascii_case("darwin") {
                "Darwin"
            } else if system.eq_ignore_ascii_case("windows") {
                "Windows"
            } else {
                "Linux"
            }
        }
    }
}

/// Extracts `KEY=value` (possibly quoted) from /etc/os-release content.
fn os_release_field(content: &str, key: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let (k, v) = line.split_once('=')?;
        if k.trim() != key {
            return None;
        }
        Some(v.trim().trim_matches('"').to_string())
    })
}

async fn probe(ctx: &ModuleCtx, cmd: &str) -> String {
    ctx.connection
        .run(cmd, &crate::connection::RunOptions::default())
        .await
        .map(|r| r.stdout.trim().to_string())
        .unwrap_or_default()
}

async fn gather_posix(ctx: &ModuleCtx) -> Value {
    let system = probe(ctx, "uname -s").await;
    let kernel = probe(ctx, "uname -r").await;
    let architecture = probe(ctx, "uname -m").await;
    let hostname = probe(ctx, "hostname").await;
    let os_release = probe(ctx, "cat /etc/os-release 2>/dev/null").await;

    let distribution = os_release_field(&os_release, "ID").unwrap_or_else(|| system.clone());
    let distribution_version =
        os_release_field(&os_release, "VERSION_ID").unwrap_or_default();
    let family = os_family(&distribution, &system);

    let vcpus: i64 = probe(ctx, "nproc 2>/dev/null || sysctl -n hw.ncpu 2>/dev/null")
        .await
        .parse()
        .unwrap_or(1);
    let memtotal_kb: i64 = probe(
        ctx,
        "grep MemTotal /proc/meminfo 2>/dev/null | awk '{print $2}'",
    )
    .await
    .parse()
    .unwrap_or(0);

    let default_ipv4 = probe(
        ctx,
        "ip route get 1.1.1.1 2>/dev/null | awk '{for(i=1;i<NF;i++) if($i==\"src\") print $(i+1)}' | head -n1",
    )
    .await;

    let home = probe(ctx, "printf %s \"$HOME\"").await;
    let user = probe(ctx, "printf %s \"$USER\"").await;

    json!({
        "ansible_system": system,
        "ansible_kernel": kernel,
        "ansible_architecture": architecture,
        "ansible_hostname": hostname,
        "ansible_distribution": distribution,
        "ansible_distribution_version": distribution_version,
        "ansible_os_family": family,
        "ansible_processor_vcpus": vcpus,
        "ansible_memtotal_mb": memtotal_kb / 1024,
        "ansible_default_ipv4": { "address": default_ipv4 },
        "ansible_env": { "HOME": home, "USER": user },
    })
}

async fn gather_windows(ctx: &ModuleCtx) -> Value {
    let hostname = probe(ctx, "$env:COMPUTERNAME").await;
    let version = probe(ctx, "[System.Environment]::OSVersion.Version.ToString()").await;
    let architecture = probe(ctx, "$env:PROCESSOR_ARCHITECTURE").await;

    json!({
        "ansible_system": "Win32NT",
        "ansible_os_family": "Windows",
        "ansible_hostname": hostname,
        "ansible_distribution": "Windows",
        "ansible_distribution_version": version,
        "ansible_architecture": architecture,
    })
}

#[async_trait]
impl Module for SetupModule {
    fn name(&self) -> &'static str {
        "setup"
    }

    async fn run(&self, _args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let facts = if ctx.is_windows() {
            gather_windows(ctx).await
        } else {
            gather_posix(ctx).await
        };
        ModuleOutput::ok("").with_result("ansible_facts", facts)
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        self.run(args, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::debug::tests::test_ctx;

    #[test]
    fn family_mapping() {
        assert_eq!(os_family("ubuntu", "Linux"), "Debian");
        assert_eq!(os_family("rocky", "Linux"), "RedHat");
        assert_eq!(os_family("alpine", "Linux"), "Alpine");
        assert_eq!(os_family("weirdos", "Darwin"), "Darwin");
        assert_eq!(os_family("weirdos", "Linux"), "Linux");
    }

    #[test]
    fn os_release_parsing() {
        let content = "NAME=\"Ubuntu\"\nID=ubuntu\nVERSION_ID=\"22.04\"\n";
        assert_eq!(os_release_field(content, "ID").unwrap(), "ubuntu");
        assert_eq!(os_release_field(content, "VERSION_ID").unwrap(), "22.04");
        assert!(os_release_field(content, "MISSING").is_none());
    }

    #[tokio::test]
    async fn local_facts_have_subset_keys() {
        let out = SetupModule.run(&ModuleArgs::new(), &test_ctx()).await;
        let facts = &out.results["ansible_facts"];
        assert!(facts["ansible_system"].is_string());
        assert!(facts["ansible_hostname"].is_string());
        assert!(facts["ansible_os_family"].is_string());
        assert!(facts["ansible_processor_vcpus"].is_number());
    }
}
