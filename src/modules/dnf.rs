//! dnf module: Fedora/RHEL package management.

use async_trait::async_trait;

use super::package::{manage_packages, PkgBackend};
use super::{Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Manages packages with dnf.
pub struct DnfModule;

#[async_trait]
impl Module for DnfModule {
    fn name(&self) -> &'static str {
        "dnf"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["name"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        manage_packages(PkgBackend::Dnf, args, ctx, false).await
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        manage_packages(PkgBackend::Dnf, args, ctx, true).await
    }
}
