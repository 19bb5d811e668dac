//! yum module: RHEL/CentOS package management.

use async_trait::async_trait;

use super::package::{manage_packages, PkgBackend};
use super::{Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Manages packages with yum.
pub struct YumModule;

#[async_trait]
impl Module for YumModule {
    fn name(&self) -> &'static str {
        "yum"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["name"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        manage_packages(PkgBackend::Yum, args, ctx, false).await
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        manage_packages(PkgBackend::Yum, args, ctx, true).await
    }
}
