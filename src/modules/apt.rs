//! apt module: Debian/Ubuntu package management.

use async_trait::async_trait;

use super::package::{manage_packages, PkgBackend};
use super::{Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Manages packages with apt-get (`state` present/latest/absent,
/// `update_cache`).
pub struct AptModule;

#[async_trait]
impl Module for AptModule {
    fn name(&self) -> &'static str {
        "apt"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["name"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        manage_packages(PkgBackend::Apt, args, ctx, false).await
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        manage_packages(PkgBackend::Apt, args, ctx, true).await
    }
}
