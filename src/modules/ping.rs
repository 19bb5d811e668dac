//! ping module: trivial reachability check through the module path.

use async_trait::async_trait;
use serde_json::json;

use super::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Returns `pong` (or the value of `data`). With `data=crash` it fails,
/// mirroring the reference behavior used to test error paths.
pub struct PingModule;

#[async_trait]
impl Module for PingModule {
    fn name(&self) -> &'static str {
        "ping"
    }

    async fn run(&self, args: &ModuleArgs, _ctx: &ModuleCtx) -> ModuleOutput {
        let data = args.get_str("data").unwrap_or_else(|| "pong".to_string());
        if data == "crash" {
            return ModuleOutput::failed("boom");
        }
        ModuleOutput::ok("").with_result("ping", json!(data))
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        self.run(args, ctx).await
    }
}
