//! fail module: fail the task with a custom message.

use async_trait::async_trait;

use super::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Unconditionally fails. Pair with `when` for guarded aborts.
pub struct FailModule;

#[async_trait]
impl Module for FailModule {
    fn name(&self) -> &'static str {
        "fail"
    }

    async fn run(&self, args: &ModuleArgs, _ctx: &ModuleCtx) -> ModuleOutput {
        let msg = args
            .get_str("msg")
            .unwrap_or_else(|| "Failed as requested from task".to_string());
        ModuleOutput::failed(msg)
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        self.run(args, ctx).await
    }
}
