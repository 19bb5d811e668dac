//! assert module: verify that conditions hold.

use async_trait::async_trait;

use super::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Evaluates each expression in `that` against the host's variables;
/// the first false condition fails the task with `fail_msg`.
pub struct AssertModule;

#[async_trait]
impl Module for AssertModule {
    fn name(&self) -> &'static str {
        "assert"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["that"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let conditions = args.get_str_list("that");
        if conditions.is_empty() {
            return ModuleOutput::failed("assert requires a 'that' condition");
        }

        for condition in &conditions {
            match ctx.engine.evaluate_when(condition, &ctx.vars) {
                Ok(true) => {}
                Ok(false) => {
                    let msg = args
                        .get_str("fail_msg")
                        .or_else(|| args.get_str("msg"))
                        .unwrap_or_else(|| format!("Assertion failed: {}", condition));
                    return ModuleOutput::failed(msg)
                        .with_result("assertion", serde_json::json!(condition))
                        .with_result("evaluated_to", serde_json::json!(false));
                }
                Err(e) => {
                    return ModuleOutput::failed(format!(
                        "Error evaluating assertion '{}': {}",
                        condition, e
                    ))
                }
            }
        }

        let msg = args
            .get_str("success_msg")
            .unwrap_or_else(|| "All assertions passed".to_string());
        ModuleOutput::ok(msg)
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        self.run(args, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::debug::tests::test_ctx;
    use serde_json::json;

    #[tokio::test]
    async fn passing_and_failing_assertions() {
        let mut ctx = test_ctx();
        ctx.vars.insert("n".into(), json!(5));

        let mut args = ModuleArgs::new();
        args.insert("that".into(), json!(["n > 3", "n < 10"]));
        let out = AssertModule.run(&args, &ctx).await;
        assert!(!out.failed);

        let mut args = ModuleArgs::new();
        args.insert("that".into(), json!(["n > 100"]));
        args.insert("fail_msg".into(), json!("too small"));
        let out = AssertModule.run(&args, &ctx).await;
        assert!(out.failed);
        assert_eq!(out.msg, "too small");
    }
}
