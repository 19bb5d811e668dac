//! set_fact module: define per-host variables for later tasks.

use async_trait::async_trait;
use serde_json::Value;

use super::{Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Every argument becomes a fact on the host, surfaced under
/// `ansible_facts` and merged into the host context by the executor.
/// Purely computational; runs in check mode too.
pub struct SetFactModule;

#[async_trait]
impl Module for SetFactModule {
    fn name(&self) -> &'static str {
        "set_fact"
    }

    async fn run(&self, args: &ModuleArgs, _ctx: &ModuleCtx) -> ModuleOutput {
        let mut facts = serde_json::Map::new();
        for (key, value) in args {
            if key == "cacheable" {
                continue;
            }
            facts.insert(key.clone(), value.clone());
        }
        if facts.is_empty() {
            return ModuleOutput::failed("set_fact requires at least one key=value pair");
        }
        ModuleOutput::ok("").with_result("ansible_facts", Value::Object(facts))
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
    async fn facts_collected() {
        let mut args = ModuleArgs::new();
        args.insert("release".into(), json!("v2"));
        args.insert("cacheable".into(), json!(true));
        let out = SetFactModule.run(&args, &test_ctx()).await;
        assert!(!out.failed);
        assert_eq!(out.results["ansible_facts"]["release"], json!("v2"));
        assert!(out.results["ansible_facts"].get("cacheable").is_none());
    }

    #[tokio::test]
    async fn empty_args_fail() {
        let out = SetFactModule.run(&ModuleArgs::new(), &test_ctx()).await;
        assert!(out.failed);
    }
}
