//! debug module: print a message or a variable.

use async_trait::async_trait;
use serde_json::json;

use super::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Prints `msg`, or the value of the variable named by `var`. Purely
/// computational; runs in check mode too.
pub struct DebugModule;

#[async_trait]
impl Module for DebugModule {
    fn name(&self) -> &'static str {
        "debug"
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        if let Some(var) = args.get_str("var") {
            let value = ctx
                .vars
                .get(&var)
                .cloned()
                .unwrap_or_else(|| json!(format!("VARIABLE IS NOT DEFINED: {}", var)));
            let rendered = match &value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return ModuleOutput::ok(format!("{}: {}", var, rendered))
                .with_result(var, value);
        }

        let msg = match args.get("msg") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "Hello world!".to_string(),
        };
        ModuleOutput::ok(msg)
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        self.run(args, ctx).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::connection::local::LocalConnection;
    use crate::template::TemplateEngine;
    use crate::vars::Vars;
    use std::sync::Arc;

    pub(crate) fn test_ctx() -> ModuleCtx {
        ModuleCtx {
            host_name: "localhost".into(),
            connection: Arc::new(LocalConnection::new("localhost")),
            check_mode: false,
            diff_mode: false,
            r#become: false,
            become_user: "root".into(),
            become_method: "sudo".into(),
            environment: Default::default(),
            vars: Vars::new(),
            engine: Arc::new(TemplateEngine::new()),
            playbook_dir: std::path::PathBuf::from("."),
        }
    }

    #[tokio::test]
    async fn default_message() {
        let out = DebugModule.run(&ModuleArgs::new(), &test_ctx()).await;
        assert!(!out.changed && !out.failed);
        assert_eq!(out.msg, "Hello world!");
    }

    #[tokio::test]
    async fn var_lookup() {
        let mut ctx = test_ctx();
        ctx.vars.insert("answer".into(), json!(42));
        let mut args = ModuleArgs::new();
        args.insert("var".into(), json!("answer"));
        let out = DebugModule.run(&args, &ctx).await;
        assert_eq!(out.msg, "answer: 42");
        assert_eq!(out.results["answer"], json!(42));
    }

    #[tokio::test]
    async fn undefined_var_reported() {
        let mut args = ModuleArgs::new();
        args.insert("var".into(), json!("ghost"));
        let out = DebugModule.run(&args, &test_ctx()).await;
        assert!(out.msg.contains("VARIABLE IS NOT DEFINED"));
    }
}
