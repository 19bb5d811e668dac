//! Galaxy passthrough: execute an unmapped FQCN module through a
//! compatible runtime installed on the target.

use async_trait::async_trait;
use serde_json::Value;

use super::{Module, ModuleArgs, ModuleCtx, ModuleOutput};
use crate::connection::shell_quote;

/// Runs `namespace.collection.module` via the `ansible` binary on the
/// target (local connection against the target itself). Not available on
/// Windows targets.
pub struct GalaxyModule {
    fqcn: String,
}

impl GalaxyModule {
    /// Creates a passthrough executor for the given FQCN.
    pub fn new(fqcn: impl Into<String>) -> Self {
        Self { fqcn: fqcn.into() }
    }

    /// Extracts the result JSON from `ansible` ad-hoc output, which looks
    /// like `localhost | SUCCESS => { ... }`.
    fn parse_adhoc_output(stdout: &str) -> Option<Value> {
        let json_start = stdout.find('{')?;
        serde_json::from_str(&stdout[json_start..]).ok()
    }
}

#[async_trait]
impl Module for GalaxyModule {
    fn name(&self) -> &'static str {
        "galaxy"
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        if ctx.is_windows() {
            return ModuleOutput::failed(format!(
                "Galaxy module '{}' cannot be executed on Windows targets; use a native win_* module instead",
                self.fqcn
            ));
        }

        let args_json =
            serde_json::to_string(&args.clone().into_iter().collect::<serde_json::Map<_, _>>())
                .unwrap_or_else(|_| "{}".to_string());
        let cmd = format!(
            "ansible localhost -c local -m {} -a {} 2>/dev/null",
            shell_quote(&self.fqcn),
            shell_quote(&args_json)
        );

        let result = match ctx.command(&cmd, true).await {
            Ok(result) => result,
            Err(e) => return ModuleOutput::failed(e.to_string()),
        };

        let Some(payload) = Self::parse_adhoc_output(&result.stdout) else {
            if result.success() {
                return ModuleOutput::ok(format!("{} completed", self.fqcn));
            }
            return ModuleOutput::failed(format!(
                "Galaxy execution of '{}' failed (rc={}): {} — is a compatible runtime installed on the target?",
                self.fqcn, result.rc, result.stderr
            ));
        };

        let changed = payload
            .get("changed")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let failed = !result.success()
            || payload.get("failed").and_then(Value::as_bool).unwrap_or(false);
        let msg = payload
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut output = ModuleOutput {
            changed,
            failed,
            msg,
            rc: result.rc,
            ..Default::default()
        };
        if let Value::Object(map) = payload {
            for (k, v) in map {
                if !matches!(k.as_str(), "changed" | "failed" | "msg") {
                    output.results.insert(k, v);
                }
            }
        }
        output
    }

    async fn check(&self, _args: &ModuleArgs, _ctx: &ModuleCtx) -> ModuleOutput {
        ModuleOutput::skipped(format!(
            "galaxy passthrough '{}' skipped (check mode)",
            self.fqcn
        ))
    }
}
