//! template module: render a local template and place it on the target.

use async_trait::async_trait;
use serde_json::json;

use super::{md5_hex, unified_diff, ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Renders `src` (a local Jinja-family template, resolved against the
/// playbook directory, with `templates/` tried as a fallback) against the
/// host's variables and writes the result to `dest`. Idempotent via
/// checksum compare like `copy`.
pub struct TemplateModule;

fn render_source(args: &ModuleArgs, ctx: &ModuleCtx) -> Result<Vec<u8>, String> {
    let src = args
        .get_str("src")
        .ok_or_else(|| "Missing required argument: src".to_string())?;

    let candidates = [
        ctx.playbook_dir.join(&src),
        ctx.playbook_dir.join("templates").join(&src),
        std::path::PathBuf::from(&src),
    ];
    let local = candidates
        .iter()
        .find(|p| p.exists())
        .ok_or_else(|| format!("Template not found: {}", src))?;

    let template = std::fs::read_to_string(local)
        .map_err(|e| format!("Failed to read template {}: {}", src, e))?;
    let rendered = ctx
        .engine
        .render(&template, &ctx.vars)
        .map_err(|e| format!("Template render failed: {}", e))?;
    Ok(rendered.into_bytes())
}

#[async_trait]
impl Module for TemplateModule {
    fn name(&self) -> &'static str {
        "template"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["src", "dest"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let dest = args.get_str("dest").expect("validated");
        let desired = match render_source(args, ctx) {
            Ok(bytes) => bytes,
            Err(msg) => return ModuleOutput::failed(msg),
        };

        let current = match ctx.connection.stat(&dest).await {
            Ok(Some(stat)) if stat.isfile => {
                match ctx.connection.get_content(&dest).await {
                    Ok(content) => Some(content),
                    Err(e) => {
                        return ModuleOutput::failed(format!("Failed to read {}: {}", dest, e))
                    }
                }
            }
            Ok(_) => None,
            Err(e) => return ModuleOutput::failed(format!("Failed to stat {}: {}", dest, e)),
        };

        if let Some(current) = &current {
            if md5_hex(current) == md5_hex(&desired) {
                return ModuleOutput::ok(format!("{} is already up to date", dest))
                    .with_result("dest", json!(dest));
            }
        }

        let mode = args.get_mode("mode");
        if let Err(e) = ctx.connection.put_content(&desired, &dest, mode).await {
            return ModuleOutput::failed(format!("Failed to write {}: {}", dest, e));
        }

        let mut output = ModuleOutput::changed(format!("{} templated", dest))
            .with_result("dest", json!(dest));
        if ctx.diff_mode {
            let before = current
                .map(|c| String::from_utf8_lossy(&c).to_string())
                .unwrap_or_default();
            output = output.with_result(
                "diff",
                json!(unified_diff(&before, &String::from_utf8_lossy(&desired))),
            );
        }
        output
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let dest = args.get_str("dest").expect("validated");
        let desired = match render_source(args, ctx) {
            Ok(bytes) => bytes,
            Err(msg) => return ModuleOutput::failed(msg),
        };
        let unchanged = match ctx.connection.stat(&dest).await {
            Ok(Some(stat)) if stat.isfile => ctx
                .connection
                .get_content(&dest)
                .await
                .map(|current| md5_hex(&current) == md5_hex(&desired))
                .unwrap_or(false),
            _ => false,
        };
        if unchanged {
            ModuleOutput::ok(format!("{} is already up to date", dest))
        } else {
            ModuleOutput {
                changed: true,
                msg: format!("would template {} (check mode)", dest),
                ..Default::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::debug::tests::test_ctx;
    use serde_json::json;

    #[tokio::test]
    async fn renders_with_host_vars() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("motd.j2"), "welcome to {{ site }}\n").unwrap();
        let dest = dir.path().join("motd").to_string_lossy().to_string();

        let mut ctx = test_ctx();
        ctx.playbook_dir = dir.path().to_path_buf();
        ctx.vars.insert("site".into(), json!("prod"));

        let mut args = ModuleArgs::new();
        args.insert("src".into(), json!("motd.j2"));
        args.insert("dest".into(), json!(dest.clone()));

        let out = TemplateModule.run(&args, &ctx).await;
        assert!(out.changed, "{}", out.msg);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "welcome to prod\n");

        let again = TemplateModule.run(&args, &ctx).await;
        assert!(!again.changed);
    }

    #[tokio::test]
    async fn undefined_variable_fails_task() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.j2"), "{{ nope }}").unwrap();

        let mut ctx = test_ctx();
        ctx.playbook_dir = dir.path().to_path_buf();

        let mut args = ModuleArgs::new();
        args.insert("src".into(), json!("bad.j2"));
        args.insert("dest".into(), json!("/tmp/never"));

        let out = TemplateModule.run(&args, &ctx).await;
        assert!(out.failed);
    }
}
