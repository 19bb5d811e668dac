//! copy module: place a file or literal content on the target.

use async_trait::async_trait;
use serde_json::json;

use super::{md5_hex, unified_diff, ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Copies a local `src` file (resolved against the playbook directory) or
/// inline `content` to `dest`. Idempotent: the transfer is skipped when the
/// destination already carries the same checksum.
pub struct CopyModule;

/// Resolves the bytes to be written from `src`/`content`.
async fn source_bytes(args: &ModuleArgs, ctx: &ModuleCtx) -> Result<Vec<u8>, String> {
    if let Some(content) = args.get_str("content") {
        return Ok(content.into_bytes());
    }
    let src = args
        .get_str("src")
        .ok_or_else(|| "copy requires 'src' or 'content'".to_string())?;
    let local = ctx.playbook_dir.join(&src);
    let local = if local.exists() {
        local
    } else {
        std::path::PathBuf::from(&src)
    };
    std::fs::read(&local).map_err(|e| format!("Failed to read source {}: {}", src, e))
}

/// Compares the desired bytes with the current destination content.
/// Returns `(would_change, current_content)`.
async fn compare_dest(
    dest: &str,
    desired: &[u8],
    ctx: &ModuleCtx,
) -> Result<(bool, Option<Vec<u8>>), String> {
    match ctx.connection.stat(dest).await {
        Ok(Some(stat)) if stat.isfile => {
            let current = ctx
                .connection
                .get_content(dest)
                .await
                .map_err(|e| format!("Failed to read {}: {}", dest, e))?;
            Ok((md5_hex(&current) != md5_hex(desired), Some(current)))
        }
        Ok(_) => Ok((true, None)),
        Err(e) => Err(format!("Failed to stat {}: {}", dest, e)),
    }
}

#[async_trait]
impl Module for CopyModule {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["dest"]
    }

    fn validate_args(&self, args: &ModuleArgs) -> Option<String> {
        if !args.contains_key("dest") {
            return Some("Missing required argument: dest".to_string());
        }
        if !args.contains_key("src") && !args.contains_key("content") {
            return Some("copy requires 'src' or 'content'".to_string());
        }
        None
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let dest = match args.get_required_str("dest") {
            Ok(dest) => dest,
            Err(msg) => return ModuleOutput::failed(msg),
        };
        let desired = match source_bytes(args, ctx).await {
            Ok(bytes) => bytes,
            Err(msg) => return ModuleOutput::failed(msg),
        };

        let (would_change, current) = match compare_dest(&dest, &desired, ctx).await {
            Ok(r) => r,
            Err(msg) => return ModuleOutput::failed(msg),
        };

        let checksum = md5_hex(&desired);
        if !would_change {
            return ModuleOutput::ok(format!("{} is already up to date", dest))
                .with_result("dest", json!(dest))
                .with_result("checksum", json!(checksum));
        }

        if args.get_bool_or("backup", false) {
            if current.is_some() {
                let backup = format!("{}.bak", dest);
                let cmd = format!(
                    "cp -p {} {}",
                    crate::connection::shell_quote(&dest),
                    crate::connection::shell_quote(&backup)
                );
                let _ = ctx.command(&cmd, true).await;
            }
        }

        let mode = args.get_mode("mode");
        if let Err(e) = ctx.connection.put_content(&desired, &dest, mode).await {
            return ModuleOutput::failed(format!("Failed to write {}: {}", dest, e));
        }

        let mut output = ModuleOutput::changed(format!("{} updated", dest))
            .with_result("dest", json!(dest))
            .with_result("checksum", json!(checksum));
        if ctx.diff_mode {
            let before = current
                .map(|c| String::from_utf8_lossy(&c).to_string())
                .unwrap_or_default();
            let after = String::from_utf8_lossy(&desired).to_string();
            output = output.with_result("diff", json!(unified_diff(&before, &after)));
        }
        output
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let dest = match args.get_required_str("dest") {
            Ok(dest) => dest,
            Err(msg) => return ModuleOutput::failed(msg),
        };
        let desired = match source_bytes(args, ctx).await {
            Ok(bytes) => bytes,
            Err(msg) => return ModuleOutput::failed(msg),
        };
        match compare_dest(&dest, &desired, ctx).await {
            Ok((true, _)) => ModuleOutput {
                changed: true,
                msg: format!("would update {} (check mode)", dest),
                ..Default::default()
            },
            Ok((false, _)) => ModuleOutput::ok(format!("{} is already up to date", dest)),
            Err(msg) => ModuleOutput::failed(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::debug::tests::test_ctx;
    use serde_json::json;

    #[tokio::test]
    async fn copy_content_then_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("conf.txt").to_string_lossy().to_string();

        let mut args = ModuleArgs::new();
        args.insert("content".into(), json!("setting = 1\n"));
        args.insert("dest".into(), json!(dest.clone()));

        let ctx = test_ctx();
        let first = CopyModule.run(&args, &ctx).await;
        assert!(first.changed, "{}", first.msg);

        let second = CopyModule.run(&args, &ctx).await;
        assert!(!second.changed);
        assert!(!second.failed);
    }

    #[tokio::test]
    async fn check_mode_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("conf.txt").to_string_lossy().to_string();

        let mut args = ModuleArgs::new();
        args.insert("content".into(), json!("data"));
        args.insert("dest".into(), json!(dest.clone()));

        let out = CopyModule.check(&args, &test_ctx()).await;
        assert!(out.changed);
        assert!(!std::path::Path::new(&dest).exists());
    }

    #[tokio::test]
    async fn missing_source_is_failure() {
        let mut args = ModuleArgs::new();
        args.insert("src".into(), json!("/definitely/not/here"));
        args.insert("dest".into(), json!("/tmp/x"));
        let out = CopyModule.run(&args, &test_ctx()).await;
        assert!(out.failed);
    }
}
