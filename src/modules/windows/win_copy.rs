//! win_copy module: place files on Windows targets.

use async_trait::async_trait;
use serde_json::json;

use super::ps_quote;
use crate::modules::{md5_hex, ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Copies a local `src` file or inline `content` to `dest` on a Windows
/// target using the chunked transfer scheme of the WinRM connection.
/// Idempotent via remote MD5 compare.
pub struct WinCopyModule;

async fn remote_md5(ctx: &ModuleCtx, path: &str) -> Option<String> {
    let script = format!(
        "(Get-FileHash -Algorithm MD5 -Path '{}' -ErrorAction SilentlyContinue).Hash",
        ps_quote(path)
    );
    let result = ctx
        .connection
        .run(&script, &crate::connection::RunOptions::default())
        .await
        .ok()?;
    let hash = result.stdout.trim().to_lowercase();
    if hash.is_empty() {
        None
    } else {
        Some(hash)
    }
}

fn source_bytes(args: &ModuleArgs, ctx: &ModuleCtx) -> Result<Vec<u8>, String> {
    if let Some(content) = args.get_str("content") {
        return Ok(content.into_bytes());
    }
    let src = args
        .get_str("src")
        .ok_or_else(|| "win_copy requires 'src' or 'content'".to_string())?;
    let local = ctx.playbook_dir.join(&src);
    let local = if local.exists() {
        local
    } else {
        std::path::PathBuf::from(&src)
    };
    std::fs::read(&local).map_err(|e| format!("Failed to read source {}: {}", src, e))
}

#[async_trait]
impl Module for WinCopyModule {
    fn name(&self) -> &'static str {
        "win_copy"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["dest"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let dest = args.get_str("dest").expect("validated");
        let desired = match source_bytes(args, ctx) {
            Ok(bytes) => bytes,
            Err(msg) => return ModuleOutput::failed(msg),
        };

        let checksum = md5_hex(&desired);
        if let Some(current) = remote_md5(ctx, &dest).await {
            if current == checksum {
                return ModuleOutput::ok(format!("{} is already up to date", dest))
                    .with_result("dest", json!(dest));
            }
        }

        match ctx.connection.put_content(&desired, &dest, None).await {
            Ok(()) => ModuleOutput::changed(format!("{} updated", dest))
                .with_result("dest", json!(dest))
                .with_result("checksum", json!(checksum)),
            Err(e) => ModuleOutput::failed(format!("Failed to write {}: {}", dest, e)),
        }
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let dest = args.get_str("dest").expect("validated");
        let desired = match source_bytes(args, ctx) {
            Ok(bytes) => bytes,
            Err(msg) => return ModuleOutput::failed(msg),
        };
        match remote_md5(ctx, &dest).await {
            Some(current) if current == md5_hex(&desired) => {
                ModuleOutput::ok(format!("{} is already up to date", dest))
            }
            _ => ModuleOutput {
                changed: true,
                msg: format!("would update {} (check mode)", dest),
                ..Default::default()
            },
        }
    }
}
