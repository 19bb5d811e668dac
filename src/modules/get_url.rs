//! get_url module: download a URL onto the target.

use async_trait::async_trait;
use serde_json::json;

use super::{md5_hex, ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Downloads `url` on the control node and places it at `dest` on the
/// target. Idempotent via checksum compare against the existing file.
pub struct GetUrlModule;

async fn download(url: &str, timeout: u64) -> Result<Vec<u8>, String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout))
        .build()
        .map_err(|e| format!("HTTP client error: {}", e))?;
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("Download from {} failed: {}", url, e))?;
    if !response.status().is_success() {
        return Err(format!(
            "Download from {} failed with status {}",
            url,
            response.status()
        ));
    }
    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| format!("Failed to read response body: {}", e))
}

#[async_trait]
impl Module for GetUrlModule {
    fn name(&self) -> &'static str {
        "get_url"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["url", "dest"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let url = args.get_str("url").expect("validated");
        let dest = args.get_str("dest").expect("validated");
        let timeout = args.get_i64("timeout").unwrap_or(60) as u64;

        let content = match download(&url, timeout).await {
            Ok(content) => content,
            Err(msg) => return ModuleOutput::failed(msg),
        };
        let checksum = md5_hex(&content);

        if let Ok(Some(stat)) = ctx.connection.stat(&dest).await {
            if stat.isfile {
                if let Ok(current) = ctx.connection.get_content(&dest).await {
                    if md5_hex(&current) == checksum {
                        return ModuleOutput::ok(format!("{} is already up to date", dest))
                            .with_result("dest", json!(dest))
                            .with_result("checksum", json!(checksum));
                    }
                }
            }
        }

        let mode = args.get_mode("mode");
        match ctx.connection.put_content(&content, &dest, mode).await {
            Ok(()) => ModuleOutput::changed(format!("{} downloaded to {}", url, dest))
                .with_result("dest", json!(dest))
                .with_result("checksum", json!(checksum))
                .with_result("size", json!(content.len())),
            Err(e) => ModuleOutput::failed(format!("Failed to write {}: {}", dest, e)),
        }
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let dest = args.get_str("dest").expect("validated");
        let exists = matches!(ctx.connection.stat(&dest).await, Ok(Some(_)));
        if exists {
            // Without downloading we cannot prove the content matches
            ModuleOutput::ok(format!("{} exists (content not verified in check mode)", dest))
        } else {
            ModuleOutput {
                changed: true,
                msg: format!("would download to {} (check mode)", dest),
                ..Default::default()
            }
        }
    }
}
