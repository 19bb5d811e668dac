//! slurp and fetch modules: pull remote file content back to the
//! controller.

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::json;

use super::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Reads a remote file and returns its content base64-encoded.
pub struct SlurpModule;

#[async_trait]
impl Module for SlurpModule {
    fn name(&self) -> &'static str {
        "slurp"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["src"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let src = args.get_str("src").expect("validated");
        match ctx.connection.get_content(&src).await {
            Ok(content) => ModuleOutput::ok("")
                .with_result(
                    "content",
                    json!(base64::engine::general_purpose::STANDARD.encode(&content)),
                )
                .with_result("encoding", json!("base64"))
                .with_result("source", json!(src)),
            Err(e) => ModuleOutput::failed(format!("Failed to read {}: {}", src, e)),
        }
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        self.run(args, ctx).await
    }
}

/// Downloads a remote file into `<dest>/<host>/<src>` on the controller.
pub struct FetchModule;

#[async_trait]
impl Module for FetchModule {
    fn name(&self) -> &'static str {
        "fetch"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["src", "dest"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let src = args.get_str("src").expect("validated");
        let dest = args.get_str("dest").expect("validated");
        let flat = args.get_bool_or("flat", false);

        let local = if flat {
            std::path::PathBuf::from(&dest)
        } else {
            std::path::PathBuf::from(&dest)
                .join(&ctx.host_name)
                .join(src.trim_start_matches('/'))
        };

        match ctx.connection.stat(&src).await {
            Ok(None) => return ModuleOutput::failed(format!("{} does not exist", src)),
            Err(e) => return ModuleOutput::failed(format!("Failed to stat {}: {}", src, e)),
            Ok(Some(_)) => {}
        }

        // Unchanged when the local copy already matches
        if let (Ok(remote), Ok(local_content)) = (
            ctx.connection.get_content(&src).await,
            std::fs::read(&local),
        ) {
            if super::md5_hex(&remote) == super::md5_hex(&local_content) {
                return ModuleOutput::ok(format!("{} already fetched", src))
                    .with_result("dest", json!(local.to_string_lossy()));
            }
        }

        match ctx.connection.get(&src, &local).await {
            Ok(()) => ModuleOutput::changed(format!("{} fetched", src))
                .with_result("dest", json!(local.to_string_lossy())),
            Err(e) => ModuleOutput::failed(format!("Failed to fetch {}: {}", src, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::debug::tests::test_ctx;
    use serde_json::json;

    #[tokio::test]
    async fn slurp_returns_base64() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("secret.txt");
        std::fs::write(&file, "hello").unwrap();

        let mut args = ModuleArgs::new();
        args.insert("src".into(), json!(file.to_string_lossy()));
        let out = SlurpModule.run(&args, &test_ctx()).await;
        assert!(!out.failed);
        assert_eq!(out.results["content"], json!("aGVsbG8="));
        assert_eq!(out.results["encoding"], json!("base64"));
    }
}
