//! stat module: report remote path facts.

use async_trait::async_trait;
use serde_json::json;

use super::{md5_hex, ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Stats a remote path and returns the facts under `results.stat`.
/// Read-only; identical in check mode.
pub struct StatModule;

#[async_trait]
impl Module for StatModule {
    fn name(&self) -> &'static str {
        "stat"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["path"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let path = args.get_str("path").expect("validated");

        let stat = match ctx.connection.stat(&path).await {
            Ok(stat) => stat,
            Err(e) => return ModuleOutput::failed(format!("Failed to stat {}: {}", path, e)),
        };

        let value = match stat {
            None => json!({ "exists": false }),
            Some(stat) => {
                let mut obj = json!({
                    "exists": true,
                    "isreg": stat.isfile,
                    "isdir": stat.isdir,
                    "islnk": stat.islink,
                    "size": stat.size,
                    "mtime": stat.mtime,
                    "mode": format!("{:04o}", stat.mode),
                    "uid": stat.uid,
                    "gid": stat.gid,
                });
                if stat.isfile && args.get_bool_or("get_checksum", false) {
                    if let Ok(content) = ctx.connection.get_content(&path).await {
                        obj["checksum"] = json!(md5_hex(&content));
                    }
                }
                obj
            }
        };

        ModuleOutput::ok("").with_result("stat", value)
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
    async fn existing_and_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.bin");
        std::fs::write(&file, b"12345").unwrap();

        let mut args = ModuleArgs::new();
        args.insert("path".into(), json!(file.to_string_lossy()));
        let out = StatModule.run(&args, &test_ctx()).await;
        assert_eq!(out.results["stat"]["exists"], json!(true));
        assert_eq!(out.results["stat"]["size"], json!(5));
        assert_eq!(out.results["stat"]["isreg"], json!(true));

        let mut args = ModuleArgs::new();
        args.insert("path".into(), json!("/definitely/missing"));
        let out = StatModule.run(&args, &test_ctx()).await;
        assert_eq!(out.results["stat"]["exists"], json!(false));
    }
}
