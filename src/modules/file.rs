//! file module: manage files, directories and links; unarchive module.

use async_trait::async_trait;
use serde_json::json;

use super::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};
use crate::connection::shell_quote;

/// Manages path state on the target: `touch`, `absent`, `directory`,
/// `link` and `file` (assert existence).
pub struct FileModule;

#[async_trait]
impl Module for FileModule {
    fn name(&self) -> &'static str {
        "file"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["path"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let path = match args.get_required_str("path") {
            Ok(p) => p,
            Err(msg) => return ModuleOutput::failed(msg),
        };
        let state = args.get_str("state").unwrap_or_else(|| "file".to_string());
        let mode = args.get_mode("mode");

        let stat = match ctx.connection.stat(&path).await {
            Ok(stat) => stat,
            Err(e) => return ModuleOutput::failed(format!("Failed to stat {}: {}", path, e)),
        };

        match state.as_str() {
            "absent" => match stat {
                None => ModuleOutput::ok(format!("{} is absent", path)),
                Some(_) => {
                    let cmd = format!("rm -rf {}", shell_quote(&path));
                    match ctx.command(&cmd, true).await {
                        Ok(r) if r.success() => {
                            ModuleOutput::changed(format!("{} removed", path))
                        }
                        Ok(r) => ModuleOutput::failed(format!(
                            "Failed to remove {}: {}",
                            path, r.stderr
                        )),
                        Err(e) => ModuleOutput::failed(e.to_string()),
                    }
                }
            },
            "directory" => match stat {
                Some(s) if s.isdir => {
                    if let Some(mode) = mode {
                        let cmd =
                            format!("chmod {:o} {}", mode, shell_quote(&path));
                        let _ = ctx.command(&cmd, true).await;
                    }
                    ModuleOutput::ok(format!("{} already exists", path))
                }
                Some(_) => ModuleOutput::failed(format!(
                    "{} exists and is not a directory",
                    path
                )),
                None => match ctx.connection.mkdir(&path, mode).await {
                    Ok(()) => ModuleOutput::changed(format!("{} created", path)),
                    Err(e) => ModuleOutput::failed(format!(
                        "Failed to create {}: {}",
                        path, e
                    )),
                },
            },
            "touch" => {
                let existed = stat.is_some();
                let mut cmd = format!("touch {}", shell_quote(&path));
                if let Some(mode) = mode {
                    cmd = format!("{} && chmod {:o} {}", cmd, mode, shell_quote(&path));
                }
                match ctx.command(&cmd, true).await {
                    Ok(r) if r.success() => {
                        if existed {
                            ModuleOutput::changed(format!("{} touched", path))
                        } else {
                            ModuleOutput::changed(format!("{} created", path))
                        }
                    }
                    Ok(r) => {
                        ModuleOutput::failed(format!("Failed to touch {}: {}", path, r.stderr))
                    }
                    Err(e) => ModuleOutput::failed(e.to_string()),
                }
            }
            "link" => {
                let src = match args.get_required_str("src") {
                    Ok(src) => src,
                    Err(msg) => return ModuleOutput::failed(msg),
                };
                if let Some(s) = &stat {
                    if s.islink {
                        // Re-linking to the same target is a no-op
                        let cmd = format!("readlink {}", shell_quote(&path));
                        if let Ok(r) = ctx.command(&cmd, true).await {
                            if r.stdout.trim() == src {
                                return ModuleOutput::ok(format!(
                                    "{} already links to {}",
                                    path, src
                                ));
                            }
                        }
                    }
                }
                let cmd = format!("ln -sfn {} {}", shell_quote(&src), shell_quote(&path));
                match ctx.command(&cmd, true).await {
                    Ok(r) if r.success() => {
                        ModuleOutput::changed(format!("{} linked to {}", path, src))
                    }
                    Ok(r) => ModuleOutput::failed(format!("Failed to link: {}", r.stderr)),
                    Err(e) => ModuleOutput::failed(e.to_string()),
                }
            }
            "file" => match stat {
                Some(_) => {
                    if let Some(mode) = mode {
                        let cmd = format!("chmod {:o} {}", mode, shell_quote(&path));
                        let _ = ctx.command(&cmd, true).await;
                    }
                    ModuleOutput::ok(format!("{} exists", path))
                }
                None => ModuleOutput::failed(format!("{} does not exist", path)),
            },
            other => ModuleOutput::failed(format!("Unknown state: {}", other)),
        }
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let path = match args.get_required_str("path") {
            Ok(p) => p,
            Err(msg) => return ModuleOutput::failed(msg),
        };
        let state = args.get_str("state").unwrap_or_else(|| "file".to_string());
        let stat = ctx.connection.stat(&path).await.unwrap_or(None);

        let would_change = match state.as_str() {
            "absent" => stat.is_some(),
            "directory" => !stat.as_ref().map(|s| s.isdir).unwrap_or(false),
            "touch" => true,
            "link" => true,
            _ => false,
        };
        if would_change {
            ModuleOutput {
                changed: true,
                msg: format!("would set {} to {} (check mode)", path, state),
                ..Default::default()
            }
        } else {
            ModuleOutput::ok(format!("{} already in desired state", path))
        }
    }
}

/// Extracts an archive on the target by running the matching remote
/// command (`tar` or `unzip`). Honors a `creates` guard for idempotence.
pub struct UnarchiveModule;

#[async_trait]
impl Module for UnarchiveModule {
    fn name(&self) -> &'static str {
        "unarchive"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["src", "dest"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let src = args.get_str("src").expect("validated");
        let dest = args.get_str("dest").expect("validated");
        let remote_src = args.get_bool_or("remote_src", false);

        if let Some(creates) = args.get_str("creates") {
            if let Ok(Some(_)) = ctx.connection.stat(&creates).await {
                return ModuleOutput::ok(format!("skipped, since {} exists", creates));
            }
        }

        // Stage local archives onto the target first
        let archive = if remote_src {
            src.clone()
        } else {
            let local = ctx.playbook_dir.join(&src);
            let local = if local.exists() {
                local
            } else {
                std::path::PathBuf::from(&src)
            };
            if !local.exists() {
                return ModuleOutput::failed(format!("Archive not found: {}", src));
            }
            let staged = format!("/tmp/.runbook-unarchive-{}", uuid::Uuid::new_v4());
            if let Err(e) = ctx.connection.put(&local, &staged, None).await {
                return ModuleOutput::failed(format!("Failed to upload archive: {}", e));
            }
            staged
        };

        if let Err(e) = ctx.connection.mkdir(&dest, None).await {
            return ModuleOutput::failed(format!("Failed to create {}: {}", dest, e));
        }

        let cmd = if src.ends_with(".zip") {
            format!("unzip -o {} -d {}", shell_quote(&archive), shell_quote(&dest))
        } else {
            format!("tar -xf {} -C {}", shell_quote(&archive), shell_quote(&dest))
        };
        let result = ctx.command(&cmd, true).await;

        if !remote_src {
            let _ = ctx
                .command(&format!("rm -f {}", shell_quote(&archive)), true)
                .await;
        }

        match result {
            Ok(r) if r.success() => {
                ModuleOutput::changed(format!("{} extracted to {}", src, dest))
            }
            Ok(r) => ModuleOutput::failed(format!("Extraction failed: {}", r.stderr)),
            Err(e) => ModuleOutput::failed(e.to_string()),
        }
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        if let Some(creates) = args.get_str("creates") {
            if let Ok(Some(_)) = ctx.connection.stat(&creates).await {
                return ModuleOutput::ok(format!("skipped, since {} exists", creates));
            }
        }
        ModuleOutput {
            changed: true,
            msg: "would extract archive (check mode)".to_string(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::debug::tests::test_ctx;
    use serde_json::json;

    #[tokio::test]
    async fn directory_create_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("newdir").to_string_lossy().to_string();

        let mut args = ModuleArgs::new();
        args.insert("path".into(), json!(target.clone()));
        args.insert("state".into(), json!("directory"));

        let ctx = test_ctx();
        let first = FileModule.run(&args, &ctx).await;
        assert!(first.changed);
        let second = FileModule.run(&args, &ctx).await;
        assert!(!second.changed && !second.failed);
    }

    #[tokio::test]
    async fn absent_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("gone.txt");
        std::fs::write(&target, "x").unwrap();

        let mut args = ModuleArgs::new();
        args.insert("path".into(), json!(target.to_string_lossy()));
        args.insert("state".into(), json!("absent"));

        let ctx = test_ctx();
        let out = FileModule.run(&args, &ctx).await;
        assert!(out.changed);
        assert!(!target.exists());

        let again = FileModule.run(&args, &ctx).await;
        assert!(!again.changed);
    }
}
