//! wait_for, wait_for_connection and pause modules.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

use super::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Waits for a TCP port to open (or close) or a remote path to appear.
pub struct WaitForModule;

#[async_trait]
impl Module for WaitForModule {
    fn name(&self) -> &'static str {
        "wait_for"
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let total = args.get_i64("timeout").unwrap_or(300) as u64;
        let delay = args.get_i64("delay").unwrap_or(0) as u64;
        let state = args
            .get_str("state")
            .unwrap_or_else(|| "started".to_string());

        if delay > 0 {
            sleep(Duration::from_secs(delay)).await;
        }

        let deadline = Instant::now() + Duration::from_secs(total);

        if let Some(port) = args.get_i64("port") {
            let host = args
                .get_str("host")
                .unwrap_or_else(|| "127.0.0.1".to_string());
            let addr = format!("{}:{}", host, port);

            loop {
                let open = timeout(
                    Duration::from_secs(5),
                    tokio::net::TcpStream::connect(&addr),
                )
                .await
                .map(|r| r.is_ok())
                .unwrap_or(false);

                let satisfied = match state.as_str() {
                    "stopped" | "drained" => !open,
                    _ => open,
                };
                if satisfied {
                    return ModuleOutput::ok(format!("{} is {}", addr, state));
                }
                if Instant::now() >= deadline {
                    return ModuleOutput::failed(format!(
                        "Timeout waiting for {} to be {}",
                        addr, state
                    ));
                }
                sleep(Duration::from_secs(1)).await;
            }
        }

        if let Some(path) = args.get_str("path") {
            loop {
                let exists = matches!(ctx.connection.stat(&path).await, Ok(Some(_)));
                let satisfied = match state.as_str() {
                    "absent" => !exists,
                    _ => exists,
                };
                if satisfied {
                    return ModuleOutput::ok(format!("{} is {}", path, state));
                }
                if Instant::now() >= deadline {
                    return ModuleOutput::failed(format!(
                        "Timeout waiting for {} to be {}",
                        path, state
                    ));
                }
                sleep(Duration::from_secs(1)).await;
            }
        }

        // Neither port nor path: plain sleep for `timeout` seconds
        sleep(Duration::from_secs(total)).await;
        ModuleOutput::ok(format!("waited {} seconds", total))
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let _ = (args, ctx);
        ModuleOutput::skipped("wait_for skipped (check mode)")
    }
}

/// Waits until the host's connection answers a trivial command.
pub struct WaitForConnectionModule;

#[async_trait]
impl Module for WaitForConnectionModule {
    fn name(&self) -> &'static str {
        "wait_for_connection"
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let total = args.get_i64("timeout").unwrap_or(600) as u64;
        let sleep_secs = args.get_i64("sleep").unwrap_or(1) as u64;
        let deadline = Instant::now() + Duration::from_secs(total);

        loop {
            let probe = if ctx.is_windows() {
                "echo ok"
            } else {
                "true"
            };
            if let Ok(result) = ctx
                .connection
                .run(probe, &crate::connection::RunOptions::default())
                .await
            {
                if result.success() {
                    return ModuleOutput::ok("connection is up");
                }
            }
            if Instant::now() >= deadline {
                return ModuleOutput::failed("Timeout waiting for connection");
            }
            sleep(Duration::from_secs(sleep_secs)).await;
        }
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        self.run(args, ctx).await
    }
}

/// Pauses execution for a number of seconds or minutes.
pub struct PauseModule;

#[async_trait]
impl Module for PauseModule {
    fn name(&self) -> &'static str {
        "pause"
    }

    async fn run(&self, args: &ModuleArgs, _ctx: &ModuleCtx) -> ModuleOutput {
        let seconds = args
            .get_i64("seconds")
            .or_else(|| args.get_i64("minutes").map(|m| m * 60))
            .unwrap_or(0) as u64;
        if seconds > 0 {
            sleep(Duration::from_secs(seconds)).await;
        }
        ModuleOutput::ok(format!("paused {} seconds", seconds))
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let _ = (args, ctx);
        ModuleOutput::skipped("pause skipped (check mode)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::debug::tests::test_ctx;
    use serde_json::json;

    #[tokio::test]
    async fn wait_for_path_appears() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("flag");
        std::fs::write(&file, "x").unwrap();

        let mut args = ModuleArgs::new();
        args.insert("path".into(), json!(file.to_string_lossy()));
        args.insert("timeout".into(), json!(3));
        let out = WaitForModule.run(&args, &test_ctx()).await;
        assert!(!out.failed, "{}", out.msg);
    }

    #[tokio::test]
    async fn wait_for_missing_path_times_out() {
        let mut args = ModuleArgs::new();
        args.insert("path".into(), json!("/never/appears"));
        args.insert("timeout".into(), json!(1));
        let out = WaitForModule.run(&args, &test_ctx()).await;
        assert!(out.failed);
    }

    #[tokio::test]
    async fn pause_zero_is_instant() {
        let out = PauseModule.run(&ModuleArgs::new(), &test_ctx()).await;
        assert!(!out.failed);
    }
}
