//! Runner facade: wires inventory, playbooks, connections and the
//! executor, and owns the process exit code.

use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::callback::{Callback, HumanCallback, JsonCallback};
use crate::connection::ConnectionCache;
use crate::error::{Error, Result};
use crate::executor::{Executor, ExecutorConfig};
use crate::inventory::InventoryManager;
use crate::playbook::PlaybookLoader;
use crate::results::PlaybookResult;
use crate::vars::{vars_from_yaml_str, Vars};
use crate::vault::{VaultLib, VaultSecret};

/// Everything the runner needs, usually assembled from CLI flags.
pub struct RunnerOptions {
    pub inventory: PathBuf,
    pub playbooks: Vec<PathBuf>,
    pub forks: usize,
    pub limit: Option<String>,
    pub check_mode: bool,
    pub diff_mode: bool,
    pub tags: Vec<String>,
    pub skip_tags: Vec<String>,
    pub extra_vars: Vec<String>,
    pub json_output: bool,
    pub verbosity: u8,
    pub artifacts_dir: Option<PathBuf>,
    pub vault_password_file: Option<PathBuf>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            inventory: PathBuf::new(),
            playbooks: Vec::new(),
            forks: 5,
            limit: None,
            check_mode: false,
            diff_mode: false,
            tags: Vec::new(),
            skip_tags: Vec::new(),
            extra_vars: Vec::new(),
            json_output: false,
            verbosity: 0,
            artifacts_dir: None,
            vault_password_file: None,
        }
    }
}

/// The high-level playbook runner.
pub struct Runner {
    options: RunnerOptions,
    vault: Arc<VaultLib>,
    cache: Arc<ConnectionCache>,
    callback: Arc<dyn Callback>,
}

impl Runner {
    /// Builds a runner; loads the vault secret when configured.
    pub fn new(options: RunnerOptions) -> Result<Self> {
        let mut vault = VaultLib::new();
        if let Some(path) = &options.vault_password_file {
            vault.add_secret(VaultSecret::from_file(path)?);
        }

        let callback: Arc<dyn Callback> = if options.json_output {
            Arc::new(JsonCallback)
        } else {
            Arc::new(HumanCallback::new(options.verbosity))
        };

        Ok(Self {
            options,
            vault: Arc::new(vault),
            cache: Arc::new(ConnectionCache::new()),
            callback,
        })
    }

    /// Synchronous entrypoint: drives the async run and converts the
    /// outcome into a process exit code.
    pub fn run(self) -> i32 {
        let runtime = match tokio::runtime::Runtime::new() {
            Ok(runtime) => runtime,
            Err(e) => {
                eprintln!("Failed to start runtime: {}", e);
                return 1;
            }
        };

        // Partial results survive an interrupt: each finished play is
        // appended to this shared accumulator.
        let partial: Arc<Mutex<PlaybookResult>> = Arc::new(Mutex::new(PlaybookResult::new(
            self.options
                .playbooks
                .first()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
        )));

        let outcome = runtime.block_on(async {
            tokio::select! {
                result = self.run_async(partial.clone()) => result,
                _ = tokio::signal::ctrl_c() => {
                    self.cache.close_all().await;
                    Err(Error::Interrupted)
                }
            }
        });

        match outcome {
            Ok(result) => {
                if self.options.json_output {
                    println!("{}", result.to_json());
                } else {
                    self.callback.on_recap(&result.final_stats());
                }
                self.write_artifacts(&result);
                result.exit_code()
            }
            Err(Error::Interrupted) => {
                let result = runtime.block_on(async { partial.lock().await.clone() });
                self.emit_error(&Error::Interrupted);
                if !result.play_results.is_empty() && !self.options.json_output {
                    self.callback.on_recap(&result.final_stats());
                }
                self.write_artifacts(&result);
                Error::Interrupted.exit_code()
            }
            Err(error) => {
                self.emit_error(&error);
                error.exit_code()
            }
        }
    }

    /// The async run loop: load inventory, then for each playbook parse
    /// and execute every play in order.
    pub async fn run_async(
        &self,
        accumulator: Arc<Mutex<PlaybookResult>>,
    ) -> Result<PlaybookResult> {
        let inventory = Arc::new(
            InventoryManager::parse(&self.options.inventory, self.vault.as_ref()).await?,
        );
        let extra_vars = parse_extra_vars(&self.options.extra_vars, self.vault.as_ref())?;

        for playbook_path in &self.options.playbooks {
            self.callback
                .on_playbook_start(&playbook_path.to_string_lossy());

            let loader = PlaybookLoader::new(playbook_path, self.vault.as_ref());
            let plays = loader.load()?;
            debug!(playbook = %playbook_path.display(), plays = plays.len(), "Playbook loaded");

            let executor = Executor::new(
                ExecutorConfig {
                    forks: self.options.forks.max(1),
                    check_mode: self.options.check_mode,
                    diff_mode: self.options.diff_mode,
                    tags: self.options.tags.clone(),
                    skip_tags: self.options.skip_tags.clone(),
                },
                inventory.clone(),
                self.cache.clone(),
                self.callback.clone(),
                extra_vars.clone(),
                playbook_path
                    .parent()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| PathBuf::from(".")),
            );

            for play in &plays {
                let hosts = self.select_hosts(&inventory, &play.hosts);
                let play_result = executor.run_play(play, hosts).await?;
                accumulator.lock().await.add_play_result(play_result);
            }
        }

        // Connections close after the last playbook.
        self.cache.close_all().await;

        let result = accumulator.lock().await.clone();
        Ok(result)
    }

    /// Resolves the play's host pattern and intersects it with the
    /// run-level limit.
    fn select_hosts(
        &self,
        inventory: &InventoryManager,
        pattern: &str,
    ) -> Vec<crate::inventory::Host> {
        let selected = inventory.get_hosts(pattern);
        match &self.options.limit {
            Some(limit) => {
                let limited: std::collections::HashSet<String> = inventory
                    .get_hosts(limit)
                    .iter()
                    .map(|h| h.name.clone())
                    .collect();
                selected
                    .into_iter()
                    .filter(|h| limited.contains(&h.name))
                    .cloned()
                    .collect()
            }
            None => selected.into_iter().cloned().collect(),
        }
    }

    fn emit_error(&self, error: &Error) {
        if self.options.json_output {
            let doc = json!({
                "error": true,
                "error_type": error.error_type(),
                "message": error.to_string(),
                "exit_code": error.exit_code(),
            });
            println!("{}", serde_json::to_string_pretty(&doc).unwrap_or_default());
        } else {
            eprintln!("ERROR: {}", error);
        }
    }

    /// Writes the machine-output document and a text log into the
    /// artifacts directory when one was requested.
    fn write_artifacts(&self, result: &PlaybookResult) {
        let Some(dir) = &self.options.artifacts_dir else {
            return;
        };
        let stamped = dir.join(chrono::Local::now().format("%Y%m%dT%H%M%S").to_string());
        if let Err(e) = std::fs::create_dir_all(&stamped) {
            eprintln!("Failed to create artifacts dir: {}", e);
            return;
        }
        let _ = std::fs::write(stamped.join("result.json"), result.to_json());

        let mut log = String::new();
        for (host, stats) in result.final_stats() {
            log.push_str(&format!(
                "{}: ok={} changed={} failed={} skipped={} unreachable={}\n",
                host, stats.ok, stats.changed, stats.failed, stats.skipped, stats.unreachable
            ));
        }
        let _ = std::fs::write(stamped.join("run.log"), log);
    }
}

/// Parses `-e` values: a JSON object, `key=value` (value parsed as JSON
/// when possible), or `@file` loading a YAML/JSON file (vault-encrypted
/// files are decrypted).
pub fn parse_extra_vars(items: &[String], vault: &VaultLib) -> Result<Vars> {
    let mut vars = Vars::new();
    for item in items {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }

        if let Some(path) = item.strip_prefix('@') {
            let content =
                crate::vault::read_maybe_encrypted(std::path::Path::new(path), vault)?;
            let file_vars = vars_from_yaml_str(&content)
                .map_err(|e| Error::Other(format!("Invalid extra-vars file {}: {}", path, e)))?;
            for (k, v) in file_vars {
                vars.insert(k, v);
            }
            continue;
        }

        if item.starts_with('{') {
            let parsed: serde_json::Value = serde_json::from_str(item)
                .map_err(|e| Error::Other(format!("Invalid extra-vars JSON: {}", e)))?;
            if let serde_json::Value::Object(map) = parsed {
                for (k, v) in map {
                    vars.insert(k, v);
                }
            }
            continue;
        }

        if let Some((key, value)) = item.split_once('=') {
            let parsed = serde_json::from_str::<serde_json::Value>(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
            vars.insert(key.trim().to_string(), parsed);
            continue;
        }

        return Err(Error::Other(format!(
            "Invalid extra-vars entry: '{}' (expected JSON, key=value, or @file)",
            item
        )));
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extra_vars_key_value_and_json() {
        let vault = VaultLib::new();
        let vars = parse_extra_vars(
            &[
                "env=prod".to_string(),
                "count=3".to_string(),
                r#"{"nested": {"a": 1}}"#.to_string(),
            ],
            &vault,
        )
        .unwrap();
        assert_eq!(vars["env"], json!("prod"));
        assert_eq!(vars["count"], json!(3));
        assert_eq!(vars["nested"]["a"], json!(1));
    }

    #[test]
    fn extra_vars_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vars.yml");
        std::fs::write(&path, "region: eu-west-1\nreplicas: 2\n").unwrap();

        let vault = VaultLib::new();
        let vars = parse_extra_vars(&[format!("@{}", path.display())], &vault).unwrap();
        assert_eq!(vars["region"], json!("eu-west-1"));
        assert_eq!(vars["replicas"], json!(2));
    }

    #[test]
    fn invalid_entry_rejected() {
        let vault = VaultLib::new();
        assert!(parse_extra_vars(&["just-a-word".to_string()], &vault).is_err());
    }
}
