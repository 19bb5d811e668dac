//! known_hosts module: manage SSH known_hosts entries.

use async_trait::async_trait;

use super::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Adds or removes a host key entry in a `known_hosts` file on the target.
pub struct KnownHostsModule;

fn rewrite(content: &str, host: &str, key: Option<&str>) -> (String, bool) {
    let mut lines: Vec<String> = content
        .lines()
        .filter(|line| {
            let entry_host = line.split_whitespace().next().unwrap_or("");
            !entry_host
                .split(',')
                .any(|h| h == host || h.trim_start_matches('[').starts_with(&format!("{}]", host)))
        })
        .map(String::from)
        .collect();

    if let Some(key) = key {
        lines.push(key.trim().to_string());
    }

    let mut new_content = lines.join("\n");
    if !new_content.is_empty() {
        new_content.push('\n');
    }
    let changed = new_content != content;
    (new_content, changed)
}

#[async_trait]
impl Module for KnownHostsModule {
    fn name(&self) -> &'static str {
        "known_hosts"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["name"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let host = args.get_str("name").expect("validated");
        let state = args
            .get_str("state")
            .unwrap_or_else(|| "present".to_string());
        let path = args
            .get_str("path")
            .unwrap_or_else(|| "~/.ssh/known_hosts".to_string());
        let path = shellexpand::tilde(&path).to_string();

        let key = if state == "present" {
            match args.get_str("key") {
                Some(key) => Some(key),
                None => {
                    return ModuleOutput::failed("known_hosts state=present requires 'key'")
                }
            }
        } else {
            None
        };

        let current = match ctx.connection.stat(&path).await {
            Ok(Some(_)) => match ctx.connection.get_content(&path).await {
                Ok(content) => String::from_utf8_lossy(&content).to_string(),
                Err(e) => return ModuleOutput::failed(format!("Failed to read {}: {}", path, e)),
            },
            Ok(None) => String::new(),
            Err(e) => return ModuleOutput::failed(format!("Failed to stat {}: {}", path, e)),
        };

        let (new_content, changed) = rewrite(&current, &host, key.as_deref());
        if !changed {
            return ModuleOutput::ok(format!("known_hosts entry for {} unchanged", host));
        }

        match ctx
            .connection
            .put_content(new_content.as_bytes(), &path, Some(0o644))
            .await
        {
            Ok(()) => ModuleOutput::changed(format!("known_hosts entry for {} {}", host, state)),
            Err(e) => ModuleOutput::failed(format!("Failed to write {}: {}", path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove_entries() {
        let key = "web01 ssh-ed25519 AAAAC3NzaC1lZDI1 comment";
        let (content, changed) = rewrite("", "web01", Some(key));
        assert!(changed);
        assert_eq!(content, format!("{}\n", key));

        let (same, changed) = rewrite(&content, "web01", Some(key));
        assert!(!changed);
        assert_eq!(same, content);

        let (removed, changed) = rewrite(&content, "web01", None);
        assert!(changed);
        assert!(removed.is_empty());
    }
}
