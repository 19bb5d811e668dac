//! cron module: manage crontab entries by name marker.

use async_trait::async_trait;

use super::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};
use crate::connection::shell_quote;

/// Manages one crontab entry identified by a `# Ansible: <name>` marker
/// comment, matching the reference tool's bookkeeping.
pub struct CronModule;

fn build_entry(args: &ModuleArgs) -> Option<String> {
    let job = args.get_str("job")?;
    let minute = args.get_str("minute").unwrap_or_else(|| "*".into());
    let hour = args.get_str("hour").unwrap_or_else(|| "*".into());
    let day = args.get_str("day").unwrap_or_else(|| "*".into());
    let month = args.get_str("month").unwrap_or_else(|| "*".into());
    let weekday = args.get_str("weekday").unwrap_or_else(|| "*".into());
    Some(format!(
        "{} {} {} {} {} {}",
        minute, hour, day, month, weekday, job
    ))
}

/// Rewrites the crontab content: the marker comment plus the entry line
/// are replaced, inserted or removed as one unit.
fn rewrite_crontab(current: &str, name: &str, entry: Option<&str>) -> (String, bool) {
    let marker = format!("# Ansible: {}", name);
    let lines: Vec<&str> = current.lines().collect();
    let mut out: Vec<String> = Vec::new();
    let mut found = false;
    let mut i = 0;

    while i < lines.len() {
        if lines[i] == marker {
            found = true;
            // Skip the marker and its entry line
            i += 2;
            if let Some(entry) = entry {
                out.push(marker.clone());
                out.push(entry.to_string());
            }
            continue;
        }
        out.push(lines[i].to_string());
        i += 1;
    }

    if !found {
        if let Some(entry) = entry {
            out.push(marker);
            out.push(entry.to_string());
        }
    }

    let mut content = out.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    let changed = content != current;
    (content, changed)
}

#[async_trait]
impl Module for CronModule {
    fn name(&self) -> &'static str {
        "cron"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["name"]
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let name = args.get_str("name").expect("validated");
        let state = args
            .get_str("state")
            .unwrap_or_else(|| "present".to_string());
        let user_flag = args
            .get_str("user")
            .map(|u| format!("-u {} ", shell_quote(&u)))
            .unwrap_or_default();

        let entry = if state == "present" {
            match build_entry(args) {
                Some(entry) => Some(entry),
                None => return ModuleOutput::failed("cron state=present requires 'job'"),
            }
        } else {
            None
        };

        let current = match ctx
            .command(&format!("crontab {}-l 2>/dev/null || true", user_flag), true)
            .await
        {
            Ok(result) => result.stdout,
            Err(e) => return ModuleOutput::failed(e.to_string()),
        };

        let (new_content, changed) = rewrite_crontab(&current, &name, entry.as_deref());
        if !changed {
            return ModuleOutput::ok(format!("cron entry '{}' unchanged", name));
        }

        let cmd = format!(
            "printf '%s' {} | crontab {}-",
            shell_quote(&new_content),
            user_flag
        );
        match ctx.command(&cmd, true).await {
            Ok(r) if r.success() => {
                ModuleOutput::changed(format!("cron entry '{}' {}", name, state))
            }
            Ok(r) => ModuleOutput::failed(format!("crontab install failed: {}", r.stderr)),
            Err(e) => ModuleOutput::failed(e.to_string()),
        }
    }

    async fn check(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let name = args.get_str("name").expect("validated");
        let state = args
            .get_str("state")
            .unwrap_or_else(|| "present".to_string());
        let entry = if state == "present" {
            build_entry(args)
        } else {
            None
        };
        let current = ctx
            .command("crontab -l 2>/dev/null || true", true)
            .await
            .map(|r| r.stdout)
            .unwrap_or_default();
        let (_, changed) = rewrite_crontab(&current, &name, entry.as_deref());
        if changed {
            ModuleOutput {
                changed: true,
                msg: format!("would update cron entry '{}' (check mode)", name),
                ..Default::default()
            }
        } else {
            ModuleOutput::ok(format!("cron entry '{}' unchanged", name))
        }
    }
}
