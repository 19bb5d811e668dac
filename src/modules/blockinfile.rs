//! blockinfile module: maintain a marked block of lines in a file.

use async_trait::async_trait;
use serde_json::json;

use super::{unified_diff, ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};

const DEFAULT_MARKER: &str = "# {mark} ANSIBLE MANAGED BLOCK";

/// Inserts, replaces or removes a block of text surrounded by marker
/// comments. The `marker` template's `{mark}` expands to BEGIN/END.
pub struct BlockinfileModule;

fn render_block(content: &str, block: &str, marker: &str, state_present: bool) -> (String, bool) {
    let begin = marker.replace("{mark}", "BEGIN");
    let end = marker.replace("{mark}", "END");

    let lines: Vec<&str> = content.lines().collect();
    let begin_idx = lines.iter().position(|l| *l == begin);
    let end_idx = lines.iter().position(|l| *l == end);

    let mut out: Vec<String> = Vec::new();
    match (begin_idx, end_idx) {
        (Some(b), Some(e)) if b <= e => {
            out.extend(lines[..b].iter().map(|s| s.to_string()));
            if state_present {
                out.push(begin.clone());
                out.extend(block.lines().map(String::from));
                out.push(end.clone());
            }
            out.extend(lines[e + 1..].iter().map(|s| s.to_string()));
        }
        _ => {
            out.extend(lines.iter().map(|s| s.to_string()));
            if state_present {
                out.push(begin.clone());
                out.extend(block.lines().map(String::from));
                out.push(end.clone());
            }
        }
    }

    let mut new_content = out.join("\n");
    if !new_content.is_empty() {
        new_content.push('\n');
    }
    let changed = new_content != content;
    (new_content, changed)
}

#[async_trait]
impl Module for BlockinfileModule {
    fn name(&self) -> &'static str {
        "blockinfile"
    }

    fn validate_args(&self, args: &ModuleArgs) -> Option<String> {
        if !args.contains_key("path") && !args.contains_key("dest") {
            return Some("Missing required argument: path".to_string());
        }
        None
    }

    async fn run(&self, args: &ModuleArgs, ctx: &ModuleCtx) -> ModuleOutput {
        let path = args
            .get_str("path")
            .or_else(|| args.get_str("dest"))
            .expect("validated");
        let state_present = args
            .get_str("state")
            .map(|s| s != "absent")
            .unwrap_or(true);
        let block = args.get_str("block").unwrap_or_default();
        let marker = args
            .get_str("marker")
            .unwrap_or_else(|| DEFAULT_MARKER.to_string());
        let create = args.get_bool_or("create", true);

        let current = match ctx.connection.stat(&path).await {
            Ok(Some(_)) => match ctx.connection.get_content(&path).await {
                Ok(content) => String::from_utf8_lossy(&content).to_string(),
                Err(e) => {
                    return ModuleOutput::failed(format!("Failed to read {}: {}", path, e))
                }
            },
            Ok(None) if state_present && create => String::new(),
            Ok(None) if !state_present => {
                return ModuleOutput::ok(format!("{} is absent", path));
            }
            Ok(None) => {
                return ModuleOutput::failed(format!("{} does not exist", path));
            }
            Err(e) => return ModuleOutput::failed(format!("Failed to stat {}: {}", path, e)),
        };

        let (new_content, changed) = render_block(&current, &block, &marker, state_present);
        if !changed {
            return ModuleOutput::ok(format!("{} unchanged", path));
        }

        if let Err(e) = ctx
            .connection
            .put_content(new_content.as_bytes(), &path, args.get_mode("mode"))
            .await
        {
            return ModuleOutput::failed(format!("Failed to write {}: {}", path, e));
        }

        let mut output = ModuleOutput::changed(format!("{} block updated", path));
        if ctx.diff_mode {
            output = output.with_result("diff", json!(unified_diff(&current, &new_content)));
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_insert_update_remove() {
        let marker = DEFAULT_MARKER;

        let (with_block, changed) = render_block("top\n", "a\nb", marker, true);
        assert!(changed);
        assert!(with_block.contains("# BEGIN ANSIBLE MANAGED BLOCK"));
        assert!(with_block.contains("# END ANSIBLE MANAGED BLOCK"));

        // Same block again: no change
        let (same, changed) = render_block(&with_block, "a\nb", marker, true);
        assert!(!changed);
        assert_eq!(same, with_block);

        // Different content replaces between markers
        let (updated, changed) = render_block(&with_block, "c", marker, true);
        assert!(changed);
        assert!(updated.contains("\nc\n"));
        assert!(!updated.contains("\na\n"));

        // Absent removes the whole block
        let (removed, changed) = render_block(&updated, "", marker, false);
        assert!(changed);
        assert_eq!(removed, "top\n");
    }
}
