//! Pre-execution inspection: human-readable metadata for a tool call,
//! computed without side effects so an approver can decide before anything
//! runs. Must never fail on expected bad inputs (missing file, invalid
//! path); it degrades the metadata instead. The snapshot may go stale
//! between inspection and execution; execution re-validates.

use serde_json::Value;
use stagehand_core::{ToolKind, ToolMetadata, ToolName};
use std::fs;
use std::path::Path;

use crate::path;
use crate::validation::arg_str;

const PREVIEW_MAX_CHARS: usize = 240;

pub fn prepare_metadata(workspace: &Path, name: &str, args: &Value) -> ToolMetadata {
    let workspace = workspace
        .canonicalize()
        .unwrap_or_else(|_| workspace.to_path_buf());
    let mut meta = ToolMetadata {
        kind: ToolKind::from_api_name(name),
        ..Default::default()
    };

    match ToolName::from_api_name(name) {
        Some(ToolName::RunShellCommand) => {
            meta.command = arg_str(args, "command").map(str::to_string);
        }
        Some(ToolName::WriteFile) => {
            let raw = arg_str(args, "path").unwrap_or_default();
            let content = arg_str(args, "content").unwrap_or_default();
            if let Ok(resolved) = path::validate_write_target(&workspace, raw) {
                let rel = path::workspace_relative(&workspace, &resolved);
                // A file that does not exist yet diffs against empty content.
                let current = fs::read_to_string(&resolved).unwrap_or_default();
                meta.diff = Some(stagehand_diff::render_unified(&rel, &current, content));
                meta.path = Some(rel);
            }
            meta.preview = Some(truncate_preview(content));
        }
        Some(ToolName::EditFile) => {
            let raw = arg_str(args, "path").unwrap_or_default();
            let old_text = arg_str(args, "old_text").unwrap_or_default();
            let new_text = arg_str(args, "new_text").unwrap_or_default();
            if let Ok(resolved) = path::validate_existing(&workspace, raw) {
                let rel = path::workspace_relative(&workspace, &resolved);
                if let Ok(current) = fs::read_to_string(&resolved)
                    && !old_text.is_empty()
                    && current.contains(old_text)
                {
                    let proposed = current.replacen(old_text, new_text, 1);
                    meta.diff = Some(stagehand_diff::render_unified(&rel, &current, &proposed));
                }
                meta.path = Some(rel);
            }
        }
        Some(ToolName::ReadFile) => {
            if let Some(raw) = arg_str(args, "path")
                && let Ok(resolved) = path::validate_existing(&workspace, raw)
            {
                meta.path = Some(path::workspace_relative(&workspace, &resolved));
            }
        }
        Some(ToolName::ListFiles) | Some(ToolName::SearchFiles) => {
            if let Some(raw) = arg_str(args, "path")
                && !raw.is_empty()
                && let Ok(resolved) = path::validate_existing(&workspace, raw)
            {
                meta.path = Some(path::workspace_relative(&workspace, &resolved));
            }
        }
        None => {}
    }

    meta
}

fn truncate_preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_MAX_CHARS {
        return content.to_string();
    }
    let mut preview: String = content.chars().take(PREVIEW_MAX_CHARS).collect();
    preview.push_str("…");
    preview
}
