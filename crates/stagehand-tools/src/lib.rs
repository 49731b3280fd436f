mod catalog;
mod inspect;
pub mod path;
mod shell;
mod validation;

use anyhow::{Result, anyhow};
use regex::RegexBuilder;
use serde_json::Value;
use stagehand_core::ToolName;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use catalog::tool_definitions;
pub use inspect::prepare_metadata;
pub use shell::{PlatformShellRunner, ShellRunResult, ShellRunner};
pub use validation::{arg_str, validate_tool_args};

/// Hard cap on search output lines before the truncation marker.
pub const SEARCH_MAX_MATCHES: usize = 200;
const SEARCH_TRUNCATION_MARKER: &str = "... (truncated)";
const NO_MATCHES: &str = "No matches found.";

/// Result of one tool execution. Failures are data, never panics: the
/// content of an error outcome is the error message, phrased for the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

/// Executes cataloged tools against a single repository root. Owns no
/// persistent state; every call re-validates paths against the root.
pub struct LocalExecutor {
    workspace: PathBuf,
    runner: Arc<dyn ShellRunner + Send + Sync>,
    shell_timeout: Duration,
}

impl LocalExecutor {
    pub fn new(workspace: &Path, shell_timeout: Duration) -> Result<Self> {
        Self::with_runner(workspace, Arc::new(PlatformShellRunner), shell_timeout)
    }

    pub fn with_runner(
        workspace: &Path,
        runner: Arc<dyn ShellRunner + Send + Sync>,
        shell_timeout: Duration,
    ) -> Result<Self> {
        let workspace = workspace
            .canonicalize()
            .map_err(|err| anyhow!("failed to resolve repository root: {err}"))?;
        if !workspace.is_dir() {
            return Err(anyhow!("repository root must be a directory"));
        }
        Ok(Self {
            workspace,
            runner,
            shell_timeout,
        })
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace
    }

    /// Run a tool call to completion. Unknown names and bad arguments fail
    /// closed here regardless of how they were classified for display.
    pub fn execute(&self, name: &str, args: &Value) -> ToolOutcome {
        match self.run_tool(name, args) {
            Ok(content) => ToolOutcome {
                content,
                is_error: false,
            },
            Err(err) => ToolOutcome {
                content: err.to_string(),
                is_error: true,
            },
        }
    }

    fn run_tool(&self, name: &str, args: &Value) -> Result<String> {
        let tool = ToolName::from_api_name(name)
            .ok_or_else(|| anyhow!("unknown tool: {name}"))?;
        validate_tool_args(tool, args)
            .map_err(|msg| anyhow!("invalid arguments for `{name}`: {msg}"))?;

        match tool {
            ToolName::ReadFile => self.read_file(args),
            ToolName::WriteFile => self.write_file(args),
            ToolName::EditFile => self.edit_file(args),
            ToolName::RunShellCommand => self.run_shell(args),
            ToolName::ListFiles => self.list_files(args),
            ToolName::SearchFiles => self.search_files(args),
        }
    }

    fn read_file(&self, args: &Value) -> Result<String> {
        let raw = arg_str(args, "path").unwrap_or_default();
        let resolved = path::validate_existing(&self.workspace, raw)?;
        let rel = path::workspace_relative(&self.workspace, &resolved);
        fs::read_to_string(&resolved).map_err(|err| anyhow!("failed to read file {rel}: {err}"))
    }

    fn write_file(&self, args: &Value) -> Result<String> {
        let raw = arg_str(args, "path").unwrap_or_default();
        let content = arg_str(args, "content").unwrap_or_default();
        let resolved = path::validate_write_target(&self.workspace, raw)?;
        let rel = path::workspace_relative(&self.workspace, &resolved);
        self.write_atomic(&resolved, content)
            .map_err(|err| anyhow!("failed to write file {rel}: {err}"))?;
        Ok(format!("Wrote {} bytes to {rel}", content.len()))
    }

    fn edit_file(&self, args: &Value) -> Result<String> {
        let raw = arg_str(args, "path").unwrap_or_default();
        let old_text = arg_str(args, "old_text").unwrap_or_default();
        let new_text = arg_str(args, "new_text").unwrap_or_default();

        let resolved = path::validate_existing(&self.workspace, raw)?;
        let rel = path::workspace_relative(&self.workspace, &resolved);
        let current = fs::read_to_string(&resolved)
            .map_err(|err| anyhow!("failed to read file {rel}: {err}"))?;

        // First occurrence wins; ambiguity on repeated old_text is deliberate.
        if !current.contains(old_text) {
            return Err(anyhow!("old_text not found in {rel}"));
        }
        let updated = current.replacen(old_text, new_text, 1);
        self.write_atomic(&resolved, &updated)
            .map_err(|err| anyhow!("failed to write file {rel}: {err}"))?;
        Ok(format!("Edited {rel}: replaced first occurrence of old_text"))
    }

    fn run_shell(&self, args: &Value) -> Result<String> {
        let cmd = arg_str(args, "command").unwrap_or_default();
        let result = self.runner.run(cmd, &self.workspace, self.shell_timeout)?;

        let mut combined = result.stdout;
        if !result.stderr.is_empty() {
            combined.push('\n');
            combined.push_str(&result.stderr);
        }

        if result.timed_out {
            return Err(anyhow!(
                "command timed out after {}s: {cmd}\n{combined}",
                self.shell_timeout.as_secs()
            ));
        }
        match result.status {
            Some(0) => Ok(combined),
            Some(code) => Err(anyhow!(
                "command failed with exit status {code}: {cmd}\n{combined}"
            )),
            None => Err(anyhow!(
                "command terminated by signal: {cmd}\n{combined}"
            )),
        }
    }

    fn list_files(&self, args: &Value) -> Result<String> {
        let raw = match arg_str(args, "path") {
            Some(p) if !p.is_empty() => p,
            _ => ".",
        };
        let pattern = match arg_str(args, "pattern") {
            Some(g) if !g.is_empty() => Some(
                glob::Pattern::new(g)
                    .map_err(|err| anyhow!("invalid glob pattern '{g}': {err}"))?,
            ),
            _ => None,
        };

        let resolved = path::validate_existing(&self.workspace, raw)?;
        let rel = path::workspace_relative(&self.workspace, &resolved);
        if !resolved.is_dir() {
            return Err(anyhow!("not a directory: {rel}"));
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&resolved)
            .map_err(|err| anyhow!("failed to list directory {rel}: {err}"))?
        {
            let entry = entry.map_err(|err| anyhow!("failed to list directory {rel}: {err}"))?;
            let mut name = entry.file_name().to_string_lossy().to_string();
            if let Some(ref pattern) = pattern
                && !pattern.matches(&name)
            {
                continue;
            }
            if entry.path().is_dir() {
                name.push('/');
            }
            entries.push(name);
        }
        Ok(entries.join("\n"))
    }

    fn search_files(&self, args: &Value) -> Result<String> {
        let pattern = arg_str(args, "pattern").unwrap_or_default();
        let root = match arg_str(args, "path") {
            Some(p) if !p.is_empty() => path::validate_existing(&self.workspace, p)?,
            _ => self.workspace.clone(),
        };
        let regex = RegexBuilder::new(pattern)
            .build()
            .map_err(|err| anyhow!("invalid regex pattern '{pattern}': {err}"))?;
        let name_glob = match arg_str(args, "glob") {
            Some(g) if !g.is_empty() => Some(
                glob::Pattern::new(g)
                    .map_err(|err| anyhow!("invalid glob pattern '{g}': {err}"))?,
            ),
            _ => None,
        };

        let mut matches: Vec<String> = Vec::new();
        let mut truncated = false;

        let walker = ignore::WalkBuilder::new(&root)
            .hidden(false)
            .follow_links(false)
            .require_git(false)
            .build();
        'walk: for entry in walker {
            // Unreadable files and directories never abort the whole search.
            let Ok(entry) = entry else { continue };
            let file = entry.path();
            if !file.is_file() || should_skip(file) {
                continue;
            }
            if let Some(ref name_glob) = name_glob {
                let base = file
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                if !name_glob.matches(&base) {
                    continue;
                }
            }
            let Ok(bytes) = fs::read(file) else { continue };
            if bytes.contains(&0) {
                continue;
            }
            let Ok(text) = String::from_utf8(bytes) else {
                continue;
            };
            let rel = path::workspace_relative(&self.workspace, file);
            for (idx, line) in text.lines().enumerate() {
                if regex.is_match(line) {
                    if matches.len() == SEARCH_MAX_MATCHES {
                        truncated = true;
                        break 'walk;
                    }
                    matches.push(format!("{rel}:{}: {line}", idx + 1));
                }
            }
        }

        if matches.is_empty() {
            return Ok(NO_MATCHES.to_string());
        }
        if truncated {
            matches.push(SEARCH_TRUNCATION_MARKER.to_string());
        }
        Ok(matches.join("\n"))
    }

    /// Write through a temp file in the target directory then rename, so a
    /// partial write never replaces prior content.
    fn write_atomic(&self, resolved: &Path, content: &str) -> Result<()> {
        let parent = resolved
            .parent()
            .ok_or_else(|| anyhow!("path has no parent directory"))?;
        fs::create_dir_all(parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(resolved).map_err(|err| err.error)?;
        Ok(())
    }
}

fn should_skip(file: &Path) -> bool {
    file.components()
        .any(|c| c.as_os_str() == ".git" || c.as_os_str() == ".stagehand")
}
