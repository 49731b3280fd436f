use anyhow::Result;
use chrono::Utc;
use serde_json::{Value, json};
use stagehand_core::{EngineEvent, SessionError, runtime_dir};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Session diagnostics: an append-only JSONL log under the workspace runtime
/// directory plus stderr helpers. Delta payloads are logged by length, not
/// content. The transcript is the source of truth, the log is not.
pub struct Observer {
    log_path: PathBuf,
    verbose: bool,
}

impl Observer {
    pub fn new(workspace: &Path) -> Result<Self> {
        let dir = runtime_dir(workspace);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            log_path: dir.join("session.log"),
            verbose: false,
        })
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn record_event(&self, event: &EngineEvent) -> Result<()> {
        self.append_log_line(&format!(
            "{} EVENT {}",
            Utc::now().to_rfc3339(),
            event_json(event)
        ))
    }

    /// Log a message to stderr when verbose mode is on.
    pub fn verbose_log(&self, msg: &str) {
        if self.verbose {
            eprintln!("[stagehand] {msg}");
        }
    }

    /// Log a warning to stderr and the log file.
    pub fn warn_log(&self, msg: &str) {
        eprintln!("[stagehand WARN] {msg}");
        let _ = self.append_log_line(&format!("{} WARN {msg}", Utc::now().to_rfc3339()));
    }

    fn append_log_line(&self, line: &str) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        writeln!(f, "{line}")?;
        Ok(())
    }
}

fn event_json(event: &EngineEvent) -> Value {
    match event {
        EngineEvent::TextDelta(text) => json!({"event": "text_delta", "len": text.len()}),
        EngineEvent::ThinkingDelta(text) => {
            json!({"event": "thinking_delta", "len": text.len()})
        }
        EngineEvent::ToolRequest(request) => json!({
            "event": "tool_request",
            "id": request.id,
            "name": request.name,
            "kind": request.metadata.kind,
            "path": request.metadata.path,
            "command": request.metadata.command,
        }),
        EngineEvent::ToolResult {
            id,
            content,
            is_error,
        } => json!({
            "event": "tool_result",
            "id": id,
            "is_error": is_error,
            "len": content.len(),
        }),
        EngineEvent::Done { stop_reason } => {
            json!({"event": "done", "stop_reason": stop_reason.as_str()})
        }
        EngineEvent::Error { error } => {
            let kind = match error {
                SessionError::Transport(_) => "transport",
                SessionError::Canceled(_) => "canceled",
            };
            json!({"event": "error", "kind": kind, "message": error.to_string()})
        }
    }
}
