use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub type Result<T> = anyhow::Result<T>;

/// Directory under the workspace root holding runtime artifacts (settings,
/// session logs). Tools never touch this path on behalf of the model.
pub fn runtime_dir(workspace: &Path) -> PathBuf {
    workspace.join(".stagehand")
}

// ── Tool vocabulary ─────────────────────────────────────────────────────

/// The closed set of built-in tools. Adding a tool means adding a variant
/// here plus a catalog entry, so dispatch stays compile-time checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    ReadFile,
    WriteFile,
    EditFile,
    RunShellCommand,
    ListFiles,
    SearchFiles,
}

impl ToolName {
    pub const ALL: [ToolName; 6] = [
        Self::ReadFile,
        Self::WriteFile,
        Self::EditFile,
        Self::RunShellCommand,
        Self::ListFiles,
        Self::SearchFiles,
    ];

    pub fn from_api_name(s: &str) -> Option<Self> {
        Some(match s {
            "read_file" => Self::ReadFile,
            "write_file" => Self::WriteFile,
            "edit_file" => Self::EditFile,
            "run_shell_command" => Self::RunShellCommand,
            "list_files" => Self::ListFiles,
            "search_files" => Self::SearchFiles,
            _ => return None,
        })
    }

    pub fn as_api_name(&self) -> &'static str {
        match self {
            Self::ReadFile => "read_file",
            Self::WriteFile => "write_file",
            Self::EditFile => "edit_file",
            Self::RunShellCommand => "run_shell_command",
            Self::ListFiles => "list_files",
            Self::SearchFiles => "search_files",
        }
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            Self::ReadFile => ToolKind::Read,
            Self::WriteFile => ToolKind::Write,
            Self::EditFile => ToolKind::Edit,
            Self::RunShellCommand => ToolKind::Shell,
            Self::ListFiles => ToolKind::List,
            Self::SearchFiles => ToolKind::Search,
        }
    }

    /// Whether a call must pass the human approval gate before executing.
    /// This is a static table, not inferred: anything that mutates the
    /// repository or spawns a process requires approval.
    pub fn requires_approval(&self) -> bool {
        matches!(self, Self::WriteFile | Self::EditFile | Self::RunShellCommand)
    }
}

/// Display/approval-routing classification of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Read,
    Write,
    Edit,
    Shell,
    List,
    Search,
}

impl ToolKind {
    /// Classify a tool name for display. Unknown names fall back to `Read`
    /// (fail open at display time); the executor separately rejects unknown
    /// names at execution time (fail closed).
    pub fn from_api_name(s: &str) -> Self {
        ToolName::from_api_name(s).map_or(Self::Read, |t| t.kind())
    }
}

impl Default for ToolKind {
    fn default() -> Self {
        Self::Read
    }
}

/// A tool (function) definition sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

// ── Tool call plumbing ──────────────────────────────────────────────────

/// Human-readable facts about a tool call, computed before approval and
/// execution so an approver can decide without side effects. A snapshot of
/// on-disk state at preparation time; execution re-validates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub kind: ToolKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

/// One model-requested tool invocation, consumed exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub args: Value,
    pub metadata: ToolMetadata,
}

/// Answer to an outstanding approval request, matched by call id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolAnswer {
    pub id: String,
    pub approved: bool,
}

// ── Transcript ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A unit of model output or tool feedback inside a transcript entry.
/// Thinking content is streamed outward but never materialized here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

/// One role-tagged conversation entry. The transcript is append-only for the
/// lifetime of a session and is serialized verbatim into every model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl MessageEntry {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// Tool results travel back to the model as a user-role entry.
    pub fn tool_results(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }
}

// ── Stop reasons ────────────────────────────────────────────────────────

/// Why a model turn (and possibly the session) ended. `MaxTurns` is
/// synthesized by the engine's loop guard; the rest map to wire strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    StopSequence,
    MaxTurns,
    Other(String),
}

impl StopReason {
    pub fn parse(s: &str) -> Self {
        match s {
            "end_turn" => Self::EndTurn,
            "max_tokens" => Self::MaxTokens,
            "tool_use" => Self::ToolUse,
            "stop_sequence" => Self::StopSequence,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::EndTurn => "end_turn",
            Self::MaxTokens => "max_tokens",
            Self::ToolUse => "tool_use",
            Self::StopSequence => "stop_sequence",
            Self::MaxTurns => "max_turns",
            Self::Other(s) => s,
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Outward events ──────────────────────────────────────────────────────

/// Events delivered to the single session consumer, in order. The stream is
/// closed after `Done` or `Error`; no further events follow.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    TextDelta(String),
    ThinkingDelta(String),
    ToolRequest(ToolCallRequest),
    ToolResult {
        id: String,
        content: String,
        is_error: bool,
    },
    Done {
        stop_reason: StopReason,
    },
    Error {
        error: SessionError,
    },
}

/// Session-fatal failures. Validation, execution, and approval-rejection
/// failures are folded into tool results instead and never surface here.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("session canceled: {0}")]
    Canceled(String),
}

// ── Cancellation ────────────────────────────────────────────────────────

/// Shared cancellation token scoped to one session. Both engine suspension
/// points (the network stream and the approval wait) observe it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    flag: AtomicBool,
    cause: Mutex<Option<String>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self, cause: impl Into<String>) {
        if let Ok(mut guard) = self.inner.cause.lock() {
            guard.get_or_insert(cause.into());
        }
        self.inner.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// The first recorded cause, or a generic one if cancel raced the cause.
    pub fn cause(&self) -> String {
        self.inner
            .cause
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .unwrap_or_else(|| "canceled".to_string())
    }
}

// ── Configuration ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub session: SessionConfig,
}

impl AppConfig {
    pub fn config_path(workspace: &Path) -> PathBuf {
        runtime_dir(workspace).join("settings.json")
    }

    pub fn load(workspace: &Path) -> Result<Self> {
        let path = Self::config_path(workspace);
        let raw = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load the workspace config, writing defaults on first run.
    pub fn ensure(workspace: &Path) -> Result<Self> {
        match Self::load(workspace) {
            Ok(cfg) => Ok(cfg),
            Err(_) => {
                let cfg = Self::default();
                cfg.save(workspace)?;
                Ok(cfg)
            }
        }
    }

    pub fn save(&self, workspace: &Path) -> Result<()> {
        let path = Self::config_path(workspace);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    pub max_retries: u8,
    pub retry_base_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 8192,
            timeout_seconds: 600,
            max_retries: 3,
            retry_base_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Upper bound on model turns before the engine stops the loop.
    pub max_turns: usize,
    pub shell_timeout_seconds: u64,
    /// Outward event channel capacity; the engine blocks when it is full.
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: 50,
            shell_timeout_seconds: 120,
            event_buffer: 256,
        }
    }
}
