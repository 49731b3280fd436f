//! Pre-execution validation for tool call arguments.
//!
//! Catches malformed arguments before the tool runs, so the model gets a
//! message naming the offending field instead of a confusing downstream
//! filesystem error. The argument payload stays untyped JSON at the wire
//! boundary; this is where each tool pins down its required strings.

use serde_json::Value;
use stagehand_core::ToolName;

/// Fetch a string argument. Non-string values read as absent.
pub fn arg_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

/// Validate arguments for `tool`. `Err` carries a model-facing message.
pub fn validate_tool_args(tool: ToolName, args: &Value) -> Result<(), String> {
    match tool {
        ToolName::ReadFile => require_string(args, "path", "file path is required"),
        ToolName::WriteFile => {
            require_string(args, "path", "file path is required")?;
            // content may be an empty string, but it must be present and a string
            require_present_string(args, "content")
        }
        ToolName::EditFile => {
            require_string(args, "path", "file path is required")?;
            require_string(args, "old_text", "the exact text to replace is required")?;
            require_present_string(args, "new_text")
        }
        ToolName::RunShellCommand => {
            require_string(args, "command", "command string is required")
        }
        ToolName::ListFiles => {
            optional_string(args, "path")?;
            optional_string(args, "pattern")
        }
        ToolName::SearchFiles => {
            require_string(args, "pattern", "search pattern is required")?;
            optional_string(args, "path")?;
            optional_string(args, "glob")
        }
    }
}

fn require_string(args: &Value, field: &str, msg: &str) -> Result<(), String> {
    match args.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(()),
        Some(Value::String(_)) => Err(format!("{field}: {msg} (got empty string)")),
        Some(v) => Err(format!(
            "{field}: expected string, got {}",
            v.to_string().chars().take(50).collect::<String>()
        )),
        None => Err(format!("{field}: {msg}")),
    }
}

fn require_present_string(args: &Value, field: &str) -> Result<(), String> {
    match args.get(field) {
        Some(Value::String(_)) => Ok(()),
        Some(v) => Err(format!(
            "{field}: expected string, got {}",
            v.to_string().chars().take(50).collect::<String>()
        )),
        None => Err(format!("'{field}' field is required")),
    }
}

fn optional_string(args: &Value, field: &str) -> Result<(), String> {
    match args.get(field) {
        None | Some(Value::String(_)) => Ok(()),
        Some(v) => Err(format!(
            "{field}: expected string, got {}",
            v.to_string().chars().take(50).collect::<String>()
        )),
    }
}
