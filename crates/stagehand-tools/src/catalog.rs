//! Static registry of the built-in tools and their parameter schemas.
//!
//! The order here is the order the model sees. `ToolName` in stagehand-core
//! carries the kind/approval classification; this module only owns the
//! model-facing descriptions and JSON schemas.

use serde_json::json;
use stagehand_core::ToolDefinition;

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "read_file".to_string(),
            description: "Read the full contents of a file in the repository.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path of the file to read, relative to the repository root."
                    }
                },
                "required": ["path"]
            }),
        },
        ToolDefinition {
            name: "write_file".to_string(),
            description: "Create or overwrite a file with the given content. \
                          Parent directories are created as needed."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path of the file to write, relative to the repository root."
                    },
                    "content": {
                        "type": "string",
                        "description": "Full new content of the file."
                    }
                },
                "required": ["path", "content"]
            }),
        },
        ToolDefinition {
            name: "edit_file".to_string(),
            description: "Replace the first occurrence of old_text in a file with new_text. \
                          Fails if old_text does not occur verbatim."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path of the file to edit, relative to the repository root."
                    },
                    "old_text": {
                        "type": "string",
                        "description": "Exact text to find. The first occurrence is replaced."
                    },
                    "new_text": {
                        "type": "string",
                        "description": "Replacement text. May be empty to delete old_text."
                    }
                },
                "required": ["path", "old_text", "new_text"]
            }),
        },
        ToolDefinition {
            name: "run_shell_command".to_string(),
            description: "Run a shell command with the repository root as the working directory. \
                          Returns stdout and stderr."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The literal command line to execute through the shell."
                    }
                },
                "required": ["command"]
            }),
        },
        ToolDefinition {
            name: "list_files".to_string(),
            description: "List the immediate entries of a directory. Directory names carry a \
                          trailing slash. An optional glob pattern filters entries by name."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Directory to list, relative to the repository root. \
                                        Defaults to the root."
                    },
                    "pattern": {
                        "type": "string",
                        "description": "Optional glob applied to entry names, e.g. *.rs"
                    }
                },
                "required": []
            }),
        },
        ToolDefinition {
            name: "search_files".to_string(),
            description: "Search file contents with a regular expression. Emits one \
                          path:line: text record per matching line, capped at 200 matches."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Regular expression to search for."
                    },
                    "path": {
                        "type": "string",
                        "description": "Directory to search under. Defaults to the repository root."
                    },
                    "glob": {
                        "type": "string",
                        "description": "Optional glob applied to file base names, e.g. *.toml"
                    }
                },
                "required": ["pattern"]
            }),
        },
    ]
}
