//! Incremental reducer from protocol events to completed content blocks.
//!
//! Per-block state machine: `Idle → TextOpen → Idle`, `Idle → ToolUseOpen →
//! Idle`, `Idle → ThinkingOpen → Idle`. Text deltas are buffered *and*
//! passed through immediately; thinking deltas are pass-through only;
//! tool-use JSON fragments are buffered with no partial parsing until the
//! block closes. The pass-through stream is a prefix-complete, in-order
//! replay of the model output: nothing reordered or dropped.

use serde_json::Value;
use stagehand_core::{ContentBlock, StopReason};

use crate::events::{BlockDelta, BlockStart, StreamEvent};

/// Outward pass-through emitted while the stream is still running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamUpdate {
    TextDelta(String),
    ThinkingDelta(String),
}

/// A tool call assembled from one closed tool-use block. The raw argument
/// JSON is kept unparsed; the engine decides how to treat malformed input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedToolUse {
    pub id: String,
    pub name: String,
    pub input_json: String,
}

/// Everything a finished model call produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub blocks: Vec<ContentBlock>,
    pub tool_uses: Vec<CompletedToolUse>,
    pub stop_reason: Option<StopReason>,
}

#[derive(Debug)]
enum OpenBlock {
    Text(String),
    Thinking,
    ToolUse {
        id: String,
        name: String,
        json: String,
    },
    Other,
}

/// Transient per-call state. Build one per model call, feed every event
/// through [`StreamReducer::apply`], then take the outcome with
/// [`StreamReducer::finish`].
#[derive(Debug, Default)]
pub struct StreamReducer {
    current: Option<OpenBlock>,
    blocks: Vec<ContentBlock>,
    tool_uses: Vec<CompletedToolUse>,
    stop_reason: Option<StopReason>,
}

impl StreamReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one protocol event. Returns the outward pass-through update the
    /// event produced, if any.
    pub fn apply(&mut self, event: StreamEvent) -> Option<StreamUpdate> {
        match event {
            StreamEvent::ContentBlockStart { content_block, .. } => {
                self.current = Some(match content_block {
                    BlockStart::Text { text } => OpenBlock::Text(text),
                    BlockStart::Thinking { .. } => OpenBlock::Thinking,
                    BlockStart::ToolUse { id, name } => OpenBlock::ToolUse {
                        id,
                        name,
                        json: String::new(),
                    },
                    BlockStart::Other => OpenBlock::Other,
                });
                None
            }
            StreamEvent::ContentBlockDelta { delta, .. } => match delta {
                BlockDelta::TextDelta { text } => {
                    if let Some(OpenBlock::Text(buffer)) = self.current.as_mut() {
                        buffer.push_str(&text);
                    }
                    Some(StreamUpdate::TextDelta(text))
                }
                BlockDelta::ThinkingDelta { thinking } => {
                    Some(StreamUpdate::ThinkingDelta(thinking))
                }
                BlockDelta::InputJsonDelta { partial_json } => {
                    if let Some(OpenBlock::ToolUse { json, .. }) = self.current.as_mut() {
                        json.push_str(&partial_json);
                    }
                    None
                }
                BlockDelta::SignatureDelta { .. } | BlockDelta::Other => None,
            },
            StreamEvent::ContentBlockStop { .. } => {
                match self.current.take() {
                    Some(OpenBlock::Text(buffer)) => {
                        if !buffer.is_empty() {
                            self.blocks.push(ContentBlock::Text { text: buffer });
                        }
                    }
                    Some(OpenBlock::ToolUse { id, name, json }) => {
                        let input_json = if json.trim().is_empty() {
                            "{}".to_string()
                        } else {
                            json
                        };
                        let input: Value =
                            serde_json::from_str(&input_json).unwrap_or(Value::Object(
                                serde_json::Map::new(),
                            ));
                        self.blocks.push(ContentBlock::ToolUse {
                            id: id.clone(),
                            name: name.clone(),
                            input,
                        });
                        self.tool_uses.push(CompletedToolUse {
                            id,
                            name,
                            input_json,
                        });
                    }
                    Some(OpenBlock::Thinking) | Some(OpenBlock::Other) | None => {}
                }
                None
            }
            StreamEvent::MessageDelta { delta } => {
                if let Some(reason) = delta.stop_reason {
                    self.stop_reason = Some(StopReason::parse(&reason));
                }
                None
            }
            StreamEvent::MessageStart
            | StreamEvent::MessageStop
            | StreamEvent::Ping
            | StreamEvent::Error { .. } => None,
        }
    }

    pub fn finish(self) -> TurnOutcome {
        TurnOutcome {
            blocks: self.blocks,
            tool_uses: self.tool_uses,
            stop_reason: self.stop_reason,
        }
    }
}
