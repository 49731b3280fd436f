//! The session engine: one conversation loop per engine instance.
//!
//! The engine owns the transcript and the in-flight stream state. Each turn
//! it opens a model call over the full transcript, folds the streamed events
//! through the reducer while forwarding text/thinking deltas outward, then
//! resolves any tool-use calls in model order (approval gate, executor,
//! tool-result) before looping. It terminates on a terminal stop reason, a
//! transport failure, or cancellation, and emits exactly one terminal event
//! before closing the outward channel.

use anyhow::{Result, anyhow};
use serde_json::Value;
use stagehand_core::{
    AppConfig, CancelToken, ContentBlock, EngineEvent, LlmConfig, MessageEntry, SessionConfig,
    SessionError, StopReason, ToolAnswer, ToolCallRequest, ToolName,
};
use stagehand_llm::{
    CompletedToolUse, MessageRequest, ModelTransport, StreamEvent, StreamReducer, StreamUpdate,
};
use stagehand_observe::Observer;
use stagehand_tools::{LocalExecutor, prepare_metadata, tool_definitions};
use std::path::Path;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, SyncSender, sync_channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Fixed tool-result content for a call the user declined.
const REJECTED_MESSAGE: &str = "rejected by user";

/// How often the approval wait re-checks the cancellation token.
const ANSWER_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a coding assistant operating on the user's \
repository. Use the available tools to inspect and change code. Keep edits minimal and \
verify your work with the shell when it helps.";

/// Builder-side configuration of one session engine.
pub struct SessionEngine {
    transport: Box<dyn ModelTransport>,
    executor: LocalExecutor,
    observer: Observer,
    session_cfg: SessionConfig,
    llm_cfg: LlmConfig,
    system_prompt: String,
}

/// Caller's end of a running session: the ordered outward event stream, the
/// approval answer channel, and the cancellation token.
pub struct SessionHandle {
    pub events: Receiver<EngineEvent>,
    answers: Sender<ToolAnswer>,
    cancel: CancelToken,
    join: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Answer the outstanding approval request. Answers that do not match
    /// the pending call id are discarded by the engine.
    pub fn answer(&self, answer: ToolAnswer) {
        let _ = self.answers.send(answer);
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the engine thread to finish. The outward channel is closed
    /// by then; any undrained events remain readable first.
    pub fn join(mut self) {
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl SessionEngine {
    pub fn new(
        workspace: &Path,
        transport: Box<dyn ModelTransport>,
        cfg: AppConfig,
    ) -> Result<Self> {
        let executor = LocalExecutor::new(
            workspace,
            Duration::from_secs(cfg.session.shell_timeout_seconds),
        )?;
        let observer = Observer::new(workspace)?;
        Ok(Self {
            transport,
            executor,
            observer,
            session_cfg: cfg.session,
            llm_cfg: cfg.llm,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        })
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.observer.set_verbose(verbose);
    }

    /// Start the session on its own thread, seeded with the input document
    /// as the first user turn.
    pub fn spawn(self, document: impl Into<String>) -> Result<SessionHandle> {
        let (event_tx, event_rx) = sync_channel(self.session_cfg.event_buffer.max(1));
        let (answer_tx, answer_rx) = std::sync::mpsc::channel();
        let cancel = CancelToken::new();

        let worker = SessionWorker {
            transport: self.transport,
            executor: self.executor,
            observer: self.observer,
            session_cfg: self.session_cfg,
            llm_cfg: self.llm_cfg,
            system_prompt: self.system_prompt,
            transcript: vec![MessageEntry::user_text(document.into())],
            events: event_tx,
            answers: answer_rx,
            cancel: cancel.clone(),
        };

        let join = thread::Builder::new()
            .name("stagehand-session".to_string())
            .spawn(move || worker.run())
            .map_err(|err| anyhow!("failed to spawn session thread: {err}"))?;

        Ok(SessionHandle {
            events: event_rx,
            answers: answer_tx,
            cancel,
            join: Some(join),
        })
    }
}

struct SessionWorker {
    transport: Box<dyn ModelTransport>,
    executor: LocalExecutor,
    observer: Observer,
    session_cfg: SessionConfig,
    llm_cfg: LlmConfig,
    system_prompt: String,
    transcript: Vec<MessageEntry>,
    events: SyncSender<EngineEvent>,
    answers: Receiver<ToolAnswer>,
    cancel: CancelToken,
}

impl SessionWorker {
    fn run(mut self) {
        let terminal = match self.drive() {
            Ok(stop_reason) => EngineEvent::Done { stop_reason },
            Err(error) => EngineEvent::Error { error },
        };
        let _ = self.observer.record_event(&terminal);
        // Best effort: the consumer may already be gone on cancellation.
        let _ = self.events.send(terminal);
        // Dropping `events` here closes the outward stream.
    }

    fn drive(&mut self) -> std::result::Result<StopReason, SessionError> {
        for _turn in 0..self.session_cfg.max_turns.max(1) {
            self.check_canceled()?;

            let outcome = self.stream_turn()?;
            if !outcome.blocks.is_empty() {
                self.transcript.push(MessageEntry::assistant(outcome.blocks));
            }

            if outcome.tool_uses.is_empty() {
                // Terminal regardless of which reason was reported; a
                // tool_use reason with zero calls must not spin either.
                return Ok(outcome.stop_reason.unwrap_or(StopReason::EndTurn));
            }

            let results = self.process_tool_calls(outcome.tool_uses)?;
            self.transcript.push(MessageEntry::tool_results(results));
        }
        Ok(StopReason::MaxTurns)
    }

    /// One model call: open the stream, fold every event through the
    /// reducer, forward deltas outward as they arrive.
    fn stream_turn(&mut self) -> std::result::Result<stagehand_llm::TurnOutcome, SessionError> {
        let request = MessageRequest {
            model: self.llm_cfg.model.clone(),
            max_tokens: self.llm_cfg.max_tokens,
            system: self.system_prompt.clone(),
            messages: self.transcript.clone(),
            tools: tool_definitions(),
        };

        let mut handle = self
            .transport
            .open_stream(&request)
            .map_err(|err| SessionError::Transport(err.to_string()))?;

        let mut reducer = StreamReducer::new();
        loop {
            self.check_canceled()?;
            let event = handle
                .next_event()
                .map_err(|err| SessionError::Transport(err.to_string()))?;
            let Some(event) = event else { break };

            if let StreamEvent::Error { error } = event {
                return Err(SessionError::Transport(format!(
                    "stream error event: {} ({})",
                    error.message, error.error_type
                )));
            }

            match reducer.apply(event) {
                Some(StreamUpdate::TextDelta(text)) => {
                    self.emit(EngineEvent::TextDelta(text))?;
                }
                Some(StreamUpdate::ThinkingDelta(text)) => {
                    self.emit(EngineEvent::ThinkingDelta(text))?;
                }
                None => {}
            }
        }
        Ok(reducer.finish())
    }

    /// Resolve tool calls strictly in model order, one at a time. Each call
    /// fully settles (approval, execution, result event) before the next
    /// starts; cancellation aborts the remainder of the batch.
    fn process_tool_calls(
        &mut self,
        calls: Vec<CompletedToolUse>,
    ) -> std::result::Result<Vec<ContentBlock>, SessionError> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            self.check_canceled()?;

            let args: Value = match serde_json::from_str(&call.input_json) {
                Ok(value) => value,
                Err(err) => {
                    let content =
                        format!("invalid tool arguments for `{}`: {err}", call.name);
                    self.emit(EngineEvent::ToolResult {
                        id: call.id.clone(),
                        content: content.clone(),
                        is_error: true,
                    })?;
                    results.push(ContentBlock::ToolResult {
                        tool_use_id: call.id,
                        content,
                        is_error: true,
                    });
                    continue;
                }
            };

            let metadata = prepare_metadata(self.executor.workspace_root(), &call.name, &args);
            let requires_approval = ToolName::from_api_name(&call.name)
                .is_some_and(|tool| tool.requires_approval());

            let approved = if requires_approval {
                self.emit(EngineEvent::ToolRequest(ToolCallRequest {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    args: args.clone(),
                    metadata,
                }))?;
                self.await_answer(&call.id)?
            } else {
                true
            };

            let (content, is_error) = if approved {
                let outcome = self.executor.execute(&call.name, &args);
                (outcome.content, outcome.is_error)
            } else {
                (REJECTED_MESSAGE.to_string(), true)
            };

            self.emit(EngineEvent::ToolResult {
                id: call.id.clone(),
                content: content.clone(),
                is_error,
            })?;
            results.push(ContentBlock::ToolResult {
                tool_use_id: call.id,
                content,
                is_error,
            });
        }
        Ok(results)
    }

    /// Block until the answer for `id` arrives or the session is canceled.
    /// There is never more than one outstanding request; answers carrying a
    /// different id belong to an already-resolved call and are dropped.
    fn await_answer(&self, id: &str) -> std::result::Result<bool, SessionError> {
        loop {
            self.check_canceled()?;
            match self.answers.recv_timeout(ANSWER_POLL_INTERVAL) {
                Ok(answer) if answer.id == id => return Ok(answer.approved),
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    self.cancel.cancel("approval channel closed");
                    return Err(SessionError::Canceled(self.cancel.cause()));
                }
            }
        }
    }

    fn emit(&self, event: EngineEvent) -> std::result::Result<(), SessionError> {
        let _ = self.observer.record_event(&event);
        self.events.send(event).map_err(|_| {
            self.cancel.cancel("event consumer disconnected");
            SessionError::Canceled(self.cancel.cause())
        })
    }

    fn check_canceled(&self) -> std::result::Result<(), SessionError> {
        if self.cancel.is_canceled() {
            Err(SessionError::Canceled(self.cancel.cause()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_llm::{BlockDelta, BlockStart, MessageDeltaBody, StreamHandle};
    use std::collections::VecDeque;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    // ── Scripted transport ──

    struct ScriptedTransport {
        scripts: Mutex<VecDeque<Vec<StreamEvent>>>,
        requests: Arc<Mutex<Vec<MessageRequest>>>,
    }

    impl ScriptedTransport {
        fn new(scripts: Vec<Vec<StreamEvent>>) -> Self {
            Self {
                scripts: Mutex::new(VecDeque::from(scripts)),
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn requests(&self) -> Arc<Mutex<Vec<MessageRequest>>> {
            Arc::clone(&self.requests)
        }
    }

    impl ModelTransport for ScriptedTransport {
        fn open_stream(&self, req: &MessageRequest) -> Result<Box<dyn StreamHandle>> {
            self.requests.lock().expect("requests").push(req.clone());
            let events = self
                .scripts
                .lock()
                .expect("scripts")
                .pop_front()
                .ok_or_else(|| anyhow!("no more scripted model calls"))?;
            Ok(Box::new(ScriptedStream {
                events: events.into(),
            }))
        }
    }

    struct ScriptedStream {
        events: VecDeque<StreamEvent>,
    }

    impl StreamHandle for ScriptedStream {
        fn next_event(&mut self) -> Result<Option<StreamEvent>> {
            Ok(self.events.pop_front())
        }
    }

    /// A stream that blocks long enough for the test to cancel mid-call.
    struct StallingTransport;

    impl ModelTransport for StallingTransport {
        fn open_stream(&self, _req: &MessageRequest) -> Result<Box<dyn StreamHandle>> {
            Ok(Box::new(StallingStream))
        }
    }

    struct StallingStream;

    impl StreamHandle for StallingStream {
        fn next_event(&mut self) -> Result<Option<StreamEvent>> {
            thread::sleep(Duration::from_millis(20));
            Ok(Some(StreamEvent::Ping))
        }
    }

    // ── Script builders ──

    fn text_turn(text: &str, stop_reason: &str) -> Vec<StreamEvent> {
        vec![
            StreamEvent::MessageStart,
            StreamEvent::ContentBlockStart {
                index: 0,
                content_block: BlockStart::Text {
                    text: String::new(),
                },
            },
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::TextDelta {
                    text: text.to_string(),
                },
            },
            StreamEvent::ContentBlockStop { index: 0 },
            StreamEvent::MessageDelta {
                delta: MessageDeltaBody {
                    stop_reason: Some(stop_reason.to_string()),
                },
            },
            StreamEvent::MessageStop,
        ]
    }

    fn tool_turn(id: &str, name: &str, input_json: &str) -> Vec<StreamEvent> {
        vec![
            StreamEvent::MessageStart,
            StreamEvent::ContentBlockStart {
                index: 0,
                content_block: BlockStart::ToolUse {
                    id: id.to_string(),
                    name: name.to_string(),
                },
            },
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::InputJsonDelta {
                    partial_json: input_json.to_string(),
                },
            },
            StreamEvent::ContentBlockStop { index: 0 },
            StreamEvent::MessageDelta {
                delta: MessageDeltaBody {
                    stop_reason: Some("tool_use".to_string()),
                },
            },
            StreamEvent::MessageStop,
        ]
    }

    fn temp_workspace() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("stagehand-agent-test-{}", Uuid::now_v7()));
        fs::create_dir_all(&dir).expect("workspace");
        dir
    }

    fn spawn_session(
        workspace: &Path,
        transport: Box<dyn ModelTransport>,
        document: &str,
    ) -> SessionHandle {
        let engine = SessionEngine::new(workspace, transport, AppConfig::default())
            .expect("engine");
        engine.spawn(document).expect("spawn")
    }

    fn drain(handle: SessionHandle) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = handle.events.recv() {
            events.push(event);
        }
        handle.join();
        events
    }

    // ── Tests ──

    #[test]
    fn text_only_turn_streams_deltas_then_ends_with_stop_reason() {
        let workspace = temp_workspace();
        let transport = ScriptedTransport::new(vec![text_turn("Hello there.", "end_turn")]);
        let handle = spawn_session(&workspace, Box::new(transport), "doc");

        let events = drain(handle);
        assert_eq!(
            events,
            vec![
                EngineEvent::TextDelta("Hello there.".to_string()),
                EngineEvent::Done {
                    stop_reason: StopReason::EndTurn,
                },
            ]
        );
    }

    #[test]
    fn rejected_write_never_touches_disk_and_the_loop_continues() {
        let workspace = temp_workspace();
        let transport = ScriptedTransport::new(vec![
            tool_turn(
                "toolu_1",
                "write_file",
                r#"{"path":"a.txt","content":"hi"}"#,
            ),
            text_turn("Understood.", "end_turn"),
        ]);
        let handle = spawn_session(&workspace, Box::new(transport), "doc");

        let request = match handle.events.recv().expect("tool request") {
            EngineEvent::ToolRequest(request) => request,
            other => panic!("expected ToolRequest, got {other:?}"),
        };
        assert_eq!(request.id, "toolu_1");
        assert_eq!(request.name, "write_file");
        assert!(request.metadata.diff.as_deref().unwrap_or_default().contains("+hi"));

        handle.answer(ToolAnswer {
            id: "toolu_1".to_string(),
            approved: false,
        });

        let events = drain(handle);
        assert_eq!(
            events[0],
            EngineEvent::ToolResult {
                id: "toolu_1".to_string(),
                content: REJECTED_MESSAGE.to_string(),
                is_error: true,
            }
        );
        assert!(!workspace.join("a.txt").exists());
        assert_eq!(events[1], EngineEvent::TextDelta("Understood.".to_string()));
        assert_eq!(
            events[2],
            EngineEvent::Done {
                stop_reason: StopReason::EndTurn,
            }
        );
    }

    #[test]
    fn approved_write_creates_the_file_and_reports_bytes() {
        let workspace = temp_workspace();
        let transport = ScriptedTransport::new(vec![
            tool_turn(
                "toolu_1",
                "write_file",
                r#"{"path":"a.txt","content":"hi"}"#,
            ),
            text_turn("Done.", "end_turn"),
        ]);
        let handle = spawn_session(&workspace, Box::new(transport), "doc");

        match handle.events.recv().expect("tool request") {
            EngineEvent::ToolRequest(request) => {
                handle.answer(ToolAnswer {
                    id: request.id,
                    approved: true,
                });
            }
            other => panic!("expected ToolRequest, got {other:?}"),
        }

        let events = drain(handle);
        match &events[0] {
            EngineEvent::ToolResult {
                id,
                content,
                is_error,
            } => {
                assert_eq!(id, "toolu_1");
                assert!(!is_error);
                assert!(content.contains("2 bytes"), "{content}");
            }
            other => panic!("expected ToolResult, got {other:?}"),
        }
        assert_eq!(
            fs::read_to_string(workspace.join("a.txt")).expect("written file"),
            "hi"
        );
    }

    #[test]
    fn cancellation_while_awaiting_approval_emits_one_error_and_closes() {
        let workspace = temp_workspace();
        let transport = ScriptedTransport::new(vec![tool_turn(
            "toolu_1",
            "write_file",
            r#"{"path":"a.txt","content":"hi"}"#,
        )]);
        let handle = spawn_session(&workspace, Box::new(transport), "doc");

        match handle.events.recv().expect("tool request") {
            EngineEvent::ToolRequest(_) => {}
            other => panic!("expected ToolRequest, got {other:?}"),
        }
        handle.cancel_token().cancel("user interrupt");

        let events = drain(handle);
        assert_eq!(
            events,
            vec![EngineEvent::Error {
                error: SessionError::Canceled("user interrupt".to_string()),
            }]
        );
        assert!(!workspace.join("a.txt").exists());
    }

    #[test]
    fn read_tools_execute_without_an_approval_request() {
        let workspace = temp_workspace();
        fs::write(workspace.join("notes.txt"), "contents here").expect("seed");
        let transport = ScriptedTransport::new(vec![
            tool_turn("toolu_1", "read_file", r#"{"path":"notes.txt"}"#),
            text_turn("Read it.", "end_turn"),
        ]);
        let handle = spawn_session(&workspace, Box::new(transport), "doc");

        let events = drain(handle);
        assert!(
            events
                .iter()
                .all(|e| !matches!(e, EngineEvent::ToolRequest(_))),
            "read_file must not request approval: {events:?}"
        );
        assert_eq!(
            events[0],
            EngineEvent::ToolResult {
                id: "toolu_1".to_string(),
                content: "contents here".to_string(),
                is_error: false,
            }
        );
    }

    #[test]
    fn stale_answers_for_other_calls_are_discarded() {
        let workspace = temp_workspace();
        let transport = ScriptedTransport::new(vec![
            tool_turn(
                "toolu_real",
                "write_file",
                r#"{"path":"a.txt","content":"hi"}"#,
            ),
            text_turn("Ok.", "end_turn"),
        ]);
        let handle = spawn_session(&workspace, Box::new(transport), "doc");

        match handle.events.recv().expect("tool request") {
            EngineEvent::ToolRequest(_) => {}
            other => panic!("expected ToolRequest, got {other:?}"),
        }
        // An approval for some other id must not release the gate.
        handle.answer(ToolAnswer {
            id: "toolu_stale".to_string(),
            approved: true,
        });
        handle.answer(ToolAnswer {
            id: "toolu_real".to_string(),
            approved: false,
        });

        let events = drain(handle);
        assert!(matches!(
            events[0],
            EngineEvent::ToolResult { ref content, is_error: true, .. }
                if content == REJECTED_MESSAGE
        ));
        assert!(!workspace.join("a.txt").exists());
    }

    #[test]
    fn transport_failure_aborts_with_an_error_event() {
        let workspace = temp_workspace();
        let transport = ScriptedTransport::new(vec![]);
        let handle = spawn_session(&workspace, Box::new(transport), "doc");

        let events = drain(handle);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            EngineEvent::Error {
                error: SessionError::Transport(_),
            }
        ));
    }

    #[test]
    fn protocol_error_event_aborts_the_session() {
        let workspace = temp_workspace();
        let transport = ScriptedTransport::new(vec![vec![
            StreamEvent::MessageStart,
            StreamEvent::Error {
                error: stagehand_llm::ApiErrorBody {
                    error_type: "overloaded_error".to_string(),
                    message: "overloaded".to_string(),
                },
            },
        ]]);
        let handle = spawn_session(&workspace, Box::new(transport), "doc");

        let events = drain(handle);
        assert!(matches!(
            &events[0],
            EngineEvent::Error { error: SessionError::Transport(msg) }
                if msg.contains("overloaded")
        ));
    }

    #[test]
    fn malformed_tool_arguments_become_a_validation_tool_result() {
        let workspace = temp_workspace();
        let transport = ScriptedTransport::new(vec![
            tool_turn("toolu_1", "read_file", "this is not json"),
            text_turn("Sorry.", "end_turn"),
        ]);
        let handle = spawn_session(&workspace, Box::new(transport), "doc");

        let events = drain(handle);
        assert!(matches!(
            &events[0],
            EngineEvent::ToolResult { content, is_error: true, .. }
                if content.contains("invalid tool arguments")
        ));
        // The session survives and finishes the next turn.
        assert!(matches!(events.last(), Some(EngineEvent::Done { .. })));
    }

    #[test]
    fn unknown_tool_names_fail_closed_at_execution() {
        let workspace = temp_workspace();
        let transport = ScriptedTransport::new(vec![
            tool_turn("toolu_1", "launch_missiles", "{}"),
            text_turn("Fine.", "end_turn"),
        ]);
        let handle = spawn_session(&workspace, Box::new(transport), "doc");

        let events = drain(handle);
        assert!(matches!(
            &events[0],
            EngineEvent::ToolResult { content, is_error: true, .. }
                if content.contains("unknown tool")
        ));
    }

    #[test]
    fn tool_use_stop_reason_with_zero_calls_still_terminates() {
        let workspace = temp_workspace();
        let transport = ScriptedTransport::new(vec![text_turn("hmm", "tool_use")]);
        let handle = spawn_session(&workspace, Box::new(transport), "doc");

        let events = drain(handle);
        assert_eq!(
            events.last(),
            Some(&EngineEvent::Done {
                stop_reason: StopReason::ToolUse,
            })
        );
    }

    #[test]
    fn max_turns_guard_stops_a_tool_happy_model() {
        let workspace = temp_workspace();
        fs::write(workspace.join("f.txt"), "x").expect("seed");
        let transport = ScriptedTransport::new(vec![
            tool_turn("toolu_1", "read_file", r#"{"path":"f.txt"}"#),
            tool_turn("toolu_2", "read_file", r#"{"path":"f.txt"}"#),
        ]);

        let mut cfg = AppConfig::default();
        cfg.session.max_turns = 2;
        let engine =
            SessionEngine::new(&workspace, Box::new(transport), cfg).expect("engine");
        let handle = engine.spawn("doc").expect("spawn");

        let events = drain(handle);
        assert_eq!(
            events.last(),
            Some(&EngineEvent::Done {
                stop_reason: StopReason::MaxTurns,
            })
        );
    }

    #[test]
    fn cancellation_interrupts_the_network_wait() {
        let workspace = temp_workspace();
        let handle = spawn_session(&workspace, Box::new(StallingTransport), "doc");

        let cancel = handle.cancel_token();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(40));
            cancel.cancel("user interrupt");
        });

        let events = drain(handle);
        assert_eq!(
            events,
            vec![EngineEvent::Error {
                error: SessionError::Canceled("user interrupt".to_string()),
            }]
        );
    }

    #[test]
    fn transcript_sent_to_the_model_accumulates_turn_by_turn() {
        let workspace = temp_workspace();
        fs::write(workspace.join("f.txt"), "data").expect("seed");
        let transport = ScriptedTransport::new(vec![
            tool_turn("toolu_1", "read_file", r#"{"path":"f.txt"}"#),
            text_turn("All done.", "end_turn"),
        ]);
        let requests = transport.requests();
        let handle = spawn_session(&workspace, Box::new(transport), "the document");

        drain(handle);

        let requests = requests.lock().expect("requests");
        assert_eq!(requests.len(), 2);

        // First call: just the seeded user document.
        assert_eq!(
            requests[0].messages,
            vec![MessageEntry::user_text("the document")]
        );
        assert_eq!(requests[0].tools.len(), 6);

        // Second call: document, assistant tool-use turn, tool results.
        let second = &requests[1].messages;
        assert_eq!(second.len(), 3);
        assert_eq!(second[0], MessageEntry::user_text("the document"));
        match &second[1].content[0] {
            ContentBlock::ToolUse { id, name, input } => {
                assert_eq!(id, "toolu_1");
                assert_eq!(name, "read_file");
                assert_eq!(input["path"], "f.txt");
            }
            other => panic!("expected tool_use block, got {other:?}"),
        }
        match &second[2].content[0] {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                assert_eq!(tool_use_id, "toolu_1");
                assert_eq!(content, "data");
                assert!(!is_error);
            }
            other => panic!("expected tool_result block, got {other:?}"),
        }
    }

    #[test]
    fn multiple_tool_calls_resolve_in_model_order() {
        let workspace = temp_workspace();
        fs::write(workspace.join("one.txt"), "1").expect("seed");
        fs::write(workspace.join("two.txt"), "2").expect("seed");

        let two_calls = vec![
            StreamEvent::MessageStart,
            StreamEvent::ContentBlockStart {
                index: 0,
                content_block: BlockStart::ToolUse {
                    id: "toolu_a".to_string(),
                    name: "read_file".to_string(),
                },
            },
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::InputJsonDelta {
                    partial_json: r#"{"path":"one.txt"}"#.to_string(),
                },
            },
            StreamEvent::ContentBlockStop { index: 0 },
            StreamEvent::ContentBlockStart {
                index: 1,
                content_block: BlockStart::ToolUse {
                    id: "toolu_b".to_string(),
                    name: "read_file".to_string(),
                },
            },
            StreamEvent::ContentBlockDelta {
                index: 1,
                delta: BlockDelta::InputJsonDelta {
                    partial_json: r#"{"path":"two.txt"}"#.to_string(),
                },
            },
            StreamEvent::ContentBlockStop { index: 1 },
            StreamEvent::MessageDelta {
                delta: MessageDeltaBody {
                    stop_reason: Some("tool_use".to_string()),
                },
            },
            StreamEvent::MessageStop,
        ];
        let transport = ScriptedTransport::new(vec![two_calls, text_turn("done", "end_turn")]);
        let handle = spawn_session(&workspace, Box::new(transport), "doc");

        let events = drain(handle);
        let result_ids: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::ToolResult { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(result_ids, vec!["toolu_a", "toolu_b"]);
    }
}
