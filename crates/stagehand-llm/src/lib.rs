mod events;
mod reducer;

use anyhow::{Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, RETRY_AFTER};
use serde_json::{Value, json};
use stagehand_core::{LlmConfig, MessageEntry, ToolDefinition};
use std::io::{BufRead, BufReader};
use std::thread;
use std::time::Duration;

pub use events::{ApiErrorBody, BlockDelta, BlockStart, MessageDeltaBody, StreamEvent};
pub use reducer::{CompletedToolUse, StreamReducer, StreamUpdate, TurnOutcome};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// One model call: the full transcript, the static tool catalog, and the
/// fixed system prompt. Serialized verbatim, with no truncation or reordering.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub messages: Vec<MessageEntry>,
    pub tools: Vec<ToolDefinition>,
}

/// Opens one streamed model call. Implemented by the HTTP client in
/// production and by scripted doubles in engine tests.
pub trait ModelTransport: Send + Sync {
    fn open_stream(&self, req: &MessageRequest) -> Result<Box<dyn StreamHandle>>;
}

/// A live stream of protocol events. `Ok(None)` is a clean end of stream;
/// `Err` is a transport failure and aborts the session.
pub trait StreamHandle: Send {
    fn next_event(&mut self) -> Result<Option<StreamEvent>>;
}

/// Blocking HTTP transport for the messages endpoint. Credentials and
/// endpoint are constructor inputs; nothing is read from the environment.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    cfg: LlmConfig,
    api_key: String,
    client: Client,
}

impl AnthropicClient {
    pub fn new(cfg: LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()?;
        Ok(Self {
            cfg,
            api_key: api_key.into(),
            client,
        })
    }
}

impl ModelTransport for AnthropicClient {
    /// Open the stream, retrying retryable statuses with exponential backoff
    /// before the first event only. Once events flow, failures are fatal to
    /// the session; retry policy above the engine belongs to the caller.
    fn open_stream(&self, req: &MessageRequest) -> Result<Box<dyn StreamHandle>> {
        let payload = build_payload(req);

        let mut last_err: Option<anyhow::Error> = None;
        let mut attempt: u8 = 0;
        while attempt <= self.cfg.max_retries {
            let response = self
                .client
                .post(&self.cfg.endpoint)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&payload)
                .send();

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(Box::new(SseStream {
                            reader: BufReader::new(resp),
                        }));
                    }
                    let retry_after = parse_retry_after_seconds(resp.headers().get(RETRY_AFTER));
                    let body = resp.text().unwrap_or_default();
                    last_err = Some(format_api_error(status, &body));
                    if should_retry_status(status) && attempt < self.cfg.max_retries {
                        thread::sleep(retry_delay(self.cfg.retry_base_ms, attempt, retry_after));
                        attempt = attempt.saturating_add(1);
                        continue;
                    }
                    break;
                }
                Err(err) => {
                    last_err = Some(anyhow!(
                        "failed to reach model endpoint {}: {err}",
                        self.cfg.endpoint
                    ));
                    if (err.is_timeout() || err.is_connect()) && attempt < self.cfg.max_retries {
                        thread::sleep(retry_delay(self.cfg.retry_base_ms, attempt, None));
                        attempt = attempt.saturating_add(1);
                        continue;
                    }
                    break;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("model request failed without detailed error")))
    }
}

struct SseStream<R> {
    reader: R,
}

impl<R: BufRead + Send> StreamHandle for SseStream<R> {
    fn next_event(&mut self) -> Result<Option<StreamEvent>> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self
                .reader
                .read_line(&mut line)
                .map_err(|err| anyhow!("stream read error: {err}"))?;
            if n == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            let Some(data) = trimmed.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() {
                continue;
            }
            // Unknown event types are skipped, not fatal.
            match serde_json::from_str::<StreamEvent>(data) {
                Ok(event) => return Ok(Some(event)),
                Err(_) => continue,
            }
        }
    }
}

fn build_payload(req: &MessageRequest) -> Value {
    let mut payload = json!({
        "model": req.model,
        "max_tokens": req.max_tokens,
        "stream": true,
        "messages": req.messages,
    });
    if !req.system.is_empty() {
        payload["system"] = json!(req.system);
    }
    if !req.tools.is_empty() {
        payload["tools"] = json!(req.tools);
    }
    payload
}

fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn parse_retry_after_seconds(header: Option<&HeaderValue>) -> Option<u64> {
    header?.to_str().ok()?.trim().parse().ok()
}

fn retry_delay(base_ms: u64, attempt: u8, retry_after: Option<u64>) -> Duration {
    if let Some(seconds) = retry_after {
        return Duration::from_secs(seconds);
    }
    Duration::from_millis(base_ms.saturating_mul(1 << attempt.min(8)))
}

fn format_api_error(status: StatusCode, body: &str) -> anyhow::Error {
    let detail: String = body.chars().take(400).collect();
    anyhow!("model request failed with status {status}: {detail}")
}
