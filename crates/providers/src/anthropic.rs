//! Anthropic-compatible Messages API provider.
//!
//! Talks to any endpoint speaking Anthropic's streaming Messages API; the
//! default base URL is z.ai's compatibility endpoint.
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - Streaming via SSE, normalized into `StreamEvent`s
//! - The reader task stops as soon as the receiver is dropped

use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use zaibridge_config::{AppConfig, MODELS};
use zaibridge_core::error::ProviderError;
use zaibridge_core::provider::{BlockKind, EventStream, StreamEvent};
use zaibridge_core::wire::{ContentPart, SamplingParams, WireMessage, WireRequest, WireRole};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const STREAM_BUFFER: usize = 64;
const CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const CHECK_MAX_TOKENS: u32 = 10;

/// Streaming Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a provider for the default z.ai endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_timeout(api_key, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a provider whose requests time out after `timeout`.
    pub fn with_timeout(
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: "zai".into(),
            base_url: zaibridge_config::DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Build from application config. Fails without an API key.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ProviderError::NotConfigured("no API key configured".into()))?;

        Ok(Self::with_timeout(api_key, Duration::from_secs(config.timeout_secs))?
            .with_base_url(&config.base_url))
    }

    /// Override the base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    /// Send a tiny request and read the whole answer.
    ///
    /// Succeeds only if the key is accepted and the endpoint streams a
    /// complete response within ten seconds.
    pub async fn check_connection(&self, model: &str) -> Result<(), ProviderError> {
        use zaibridge_core::Provider;

        let request = WireRequest::new(
            vec![WireMessage {
                role: WireRole::User,
                content: vec![ContentPart::Text {
                    text: "test".into(),
                }],
            }],
            Vec::new(),
        )
        .with_sampling(&SamplingParams {
            model: model.into(),
            max_tokens: CHECK_MAX_TOKENS,
            temperature: 1.0,
        });

        let drain = async {
            let mut rx = self.stream(request).await?;
            while let Some(item) = rx.recv().await {
                item?;
            }
            Ok::<(), ProviderError>(())
        };

        match tokio::time::timeout(CHECK_TIMEOUT, drain).await {
            Ok(result) => {
                debug!(provider = %self.name, model, ok = result.is_ok(), "Connection check");
                result
            }
            Err(_) => Err(ProviderError::Timeout(format!(
                "no complete answer within {}s",
                CHECK_TIMEOUT.as_secs()
            ))),
        }
    }
}

/// Map a non-success HTTP status to a provider error.
fn status_error(status: u16, body: String) -> ProviderError {
    match status {
        401 | 403 => ProviderError::AuthenticationFailed("Invalid API key".into()),
        429 => ProviderError::RateLimited {
            retry_after_secs: 5,
        },
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// What one SSE payload means for the event stream.
#[derive(Debug, PartialEq)]
pub(crate) enum SseOutcome {
    Event(StreamEvent),
    Error(ProviderError),
    Stop,
    Ignore,
}

/// Translate one SSE `data` payload into a stream event.
pub(crate) fn parse_sse_data(data: &str) -> SseOutcome {
    let event: ApiStreamEvent = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            trace!(error = %e, data = %data, "Ignoring unparseable SSE payload");
            return SseOutcome::Ignore;
        }
    };

    match event {
        ApiStreamEvent::MessageStart { message } => SseOutcome::Event(StreamEvent::MessageStart {
            input_tokens: message.usage.map(|u| u.input_tokens).unwrap_or(0),
        }),
        ApiStreamEvent::ContentBlockStart { content_block } => match content_block {
            ApiBlock::Text => SseOutcome::Event(StreamEvent::BlockStart {
                kind: BlockKind::Text,
                tool_id: None,
                tool_name: None,
            }),
            ApiBlock::ToolUse { id, name } => SseOutcome::Event(StreamEvent::BlockStart {
                kind: BlockKind::ToolUse,
                tool_id: Some(id),
                tool_name: Some(name),
            }),
            ApiBlock::Other => SseOutcome::Ignore,
        },
        ApiStreamEvent::ContentBlockDelta { delta } => match delta {
            ApiDelta::TextDelta { text } => SseOutcome::Event(StreamEvent::text(text)),
            ApiDelta::InputJsonDelta { partial_json } => {
                SseOutcome::Event(StreamEvent::json(partial_json))
            }
            ApiDelta::Other => SseOutcome::Ignore,
        },
        ApiStreamEvent::MessageDelta { usage } => SseOutcome::Event(StreamEvent::MessageDelta {
            output_tokens: usage.map(|u| u.output_tokens).unwrap_or(0),
        }),
        ApiStreamEvent::MessageStop => SseOutcome::Stop,
        ApiStreamEvent::Error { error } => SseOutcome::Error(ProviderError::StreamError {
            kind: error.kind,
            message: error.message,
        }),
        ApiStreamEvent::ContentBlockStop | ApiStreamEvent::Ping | ApiStreamEvent::Other => {
            SseOutcome::Ignore
        }
    }
}

/// Forward SSE payloads to `tx` until the stream stops or the receiver goes away.
async fn pump_events(
    response: reqwest::Response,
    tx: mpsc::Sender<Result<StreamEvent, ProviderError>>,
) {
    let mut events = response.bytes_stream().eventsource();

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                debug!("Stream receiver dropped, closing connection");
                return;
            }
            next = events.next() => next,
        };

        let sse = match next {
            Some(Ok(sse)) => sse,
            Some(Err(e)) => {
                let err = match e {
                    EventStreamError::Transport(e) if e.is_timeout() => {
                        ProviderError::Timeout(e.to_string())
                    }
                    other => ProviderError::StreamInterrupted(other.to_string()),
                };
                let _ = tx.send(Err(err)).await;
                return;
            }
            None => return,
        };

        trace!(event = %sse.event, "SSE event");
        match parse_sse_data(&sse.data) {
            SseOutcome::Event(event) => {
                if tx.send(Ok(event)).await.is_err() {
                    return;
                }
            }
            SseOutcome::Error(err) => {
                warn!(error = %err, "Provider sent an error event");
                let _ = tx.send(Err(err)).await;
                return;
            }
            SseOutcome::Stop => return,
            SseOutcome::Ignore => {}
        }
    }
}

#[async_trait]
impl zaibridge_core::Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: WireRequest) -> Result<EventStream, ProviderError> {
        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending streaming request"
        );

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            warn!(status, body = %body, "Provider API error");
            return Err(status_error(status, body));
        }

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(pump_events(response, tx));
        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        // No listing endpoint on the compatibility API; return the known set
        Ok(MODELS.iter().map(|m| m.to_string()).collect())
    }
}

// --- Messages API stream payloads ---

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiStreamEvent {
    MessageStart {
        message: ApiMessageStart,
    },
    ContentBlockStart {
        content_block: ApiBlock,
    },
    ContentBlockDelta {
        delta: ApiDelta,
    },
    ContentBlockStop,
    MessageDelta {
        #[serde(default)]
        usage: Option<ApiOutputUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: ApiErrorBody,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiMessageStart {
    #[serde(default)]
    usage: Option<ApiInputUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiInputUsage {
    #[serde(default)]
    input_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiOutputUsage {
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiBlock {
    Text,
    ToolUse { id: String, name: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: String,
}
