//! The bounded tool loop.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zaibridge_config::AppConfig;
use zaibridge_core::dialogue::{Dialogue, Turn};
use zaibridge_core::event::{DomainEvent, EventBus};
use zaibridge_core::provider::{Provider, TokenUsage};
use zaibridge_core::tool::{ToolDefinition, ToolResolver};
use zaibridge_core::wire::{SamplingParams, WireRequest};
use zaibridge_core::{Error, Result};

use crate::decoder::{DecodedTurn, StreamDecoder};
use crate::encoder;
use crate::stream_event::ContentIncrement;

/// Iterations allowed per run unless configured otherwise.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The model answered without tool calls, or no results were supplied.
    Completed,
    /// Every allowed iteration ended in tool calls.
    IterationCapReached,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::IterationCapReached => "iteration_cap_reached",
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Provider round-trips made
    pub iterations: u32,
    /// Token counts summed over every iteration
    pub usage: TokenUsage,
    /// Tool calls dropped because their arguments were unusable
    pub discarded_tool_calls: usize,
}

/// Per-run inputs that are not part of the dialogue.
pub struct RunInput<'a> {
    pub preamble: &'a [String],
    pub tools: &'a [ToolDefinition],
    pub resolver: &'a dyn ToolResolver,
    pub cancel: CancellationToken,
}

impl<'a> RunInput<'a> {
    pub fn new(
        preamble: &'a [String],
        tools: &'a [ToolDefinition],
        resolver: &'a dyn ToolResolver,
    ) -> Self {
        Self {
            preamble,
            tools,
            resolver,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Drives encode → stream → decode → resolve until the model stops asking
/// for tools or the iteration cap is reached.
pub struct ToolLoopController {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// Model and sampling parameters for every request
    sampling: SamplingParams,

    /// Maximum provider round-trips per run
    max_iterations: u32,

    /// Event bus for domain events
    event_bus: Option<Arc<EventBus>>,
}

impl ToolLoopController {
    pub fn new(provider: Arc<dyn Provider>, sampling: SamplingParams) -> Self {
        Self {
            provider,
            sampling,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            event_bus: None,
        }
    }

    /// Sampling parameters and iteration cap taken from configuration.
    pub fn from_config(provider: Arc<dyn Provider>, config: &AppConfig) -> Self {
        Self::new(provider, config.sampling_params()).with_max_iterations(config.max_iterations)
    }

    /// Set the maximum number of provider round-trips. Zero is treated as one.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn sampling(&self) -> &SamplingParams {
        &self.sampling
    }

    /// Run the loop against `dialogue`, appending each finalized assistant
    /// turn and each complete set of tool results.
    ///
    /// Increments are handed to `on_increment` as they are decoded. On error
    /// or cancellation the dialogue keeps every turn appended so far but
    /// never a partially streamed one.
    pub async fn run<F>(
        &self,
        dialogue: &mut Dialogue,
        input: RunInput<'_>,
        mut on_increment: F,
    ) -> Result<RunOutcome>
    where
        F: FnMut(ContentIncrement) + Send,
    {
        info!(
            dialogue_id = %dialogue.id,
            turns = dialogue.len(),
            model = %self.sampling.model,
            "Starting tool loop"
        );

        let mut usage = TokenUsage::default();
        let mut discarded = 0;

        for iteration in 1..=self.max_iterations {
            if input.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            debug!(dialogue_id = %dialogue.id, iteration, "Tool loop iteration");

            let request = self.build_request(dialogue, &input);
            let decoded = match self
                .stream_once(request, &input.cancel, &mut on_increment)
                .await
            {
                Ok(decoded) => decoded,
                Err(e) => {
                    self.report_error(dialogue, &e);
                    return Err(e);
                }
            };

            usage.add(decoded.usage);
            discarded += decoded.errors.len();
            self.report_response(dialogue, iteration, &decoded);

            let calls = decoded.turn.tool_calls.clone();
            dialogue.push(Turn::Assistant(decoded.turn));

            if calls.is_empty() {
                return Ok(self.finish(dialogue, RunStatus::Completed, iteration, usage, discarded));
            }

            debug!(tool_count = calls.len(), "Resolving tool calls");
            let Some(results) = input.resolver.resolve(&calls).await else {
                debug!("No tool results supplied, ending run");
                return Ok(self.finish(dialogue, RunStatus::Completed, iteration, usage, discarded));
            };

            if !results.covers(&calls) {
                warn!(
                    calls = calls.len(),
                    results = results.results.len(),
                    "Tool results do not answer every call, ending run"
                );
                return Ok(self.finish(dialogue, RunStatus::Completed, iteration, usage, discarded));
            }

            if input.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            dialogue.push(Turn::ToolResults(results));
        }

        warn!(
            dialogue_id = %dialogue.id,
            iterations = self.max_iterations,
            "Max tool iterations reached"
        );
        Ok(self.finish(
            dialogue,
            RunStatus::IterationCapReached,
            self.max_iterations,
            usage,
            discarded,
        ))
    }

    fn build_request(&self, dialogue: &Dialogue, input: &RunInput<'_>) -> WireRequest {
        let request =
            encoder::encode(dialogue.turns(), input.preamble).with_sampling(&self.sampling);
        if input.tools.is_empty() {
            request
        } else {
            request.with_tools(input.tools)
        }
    }

    /// One provider round-trip. Returns only once the stream is exhausted,
    /// so a failure never leaves a half-decoded turn behind.
    async fn stream_once<F>(
        &self,
        request: WireRequest,
        cancel: &CancellationToken,
        on_increment: &mut F,
    ) -> Result<DecodedTurn>
    where
        F: FnMut(ContentIncrement) + Send,
    {
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            opened = self.provider.stream(request) => opened?,
        };

        let mut decoder = StreamDecoder::new();
        loop {
            // Returning drops `stream`, which tells the provider to stop reading
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                item = stream.recv() => item,
            };

            match item {
                Some(Ok(event)) => {
                    if let Some(increment) = decoder.apply(event) {
                        on_increment(increment);
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }

        if !decoder.is_done() {
            debug!("Stream ended before the message delta");
        }
        if let Some(increment) = decoder.close() {
            on_increment(increment);
        }
        Ok(decoder.into_turn())
    }

    fn finish(
        &self,
        dialogue: &Dialogue,
        status: RunStatus,
        iterations: u32,
        usage: TokenUsage,
        discarded_tool_calls: usize,
    ) -> RunOutcome {
        info!(
            dialogue_id = %dialogue.id,
            status = status.as_str(),
            iterations,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Tool loop finished"
        );
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ToolLoopFinished {
                dialogue_id: dialogue.id.to_string(),
                status: status.as_str().into(),
                iterations,
                timestamp: Utc::now(),
            });
        }
        RunOutcome {
            status,
            iterations,
            usage,
            discarded_tool_calls,
        }
    }

    fn report_response(&self, dialogue: &Dialogue, iteration: u32, decoded: &DecodedTurn) {
        let Some(bus) = &self.event_bus else {
            return;
        };
        bus.publish(DomainEvent::ResponseGenerated {
            dialogue_id: dialogue.id.to_string(),
            model: self.sampling.model.clone(),
            iteration,
            input_tokens: decoded.usage.input_tokens,
            output_tokens: decoded.usage.output_tokens,
            tool_calls: decoded.turn.tool_calls.len(),
            timestamp: Utc::now(),
        });
        for err in &decoded.errors {
            bus.publish(DomainEvent::ToolCallDiscarded {
                dialogue_id: dialogue.id.to_string(),
                tool_id: err.tool_id.clone(),
                tool_name: err.tool_name.clone(),
                reason: err.reason.clone(),
                timestamp: Utc::now(),
            });
        }
    }

    fn report_error(&self, dialogue: &Dialogue, error: &Error) {
        if matches!(error, Error::Cancelled) {
            debug!(dialogue_id = %dialogue.id, "Run cancelled");
            return;
        }
        warn!(dialogue_id = %dialogue.id, error = %error, "Tool loop aborted");
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ErrorOccurred {
                context: format!("tool loop for dialogue {}", dialogue.id),
                error_message: error.to_string(),
                timestamp: Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;
    use zaibridge_core::dialogue::{ToolCallRequest, ToolResult, ToolResultTurn};
    use zaibridge_core::error::{FailureKind, ProviderError};
    use zaibridge_core::provider::{EventStream, StreamEvent};
    use zaibridge_core::tool::NoTools;
    use zaibridge_core::wire::ContentPart;

    type Script = Vec<std::result::Result<StreamEvent, ProviderError>>;

    /// Replays one script per call and records every request.
    struct ScriptedProvider {
        scripts: Mutex<VecDeque<std::result::Result<Script, ProviderError>>>,
        requests: Mutex<Vec<WireRequest>>,
    }

    impl ScriptedProvider {
        fn new(scripts: Vec<Script>) -> Self {
            Self::with_results(scripts.into_iter().map(Ok).collect())
        }

        fn with_results(scripts: Vec<std::result::Result<Script, ProviderError>>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request(&self, index: usize) -> WireRequest {
            self.requests.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn stream(
            &self,
            request: WireRequest,
        ) -> std::result::Result<EventStream, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .expect("provider called more times than scripted")?;
            let (tx, rx) = mpsc::channel(script.len() + 1);
            for item in script {
                tx.try_send(item).unwrap();
            }
            Ok(rx)
        }
    }

    /// Always answers with one tool call, numbered per request.
    struct LoopingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Provider for LoopingProvider {
        fn name(&self) -> &str {
            "looping"
        }

        async fn stream(
            &self,
            _request: WireRequest,
        ) -> std::result::Result<EventStream, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let script = tool_call_script(&format!("t{n}"), "get_time", "{}");
            let (tx, rx) = mpsc::channel(script.len());
            for item in script {
                tx.try_send(item).unwrap();
            }
            Ok(rx)
        }
    }

    /// Sends what it is given and then holds the stream open.
    struct HangingProvider {
        senders: Mutex<Vec<mpsc::Sender<std::result::Result<StreamEvent, ProviderError>>>>,
    }

    #[async_trait]
    impl Provider for HangingProvider {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn stream(
            &self,
            _request: WireRequest,
        ) -> std::result::Result<EventStream, ProviderError> {
            let (tx, rx) = mpsc::channel(8);
            tx.try_send(Ok(StreamEvent::text_block())).unwrap();
            tx.try_send(Ok(StreamEvent::text("partial"))).unwrap();
            self.senders.lock().unwrap().push(tx);
            Ok(rx)
        }
    }

    /// Answers every call successfully and counts invocations.
    #[derive(Default)]
    struct EchoResolver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ToolResolver for EchoResolver {
        async fn resolve(&self, calls: &[ToolCallRequest]) -> Option<ToolResultTurn> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(ToolResultTurn::new(
                calls
                    .iter()
                    .map(|c| ToolResult::success(&c.id, format!("ran {}", c.name)))
                    .collect(),
            ))
        }
    }

    /// Answers nothing useful: results for unknown ids.
    struct WrongIdsResolver;

    #[async_trait]
    impl ToolResolver for WrongIdsResolver {
        async fn resolve(&self, _calls: &[ToolCallRequest]) -> Option<ToolResultTurn> {
            Some(ToolResultTurn::new(vec![ToolResult::success("other", "?")]))
        }
    }

    fn text_script(text: &str) -> Script {
        vec![
            Ok(StreamEvent::MessageStart { input_tokens: 10 }),
            Ok(StreamEvent::text_block()),
            Ok(StreamEvent::text(text)),
            Ok(StreamEvent::MessageDelta { output_tokens: 5 }),
        ]
    }

    fn tool_call_script(id: &str, name: &str, args: &str) -> Script {
        vec![
            Ok(StreamEvent::MessageStart { input_tokens: 20 }),
            Ok(StreamEvent::tool_block(id, name)),
            Ok(StreamEvent::json(args)),
            Ok(StreamEvent::MessageDelta { output_tokens: 7 }),
        ]
    }

    fn sampling() -> SamplingParams {
        SamplingParams {
            model: "glm-4-flash".into(),
            max_tokens: 3000,
            temperature: 1.0,
        }
    }

    fn dialogue(text: &str) -> Dialogue {
        Dialogue::from_turns(vec![Turn::user(text)])
    }

    #[tokio::test]
    async fn text_answer_completes_in_one_iteration() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_script("Hello!")]));
        let controller = ToolLoopController::new(provider.clone(), sampling());
        let mut d = dialogue("hi");
        let mut seen = Vec::new();

        let outcome = controller
            .run(&mut d, RunInput::new(&[], &[], &NoTools), |inc| seen.push(inc))
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.usage.total(), 15);
        assert_eq!(d.len(), 2);
        assert_eq!(d.last_assistant().unwrap().text, "Hello!");
        assert_eq!(
            seen,
            vec![ContentIncrement::Text {
                text: "Hello!".into()
            }]
        );
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn tool_round_trip_then_answer() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_script("t1", "get_time", r#"{"utc":true}"#),
            text_script("It is noon."),
        ]));
        let resolver = EchoResolver::default();
        let tools = vec![ToolDefinition {
            name: "get_time".into(),
            description: "Current time".into(),
            parameters: json!({"type": "object"}),
        }];
        let controller = ToolLoopController::new(provider.clone(), sampling());
        let mut d = dialogue("what time is it?");

        let outcome = controller
            .run(&mut d, RunInput::new(&[], &tools, &resolver), |_| {})
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.usage.input_tokens, 30);
        assert_eq!(d.len(), 4);
        assert!(matches!(&d.turns()[2], Turn::ToolResults(r) if r.results[0].call_id == "t1"));

        let second = provider.request(1);
        assert_eq!(second.messages.len(), 3);
        assert_eq!(second.tools.len(), 1);
        assert!(matches!(
            &second.messages[2].content[0],
            ContentPart::ToolResult { tool_use_id, .. } if tool_use_id == "t1"
        ));
    }

    #[tokio::test]
    async fn iteration_cap_is_enforced() {
        let provider = Arc::new(LoopingProvider {
            calls: AtomicUsize::new(0),
        });
        let resolver = EchoResolver::default();
        let controller =
            ToolLoopController::new(provider.clone(), sampling()).with_max_iterations(3);
        let mut d = dialogue("loop forever");

        let outcome = controller
            .run(&mut d, RunInput::new(&[], &[], &resolver), |_| {})
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::IterationCapReached);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 3);
        // user + 3 × (assistant + results)
        assert_eq!(d.len(), 7);
    }

    #[tokio::test]
    async fn default_cap_is_ten() {
        let provider = Arc::new(LoopingProvider {
            calls: AtomicUsize::new(0),
        });
        let controller = ToolLoopController::new(provider.clone(), sampling());
        assert_eq!(controller.max_iterations(), DEFAULT_MAX_ITERATIONS);

        let mut d = dialogue("loop");
        let outcome = controller
            .run(&mut d, RunInput::new(&[], &[], &EchoResolver::default()), |_| {})
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::IterationCapReached);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn from_config_uses_configured_cap() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let config = AppConfig {
            max_iterations: 4,
            ..AppConfig::default()
        };
        let controller = ToolLoopController::from_config(provider, &config);
        assert_eq!(controller.max_iterations(), 4);
        assert_eq!(controller.sampling(), &config.sampling_params());
    }

    #[tokio::test]
    async fn no_results_completes_without_appending() {
        let provider = Arc::new(ScriptedProvider::new(vec![tool_call_script(
            "t1", "get_time", "{}",
        )]));
        let controller = ToolLoopController::new(provider.clone(), sampling());
        let mut d = dialogue("time?");

        let outcome = controller
            .run(&mut d, RunInput::new(&[], &[], &NoTools), |_| {})
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(d.len(), 2);
        assert_eq!(d.last_assistant().unwrap().tool_calls.len(), 1);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn incomplete_results_are_not_appended() {
        let provider = Arc::new(ScriptedProvider::new(vec![tool_call_script(
            "t1", "get_time", "{}",
        )]));
        let controller = ToolLoopController::new(provider.clone(), sampling());
        let mut d = dialogue("time?");

        let outcome = controller
            .run(&mut d, RunInput::new(&[], &[], &WrongIdsResolver), |_| {})
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(d.len(), 2);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn malformed_tool_call_is_counted_and_not_resolved() {
        let provider = Arc::new(ScriptedProvider::new(vec![tool_call_script(
            "t1",
            "get_time",
            "{\"utc\":",
        )]));
        let resolver = EchoResolver::default();
        let controller = ToolLoopController::new(provider, sampling());
        let mut d = dialogue("time?");

        let outcome = controller
            .run(&mut d, RunInput::new(&[], &[], &resolver), |_| {})
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.discarded_tool_calls, 1);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
        assert!(d.last_assistant().unwrap().tool_calls.is_empty());
    }

    #[tokio::test]
    async fn stream_error_aborts_without_partial_turn() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![
            Ok(StreamEvent::text_block()),
            Ok(StreamEvent::text("half an ans")),
            Err(ProviderError::StreamInterrupted("connection reset".into())),
        ]]));
        let controller = ToolLoopController::new(provider, sampling());
        let mut d = dialogue("hi");
        let mut seen = 0;

        let err = controller
            .run(&mut d, RunInput::new(&[], &[], &NoTools), |_| seen += 1)
            .await
            .unwrap_err();

        match err {
            Error::Provider(e) => assert_eq!(e.failure_kind(), FailureKind::Connection),
            other => panic!("expected provider error, got {other:?}"),
        }
        assert_eq!(seen, 1);
        assert_eq!(d.len(), 1);
    }

    #[tokio::test]
    async fn open_failure_keeps_earlier_turns() {
        let provider = Arc::new(ScriptedProvider::with_results(vec![
            Ok(tool_call_script("t1", "get_time", "{}")),
            Err(ProviderError::AuthenticationFailed("invalid x-api-key".into())),
        ]));
        let controller = ToolLoopController::new(provider, sampling());
        let mut d = dialogue("time?");

        let err = controller
            .run(&mut d, RunInput::new(&[], &[], &EchoResolver::default()), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Provider(ProviderError::AuthenticationFailed(_))
        ));
        // user, assistant(tool call), results
        assert_eq!(d.len(), 3);
    }

    #[tokio::test]
    async fn cancelled_before_start_never_calls_provider() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_script("unused")]));
        let controller = ToolLoopController::new(provider.clone(), sampling());
        let token = CancellationToken::new();
        token.cancel();
        let mut d = dialogue("hi");

        let err = controller
            .run(
                &mut d,
                RunInput::new(&[], &[], &NoTools).with_cancel(token),
                |_| {},
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(provider.calls(), 0);
        assert_eq!(d.len(), 1);
    }

    #[tokio::test]
    async fn cancel_mid_stream_releases_the_stream() {
        let provider = Arc::new(HangingProvider {
            senders: Mutex::new(Vec::new()),
        });
        let controller = ToolLoopController::new(provider.clone(), sampling());
        let token = CancellationToken::new();
        let trigger = token.clone();
        let mut d = dialogue("hi");

        let err = controller
            .run(
                &mut d,
                RunInput::new(&[], &[], &NoTools).with_cancel(token),
                move |_| trigger.cancel(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(d.len(), 1);
        let senders = provider.senders.lock().unwrap();
        assert_eq!(senders.len(), 1);
        assert!(senders[0].is_closed());
    }

    #[tokio::test]
    async fn request_carries_preamble_sampling_and_no_empty_tools() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_script("ok")]));
        let controller = ToolLoopController::new(provider.clone(), sampling());
        let preamble = vec!["You are helpful.".to_string()];
        let mut d = dialogue("hi");

        controller
            .run(&mut d, RunInput::new(&preamble, &[], &NoTools), |_| {})
            .await
            .unwrap();

        let req = provider.request(0);
        assert_eq!(req.model, "glm-4-flash");
        assert_eq!(req.max_tokens, 3000);
        assert!(req.stream);
        assert_eq!(req.system.len(), 1);
        assert!(req.tools.is_empty());
        let body = serde_json::to_value(&req).unwrap();
        assert!(body.get("tools").is_none());
    }

    #[tokio::test]
    async fn events_are_published() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_script("t1", "get_time", "{}"),
            text_script("done"),
        ]));
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let controller = ToolLoopController::new(provider, sampling()).with_event_bus(bus);
        let mut d = dialogue("hi");

        controller
            .run(&mut d, RunInput::new(&[], &[], &EchoResolver::default()), |_| {})
            .await
            .unwrap();

        let mut responses = 0;
        let mut finished = None;
        while let Ok(event) = rx.try_recv() {
            match event.as_ref() {
                DomainEvent::ResponseGenerated { .. } => responses += 1,
                DomainEvent::ToolLoopFinished {
                    status, iterations, ..
                } => finished = Some((status.clone(), *iterations)),
                _ => {}
            }
        }
        assert_eq!(responses, 2);
        assert_eq!(finished, Some(("completed".to_string(), 2)));
    }
}
