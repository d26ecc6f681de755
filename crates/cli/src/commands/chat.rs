//! `zaibridge chat`: Interactive or single-message chat mode.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zaibridge_agent::{ContentIncrement, RunInput, RunOutcome, RunStatus, ToolLoopController};
use zaibridge_config::AppConfig;
use zaibridge_core::dialogue::{Dialogue, Turn};
use zaibridge_core::error::{Error, FailureKind};
use zaibridge_core::event::EventBus;
use zaibridge_core::preamble::{PreambleSource, StaticPreamble, collect_segments};
use zaibridge_core::tool::{NoTools, ToolDefinition, ToolResolver};
use zaibridge_devices::{DeviceContext, DeviceFilter};
use zaibridge_memory::AssistantMemory;
use zaibridge_providers::AnthropicProvider;
use zaibridge_tools::ToolRegistry;

/// One dialogue plus everything needed to continue it.
pub struct ChatSession {
    controller: ToolLoopController,
    dialogue: Dialogue,
    static_preamble: StaticPreamble,
    devices: Option<DeviceContext>,
    memory: Option<Arc<AssistantMemory>>,
    registry: Option<ToolRegistry>,
    tools: Vec<ToolDefinition>,
}

impl ChatSession {
    pub fn new(
        controller: ToolLoopController,
        static_preamble: StaticPreamble,
        memory: Option<Arc<AssistantMemory>>,
        registry: Option<ToolRegistry>,
    ) -> Self {
        let tools = registry
            .as_ref()
            .map(ToolRegistry::definitions)
            .unwrap_or_default();
        Self {
            controller,
            dialogue: Dialogue::new(),
            static_preamble,
            devices: None,
            memory,
            registry,
            tools,
        }
    }

    /// Add the home device snapshot to every request's preamble.
    pub fn with_devices(mut self, devices: DeviceContext) -> Self {
        self.devices = Some(devices);
        self
    }

    pub fn dialogue(&self) -> &Dialogue {
        &self.dialogue
    }

    /// Configured prompt and context files first, then devices, then memory.
    async fn preamble(&self) -> Vec<String> {
        let mut sources: Vec<&dyn PreambleSource> = vec![&self.static_preamble];
        if let Some(devices) = &self.devices {
            sources.push(devices);
        }
        if let Some(memory) = &self.memory {
            sources.push(&**memory);
        }
        collect_segments(&sources).await
    }

    /// Send one user message, streaming the answer into `out`.
    ///
    /// A failed or cancelled run leaves the dialogue as it was before the
    /// message.
    pub async fn send<W: Write + Send>(
        &mut self,
        text: &str,
        cancel: CancellationToken,
        out: &mut W,
    ) -> Result<RunOutcome, Error> {
        let checkpoint = self.dialogue.clone();
        self.dialogue.push(Turn::user(text));

        let preamble = self.preamble().await;
        let resolver: &dyn ToolResolver = match &self.registry {
            Some(registry) => registry,
            None => &NoTools,
        };
        let input = RunInput::new(&preamble, &self.tools, resolver).with_cancel(cancel);

        let result = self
            .controller
            .run(&mut self.dialogue, input, |increment| match increment {
                ContentIncrement::Text { text } => {
                    let _ = write!(out, "{text}");
                    let _ = out.flush();
                }
                ContentIncrement::ToolCall { name, args, .. } => {
                    debug!(tool = %name, %args, "Model requested tool");
                }
            })
            .await;

        match result {
            Ok(_) if ends_without_answer(&self.dialogue) => {
                warn!("Model returned an empty answer, dropping the exchange");
                self.dialogue = checkpoint;
                Err(Error::EmptyAnswer)
            }
            Ok(outcome) => {
                if let Some(memory) = &self.memory {
                    if let Err(e) = memory.record_interaction(Some(text)).await {
                        warn!("Failed to record interaction: {e}");
                    }
                }
                Ok(outcome)
            }
            Err(e) => {
                self.dialogue = checkpoint;
                Err(e)
            }
        }
    }
}

/// True when the dialogue ends in an assistant turn with no text and no
/// tool calls. Such a turn cannot be sent back as history.
fn ends_without_answer(dialogue: &Dialogue) -> bool {
    matches!(
        dialogue.turns().last(),
        Some(Turn::Assistant(turn)) if turn.text.trim().is_empty() && turn.tool_calls.is_empty()
    )
}

/// Read context files into one preamble segment each.
pub async fn load_context_files(
    prompt: Option<&str>,
    paths: &[PathBuf],
) -> Result<StaticPreamble, Box<dyn std::error::Error>> {
    let mut segments = Vec::with_capacity(paths.len() + 1);
    if let Some(prompt) = prompt {
        segments.push(prompt.to_string());
    }
    for path in paths {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read context file {}: {e}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        segments.push(format!("## Context: {name}\n\n{}", content.trim_end()));
    }
    Ok(StaticPreamble::new(segments))
}

/// A short explanation of a failed run for the terminal.
pub fn describe_error(error: &Error) -> String {
    match error {
        Error::Provider(e) => match e.failure_kind() {
            FailureKind::Authentication => {
                format!("Authentication failed, check your API key ({e})")
            }
            FailureKind::Connection => format!("Could not reach z.ai ({e})"),
            FailureKind::Rejected => format!("The request was rejected ({e})"),
        },
        Error::Cancelled => "Cancelled".into(),
        Error::EmptyAnswer => "No answer from the model, please try again".into(),
        other => other.to_string(),
    }
}

fn spawn_event_logger(bus: &EventBus) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => debug!(?event, "Domain event"),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Event logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Cancel `token` on Ctrl+C until the returned handle is aborted.
fn cancel_on_ctrl_c(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    })
}

async fn send_and_report(session: &mut ChatSession, text: &str) -> bool {
    let token = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(token.clone());
    let mut stdout = std::io::stdout();
    let result = session.send(text, token, &mut stdout).await;
    watcher.abort();
    println!();

    match result {
        Ok(outcome) => {
            if outcome.status == RunStatus::IterationCapReached {
                eprintln!(
                    "  [Stopped after {} tool rounds without a final answer]",
                    outcome.iterations
                );
            }
            true
        }
        Err(e) => {
            eprintln!("  [Error] {}", describe_error(&e));
            false
        }
    }
}

/// Options of `zaibridge chat`.
#[derive(Debug, Default)]
pub struct ChatOptions {
    pub message: Option<String>,
    pub context_files: Vec<PathBuf>,
    pub devices: Option<PathBuf>,
    pub include_unavailable: bool,
    pub no_tools: bool,
}

pub async fn run(options: ChatOptions) -> Result<(), Box<dyn std::error::Error>> {
    let ChatOptions {
        message,
        context_files,
        devices,
        include_unavailable,
        no_tools,
    } = options;
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Fail early with setup instructions
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    ZAIBRIDGE_API_KEY=...");
        eprintln!("    ZAI_API_KEY=...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider = Arc::new(AnthropicProvider::from_config(&config)?);
    let event_bus = Arc::new(EventBus::default());
    spawn_event_logger(&event_bus);
    let controller = ToolLoopController::from_config(provider, &config).with_event_bus(event_bus);

    let memory = if config.memory.enabled {
        Some(Arc::new(
            AssistantMemory::open(config.storage_dir(), config.entry_id.as_str()).await,
        ))
    } else {
        None
    };
    let registry = (!no_tools).then(|| zaibridge_tools::default_registry(memory.clone()));
    let static_preamble = load_context_files(config.prompt.as_deref(), &context_files).await?;
    let tool_names = registry
        .as_ref()
        .map(|r| r.names().join(", "))
        .unwrap_or_else(|| "none".into());

    let mut session = ChatSession::new(controller, static_preamble, memory, registry);
    if let Some(path) = &devices {
        // Fail early on a missing or malformed snapshot
        DeviceContext::new(path).build().await?;
        session = session.with_devices(DeviceContext::new(path).with_filter(DeviceFilter {
            include_unavailable,
            ..Default::default()
        }));
    }

    if let Some(msg) = message {
        // Single message mode
        if !send_and_report(&mut session, &msg).await {
            return Err("Chat failed".into());
        }
        return Ok(());
    }

    let sampling = config.sampling_params();
    println!();
    println!("  zaibridge — interactive chat");
    println!();
    println!("  Model:     {}", sampling.model);
    println!("  Tools:     {tool_names}");
    println!("  Context:   {} files", context_files.len());
    if let Some(path) = &devices {
        println!("  Devices:   {}", path.display());
    }
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' to quit; Ctrl+C stops an answer.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        print!("  Assistant > ");
        std::io::stdout().flush()?;
        send_and_report(&mut session, line).await;
        println!();
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use zaibridge_core::error::ProviderError;
    use zaibridge_core::provider::{EventStream, Provider, StreamEvent};
    use zaibridge_core::wire::{SamplingParams, WireRequest};

    /// Replays canned text answers and records requests.
    struct CannedProvider {
        answers: Mutex<Vec<Result<String, ProviderError>>>,
        requests: Mutex<Vec<WireRequest>>,
    }

    #[async_trait::async_trait]
    impl Provider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn stream(&self, request: WireRequest) -> Result<EventStream, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let answer = self.answers.lock().unwrap().remove(0)?;
            let (tx, rx) = tokio::sync::mpsc::channel(4);
            tx.try_send(Ok(StreamEvent::text_block())).unwrap();
            tx.try_send(Ok(StreamEvent::text(answer))).unwrap();
            tx.try_send(Ok(StreamEvent::MessageDelta { output_tokens: 1 }))
                .unwrap();
            Ok(rx)
        }
    }

    fn session(
        answers: Vec<Result<String, ProviderError>>,
        preamble: StaticPreamble,
        memory: Option<Arc<AssistantMemory>>,
    ) -> (Arc<CannedProvider>, ChatSession) {
        let provider = Arc::new(CannedProvider {
            answers: Mutex::new(answers),
            requests: Mutex::new(Vec::new()),
        });
        let controller = ToolLoopController::new(
            provider.clone(),
            SamplingParams {
                model: "glm-4-flash".into(),
                max_tokens: 3000,
                temperature: 1.0,
            },
        );
        (provider, ChatSession::new(controller, preamble, memory, None))
    }

    #[tokio::test]
    async fn send_streams_text_to_output() {
        let (_, mut session) = session(vec![Ok("Hi there".into())], StaticPreamble::default(), None);
        let mut out = Vec::new();

        let outcome = session
            .send("hello", CancellationToken::new(), &mut out)
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(String::from_utf8(out).unwrap(), "Hi there");
        assert_eq!(session.dialogue().len(), 2);
    }

    #[tokio::test]
    async fn failed_send_restores_dialogue() {
        let (_, mut session) = session(
            vec![
                Ok("first".into()),
                Err(ProviderError::Network("refused".into())),
            ],
            StaticPreamble::default(),
            None,
        );
        let mut out = Vec::new();
        session
            .send("one", CancellationToken::new(), &mut out)
            .await
            .unwrap();
        let err = session
            .send("two", CancellationToken::new(), &mut out)
            .await
            .unwrap_err();

        assert!(describe_error(&err).starts_with("Could not reach z.ai"));
        assert_eq!(session.dialogue().len(), 2);
    }

    #[tokio::test]
    async fn empty_answer_is_not_kept_in_history() {
        let (provider, mut session) = session(
            vec![Ok(String::new()), Ok("second".into())],
            StaticPreamble::default(),
            None,
        );
        let mut out = Vec::new();

        let err = session
            .send("one", CancellationToken::new(), &mut out)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyAnswer));
        assert!(describe_error(&err).starts_with("No answer"));
        assert!(session.dialogue().is_empty());

        session
            .send("two", CancellationToken::new(), &mut out)
            .await
            .unwrap();

        let second = provider.requests.lock().unwrap()[1].clone();
        assert_eq!(second.messages.len(), 1);
        assert!(second.messages.iter().all(|m| !m.content.is_empty()));
        assert_eq!(session.dialogue().len(), 2);
    }

    #[tokio::test]
    async fn preamble_orders_prompt_then_files_then_memory() {
        let dir = tempfile::TempDir::new().unwrap();
        let notes = dir.path().join("house.md");
        tokio::fs::write(&notes, "Three bedrooms.\n").await.unwrap();
        let memory = Arc::new(AssistantMemory::open(dir.path(), "chat").await);
        memory.set_context("user_name", "Ada").await.unwrap();

        let preamble = load_context_files(Some("Be brief."), &[notes]).await.unwrap();
        let (provider, mut session) = session(vec![Ok("ok".into())], preamble, Some(memory.clone()));
        session
            .send("hi", CancellationToken::new(), &mut Vec::new())
            .await
            .unwrap();

        let request = provider.requests.lock().unwrap()[0].clone();
        let system: Vec<_> = request.system.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(system.len(), 3);
        assert_eq!(system[0], "Be brief.");
        assert_eq!(system[1], "## Context: house.md\n\nThree bedrooms.");
        assert!(system[2].contains("User Name: Ada"));
        assert_eq!(memory.stats().await.total_interactions, 1);
    }

    #[tokio::test]
    async fn device_snapshot_sits_between_files_and_memory() {
        let dir = tempfile::TempDir::new().unwrap();
        let snapshot = dir.path().join("devices.json");
        tokio::fs::write(
            &snapshot,
            r#"{"areas": [{"id": "kitchen", "name": "Kitchen"}],
                "entities": [
                  {"entity_id": "light.k", "state": "on", "area_id": "kitchen",
                   "attributes": {"friendly_name": "Kitchen Light"}},
                  {"entity_id": "lock.door", "state": "unavailable"}
                ]}"#,
        )
        .await
        .unwrap();
        let memory = Arc::new(AssistantMemory::open(dir.path(), "chat").await);
        memory.add_note("Water the plants", vec![]).await.unwrap();

        let (provider, session) = session(
            vec![Ok("ok".into())],
            StaticPreamble::single("Be brief."),
            Some(memory),
        );
        let mut session = session.with_devices(DeviceContext::new(&snapshot));
        session
            .send("hi", CancellationToken::new(), &mut Vec::new())
            .await
            .unwrap();

        let request = provider.requests.lock().unwrap()[0].clone();
        let system: Vec<_> = request.system.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(system.len(), 3);
        assert_eq!(system[0], "Be brief.");
        assert_eq!(
            system[1],
            "# Home devices\n\n## Kitchen\n- Kitchen Light (light.k): ON"
        );
        assert!(system[2].contains("Water the plants"));
    }

    #[tokio::test]
    async fn missing_context_file_is_an_error() {
        let err = load_context_files(None, &[PathBuf::from("/nonexistent/context.md")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("context.md"));
    }

    #[test]
    fn error_descriptions() {
        let auth = Error::Provider(ProviderError::AuthenticationFailed("bad key".into()));
        assert!(describe_error(&auth).starts_with("Authentication failed"));
        let rejected = Error::Provider(ProviderError::ApiError {
            status_code: 400,
            message: "bad request".into(),
        });
        assert!(describe_error(&rejected).starts_with("The request was rejected"));
        assert_eq!(describe_error(&Error::Cancelled), "Cancelled");
    }
}
