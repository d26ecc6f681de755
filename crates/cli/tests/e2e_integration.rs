//! End-to-end integration tests for zaibridge.
//!
//! These exercise the full pipeline from a user turn to a finished run:
//! encoding, streaming, decoding, tool execution against the real registry,
//! and memory feeding back into the next system preamble.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio::sync::mpsc;
use zaibridge_agent::{ContentIncrement, RunInput, RunStatus, ToolLoopController};
use zaibridge_core::dialogue::{Dialogue, Turn};
use zaibridge_core::error::ProviderError;
use zaibridge_core::preamble::{PreambleSource, StaticPreamble, collect_segments};
use zaibridge_core::provider::{EventStream, Provider, StreamEvent};
use zaibridge_core::wire::{ContentPart, SamplingParams, WireRequest, WireRole};
use zaibridge_memory::AssistantMemory;
use zaibridge_tools::default_registry;

// ── Mock Provider ────────────────────────────────────────────────────────

type Script = Vec<StreamEvent>;

/// A mock provider that replays scripted event streams in sequence.
struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<WireRequest>>,
}

impl ScriptedProvider {
    fn new(scripts: Vec<Script>) -> Self {
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

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn stream(&self, request: WireRequest) -> Result<EventStream, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_else(|| {
            panic!("ScriptedProvider exhausted");
        });
        let (tx, rx) = mpsc::channel(script.len().max(1));
        for event in script {
            tx.try_send(Ok(event)).unwrap();
        }
        Ok(rx)
    }
}

fn text_answer(text: &str) -> Script {
    vec![
        StreamEvent::MessageStart { input_tokens: 50 },
        StreamEvent::text_block(),
        StreamEvent::text(text),
        StreamEvent::MessageDelta { output_tokens: 8 },
    ]
}

fn tool_call(id: &str, name: &str, args: serde_json::Value) -> Script {
    let raw = args.to_string();
    let (head, tail) = raw.split_at(raw.len() / 2);
    vec![
        StreamEvent::MessageStart { input_tokens: 40 },
        StreamEvent::text_block(),
        StreamEvent::text("One moment."),
        StreamEvent::tool_block(id, name),
        StreamEvent::json(head),
        StreamEvent::json(tail),
        StreamEvent::MessageDelta { output_tokens: 12 },
    ]
}

fn sampling() -> SamplingParams {
    SamplingParams {
        model: "glm-4-flash".into(),
        max_tokens: 3000,
        temperature: 1.0,
    }
}

async fn preamble(memory: &AssistantMemory) -> Vec<String> {
    let configured = StaticPreamble::single("You are a helpful home assistant.");
    let sources: Vec<&dyn PreambleSource> = vec![&configured, memory];
    collect_segments(&sources).await
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_remember_note_then_recall_in_preamble() {
    let dir = tempfile::TempDir::new().unwrap();
    let memory = Arc::new(AssistantMemory::open(dir.path(), "e2e").await);
    let registry = default_registry(Some(memory.clone()));
    let tools = registry.definitions();

    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_call(
            "toolu_01",
            "remember_note",
            json!({"note": "The plumber comes Tuesday", "tags": ["house"]}),
        ),
        text_answer("Got it, I'll remember."),
        text_answer("The plumber comes Tuesday."),
    ]));
    let controller = ToolLoopController::new(provider.clone(), sampling());

    // First exchange: the model stores a note
    let mut dialogue = Dialogue::from_turns(vec![Turn::user("Remember the plumber comes Tuesday")]);
    let segments = preamble(&memory).await;
    assert_eq!(segments.len(), 1);

    let mut streamed = String::new();
    let mut tool_calls = Vec::new();
    let outcome = controller
        .run(
            &mut dialogue,
            RunInput::new(&segments, &tools, &registry),
            |inc| match inc {
                ContentIncrement::Text { text } => streamed.push_str(&text),
                ContentIncrement::ToolCall { name, .. } => tool_calls.push(name),
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.iterations, 2);
    assert_eq!(streamed, "One moment.Got it, I'll remember.");
    assert_eq!(tool_calls, vec!["remember_note".to_string()]);
    assert_eq!(memory.notes().await[0].text, "The plumber comes Tuesday");

    // The second request carried the tool result as a single user message
    let second = provider.request(1);
    assert_eq!(second.tools.len(), tools.len());
    let last = second.messages.last().unwrap();
    assert_eq!(last.role, WireRole::User);
    assert!(matches!(
        &last.content[0],
        ContentPart::ToolResult { tool_use_id, is_error: false, content }
            if tool_use_id == "toolu_01" && content.contains("Noted")
    ));

    // Next exchange: the note is now part of the system preamble
    dialogue.push(Turn::user("When is the plumber coming?"));
    let segments = preamble(&memory).await;
    assert_eq!(segments.len(), 2);
    controller
        .run(&mut dialogue, RunInput::new(&segments, &tools, &registry), |_| {})
        .await
        .unwrap();

    let third = provider.request(2);
    assert!(third.system[1].text.contains("The plumber comes Tuesday"));
    assert_eq!(third.messages.len(), 5);
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn e2e_unknown_tool_reports_error_to_model() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_call("t1", "open_garage", json!({})),
        text_answer("I can't open the garage."),
    ]));
    let registry = default_registry(None);
    let controller = ToolLoopController::new(provider.clone(), sampling());
    let mut dialogue = Dialogue::from_turns(vec![Turn::user("Open the garage")]);

    let outcome = controller
        .run(&mut dialogue, RunInput::new(&[], &registry.definitions(), &registry), |_| {})
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    let second = provider.request(1);
    assert!(matches!(
        &second.messages[2].content[0],
        ContentPart::ToolResult { is_error: true, content, .. } if content.contains("open_garage")
    ));
}

#[tokio::test]
async fn e2e_get_time_loop_hits_the_cap() {
    let scripts = (0..3)
        .map(|i| tool_call(&format!("t{i}"), "get_time", json!({"utc": true})))
        .collect();
    let provider = Arc::new(ScriptedProvider::new(scripts));
    let registry = default_registry(None);
    let controller = ToolLoopController::new(provider.clone(), sampling()).with_max_iterations(3);
    let mut dialogue = Dialogue::from_turns(vec![Turn::user("time, again and again")]);

    let outcome = controller
        .run(&mut dialogue, RunInput::new(&[], &registry.definitions(), &registry), |_| {})
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::IterationCapReached);
    assert_eq!(outcome.iterations, 3);
    assert_eq!(outcome.usage.input_tokens, 120);
    assert_eq!(provider.calls(), 3);
    assert!(matches!(dialogue.turns().last(), Some(Turn::ToolResults(_))));
}
