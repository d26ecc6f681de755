//! Provider event stream → assistant turn.
//!
//! The decoder is an explicit state machine. [`StreamDecoder::transition`]
//! takes the current state and one event and returns the next state plus
//! at most one [`ContentIncrement`]; the decoder owns the accumulated text,
//! finalized tool calls and token counts.
//!
//! | state         | event                  | next          | emits              |
//! |---------------|------------------------|---------------|--------------------|
//! | any but Done  | MessageStart           | unchanged     | records input      |
//! | any but Done  | BlockStart(text)       | InTextBlock   | closes open tool   |
//! | any but Done  | BlockStart(tool_use)   | InToolBlock   | closes open tool   |
//! | InTextBlock   | BlockDelta(text)       | InTextBlock   | `Text`             |
//! | InToolBlock   | BlockDelta(json)       | InToolBlock   |                    |
//! | any but Done  | MessageDelta           | Done          | closes open tool   |
//! | Done          | anything               | Done          |                    |
//!
//! Anything else (a delta of the wrong kind, a delta outside a block) is
//! ignored. Closing a tool block parses its argument buffer; an empty buffer
//! means `{}`. A buffer that is not valid JSON drops the call and records a
//! [`DecodeError`].

use serde_json::Value;
use tracing::{debug, warn};
use zaibridge_core::dialogue::{AssistantTurn, ToolCallRequest};
use zaibridge_core::provider::{BlockKind, Fragment, StreamEvent, TokenUsage};

use crate::stream_event::ContentIncrement;

/// A tool-use block being accumulated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingToolCall {
    pub id: String,
    pub name: String,
    pub args: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DecoderState {
    #[default]
    Idle,
    InTextBlock,
    InToolBlock(PendingToolCall),
    Done,
}

/// A tool call dropped during decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub tool_id: String,
    pub tool_name: String,
    pub raw_args: String,
    pub reason: String,
}

/// Everything one response stream produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedTurn {
    pub turn: AssistantTurn,
    pub usage: TokenUsage,
    pub errors: Vec<DecodeError>,
}

#[derive(Debug, Default)]
pub struct StreamDecoder {
    state: DecoderState,
    text: String,
    tool_calls: Vec<ToolCallRequest>,
    usage: TokenUsage,
    errors: Vec<DecodeError>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DecoderState {
        &self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == DecoderState::Done
    }

    /// Feed one event, returning the increment it produced, if any.
    pub fn apply(&mut self, event: StreamEvent) -> Option<ContentIncrement> {
        let state = std::mem::take(&mut self.state);
        let (next, increment) = self.transition(state, event);
        self.state = next;
        increment
    }

    /// The transition function. See the module table.
    pub fn transition(
        &mut self,
        state: DecoderState,
        event: StreamEvent,
    ) -> (DecoderState, Option<ContentIncrement>) {
        if state == DecoderState::Done {
            debug!(?event, "Ignoring event after message end");
            return (state, None);
        }

        match event {
            StreamEvent::MessageStart { input_tokens } => {
                self.usage.input_tokens = input_tokens;
                (state, None)
            }

            StreamEvent::BlockStart {
                kind,
                tool_id,
                tool_name,
            } => {
                let closed = self.close_block(state);
                let next = match kind {
                    BlockKind::Text => DecoderState::InTextBlock,
                    BlockKind::ToolUse => DecoderState::InToolBlock(PendingToolCall {
                        id: tool_id.unwrap_or_default(),
                        name: tool_name.unwrap_or_default(),
                        args: String::new(),
                    }),
                };
                (next, closed)
            }

            StreamEvent::BlockDelta(Fragment::Text(fragment)) => match state {
                DecoderState::InTextBlock => {
                    self.text.push_str(&fragment);
                    (state, Some(ContentIncrement::Text { text: fragment }))
                }
                other => {
                    debug!(state = ?other, "Ignoring text delta outside a text block");
                    (other, None)
                }
            },

            StreamEvent::BlockDelta(Fragment::Json(fragment)) => match state {
                DecoderState::InToolBlock(mut pending) => {
                    pending.args.push_str(&fragment);
                    (DecoderState::InToolBlock(pending), None)
                }
                other => {
                    debug!(state = ?other, "Ignoring argument delta outside a tool block");
                    (other, None)
                }
            },

            StreamEvent::MessageDelta { output_tokens } => {
                self.usage.output_tokens = output_tokens;
                let closed = self.close_block(state);
                (DecoderState::Done, closed)
            }
        }
    }

    /// Close whatever block is open and move to `Done`.
    ///
    /// Called when the stream ends; a tool block cut off before the
    /// message delta is still finalized.
    pub fn close(&mut self) -> Option<ContentIncrement> {
        let state = std::mem::replace(&mut self.state, DecoderState::Done);
        self.close_block(state)
    }

    pub fn into_turn(self) -> DecodedTurn {
        DecodedTurn {
            turn: AssistantTurn {
                text: self.text,
                tool_calls: self.tool_calls,
            },
            usage: self.usage,
            errors: self.errors,
        }
    }

    fn close_block(&mut self, state: DecoderState) -> Option<ContentIncrement> {
        match state {
            DecoderState::InToolBlock(pending) => self.finalize(pending),
            _ => None,
        }
    }

    fn finalize(&mut self, pending: PendingToolCall) -> Option<ContentIncrement> {
        if pending.id.is_empty() || pending.name.is_empty() {
            return self.discard(pending, "tool block missing id or name".into());
        }

        let raw = pending.args.trim();
        let args = if raw.is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            match serde_json::from_str::<Value>(raw) {
                Ok(value) => value,
                Err(e) => return self.discard(pending, e.to_string()),
            }
        };

        self.tool_calls.push(ToolCallRequest {
            id: pending.id.clone(),
            name: pending.name.clone(),
            args: args.clone(),
        });
        Some(ContentIncrement::ToolCall {
            id: pending.id,
            name: pending.name,
            args,
        })
    }

    fn discard(&mut self, pending: PendingToolCall, reason: String) -> Option<ContentIncrement> {
        warn!(
            tool_id = %pending.id,
            tool_name = %pending.name,
            args = %pending.args,
            error = %reason,
            "Discarding tool call with unusable arguments"
        );
        self.errors.push(DecodeError {
            tool_id: pending.id,
            tool_name: pending.name,
            raw_args: pending.args,
            reason,
        });
        None
    }
}

/// Decode a complete event sequence in one go.
pub fn decode_all(
    events: impl IntoIterator<Item = StreamEvent>,
) -> (Vec<ContentIncrement>, DecodedTurn) {
    let mut decoder = StreamDecoder::new();
    let mut increments: Vec<_> = events
        .into_iter()
        .filter_map(|event| decoder.apply(event))
        .collect();
    increments.extend(decoder.close());
    (increments, decoder.into_turn())
}
