//! The conversation engine of zaibridge.
//!
//! One run follows a bounded **encode → stream → decode → resolve** cycle:
//!
//! 1. **Encode** the dialogue and system preamble into a wire request
//! 2. **Stream** it to the provider
//! 3. **Decode** the event stream into text and tool calls, handing each
//!    increment to the caller as it arrives
//! 4. **Resolve**: if the model asked for tools, ask the caller for results,
//!    append them, and go back to step 1
//!
//! The loop stops when the model answers without tool calls, when the caller
//! supplies no results, or when the iteration cap is reached.

pub mod decoder;
pub mod encoder;
pub mod loop_runner;
pub mod stream_event;

pub use decoder::{DecodeError, DecodedTurn, DecoderState, PendingToolCall, StreamDecoder, decode_all};
pub use encoder::encode;
pub use loop_runner::{
    DEFAULT_MAX_ITERATIONS, RunInput, RunOutcome, RunStatus, ToolLoopController,
};
pub use stream_event::ContentIncrement;
