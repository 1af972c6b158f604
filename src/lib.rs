//! Chat client for hosted LLMs (Gemini, Groq) built around a response
//! accumulator that folds a streamed or single-shot reply into one
//! conversation turn.
//!
//! ```text
//! ChatController::submit
//!   └─ Conversation::begin_exchange      (user turn + pending assistant turn)
//!   └─ Accumulator::run_stream / run_single
//!        └─ GenerationProvider (GeminiAdapter | GroqAdapter)
//!        └─ TurnSink::publish             (identity-checked update)
//! ```

pub mod accumulator;
pub mod cli;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod error;
pub mod gemini;
pub mod groq;
pub mod providers;
pub mod sse;
pub mod ui;

pub use accumulator::{
    Accumulator, ConversationSink, FailureObserver, StreamFailurePolicy, TracingObserver,
    TurnOutcome, TurnSink, DEFAULT_ERROR_MESSAGE,
};
pub use config::ChatConfig;
pub use controller::ChatController;
pub use conversation::{
    Conversation, Delivery, Role, SharedConversation, Turn, TurnId, TurnStatus, TurnUpdate,
};
pub use error::ChatError;
pub use providers::{FragmentStream, GenerationProvider, GenerationRequest, Provider};
