//! Turn controller, conversation state, and LLM adapter interfaces.

pub mod controller;
pub mod conversation;
pub mod gigachat;
pub mod llm;
pub mod runtime;
pub mod session;
pub mod tool_registry;

/// Tool-calling turn loop and its settings/outcome types.
pub use controller::{TurnController, TurnOutcome, TurnSettings, TurnStatus};
/// Append-only, invariant-checked conversation history.
pub use conversation::{Checkpoint, Conversation};
/// GigaChat functions API provider.
pub use gigachat::{GigaChatProvider, GigaChatSettings};
/// Chat request/response models and provider interfaces.
pub use llm::{ChatRequest, LlmProvider, ModelReply, OpenAiProvider, TokenUsage};
/// Session-aware runtime facade.
pub use runtime::{AgentRuntime, DEFAULT_SYSTEM_PROMPT, TURN_FAILED_REPLY};
/// Per-session conversation store.
pub use session::SessionStore;
/// Runtime tool registry.
pub use tool_registry::ToolRegistry;
