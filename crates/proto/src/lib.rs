//! Shared protocol types for channels, the turn controller, and tools.
//!
//! This crate defines serializable message/event/tool structures and
//! strongly-typed error enums shared across the workspace.

pub mod error;
pub mod event;
pub mod message;
pub mod tool;

/// Re-export of all protocol error types.
pub use error::*;
/// Re-export of inbound/outbound event types.
pub use event::{AgentResponse, ChannelEvent};
/// Re-export of conversation/message identity types.
pub use message::{ChannelId, Message, Role, SessionId};
/// Re-export of tool schema, request and classification types.
pub use tool::{
    ClassifiedResponse, ParamSpec, ParamType, ToolArguments, ToolDescriptor, ToolRequest,
};
