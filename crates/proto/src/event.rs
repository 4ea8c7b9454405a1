use serde::{Deserialize, Serialize};

use crate::message::{ChannelId, SessionId};

/// Inbound event from a channel adapter to the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEvent {
    /// Source channel identifier; responses are routed back to it.
    pub channel_id: ChannelId,
    /// Session whose conversation this input belongs to.
    pub session_id: SessionId,
    /// User text payload.
    pub user_message: String,
}

impl ChannelEvent {
    /// Creates a new inbound event from channel/session/user message.
    pub fn new(
        channel_id: ChannelId,
        session_id: SessionId,
        user_message: impl Into<String>,
    ) -> Self {
        Self {
            channel_id,
            session_id,
            user_message: user_message.into(),
        }
    }
}

/// Outbound response from the agent to a channel adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Target channel identifier.
    pub channel_id: ChannelId,
    /// Session identifier associated with this response.
    pub session_id: SessionId,
    /// Response text payload.
    pub content: String,
    /// Whether the turn failed and `content` is an apology.
    pub is_error: bool,
}

impl AgentResponse {
    /// Creates a normal (non-error) agent response.
    pub fn new(channel_id: ChannelId, session_id: SessionId, content: impl Into<String>) -> Self {
        Self {
            channel_id,
            session_id,
            content: content.into(),
            is_error: false,
        }
    }

    /// Creates an error response.
    pub fn error(channel_id: ChannelId, session_id: SessionId, error: impl Into<String>) -> Self {
        Self {
            channel_id,
            session_id,
            content: error.into(),
            is_error: true,
        }
    }
}
