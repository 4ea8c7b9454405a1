use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::ToolRequest;

/// Unique identifier for a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Creates a new random session identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the raw session identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a channel (e.g., "cli:local", "web:<request id>")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl ChannelId {
    /// Builds a channel identifier from adapter name and adapter-specific id.
    pub fn new(adapter: &str, id: &str) -> Self {
        Self(format!("{adapter}:{id}"))
    }

    /// Returns the raw channel identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the adapter prefix (the part before the first `:`).
    pub fn adapter(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ChannelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instruction message.
    System,
    /// Message authored by an end user.
    User,
    /// Message authored by the model.
    Assistant,
    /// Tool execution result message.
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = crate::error::ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            other => Err(crate::error::ProtoError::InvalidRole(other.to_string())),
        }
    }
}

/// A single conversation entry.
///
/// Messages are never mutated after they are appended to a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Semantic role of this message.
    pub role: Role,
    /// Message content payload.
    pub content: String,
    /// Tool invocation requested by an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_request: Option<ToolRequest>,
    /// Correlation id of the request a `tool` message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result_of: Option<String>,
    /// Message creation timestamp in UTC.
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_request: None,
            tool_result_of: None,
            created_at: Utc::now(),
        }
    }

    /// Creates a system-role message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Creates a user-role message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Creates a plain assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Creates an assistant message carrying a tool request.
    pub fn assistant_tool_request(content: impl Into<String>, request: ToolRequest) -> Self {
        Self {
            tool_request: Some(request),
            ..Self::with_role(Role::Assistant, content)
        }
    }

    /// Creates a tool result message answering `correlation_id`.
    pub fn tool_result(correlation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_result_of: Some(correlation_id.into()),
            ..Self::with_role(Role::Tool, content)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::ProtoError;

    #[test]
    fn session_id_new_creates_non_empty_value() {
        let session = SessionId::new();
        assert!(!session.as_str().is_empty());
    }

    #[test]
    fn channel_id_new_formats_adapter_and_id() {
        let channel = ChannelId::new("web", "req-1");
        assert_eq!(channel.as_str(), "web:req-1");
        assert_eq!(channel.adapter(), "web");
    }

    #[test]
    fn role_display_and_parse_agree() {
        for role in [Role::System, Role::User, Role::Assistant, Role::Tool] {
            let parsed = Role::from_str(&role.to_string()).expect("role should parse");
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn role_parse_invalid_value_returns_error() {
        let err = Role::from_str("function").expect_err("invalid role should fail");
        match err {
            ProtoError::InvalidRole(value) => assert_eq!(value, "function"),
            other => panic!("unexpected error variant: {other}"),
        }
    }

    #[test]
    fn constructors_set_role_and_links() {
        let user = Message::user("hello");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.content, "hello");
        assert!(user.tool_request.is_none());
        assert!(user.tool_result_of.is_none());

        let request = ToolRequest::new("check_asv", r#"{"amount":1}"#, "call-1");
        let assistant = Message::assistant_tool_request("", request.clone());
        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(assistant.tool_request, Some(request));

        let tool = Message::tool_result("call-1", "ok");
        assert_eq!(tool.role, Role::Tool);
        assert_eq!(tool.tool_result_of.as_deref(), Some("call-1"));
    }

    #[test]
    fn plain_messages_serialize_without_tool_fields() {
        let json = serde_json::to_value(Message::user("hi")).expect("serialize");
        assert_eq!(json["role"], "user");
        assert!(json.get("tool_request").is_none());
        assert!(json.get("tool_result_of").is_none());
    }
}
