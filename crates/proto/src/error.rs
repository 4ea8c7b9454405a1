use thiserror::Error;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration loading/validation error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// LLM provider error.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Tool registration/execution error.
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// External data service error.
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Conversation state error.
    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),

    /// Turn-fatal orchestration error.
    #[error("Turn error: {0}")]
    Turn(#[from] TurnError),

    /// Channel adapter error.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Internal protocol type error.
    #[error("Proto error: {0}")]
    Proto(#[from] ProtoError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required field was not provided.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// A field has an invalid value and reason.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Filesystem read error.
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("TOML parse error: {0}")]
    Toml(String),
}

/// LLM provider errors. All of them are turn-fatal.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Remote API failure.
    #[error("{0}")]
    Api(String),

    /// Provider rejected the credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Provider throttled the request.
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Provider response schema/content was invalid.
    #[error("Invalid response from LLM: {0}")]
    InvalidResponse(String),

    /// Provider did not answer within the configured bound.
    #[error("LLM call timed out after {0}s")]
    Timeout(u64),

    /// Serialization/deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Tool lookup, argument and dispatch errors.
///
/// Except for `Duplicate`, these never leave a turn: the controller renders
/// them into a `tool` message so the model can correct itself.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Requested tool is unknown.
    #[error("unknown tool '{name}'; available tools: {available}")]
    UnknownTool { name: String, available: String },

    /// Raw arguments could not be parsed into a key/value object.
    #[error("malformed arguments: {0}")]
    MalformedArguments(String),

    /// Arguments parsed but failed descriptor validation.
    #[error("invalid arguments for '{tool}': {}", .issues.join("; "))]
    InvalidArguments { tool: String, issues: Vec<String> },

    /// Handler exceeded the dispatch time bound.
    #[error("tool '{tool}' timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    /// A tool with the same name is already registered.
    #[error("tool '{0}' is already registered")]
    Duplicate(String),
}

/// External data collaborator errors (rate tables, inflation tables).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Transport failure or non-success HTTP status.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Request exceeded the fetch timeout.
    #[error("service timed out after {0}s")]
    Timeout(u64),

    /// The page was fetched but did not contain usable data.
    #[error("unexpected page content: {0}")]
    Parse(String),

    /// No mapping exists for the requested city.
    #[error("lookup failed for requested city '{0}'")]
    UnknownCity(String),

    /// No mapping exists for the requested currency.
    #[error("lookup failed for requested currency '{0}'")]
    UnknownCurrency(String),

    /// The rate table had no quotes for the requested side.
    #[error("no {0} quotes found")]
    NoQuotes(String),
}

/// Conversation state errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    /// An append would break a conversation invariant.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The conversation holds no messages.
    #[error("Conversation is empty")]
    EmptyConversation,
}

/// Errors that abort a turn instead of being folded into the conversation.
#[derive(Debug, Error)]
pub enum TurnError {
    /// The model backend failed, timed out, or was unreachable.
    #[error("Model invocation failed: {0}")]
    ModelInvocation(#[from] LlmError),

    /// Conversation state was corrupted; a programming defect.
    #[error(transparent)]
    Conversation(#[from] ConversationError),

    /// The turn was cancelled by its caller.
    #[error("Turn cancelled")]
    Cancelled,
}

/// Channel adapter errors
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Channel connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Sending message/event failed.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Channel has been closed.
    #[error("Channel closed")]
    Closed,
}

/// Internal proto errors
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Invalid role string value.
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    /// Invalid parameter type string value.
    #[error("Invalid parameter type: {0}")]
    InvalidParamType(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_config_error_variant() {
        let err = ConfigError::MissingField("agent.model".to_string());
        assert!(err.to_string().contains("Missing required field"));
    }

    #[test]
    fn wraps_llm_error_into_turn_and_top_level_error() {
        let turn: TurnError = LlmError::Timeout(60).into();
        assert!(turn.to_string().contains("timed out after 60s"));

        let err: Error = turn.into();
        assert!(err.to_string().contains("Turn error"));
    }

    #[test]
    fn invalid_arguments_lists_every_issue() {
        let err = ToolError::InvalidArguments {
            tool: "check_asv".to_string(),
            issues: vec![
                "missing required parameter 'amount'".to_string(),
                "parameter 'bank_name' must be string".to_string(),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("check_asv"));
        assert!(text.contains("'amount'"));
        assert!(text.contains("'bank_name'"));
    }

    #[test]
    fn unknown_city_names_the_requested_city() {
        let err = ServiceError::UnknownCity("Тверь".to_string());
        assert_eq!(err.to_string(), "lookup failed for requested city 'Тверь'");
    }

    #[test]
    fn wraps_tool_service_and_channel_errors() {
        let tool_err: Error = ToolError::Duplicate("check_asv".to_string()).into();
        assert!(tool_err.to_string().contains("Tool error"));

        let service_err: Error = ServiceError::Timeout(15).into();
        assert!(service_err.to_string().contains("Service error"));

        let channel_err: Error = ChannelError::Closed.into();
        assert!(channel_err.to_string().contains("Channel error"));
    }

    #[test]
    fn conversation_error_is_transparent_inside_turn_error() {
        let turn: TurnError = ConversationError::EmptyConversation.into();
        assert_eq!(turn.to_string(), "Conversation is empty");
    }
}
