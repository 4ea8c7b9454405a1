//! Ordered, append-only conversation history for one session.

use std::collections::HashSet;

use proto::{ConversationError, Message, Role};
use serde::{Deserialize, Serialize};

/// Length marker used to roll back a failed turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

/// Message history starting with exactly one system message.
///
/// Appends are checked against the history invariants: the system message
/// comes first and only once, and every tool result answers a request that
/// is still open in the current turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<Message>", into = "Vec<Message>")]
pub struct Conversation {
    messages: Vec<Message>,
    open_requests: HashSet<String>,
}

impl Conversation {
    /// Starts a conversation with its system message.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            open_requests: HashSet::new(),
        }
    }

    /// Appends `message` after checking the history invariants.
    pub fn append(&mut self, message: Message) -> Result<(), ConversationError> {
        Self::check(&self.messages, &self.open_requests, &message)?;
        Self::track(&mut self.open_requests, &message);
        self.messages.push(message);
        Ok(())
    }

    fn check(
        history: &[Message],
        open: &HashSet<String>,
        message: &Message,
    ) -> Result<(), ConversationError> {
        let violation = |reason: String| Err(ConversationError::InvariantViolation(reason));

        match message.role {
            Role::System if !history.is_empty() => {
                return violation("system message must be the only first message".into());
            }
            _ if history.is_empty() && message.role != Role::System => {
                return violation(format!(
                    "conversation must start with a system message, got {}",
                    message.role
                ));
            }
            Role::Tool => match &message.tool_result_of {
                None => return violation("tool message without tool_result_of".into()),
                Some(id) if !open.contains(id) => {
                    return violation(format!("tool result '{id}' answers no open request"));
                }
                Some(_) => {}
            },
            Role::Assistant => {
                if let Some(request) = &message.tool_request
                    && open.contains(&request.correlation_id)
                {
                    return violation(format!(
                        "correlation id '{}' is already open",
                        request.correlation_id
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn track(open: &mut HashSet<String>, message: &Message) {
        match message.role {
            Role::User => open.clear(),
            Role::Assistant => {
                if let Some(request) = &message.tool_request {
                    open.insert(request.correlation_id.clone());
                }
            }
            Role::Tool => {
                if let Some(id) = &message.tool_result_of {
                    open.remove(id);
                }
            }
            Role::System => {}
        }
    }

    /// Immutable ordered view of the history.
    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_message(&self) -> Result<&Message, ConversationError> {
        self.messages
            .last()
            .ok_or(ConversationError::EmptyConversation)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Marks the current end of the history.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.messages.len())
    }

    /// Drops everything appended after `checkpoint`.
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        if checkpoint.0 >= self.messages.len() {
            return;
        }
        self.messages.truncate(checkpoint.0);
        self.open_requests.clear();
        for message in &self.messages {
            Self::track(&mut self.open_requests, message);
        }
    }
}

impl TryFrom<Vec<Message>> for Conversation {
    type Error = ConversationError;

    fn try_from(messages: Vec<Message>) -> Result<Self, Self::Error> {
        let mut conversation = Self {
            messages: Vec::with_capacity(messages.len()),
            open_requests: HashSet::new(),
        };
        for message in messages {
            conversation.append(message)?;
        }
        if conversation.is_empty() {
            return Err(ConversationError::EmptyConversation);
        }
        Ok(conversation)
    }
}

impl From<Conversation> for Vec<Message> {
    fn from(conversation: Conversation) -> Self {
        conversation.messages
    }
}
