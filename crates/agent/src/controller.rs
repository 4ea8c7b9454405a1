//! Tool-calling turn loop.
//!
//! A turn alternates model calls and tool dispatches until the model gives a
//! final answer or the tool-round budget runs out. Anything the model gets
//! wrong (bad arguments, unknown tools, slow tools) is written back into the
//! conversation as a `tool` message; only model failures, conversation
//! invariant violations and cancellation end the turn with an error.

use std::sync::Arc;
use std::time::Duration;

use proto::{
    ClassifiedResponse, LlmError, Message, ToolArguments, ToolDescriptor, ToolError, ToolRequest,
    TurnError,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::conversation::Conversation;
use crate::llm::{ChatRequest, LlmProvider, ModelReply, TokenUsage};
use crate::tool_registry::ToolRegistry;

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// Knobs for a single turn.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Completed tool round-trips allowed before the turn is cut off.
    pub max_tool_rounds: usize,
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            model: "GigaChat".to_string(),
            temperature: Some(0.3),
            max_tokens: Some(1024),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            model_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(30),
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Answered,
    BudgetExceeded,
}

/// Result of a completed turn. `text` is also the conversation's last message.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub text: String,
    pub tool_rounds: usize,
    pub status: TurnStatus,
    pub usage: TokenUsage,
}

/// Drives one user turn against a model and a tool registry.
pub struct TurnController {
    llm: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    settings: TurnSettings,
}

impl TurnController {
    pub fn new(llm: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>, settings: TurnSettings) -> Self {
        Self {
            llm,
            tools,
            settings,
        }
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Runs the model/tool loop on a conversation whose last message is the
    /// user's input.
    pub async fn run_turn(
        &self,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let descriptors = self.tools.descriptors();
        let mut rounds = 0;
        let mut usage = TokenUsage::default();

        loop {
            if cancel.is_cancelled() {
                return Err(TurnError::Cancelled);
            }

            debug!(round = rounds, messages = conversation.len(), "LLM call");
            let t0 = std::time::Instant::now();
            let reply = self.invoke_model(conversation, &descriptors, cancel).await?;
            debug!(elapsed_ms = %t0.elapsed().as_millis(), round = rounds, "LLM response received");
            usage.add(&reply.usage);

            match reply.response {
                ClassifiedResponse::FinalAnswer { text } => {
                    conversation.append(Message::assistant(text.clone()))?;
                    info!(rounds, "Turn answered: {text:.50}");
                    return Ok(TurnOutcome {
                        text,
                        tool_rounds: rounds,
                        status: TurnStatus::Answered,
                        usage,
                    });
                }
                ClassifiedResponse::ToolCallRequested { text, request } => {
                    if rounds >= self.settings.max_tool_rounds {
                        warn!(
                            tool = %request.name,
                            "Max tool rounds ({}) reached, aborting turn",
                            self.settings.max_tool_rounds
                        );
                        let notice = budget_exceeded_message(self.settings.max_tool_rounds);
                        conversation.append(Message::assistant(notice.clone()))?;
                        return Ok(TurnOutcome {
                            text: notice,
                            tool_rounds: rounds,
                            status: TurnStatus::BudgetExceeded,
                            usage,
                        });
                    }

                    conversation.append(Message::assistant_tool_request(text, request.clone()))?;
                    let output = self.dispatch(&request, cancel).await?;
                    conversation.append(Message::tool_result(request.correlation_id, output))?;
                    rounds += 1;
                }
            }
        }
    }

    async fn invoke_model(
        &self,
        conversation: &Conversation,
        descriptors: &[ToolDescriptor],
        cancel: &CancellationToken,
    ) -> Result<ModelReply, TurnError> {
        let req = ChatRequest {
            messages: conversation.snapshot().to_vec(),
            tools: descriptors.to_vec(),
            model: self.settings.model.clone(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };
        let timeout = self.settings.model_timeout;

        tokio::select! {
            _ = cancel.cancelled() => Err(TurnError::Cancelled),
            result = tokio::time::timeout(timeout, self.llm.chat(req)) => match result {
                Ok(reply) => Ok(reply?),
                Err(_) => Err(LlmError::Timeout(timeout.as_secs()).into()),
            },
        }
    }

    /// Produces the text of the `tool` message answering `request`. Only
    /// cancellation escapes as an error.
    async fn dispatch(
        &self,
        request: &ToolRequest,
        cancel: &CancellationToken,
    ) -> Result<String, TurnError> {
        let args = match ToolArguments::parse(&request.raw_arguments) {
            Ok(args) => args,
            Err(e) => return Ok(diagnostic(request, e)),
        };

        let Some(tool) = self.tools.lookup(&request.name) else {
            let e = ToolError::UnknownTool {
                name: request.name.clone(),
                available: self.tools.tool_names().join(", "),
            };
            return Ok(diagnostic(request, e));
        };

        if let Err(e) = tool.descriptor().validate(&args) {
            return Ok(diagnostic(request, e));
        }

        if cancel.is_cancelled() {
            return Err(TurnError::Cancelled);
        }

        debug!(tool = %request.name, call_id = %request.correlation_id, "Executing tool");
        let timeout = self.settings.tool_timeout;
        tokio::select! {
            _ = cancel.cancelled() => Err(TurnError::Cancelled),
            result = tokio::time::timeout(timeout, tool.execute(&args)) => match result {
                Ok(output) => Ok(output),
                Err(_) => Ok(diagnostic(request, ToolError::Timeout {
                    tool: request.name.clone(),
                    secs: timeout.as_secs(),
                })),
            },
        }
    }
}

fn diagnostic(request: &ToolRequest, error: ToolError) -> String {
    warn!(
        tool = %request.name,
        call_id = %request.correlation_id,
        error = %error,
        "Tool request rejected"
    );
    format!("ОШИБКА: {error}")
}

fn budget_exceeded_message(max_rounds: usize) -> String {
    format!(
        "Не удалось завершить ответ: превышен лимит вызовов инструментов ({max_rounds}). \
         Попробуйте переформулировать вопрос."
    )
}
