//! LLM provider abstraction and OpenAI-compatible implementation.

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionTool, ChatCompletionToolType, CreateChatCompletionRequestArgs, FinishReason,
        FunctionCall, FunctionObjectArgs,
    },
};
use async_trait::async_trait;
use proto::{ClassifiedResponse, LlmError, Message, Role, ToolDescriptor, ToolRequest};
use tracing::{debug, warn};

/// Request to the LLM
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Conversation snapshot, system message first.
    pub messages: Vec<Message>,
    /// Every registered tool, in registration order.
    pub tools: Vec<ToolDescriptor>,
    /// Target model id.
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Token usage reported by the LLM for a single call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    /// Number of tokens in the prompt / input.
    pub prompt_tokens: u32,
    /// Number of tokens in the generated output.
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Accumulates another usage record into this one.
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// Classified model output plus its token accounting.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub response: ClassifiedResponse,
    pub usage: TokenUsage,
}

impl ModelReply {
    pub fn new(response: ClassifiedResponse, usage: TokenUsage) -> Self {
        Self { response, usage }
    }
}

/// LLM provider trait
///
/// Implementations decide once whether the model answered or asked for a
/// tool; callers branch only on [`ClassifiedResponse`].
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Sends a chat request to the provider and returns the classified reply.
    async fn chat(&self, req: ChatRequest) -> Result<ModelReply, LlmError>;
}

/// OpenAI-compatible provider (works with OpenAI, OpenRouter, Ollama, etc.)
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// Creates an OpenAI provider using the default API base URL.
    pub fn new(api_key: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        let client = Client::with_config(config);
        Self { client }
    }

    /// Creates an OpenAI provider with a custom API base URL.
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(base_url);
        let client = Client::with_config(config);
        Self { client }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ModelReply, LlmError> {
        let messages: Vec<ChatCompletionRequestMessage> = req
            .messages
            .iter()
            .map(convert_message)
            .collect::<Result<_, _>>()?;

        let tools: Vec<ChatCompletionTool> = req
            .tools
            .iter()
            .map(convert_tool)
            .collect::<Result<_, _>>()?;

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(&req.model).messages(messages);

        if !tools.is_empty() {
            builder.tools(tools);
        }
        if let Some(temperature) = req.temperature {
            builder.temperature(temperature);
        }
        if let Some(max_tokens) = req.max_tokens {
            builder.max_completion_tokens(max_tokens);
        }

        let request = builder
            .build()
            .map_err(|e| LlmError::Serialization(e.to_string()))?;

        debug!(
            model = %req.model,
            messages = %req.messages.len(),
            tools = %req.tools.len(),
            "Sending request to OpenAI-compatible endpoint"
        );

        let response = self.client.chat().create(request).await.map_err(|e| {
            let msg = e.to_string();
            debug!(error = %msg, "OpenAI API error");
            map_api_error(msg)
        })?;

        let usage = TokenUsage {
            prompt_tokens: response.usage.as_ref().map_or(0, |u| u.prompt_tokens),
            completion_tokens: response.usage.as_ref().map_or(0, |u| u.completion_tokens),
        };
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".into()))?;

        let response = classify_choice(
            choice.finish_reason,
            choice.message.content,
            choice.message.tool_calls,
        );
        Ok(ModelReply::new(response, usage))
    }
}

fn map_api_error(msg: String) -> LlmError {
    let lower = msg.to_lowercase();
    if lower.contains("rate limit") || lower.contains("429") {
        LlmError::RateLimit
    } else if lower.contains("invalid_api_key")
        || lower.contains("incorrect api key")
        || lower.contains("401")
    {
        LlmError::Auth(msg)
    } else {
        LlmError::Api(msg)
    }
}

/// Tool calls win over text whenever the model emitted any. Only the first
/// call is honored.
fn classify_choice(
    finish_reason: Option<FinishReason>,
    content: Option<String>,
    tool_calls: Option<Vec<ChatCompletionMessageToolCall>>,
) -> ClassifiedResponse {
    let text = content.unwrap_or_default();
    let mut calls = tool_calls.unwrap_or_default().into_iter();

    match calls.next() {
        Some(first) => {
            let extra = calls.count();
            if extra > 0 {
                warn!(
                    kept = %first.function.name,
                    dropped = extra,
                    "Model requested several tools at once; keeping the first"
                );
            }
            ClassifiedResponse::ToolCallRequested {
                text,
                request: ToolRequest::new(
                    first.function.name,
                    first.function.arguments,
                    first.id,
                ),
            }
        }
        None => {
            if finish_reason == Some(FinishReason::ToolCalls) {
                warn!("finish_reason was tool_calls but no tool call was returned");
            }
            ClassifiedResponse::FinalAnswer { text }
        }
    }
}

/// Converts a conversation message into OpenAI request format.
fn convert_message(m: &Message) -> Result<ChatCompletionRequestMessage, LlmError> {
    match m.role {
        Role::System => Ok(ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(m.content.clone())
                .build()
                .map_err(|e| LlmError::Serialization(e.to_string()))?,
        )),
        Role::User => Ok(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(m.content.clone())
                .build()
                .map_err(|e| LlmError::Serialization(e.to_string()))?,
        )),
        Role::Assistant => {
            let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
            builder.content(m.content.clone());

            if let Some(request) = &m.tool_request {
                builder.tool_calls(vec![ChatCompletionMessageToolCall {
                    id: request.correlation_id.clone(),
                    r#type: ChatCompletionToolType::Function,
                    function: FunctionCall {
                        name: request.name.clone(),
                        arguments: request.raw_arguments.clone(),
                    },
                }]);
            }

            Ok(ChatCompletionRequestMessage::Assistant(
                builder
                    .build()
                    .map_err(|e| LlmError::Serialization(e.to_string()))?,
            ))
        }
        Role::Tool => {
            let call_id = m.tool_result_of.clone().ok_or_else(|| {
                LlmError::Serialization("tool message without correlation id".into())
            })?;
            Ok(ChatCompletionRequestMessage::Tool(
                ChatCompletionRequestToolMessageArgs::default()
                    .tool_call_id(call_id)
                    .content(m.content.clone())
                    .build()
                    .map_err(|e| LlmError::Serialization(e.to_string()))?,
            ))
        }
    }
}

/// Converts a tool descriptor into an OpenAI function-tool declaration.
fn convert_tool(t: &ToolDescriptor) -> Result<ChatCompletionTool, LlmError> {
    Ok(ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function: FunctionObjectArgs::default()
            .name(t.name.clone())
            .description(t.description.clone())
            .parameters(t.parameters_schema())
            .build()
            .map_err(|e| LlmError::Serialization(e.to_string()))?,
    })
}
