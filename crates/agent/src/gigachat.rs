//! GigaChat API provider implementation.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use proto::{ClassifiedResponse, LlmError, Message, Role, ToolRequest};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::llm::{ChatRequest, LlmProvider, ModelReply, TokenUsage};

pub const DEFAULT_AUTH_URL: &str = "https://ngw.devices.sberbank.ru:9443/api/v2/oauth";
pub const DEFAULT_BASE_URL: &str = "https://gigachat.devices.sberbank.ru/api/v1";
pub const DEFAULT_SCOPE: &str = "GIGACHAT_API_PERS";

/// Tokens this close to expiry are refreshed before use.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

// ── Request types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GigaChatRequest {
    model: String,
    messages: Vec<GigaChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    functions: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GigaChatMessage {
    role: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

// ── Response types ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GigaChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: GigaChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Unix time in milliseconds.
    expires_at: i64,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        (self.expires_at - now).num_seconds() > TOKEN_REFRESH_MARGIN_SECS
    }
}

// ── Provider ───────────────────────────────────────────────────────────────────

/// Connection settings for [`GigaChatProvider`].
#[derive(Debug, Clone)]
pub struct GigaChatSettings {
    /// Authorization key (base64 of `client_id:client_secret`), or the raw
    /// `client_id:client_secret` pair.
    pub credentials: String,
    pub scope: String,
    pub auth_url: String,
    pub base_url: String,
    pub accept_invalid_certs: bool,
    pub timeout: Duration,
}

impl GigaChatSettings {
    pub fn new(credentials: impl Into<String>) -> Self {
        Self {
            credentials: credentials.into(),
            scope: DEFAULT_SCOPE.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            accept_invalid_certs: false,
            timeout: Duration::from_secs(60),
        }
    }
}

/// GigaChat LLM provider using the functions API.
pub struct GigaChatProvider {
    client: reqwest::Client,
    authorization: String,
    scope: String,
    auth_url: String,
    base_url: String,
    token: Mutex<Option<AccessToken>>,
}

impl GigaChatProvider {
    pub fn new(settings: GigaChatSettings) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()
            .map_err(|e| LlmError::Api(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            client,
            authorization: basic_authorization(&settings.credentials),
            scope: settings.scope,
            auth_url: settings.auth_url,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, LlmError> {
        let now = Utc::now();
        let cached = self
            .token
            .lock()
            .as_ref()
            .filter(|token| token.is_fresh(now))
            .map(|token| token.value.clone());
        if let Some(value) = cached {
            return Ok(value);
        }

        debug!(scope = %self.scope, "Requesting GigaChat access token");
        let response = self
            .client
            .post(&self.auth_url)
            .header("Authorization", &self.authorization)
            .header("RqUID", uuid::Uuid::new_v4().to_string())
            .header("Accept", "application/json")
            .form(&[("scope", self.scope.as_str())])
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;
        if !status.is_success() {
            let preview: String = body.chars().take(300).collect();
            return Err(LlmError::Auth(format!("HTTP {status}: {preview}")));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::InvalidResponse(format!("token response: {e}")))?;
        let expires_at = Utc
            .timestamp_millis_opt(parsed.expires_at)
            .single()
            .ok_or_else(|| {
                LlmError::InvalidResponse(format!("bad token expiry {}", parsed.expires_at))
            })?;

        let value = parsed.access_token;
        *self.token.lock() = Some(AccessToken {
            value: value.clone(),
            expires_at,
        });
        Ok(value)
    }
}

#[async_trait]
impl LlmProvider for GigaChatProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ModelReply, LlmError> {
        let body = build_request(&req);
        let token = self.access_token().await?;

        let url = format!("{}/chat/completions", self.base_url);
        debug!(
            model = %req.model,
            messages = %body.messages.len(),
            functions = %body.functions.len(),
            "Sending request to GigaChat"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        let status = response.status();
        debug!(status = %status.as_u16(), "GigaChat response received");
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimit);
        }
        if status.as_u16() == 401 {
            self.token.lock().take();
            return Err(LlmError::Auth("access token rejected".into()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        if !status.is_success() {
            let preview: String = text.chars().take(500).collect();
            return Err(LlmError::Api(format!("HTTP {status}: {preview}")));
        }

        let parsed: GigaChatResponse = serde_json::from_str(&text).map_err(|e| {
            LlmError::InvalidResponse(format!(
                "Deserialization error: {e}; body: {}",
                text.chars().take(200).collect::<String>()
            ))
        })?;

        classify(parsed)
    }
}

// ── Conversion helpers ─────────────────────────────────────────────────────────

/// Function-call replies may carry `"content": null`.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn basic_authorization(credentials: &str) -> String {
    let credentials = credentials.trim();
    let key = if credentials.contains(':') {
        STANDARD.encode(credentials)
    } else {
        credentials.to_string()
    };
    format!("Basic {key}")
}

fn map_transport_error(e: &reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Api(format!("request timed out: {e}"))
    } else {
        LlmError::Api(e.to_string())
    }
}

fn build_request(req: &ChatRequest) -> GigaChatRequest {
    let functions: Vec<Value> = req.tools.iter().map(|t| t.to_schema()).collect();
    let function_call = (!functions.is_empty()).then_some("auto");

    GigaChatRequest {
        model: req.model.clone(),
        messages: convert_messages(&req.messages),
        functions,
        function_call,
        temperature: req.temperature,
        max_tokens: req.max_tokens,
    }
}

/// Tool results become `function` messages named after the tool that
/// produced them, with the output wrapped as `{"result": ...}`.
fn convert_messages(messages: &[Message]) -> Vec<GigaChatMessage> {
    messages
        .iter()
        .map(|msg| match msg.role {
            Role::System | Role::User => GigaChatMessage {
                role: msg.role.to_string(),
                content: msg.content.clone(),
                name: None,
                function_call: None,
            },
            Role::Assistant => GigaChatMessage {
                role: "assistant".to_string(),
                content: msg.content.clone(),
                name: None,
                function_call: msg.tool_request.as_ref().map(|request| FunctionCall {
                    name: request.name.clone(),
                    arguments: serde_json::from_str(&request.raw_arguments)
                        .unwrap_or_else(|_| Value::String(request.raw_arguments.clone())),
                }),
            },
            Role::Tool => GigaChatMessage {
                role: "function".to_string(),
                content: json!({ "result": msg.content }).to_string(),
                name: msg
                    .tool_result_of
                    .as_deref()
                    .and_then(|id| requested_tool_name(messages, id)),
                function_call: None,
            },
        })
        .collect()
}

fn requested_tool_name(messages: &[Message], correlation_id: &str) -> Option<String> {
    messages
        .iter()
        .rev()
        .filter_map(|m| m.tool_request.as_ref())
        .find(|r| r.correlation_id == correlation_id)
        .map(|r| r.name.clone())
}

fn classify(response: GigaChatResponse) -> Result<ModelReply, LlmError> {
    let usage = response
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("No choices in response".into()))?;

    let text = choice.message.content;
    let wants_function = choice.finish_reason.as_deref() == Some("function_call");

    let response = match (wants_function, choice.message.function_call) {
        (true, Some(call)) => {
            let raw_arguments = match call.arguments {
                Value::String(raw) => raw,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            ClassifiedResponse::ToolCallRequested {
                text,
                request: ToolRequest::new(
                    call.name,
                    raw_arguments,
                    uuid::Uuid::new_v4().to_string(),
                ),
            }
        }
        (true, None) => {
            warn!("finish_reason was function_call but no function_call was returned");
            ClassifiedResponse::FinalAnswer { text }
        }
        (false, _) => ClassifiedResponse::FinalAnswer { text },
    };

    Ok(ModelReply::new(response, usage))
}
