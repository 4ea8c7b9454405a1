use proto::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Known LLM provider presets.
///
/// GigaChat talks its own OAuth + functions API; every other preset goes
/// through the OpenAI-compatible client with a preset `base_url`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderPreset {
    /// Sber GigaChat. Default.
    #[default]
    GigaChat,
    /// OpenAI API (api.openai.com).
    OpenAi,
    /// OpenRouter – OpenAI-compatible; base_url auto-set.
    OpenRouter,
    /// Local Ollama instance – OpenAI-compatible; no API key needed.
    Ollama,
    /// Fully custom OpenAI-compatible endpoint: set `base_url` and `model`.
    Custom,
}

impl ProviderPreset {
    /// Default model ID used when `agent.model` is empty.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::GigaChat => "GigaChat",
            Self::OpenAi => "gpt-4o-mini",
            Self::OpenRouter => "openai/gpt-4o-mini",
            Self::Ollama => "llama3.2",
            Self::Custom => "",
        }
    }

    /// Preset API base URL, if the preset has one.
    pub fn base_url(&self) -> Option<&'static str> {
        match self {
            Self::GigaChat => Some(agent::gigachat::DEFAULT_BASE_URL),
            Self::OpenRouter => Some("https://openrouter.ai/api/v1"),
            Self::Ollama => Some("http://localhost:11434/v1"),
            Self::OpenAi | Self::Custom => None,
        }
    }

    /// Environment variable consulted when no key is configured.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::GigaChat => "GIGACHAT_CREDENTIALS",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::Ollama | Self::Custom => "",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::GigaChat => "gigachat",
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
            Self::Ollama => "ollama",
            Self::Custom => "custom",
        }
    }
}

impl std::str::FromStr for ProviderPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gigachat" | "giga" => Ok(Self::GigaChat),
            "openai" => Ok(Self::OpenAi),
            "openrouter" => Ok(Self::OpenRouter),
            "ollama" => Ok(Self::Ollama),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Model provider and turn limits.
    #[serde(default)]
    pub agent: AgentConfig,

    /// External data fetchers used by the tools.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Channel adapter configuration.
    #[serde(default)]
    pub channels: ChannelsConfig,
}

/// `[agent]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Provider preset: gigachat | openai | openrouter | ollama | custom.
    #[serde(default)]
    pub provider: ProviderPreset,
    /// Model ID. Leave empty (or omit) to use the preset default.
    #[serde(default)]
    pub model: String,
    /// API key, or GigaChat authorization key.
    #[serde(default)]
    pub api_key: String,
    /// Explicit API base URL. Overrides the preset URL when non-empty.
    #[serde(default)]
    pub base_url: Option<String>,
    /// GigaChat OAuth scope.
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// File with a custom system prompt. Built-in prompt when unset.
    #[serde(default)]
    pub system_prompt_path: Option<String>,
    /// Skip TLS verification for GigaChat (Russian CA chain).
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Conversations idle for longer than this are forgotten.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
    /// Upper bound on conversations kept in memory.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_scope() -> String {
    agent::gigachat::DEFAULT_SCOPE.to_string()
}

fn default_max_tool_rounds() -> usize {
    agent::controller::DEFAULT_MAX_TOOL_ROUNDS
}

fn default_model_timeout_secs() -> u64 {
    60
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_session_idle_secs() -> u64 {
    agent::session::DEFAULT_SESSION_IDLE_TTL.as_secs()
}

fn default_max_sessions() -> usize {
    agent::session::DEFAULT_MAX_SESSIONS
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: ProviderPreset::default(),
            model: String::new(),
            api_key: String::new(),
            base_url: None,
            scope: default_scope(),
            max_tool_rounds: default_max_tool_rounds(),
            model_timeout_secs: default_model_timeout_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt_path: None,
            accept_invalid_certs: false,
            session_idle_secs: default_session_idle_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl AgentConfig {
    /// Returns the effective model ID.
    /// Falls back to the preset default when `model` is empty.
    pub fn effective_model(&self) -> &str {
        if self.model.is_empty() {
            self.provider.default_model()
        } else {
            &self.model
        }
    }

    /// Returns the effective API base URL.
    /// Priority: explicit `base_url` field > preset auto-URL > `None`.
    pub fn effective_base_url(&self) -> Option<&str> {
        if let Some(url) = &self.base_url
            && !url.is_empty()
        {
            return Some(url.as_str());
        }
        self.provider.base_url()
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn session_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }
}

/// `[tools]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Request timeout for banki.ru and cbr.ru pages.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// User-Agent sent by the scrapers. Built-in browser UA when empty.
    #[serde(default)]
    pub user_agent: String,
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout_secs(),
            user_agent: String::new(),
        }
    }
}

impl ToolsConfig {
    pub fn fetch_settings(&self) -> tools::FetchSettings {
        let mut settings = tools::FetchSettings {
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            ..tools::FetchSettings::default()
        };
        if !self.user_agent.trim().is_empty() {
            settings.user_agent = self.user_agent.trim().to_string();
        }
        settings
    }
}

/// Container for all channel adapter configs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    /// Local CLI adapter config.
    #[serde(default)]
    pub cli: CliConfig,
    /// HTTP `/invoke` adapter config.
    #[serde(default)]
    pub web: WebConfig,
}

/// Local CLI channel config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Whether CLI adapter is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CliConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// HTTP adapter config.
///
/// Configure via `[channels.web]` in `config.toml`; `DEPOSIT_AGENT_WEB_PORT`
/// overrides the port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// Allowed CORS origins (comma-separated), or `*`.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

fn default_web_port() -> u16 {
    3210
}

fn default_cors_origins() -> String {
    "*".to_string()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_web_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

/// `~/.deposit-agent`, or `./.deposit-agent` without `HOME`.
pub fn home_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".deposit-agent")
}

impl Config {
    /// Loads configuration from explicit path, fallback locations, and env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path.map(|p| p.to_path_buf()).or_else(|| {
            let cwd = std::env::current_dir().ok()?.join("config.toml");
            if cwd.exists() {
                return Some(cwd);
            }
            let home_config = home_dir().join("config.toml");
            if home_config.exists() {
                return Some(home_config);
            }
            None
        });
        debug!(path = ?config_path, "Config file resolved");

        let mut config = if let Some(path) = config_path {
            let content = std::fs::read_to_string(&path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(|e| ConfigError::Toml(e.to_string()))?
        } else {
            Config::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;

        debug!(
            provider = %config.agent.provider.name(),
            model = %config.agent.effective_model(),
            base_url = ?config.agent.effective_base_url(),
            "Config loaded"
        );
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(key) = std::env::var("DEPOSIT_AGENT_API_KEY") {
            self.agent.api_key = key;
        }
        if let Ok(model) = std::env::var("DEPOSIT_AGENT_MODEL") {
            self.agent.model = model;
        }
        if let Ok(port) = std::env::var("DEPOSIT_AGENT_WEB_PORT") {
            self.channels.web.port =
                port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    field: "DEPOSIT_AGENT_WEB_PORT".to_string(),
                    reason: format!("not a port number: {port}"),
                })?;
        }
        if let Ok(rounds) = std::env::var("DEPOSIT_AGENT_MAX_TOOL_ROUNDS") {
            self.agent.max_tool_rounds =
                rounds.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    field: "DEPOSIT_AGENT_MAX_TOOL_ROUNDS".to_string(),
                    reason: format!("not a non-negative integer: {rounds}"),
                })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_tool_rounds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "agent.max_tool_rounds".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.agent.model_timeout_secs == 0 || self.agent.tool_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "agent.*_timeout_secs".to_string(),
                reason: "timeouts must be positive".to_string(),
            });
        }
        if self.agent.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "agent.max_sessions".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.agent.provider == ProviderPreset::Custom
            && self.agent.effective_base_url().is_none()
        {
            return Err(ConfigError::MissingField("agent.base_url".to_string()));
        }
        Ok(())
    }

    /// Resolves the API key to use for the configured provider.
    ///
    /// Priority:
    /// 1. `agent.api_key` in config file (or `DEPOSIT_AGENT_API_KEY` applied at load time)
    /// 2. Provider-specific environment variable (e.g. `GIGACHAT_CREDENTIALS`)
    pub fn resolve_api_key(&self) -> String {
        if !self.agent.api_key.is_empty() {
            debug!(source = "config", provider = %self.agent.provider.name(), "API key resolved");
            return self.agent.api_key.clone();
        }

        let env_var = self.agent.provider.api_key_env();
        if !env_var.is_empty()
            && let Ok(key) = std::env::var(env_var)
        {
            debug!(source = "env", env_var = %env_var, "API key resolved");
            return key;
        }

        debug!(provider = %self.agent.provider.name(), "No API key found from any source");
        String::new()
    }

    /// Reads the system prompt file, or returns the built-in prompt.
    pub fn load_system_prompt(&self) -> Result<String, ConfigError> {
        match self.agent.system_prompt_path.as_deref() {
            Some(path) if !path.trim().is_empty() => {
                let prompt = std::fs::read_to_string(path.trim()).map_err(ConfigError::Io)?;
                let prompt = prompt.trim();
                if prompt.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "agent.system_prompt_path".to_string(),
                        reason: format!("{path} is empty"),
                    });
                }
                Ok(prompt.to_string())
            }
            _ => Ok(agent::DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }
}
