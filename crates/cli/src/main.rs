//! CLI entrypoint and subcommand orchestration.

mod config;
#[cfg(not(test))]
mod daemon;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use agent::{
    GigaChatProvider, GigaChatSettings, LlmProvider, OpenAiProvider, ToolRegistry, TurnSettings,
};
use clap::{Parser, Subcommand};
use config::{Config, ProviderPreset};
use proto::{ChannelId, ConfigError};
use tools::{
    BankiRuRateSource, CbrInflationSource, CurrencyRateTool, DepositInsuranceTool, RealYieldTool,
};

#[cfg(not(test))]
use agent::{AgentRuntime, SessionStore, TurnController};
#[cfg(not(test))]
use channels::{ChannelAdapter, CliAdapter, WebAdapter};
#[cfg(not(test))]
use proto::{AgentResponse, ChannelEvent, SessionId};
#[cfg(not(test))]
use tokio_util::sync::CancellationToken;
#[cfg(not(test))]
use tracing::{error, info, warn};
#[cfg(not(test))]
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Top-level command-line arguments.
#[derive(Parser)]
#[command(name = "deposit-agent")]
#[command(about = "Консультант по банковским вкладам", version = "0.1.0")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable debug logging to ~/.deposit-agent/logs/
    #[arg(long, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the enabled channels (default when no subcommand is given)
    Start,

    /// Answer a single question and exit
    Run {
        /// Question to send to the agent
        #[arg(short = 'e', long)]
        exec: String,
    },

    /// Print the tool schemas sent to the model
    Tools,
}

#[cfg(not(test))]
#[tokio::main]
/// Program entrypoint.
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Start);

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));

    // Keep the guard alive for the whole run or buffered lines are lost.
    let _file_guard;
    let debug_writer = if cli.debug {
        let log_dir = config::home_dir().join("logs");
        std::fs::create_dir_all(&log_dir)?;
        let appender = tracing_appender::rolling::daily(&log_dir, "debug.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        _file_guard = Some(guard);
        Some(writer)
    } else {
        _file_guard = None;
        None
    };

    match debug_writer {
        Some(writer) => {
            let console = fmt::layer().with_target(false).with_filter(console_filter);
            let file = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .with_filter(EnvFilter::new(
                    "debug,hyper_util=info,rustls=info,reqwest=info,html5ever=info,selectors=info",
                ));
            tracing_subscriber::registry()
                .with(console)
                .with(file)
                .init();
        }
        None => {
            fmt()
                .with_env_filter(console_filter)
                .with_target(false)
                .init();
        }
    }

    if cli.debug {
        let cmd_label = match &command {
            Commands::Start => "start",
            Commands::Run { .. } => "run",
            Commands::Tools => "tools",
        };
        info!(
            version = env!("CARGO_PKG_VERSION"),
            command = cmd_label,
            log_level = %cli.log_level,
            "========== deposit-agent session start =========="
        );
    }

    let config = Config::load(cli.config.as_deref())?;

    match command {
        Commands::Start => cmd_start(config).await,
        Commands::Run { exec } => cmd_run(config, exec).await,
        Commands::Tools => cmd_tools(config),
    }
}

/// Registers the three advice tools in the order the model sees them.
fn build_registry(config: &Config) -> proto::Result<ToolRegistry> {
    let fetch = config.tools.fetch_settings();
    let rates = BankiRuRateSource::new(&fetch)?;
    let inflation = CbrInflationSource::new(&fetch)?;

    let mut registry = ToolRegistry::new();
    registry.register(DepositInsuranceTool::new())?;
    registry.register(CurrencyRateTool::new(Arc::new(rates)))?;
    registry.register(RealYieldTool::new(Arc::new(inflation)))?;
    Ok(registry)
}

/// Builds the model client for the configured provider preset.
fn build_provider(config: &Config, api_key: &str) -> proto::Result<Arc<dyn LlmProvider>> {
    let agent = &config.agent;
    match agent.provider {
        ProviderPreset::GigaChat => {
            if api_key.is_empty() {
                return Err(ConfigError::MissingField(
                    "GIGACHAT_CREDENTIALS or agent.api_key".to_string(),
                )
                .into());
            }
            let mut settings = GigaChatSettings::new(api_key);
            settings.scope = agent.scope.clone();
            if let Some(base_url) = agent.effective_base_url() {
                settings.base_url = base_url.to_string();
            }
            settings.accept_invalid_certs = agent.accept_invalid_certs;
            settings.timeout = agent.model_timeout();
            Ok(Arc::new(GigaChatProvider::new(settings)?))
        }
        _ => match agent.effective_base_url() {
            Some(base_url) => Ok(Arc::new(OpenAiProvider::with_base_url(api_key, base_url))),
            None => Ok(Arc::new(OpenAiProvider::new(api_key))),
        },
    }
}

fn turn_settings(config: &Config) -> TurnSettings {
    let agent = &config.agent;
    TurnSettings {
        model: agent.effective_model().to_string(),
        temperature: Some(agent.temperature),
        max_tokens: Some(agent.max_tokens),
        max_tool_rounds: agent.max_tool_rounds,
        model_timeout: agent.model_timeout(),
        tool_timeout: agent.tool_timeout(),
    }
}

#[cfg(not(test))]
/// Creates a runtime with the advice tools and the configured LLM provider.
fn build_runtime(config: &Config) -> anyhow::Result<Arc<AgentRuntime>> {
    let registry = Arc::new(build_registry(config)?);

    let api_key = config.resolve_api_key();
    if api_key.is_empty() && config.agent.provider != ProviderPreset::Ollama {
        warn!(
            provider = config.agent.provider.name(),
            "No API key configured. Set DEPOSIT_AGENT_API_KEY or {}.",
            config.agent.provider.api_key_env()
        );
    }
    let llm = build_provider(config, &api_key)?;

    let sessions = SessionStore::with_limits(
        config.load_system_prompt()?,
        config.agent.session_idle_ttl(),
        config.agent.max_sessions,
    );
    let controller = TurnController::new(llm, registry, turn_settings(config));
    info!(
        provider = config.agent.provider.name(),
        model = config.agent.effective_model(),
        "Agent runtime ready"
    );
    Ok(Arc::new(AgentRuntime::new(controller, sessions)))
}

#[cfg(not(test))]
/// Runs the enabled channels over an in-process event bus.
async fn cmd_start(config: Config) -> anyhow::Result<()> {
    if !config.channels.cli.enabled && !config.channels.web.enabled {
        anyhow::bail!("No channels enabled. Enable [channels.cli] or [channels.web].");
    }
    info!("Starting deposit-agent");

    let runtime = build_runtime(&config)?;
    let shutdown = CancellationToken::new();

    let (event_tx, mut event_rx) = tokio::sync::mpsc::channel::<ChannelEvent>(128);
    let (resp_tx, mut resp_rx) = tokio::sync::mpsc::channel::<AgentResponse>(128);

    let mut cli_task = None;
    let mut cli_resp_adapter: Option<CliAdapter> = None;
    if config.channels.cli.enabled {
        let tx = event_tx.clone();
        let adapter = CliAdapter::with_session(SessionId::new());
        cli_resp_adapter = Some(adapter.clone());
        cli_task = Some(tokio::spawn(async move {
            if let Err(e) = adapter.run(tx).await {
                error!("CLI adapter error: {e}");
            }
        }));
    }

    let mut web_resp_adapter: Option<WebAdapter> = None;
    if config.channels.web.enabled {
        let web = &config.channels.web;
        let adapter = WebAdapter::new(web.port, web.cors_origins.clone());
        web_resp_adapter = Some(adapter.clone());
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = adapter.run(tx).await {
                error!("Web adapter error: {e}");
            }
        });
    }
    drop(event_tx);

    let web_turns = web_resp_adapter.clone();
    let web_shutdown = web_resp_adapter.as_ref().map(WebAdapter::shutdown_token);

    // Response forwarder
    tokio::spawn(async move {
        while let Some(resp) = resp_rx.recv().await {
            let channel_id = resp.channel_id.clone();

            if should_send_cli_response(&channel_id) {
                if let Some(adapter) = &cli_resp_adapter {
                    if let Err(e) = adapter.send_response(resp).await {
                        error!("Failed to send CLI response: {e}");
                    }
                } else {
                    warn!("CLI response dropped because CLI channel is disabled");
                }
                continue;
            }

            if should_send_web_response(&channel_id) {
                if let Some(adapter) = &web_resp_adapter {
                    if let Err(e) = adapter.send_response(resp).await {
                        warn!("Failed to send Web response: {e}");
                    }
                } else {
                    warn!("Web response dropped because Web channel is disabled");
                }
                continue;
            }

            warn!("No response adapter configured for channel: {}", channel_id);
        }
    });

    let cli_finished = async {
        match cli_task {
            Some(task) => {
                let _ = task.await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = async {
            while let Some(event) = event_rx.recv().await {
                let runtime = runtime.clone();
                let resp_tx = resp_tx.clone();
                // Web turns die with their request; the rest with the process.
                let cancel = match &web_turns {
                    Some(web) if should_send_web_response(&event.channel_id) => {
                        web.turn_token(&event.channel_id)
                    }
                    _ => shutdown.child_token(),
                };

                tokio::spawn(async move {
                    let resp = runtime.handle_event(event, &cancel).await;
                    let _ = resp_tx.send(resp).await;
                });
            }
        } => {}
        _ = cli_finished => {
            info!("CLI session ended");
        }
        _ = daemon::wait_for_shutdown() => {
            info!("Shutdown signal received");
        }
    }

    shutdown.cancel();
    if let Some(token) = web_shutdown {
        token.cancel();
    }
    info!("deposit-agent stopped");
    Ok(())
}

#[cfg(not(test))]
/// Answers one question and exits.
async fn cmd_run(config: Config, exec: String) -> anyhow::Result<()> {
    let runtime = build_runtime(&config)?;
    let session_id = SessionId::new();

    println!("{}", format_run_header(&exec));

    match runtime
        .process(&session_id, &exec, &CancellationToken::new())
        .await
    {
        Ok(outcome) => {
            println!("{}", outcome.text);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", agent::TURN_FAILED_REPLY);
            Err(e.into())
        }
    }
}

#[cfg(not(test))]
fn cmd_tools(config: Config) -> anyhow::Result<()> {
    let registry = build_registry(&config)?;
    println!("{}", serde_json::to_string_pretty(&tool_schemas(&registry))?);
    Ok(())
}

/// JSON schemas for every registered tool, in registration order.
fn tool_schemas(registry: &ToolRegistry) -> serde_json::Value {
    serde_json::Value::Array(
        registry
            .descriptors()
            .iter()
            .map(|descriptor| descriptor.to_schema())
            .collect(),
    )
}

/// Returns whether a response should be routed to the CLI.
fn should_send_cli_response(channel_id: &ChannelId) -> bool {
    channel_id.adapter() == "cli"
}

/// Returns whether a response should be routed to the HTTP endpoint.
fn should_send_web_response(channel_id: &ChannelId) -> bool {
    channel_id.adapter() == "web"
}

/// Formats run mode header text.
fn format_run_header(exec: &str) -> String {
    format!("Вы: {exec}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_send_cli_response_checks_adapter() {
        assert!(should_send_cli_response(&ChannelId::from("cli:local")));
        assert!(!should_send_cli_response(&ChannelId::from("web:req-1")));
    }

    #[test]
    fn should_send_web_response_checks_adapter() {
        assert!(should_send_web_response(&ChannelId::from("web:req-1")));
        assert!(!should_send_web_response(&ChannelId::from("cli:local")));
        assert!(!should_send_web_response(&ChannelId::from("webhook:x")));
    }

    #[test]
    fn format_run_header_embeds_exec_text() {
        assert_eq!(format_run_header("курс евро"), "Вы: курс евро");
    }

    #[test]
    fn registry_exposes_tools_in_order() {
        let registry = build_registry(&Config::default()).expect("registry");
        assert_eq!(
            registry.tool_names(),
            vec!["check_asv", "get_curr_rate", "calc_real_yield"]
        );

        let schemas = tool_schemas(&registry);
        let schemas = schemas.as_array().expect("array");
        assert_eq!(schemas.len(), 3);
        assert_eq!(schemas[0]["name"], "check_asv");
        assert_eq!(schemas[0]["parameters"]["type"], "object");
        assert_eq!(
            schemas[1]["parameters"]["required"],
            serde_json::json!(["operation_type", "exchange_value", "city"])
        );
    }

    #[test]
    fn turn_settings_follow_agent_config() {
        let mut config = Config::default();
        config.agent.max_tool_rounds = 2;
        config.agent.tool_timeout_secs = 5;
        config.agent.model = "GigaChat-Pro".to_string();

        let settings = turn_settings(&config);
        assert_eq!(settings.model, "GigaChat-Pro");
        assert_eq!(settings.max_tool_rounds, 2);
        assert_eq!(settings.tool_timeout, std::time::Duration::from_secs(5));
        assert_eq!(settings.max_tokens, Some(1024));
    }

    #[test]
    fn gigachat_provider_requires_credentials() {
        let config = Config::default();
        match build_provider(&config, "") {
            Err(proto::Error::Config(ConfigError::MissingField(field))) => {
                assert!(field.contains("GIGACHAT_CREDENTIALS"));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("provider built without credentials"),
        }
        assert!(build_provider(&config, "Z2lnYTpzZWNyZXQ=").is_ok());
    }

    #[test]
    fn openai_compatible_presets_build_without_network() {
        let mut config = Config::default();
        for preset in [
            ProviderPreset::OpenAi,
            ProviderPreset::OpenRouter,
            ProviderPreset::Ollama,
        ] {
            config.agent.provider = preset;
            assert!(build_provider(&config, "sk-test").is_ok(), "{preset:?}");
        }
    }
}
