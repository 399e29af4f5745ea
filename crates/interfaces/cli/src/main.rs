use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use whisperengine_config::{AppConfig, CharacterProfile};
use whisperengine_runtime::RuntimeContext;

#[derive(Debug, Parser)]
#[command(
    name = "whisperengine",
    version,
    about = "Multi-character conversational agent runtime"
)]
struct Cli {
    /// Path to the bot configuration file.
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Path to the character definition file.
    #[arg(long, default_value = "character.toml", global = true)]
    character: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate configuration and character files without starting anything.
    CheckConfig,
    /// Probe the vector, broker, and relational backends.
    Health,
    /// Run the background worker process (queue consumers only).
    ///
    /// The gateway process embeds the runtime library directly; this binary
    /// covers the worker side and operational checks.
    Worker,
    /// One-shot import of character knowledge into the bot's self-memory.
    ImportKnowledge {
        /// Character definition to import (JSON).
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

fn init_tracing(level: &str) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily("logs", "whisperengine.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(file_writer)
        .with_ansi(false)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    let _guard = init_tracing(&config.telemetry.log_level);

    match cli.command {
        Commands::CheckConfig => {
            config.validate()?;
            let character = CharacterProfile::load_from(&cli.character)
                .with_context(|| format!("loading character from {}", cli.character.display()))?;
            if character.name != config.bot.name {
                bail!(
                    "character name {:?} does not match bot.name {:?}",
                    character.name,
                    config.bot.name
                );
            }
            println!("configuration ok: bot={}", config.bot.name);
            println!("memory collection: {}", config.memory_collection());
            Ok(())
        }

        Commands::Health => {
            let character = CharacterProfile::load_from(&cli.character).unwrap_or_default();
            let ctx = RuntimeContext::initialize(config, character).await?;
            let health = ctx
                .memory
                .health_check()
                .await
                .map_err(|err| anyhow::anyhow!("vector backend unhealthy: {err}"))?;
            println!("vector: {} ({} points)", health.status, health.points.unwrap_or(0));
            println!("collection: {}", health.collection);
            Ok(())
        }

        Commands::Worker => {
            let character = CharacterProfile::load_from(&cli.character)
                .with_context(|| format!("loading character from {}", cli.character.display()))?;
            let ctx = RuntimeContext::initialize(config, character).await?;

            // Workers have no gateway of their own; outbound sends from
            // autonomous replies go through the pending-actions list, which
            // the gateway-side poller executes.
            let adapter = std::sync::Arc::new(NullAdapter);
            let process = whisperengine_runtime::start_workers(ctx, adapter)?;

            tokio::signal::ctrl_c().await?;
            tracing::info!("shutdown signal received; draining workers");
            process.shutdown().await;
            Ok(())
        }

        Commands::ImportKnowledge { path } => {
            let character = CharacterProfile::load_from(&cli.character)
                .with_context(|| format!("loading character from {}", cli.character.display()))?;
            let ctx = RuntimeContext::initialize(config, character).await?;

            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let definition: serde_json::Value = serde_json::from_str(&raw)?;

            let count = ctx
                .self_memory
                .import_character_knowledge(
                    ctx.llm.as_ref(),
                    &ctx.config.llm.model,
                    &definition,
                )
                .await
                .map_err(|err| anyhow::anyhow!("import failed: {err}"))?;
            println!("imported {count} knowledge facts");
            Ok(())
        }
    }
}

/// Adapter used by the worker process: it cannot reach the gateway, so every
/// send is refused and surfaces as a queued retry instead of a silent drop.
struct NullAdapter;

#[async_trait::async_trait]
impl whisperengine_messaging::MessagingAdapter for NullAdapter {
    async fn send_message(
        &self,
        _channel_id: &str,
        _content: &str,
        _reply_to: Option<&str>,
    ) -> Result<String, whisperengine_messaging::AdapterError> {
        Err(whisperengine_messaging::AdapterError::Gateway(
            "worker process has no gateway".to_string(),
        ))
    }
    async fn edit_message(
        &self,
        _c: &str,
        _m: &str,
        _t: &str,
    ) -> Result<(), whisperengine_messaging::AdapterError> {
        Err(whisperengine_messaging::AdapterError::Gateway(
            "worker process has no gateway".to_string(),
        ))
    }
    async fn add_reaction(
        &self,
        _c: &str,
        _m: &str,
        _e: &str,
    ) -> Result<(), whisperengine_messaging::AdapterError> {
        Err(whisperengine_messaging::AdapterError::Gateway(
            "worker process has no gateway".to_string(),
        ))
    }
    async fn fetch_recent_messages(
        &self,
        _c: &str,
        _l: usize,
    ) -> Result<Vec<whisperengine_messaging::MessageSnapshot>, whisperengine_messaging::AdapterError>
    {
        Ok(Vec::new())
    }
    async fn list_channels(
        &self,
    ) -> Result<Vec<whisperengine_messaging::ChannelInfo>, whisperengine_messaging::AdapterError>
    {
        Ok(Vec::new())
    }
    async fn trigger_typing(
        &self,
        _c: &str,
    ) -> Result<(), whisperengine_messaging::AdapterError> {
        Ok(())
    }
}
