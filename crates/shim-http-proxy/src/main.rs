use anyhow::Context;
use clap::Parser;
use shim_http_proxy::{ChatCompletionGenerator, Config, ProxyServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shim", version, about = "Mock JSON for upstream endpoints that do not exist yet")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "SHIM_CONFIG", default_value = "shim.yaml")]
    config: PathBuf,

    /// Override the listen port from the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Verbose logging (ignored when RUST_LOG is set)
    #[arg(short, long)]
    debug: bool,

    /// Chat model used to generate mock payloads
    #[arg(long, env = "AI_MODEL")]
    ai_model: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "AI_SERVICE_URL")]
    ai_service_url: Option<String>,

    /// API key for the generator backend
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(port) = self.port {
            config.listen.port = port;
        }
        if self.debug {
            config.debug = true;
        }
        if let Some(model) = self.ai_model {
            config.generator.model = model;
        }
        if let Some(url) = self.ai_service_url {
            config.generator.base_url = url;
        }
        if let Some(key) = self.api_key {
            config.generator.api_key = Some(key);
        }
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    args.apply(&mut config);
    init_tracing(config.debug);

    if config.generator.api_key.is_none() {
        tracing::warn!("No generator API key configured; mock generation may be rejected");
    }

    let generator = ChatCompletionGenerator::new(config.generator.clone())
        .context("Failed to create mock generator")?;
    info!(
        "Mock generator: {} (model: {})",
        generator.endpoint(),
        config.generator.model
    );

    let mut server = ProxyServer::new(config, Arc::new(generator))?;
    server.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    server.stop().await;

    Ok(())
}
