//! CLI command implementations

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;
use streamgate_core::StreamOrchestrator;
use streamgate_core::config::StreamGateConfig;
use streamgate_core::fanout::FanOutExecutor;
use streamgate_core::tracing_setup::{CliLogLevel, init_tracing};
use streamgate_core::upstream::{RestContentClient, RestEntitlementClient};
use tracing::info;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the streaming server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,
        /// Base directory for media files
        #[arg(long)]
        media_root: Option<PathBuf>,
        /// Content management service base URL
        #[arg(long)]
        content_url: Option<String>,
        /// Subscription service base URL
        #[arg(long)]
        entitlement_url: Option<String>,
        /// Console log level
        #[arg(long, default_value = "info")]
        log_level: CliLogLevel,
    },
    /// Probe the sibling services this instance depends on
    Check {
        /// Content management service base URL
        #[arg(long)]
        content_url: Option<String>,
        /// Subscription service base URL
        #[arg(long)]
        entitlement_url: Option<String>,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Serve {
            host,
            port,
            media_root,
            content_url,
            entitlement_url,
            log_level,
        } => {
            serve(
                host,
                port,
                media_root,
                content_url,
                entitlement_url,
                log_level,
            )
            .await
        }
        Commands::Check {
            content_url,
            entitlement_url,
        } => check_upstreams(content_url, entitlement_url).await,
    }
}

/// Start the streaming server with config from environment plus flags.
async fn serve(
    host: String,
    port: u16,
    media_root: Option<PathBuf>,
    content_url: Option<String>,
    entitlement_url: Option<String>,
    log_level: CliLogLevel,
) -> anyhow::Result<()> {
    init_tracing(log_level.as_tracing_level(), None)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let mut config = StreamGateConfig::from_env();
    if let Some(root) = media_root {
        config.streaming.media_root = root;
    }
    if let Some(url) = content_url {
        config.upstream.content_base_url = url;
    }
    if let Some(url) = entitlement_url {
        config.upstream.entitlement_base_url = url;
    }

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;

    let content = RestContentClient::new(&config.upstream)
        .context("building content service client")?;
    let entitlement = RestEntitlementClient::new(&config.upstream)
        .context("building subscription service client")?;

    let executor = FanOutExecutor::new(&config.fanout);
    let orchestrator = Arc::new(StreamOrchestrator::new(
        executor.handle(),
        Arc::new(content),
        Arc::new(entitlement),
        &config,
    ));

    info!(
        media_root = %config.streaming.media_root.display(),
        content_url = %config.upstream.content_base_url,
        entitlement_url = %config.upstream.entitlement_base_url,
        "Starting StreamGate"
    );

    let result = streamgate_web::run_server(addr, orchestrator).await;

    // Drain the pool before reporting the server result.
    executor.shutdown().await;

    result.map_err(|e| anyhow::anyhow!("server error: {e}"))
}

/// Probe both sibling services and report reachability.
async fn check_upstreams(
    content_url: Option<String>,
    entitlement_url: Option<String>,
) -> anyhow::Result<()> {
    let mut config = StreamGateConfig::from_env();
    if let Some(url) = content_url {
        config.upstream.content_base_url = url;
    }
    if let Some(url) = entitlement_url {
        config.upstream.entitlement_base_url = url;
    }

    let client = reqwest::Client::builder()
        .connect_timeout(config.upstream.connect_timeout)
        .timeout(config.upstream.request_timeout)
        .build()
        .context("building probe client")?;

    let mut all_reachable = true;
    for (name, base) in [
        ("content service", &config.upstream.content_base_url),
        ("subscription service", &config.upstream.entitlement_base_url),
    ] {
        match client.get(base.clone()).send().await {
            Ok(response) => {
                println!("{name}: reachable at {base} (status {})", response.status());
            }
            Err(e) => {
                println!("{name}: UNREACHABLE at {base} ({e})");
                all_reachable = false;
            }
        }
    }

    if all_reachable {
        Ok(())
    } else {
        anyhow::bail!("one or more sibling services are unreachable")
    }
}
