//! ws-relay - CLI Entry Point

// Use mimalloc as global allocator for better p99 latency
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ws_relay::{Config, Relay, VERSION};

/// Config file tried when `--config` is not given
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(name = "ws-relay")]
#[command(version = VERSION)]
#[command(about = "WebSocket to TCP tunneling relay")]
struct Args {
    /// Path to configuration file (defaults to ./config.yaml when present)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Listen address (overrides config)
    #[arg(short = 'l', long = "listen")]
    listen: Option<String>,

    /// Bearer token required on upgrade requests (overrides config)
    #[arg(long = "secret")]
    secret: Option<String>,

    /// Fallback region, or AUTO (overrides config)
    #[arg(long = "region")]
    region: Option<String>,

    /// Test configuration and exit
    #[arg(short = 't', long = "test")]
    test: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    // Build optimized tokio runtime for many short-lived relay sessions
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get().max(2))
        .enable_all()
        .thread_name("ws-relay-worker")
        .build()?;

    runtime.block_on(async_main(args, config))
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_PATH).is_file() => Config::load(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("Failed to load configuration from {}", DEFAULT_CONFIG_PATH))?,
        None => Config::default(),
    };

    config.apply_env();

    if let Some(listen) = &args.listen {
        config.listen = listen.clone();
    }
    if let Some(secret) = &args.secret {
        config.secret = Some(secret.clone());
    }
    if let Some(region) = &args.region {
        config.fallback.region = region.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn async_main(args: Args, config: Config) -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("ws_relay={}", config.log_level).parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    info!("ws-relay v{}", VERSION);

    // Test mode
    if args.test {
        info!("Configuration test passed");
        return Ok(());
    }

    let relay = match Relay::new(config) {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to initialize relay: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = relay.run().await {
        error!("Relay error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
