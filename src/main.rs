use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::TurnstileConfig;
use turnstile::http::HttpServer;
use turnstile::ratelimit::{spawn_eviction_task, LimiterRegistry, Quota};

/// Command line arguments. Flags override the config file and environment.
#[derive(Parser, Debug)]
#[command(name = "turnstile")]
#[command(version, about = "Per-client sliding window rate limiting service")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Requests allowed per client within one window
    #[arg(long)]
    limit: Option<u64>,

    /// Window length in seconds
    #[arg(long)]
    window: Option<u64>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn apply(&self, config: &mut TurnstileConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(limit) = self.limit {
            config.rate_limiting.limit = limit;
        }
        if let Some(window) = self.window {
            config.rate_limiting.window_secs = window;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    info!("Starting Turnstile");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = TurnstileConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    let rate_limiting = &config.rate_limiting;
    let quota = Quota::new(rate_limiting.limit, rate_limiting.window());
    info!(
        addr = %config.listen_addr(),
        limit = quota.limit,
        window_secs = rate_limiting.window_secs,
        "Configuration loaded"
    );

    let registry = Arc::new(LimiterRegistry::new());

    let sweeper = match rate_limiting.sweep_interval() {
        Some(every) => Some(spawn_eviction_task(
            Arc::clone(&registry),
            quota.window,
            rate_limiting.idle_ttl(),
            every,
        )),
        None => {
            info!("Idle counter eviction disabled");
            None
        }
    };

    let server = HttpServer::new(config.listen_addr(), registry, quota);
    server.serve_with_shutdown(shutdown_signal()).await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    info!("Turnstile stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
