//! tokbuk Daemon - Rate-limited HTTP admission service
//!
//! This binary loads the YAML configuration, applies command-line
//! overrides, and serves:
//! - The rate-limited route (`200 allowed` / `429 rate limit exceeded`)
//! - The Prometheus `/metrics` endpoint, when enabled
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! Both servers share one `CancellationToken`; when a signal arrives they
//! stop accepting connections and the process exits.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokbuk_core::BucketRegistry;
use tokbuk_http::{AdmissionServer, HeaderKey, PeerIp, RateLimit, StaticKey};
use tokbuk_telemetry::{MetricsRegistry, MetricsServer};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;

use config::{Config, ConfigBuilder, KeyStrategy, LogFormat, LoggingConfig};

// ============================================================================
// Command line
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "tokbukd", version, about = "Per-client token bucket rate limiter")]
struct Cli {
    /// Use alternate config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address of the rate-limited endpoint, e.g. 0.0.0.0:8080
    #[arg(long)]
    listen: Option<String>,

    /// Path of the rate-limited route
    #[arg(long)]
    route: Option<String>,

    /// Burst allowance per client
    #[arg(long)]
    capacity: Option<u64>,

    /// Tokens regained per second
    #[arg(long)]
    rate: Option<f64>,

    /// Identify clients by this header instead of their IP address
    #[arg(long, value_name = "HEADER")]
    key_header: Option<String>,

    /// Address of the Prometheus endpoint
    #[arg(long)]
    metrics_listen: Option<String>,

    /// Do not serve /metrics
    #[arg(long)]
    no_metrics: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    /// Layers the flags that were given over `config`.
    fn apply(&self, config: Config) -> ConfigBuilder {
        let mut builder = ConfigBuilder::from_config(config);

        if let Some(listen) = &self.listen {
            builder = builder.server_listen(listen);
        }
        if let Some(route) = &self.route {
            builder = builder.server_route(route);
        }
        if let Some(capacity) = self.capacity {
            builder = builder.rate_limit_capacity(capacity);
        }
        if let Some(rate) = self.rate {
            builder = builder.rate_limit_rate(rate);
        }
        if let Some(header) = &self.key_header {
            builder = builder.rate_limit_header(header);
        }
        if let Some(listen) = &self.metrics_listen {
            builder = builder.metrics_listen(listen);
        }
        if self.no_metrics {
            builder = builder.metrics_enabled(false);
        }
        if self.json_logs {
            builder = builder.logging_format(LogFormat::Json);
        }
        match self.verbose {
            0 => {}
            1 => builder = builder.logging_level("debug"),
            _ => builder = builder.logging_level("trace"),
        }

        builder
    }
}

/// Reads the file named by `--config`, or the default path if it exists.
fn load_config(explicit: Option<&PathBuf>) -> Result<Config> {
    let path = match explicit {
        Some(path) => path.clone(),
        None => {
            let path = Config::default_path();
            if !path.exists() {
                return Ok(Config::default());
            }
            path
        }
    };

    Config::load(&path).with_context(|| format!("Failed to load config from {}", path.display()))
}

// ============================================================================
// Tracing
// ============================================================================

fn init_tracing(logging: &LoggingConfig) {
    // RUST_LOG wins over the configured level.
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init(),
    }
}

// ============================================================================
// Daemon
// ============================================================================

/// Builds the admission policy for the configured key strategy.
fn build_policy(config: &Config, registry: Arc<BucketRegistry>) -> Result<RateLimit> {
    let limits = &config.rate_limit;
    let policy = match limits.key {
        KeyStrategy::PeerIp => RateLimit::new(registry, limits.capacity, limits.rate, PeerIp)?,
        KeyStrategy::Header => {
            let extractor = HeaderKey::new(&limits.header_name)
                .with_context(|| format!("Invalid header name '{}'", limits.header_name))?;
            RateLimit::new(registry, limits.capacity, limits.rate, extractor)?
        }
        KeyStrategy::Static => RateLimit::new(
            registry,
            limits.capacity,
            limits.rate,
            StaticKey::new(limits.static_key.as_str()),
        )?,
    };
    Ok(policy)
}

/// The running service: the limited endpoint plus optional metrics.
struct Daemon {
    admission: AdmissionServer,
    metrics: Option<MetricsServer>,
}

impl Daemon {
    fn new(config: &Config) -> Result<Self> {
        let registry = Arc::new(BucketRegistry::new());
        let mut policy = build_policy(config, registry)?;

        let metrics = if config.metrics.enabled {
            let registry = Arc::new(MetricsRegistry::new().context("Failed to create metrics")?);
            policy = policy.with_metrics(Arc::clone(&registry));
            Some(MetricsServer::new(registry, &config.metrics.listen)?)
        } else {
            None
        };

        let admission =
            AdmissionServer::new(Arc::new(policy), &config.server.listen, &config.server.route)?;

        Ok(Self { admission, metrics })
    }

    /// Binds every endpoint, then serves until `shutdown` is cancelled or
    /// either server fails.
    ///
    /// A bind failure is returned before anything is served. Whichever
    /// server stops first cancels `shutdown` so the other follows.
    async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let admission_listener = self.admission.bind().await?;
        let metrics_listener = match &self.metrics {
            Some(server) => Some(server.bind().await?),
            None => None,
        };

        let admission = async {
            let result = self
                .admission
                .serve(admission_listener, shutdown.clone())
                .await;
            shutdown.cancel();
            result.context("Admission server failed")
        };

        let metrics = async {
            let (Some(server), Some(listener)) = (&self.metrics, metrics_listener) else {
                return Ok(());
            };
            let result = server.serve(listener, shutdown.clone()).await;
            shutdown.cancel();
            result.context("Metrics server failed")
        };

        tokio::try_join!(admission, metrics)?;
        Ok(())
    }
}

/// Waits for SIGINT or SIGTERM, then cancels `token`.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match cli.apply(load_config(cli.config.as_ref())?).build_validated() {
        Ok(config) => config,
        Err(errors) => {
            for e in &errors {
                eprintln!("config error: {e}");
            }
            anyhow::bail!("Invalid configuration ({} error(s))", errors.len());
        }
    };

    if cli.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    init_tracing(&config.logging);
    info!(
        capacity = config.rate_limit.capacity,
        rate = config.rate_limit.rate,
        key = ?config.rate_limit.key,
        "tokbuk daemon starting (tokbukd)"
    );

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let result = Daemon::new(&config)?.run(shutdown_token).await;

    match &result {
        Ok(()) => info!("tokbuk daemon shut down gracefully"),
        Err(e) => error!(error = %e, "tokbuk daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
