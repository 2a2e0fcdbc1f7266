//! Throttled link relay.
//!
//! Listens for TCP clients and relays each one to an upstream over a link
//! limited to a byte budget per time quantum.
//!
//! ```text
//!     client ──▶ listener ──▶ relay ──▶ ThrottledConn ──▶ upstream
//!                                        (paced both ways)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;

use throttled_link::config::{load_config, validate_config, ConfigError, ConfigWatcher, LinkConfig};
use throttled_link::lifecycle::{wait_for_signal, Shutdown};
use throttled_link::net::Listener;
use throttled_link::observability::{logging, metrics};
use throttled_link::RelayServer;

#[derive(Parser, Debug, Clone)]
#[command(name = "throttled-link")]
#[command(about = "Relay TCP connections over a bandwidth-limited link", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides [listener].bind_address
    #[arg(long)]
    listen: Option<String>,

    /// Upstream address, overrides [upstream].address
    #[arg(long)]
    upstream: Option<String>,

    /// Bytes per quantum in each direction, overrides [throttle].rate_budget
    #[arg(long)]
    rate: Option<u64>,

    /// Quantum length in milliseconds, overrides [throttle].quantum_ms
    #[arg(long)]
    quantum_ms: Option<u64>,

    /// Reload the configuration file when it changes
    #[arg(long, requires = "config")]
    watch: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut LinkConfig) {
        if let Some(listen) = &self.listen {
            config.listener.bind_address = listen.clone();
        }
        if let Some(upstream) = &self.upstream {
            config.upstream.address = upstream.clone();
        }
        if let Some(rate) = self.rate {
            config.throttle.rate_budget = rate;
        }
        if let Some(quantum_ms) = self.quantum_ms {
            config.throttle.quantum_ms = quantum_ms;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => LinkConfig::default(),
    };
    cli.apply_overrides(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "throttled-link starting");

    let settings = config.throttle.settings();
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        outbound_budget = settings.outbound_budget,
        inbound_budget = settings.inbound_budget,
        quantum_ms = config.throttle.quantum_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    // Keep the watcher handle alive for the life of the relay.
    let (_watcher, config_updates) = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, mut reloaded) = ConfigWatcher::new(path);
            let handle = watcher.run()?;
            let (tx, updates) = mpsc::unbounded_channel();
            let overrides = cli.clone();
            tokio::spawn(async move {
                while let Some(mut new_config) = reloaded.recv().await {
                    overrides.apply_overrides(&mut new_config);
                    if let Err(errors) = validate_config(&new_config) {
                        tracing::error!(
                            error = %ConfigError::Validation(errors),
                            "Reloaded config rejected after overrides"
                        );
                        continue;
                    }
                    if tx.send(new_config).is_err() {
                        break;
                    }
                }
            });
            (Some(handle), updates)
        }
        _ => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = Listener::bind(&config.listener).await?;
    let shutdown = Shutdown::new();
    let server = RelayServer::new(config);

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(name) => {
                tracing::info!(signal = name, "Shutdown signal received");
                signal_shutdown.trigger();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signals"),
        }
    });

    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
