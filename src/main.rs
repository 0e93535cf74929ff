//! Authority gateway client CLI.
//!
//! ```text
//!   authority-gateway [--config FILE] [--gateway URL] <command>
//!
//!   authorities [--refresh]   list known authorities
//!   authority <name>          show one authority
//!   ping <name>               probe one authority
//!   ping-all                  probe every authority concurrently
//!   health                    gateway /health body
//!   metrics                   client metrics after a discovery round
//!   watch                     run background monitors until Ctrl-C
//! ```

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use authority_gateway::config::{load_config, ClientConfig};
use authority_gateway::lifecycle::shutdown_signal;
use authority_gateway::observability::{logging, metrics};
use authority_gateway::AuthorityClient;

#[derive(Parser)]
#[command(name = "authority-gateway")]
#[command(about = "Resilient client for authorities behind a gateway bridge", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the gateway base URL.
    #[arg(short, long)]
    gateway: Option<String>,

    /// Override the log level.
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List known authorities
    Authorities {
        /// Bypass the discovery cache
        #[arg(long)]
        refresh: bool,
    },
    /// Show a single authority
    Authority { name: String },
    /// Probe one authority through the gateway
    Ping { name: String },
    /// Probe every authority concurrently
    PingAll,
    /// Query the gateway health endpoint
    Health,
    /// Print client metrics after one discovery round
    Metrics,
    /// Run discovery and health monitors until interrupted
    Watch {
        /// Seconds between metric log lines
        #[arg(long, default_value_t = 30)]
        report_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };
    if let Some(url) = cli.gateway {
        config.gateway.base_url = url;
    }
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    logging::init_logging(&config.observability.log_level);

    let watching = matches!(cli.command, Commands::Watch { .. });
    if !watching {
        // One-shot commands must not leave monitors probing behind them.
        config.discovery.background_refresh = false;
        config.health_check.enabled = false;
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let client = AuthorityClient::new(config)?;
    client.start().await?;
    let outcome = run(&client, cli.command).await;
    client.stop().await;
    outcome
}

async fn run(client: &AuthorityClient, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Authorities { refresh } => {
            let authorities = if refresh {
                client.force_refresh().await?
            } else {
                client.get_authorities().await?
            };
            print_json(&authorities)?;
        }
        Commands::Authority { name } => match client.get_authority(&name).await? {
            Some(record) => print_json(&record)?,
            None => return Err(format!("authority {} not found", name).into()),
        },
        Commands::Ping { name } => {
            print_json(&client.ping_authority(&name).await?)?;
        }
        Commands::PingAll => {
            print_json(&client.ping_all().await?)?;
        }
        Commands::Health => {
            print_json(&client.gateway_health().await?)?;
        }
        Commands::Metrics => {
            if let Err(e) = client.discover().await {
                tracing::warn!(error = %e, "Discovery failed before metrics snapshot");
            }
            print_json(&client.get_metrics())?;
        }
        Commands::Watch { report_secs } => {
            let mut ticker = tokio::time::interval(Duration::from_secs(report_secs.max(1)));
            let shutdown = shutdown_signal();
            tokio::pin!(shutdown);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let snapshot = client.get_metrics();
                        tracing::info!(
                            requests = snapshot.requests.total,
                            success_rate = snapshot.requests.success_rate,
                            cache_hit_rate = snapshot.cache.hit_rate,
                            breaker = ?snapshot.circuit_breaker.state,
                            authorities = snapshot.authorities.known,
                            online = snapshot.authorities.online,
                            "Client metrics"
                        );
                    }
                    _ = &mut shutdown => break,
                }
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
