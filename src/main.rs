mod activity;
mod api;
mod gateway;
mod keepalive;
#[cfg(test)]
mod testing;

use activity::ActivityTracker;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::warn;
use vigil_core::config::{self, Config};
use vigil_liveness::{LifecycleState, Reconciler};
use vigil_platform::{CloudTasksClient, HelixClient};

#[derive(Parser)]
#[command(
    name = "vigil",
    version,
    about = "Vigil: stream liveness tracking and keep-warm scheduling"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml", env = "VIGIL_CONFIG")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook and keep-alive server.
    Start,
    /// Print the effective configuration (secrets redacted).
    Status,
    /// Ask the stream API directly which channels are live.
    Reconcile {
        /// Channel login to check. Repeatable.
        #[arg(long = "channel", required = true)]
        channels: Vec<String>,
    },
}

fn init_logging(cfg: &Config) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.vigil.log_level)),
        )
        .init();
}

fn helix_client(cfg: &Config) -> anyhow::Result<HelixClient> {
    if cfg.helix.client_id.is_empty() || cfg.helix.client_secret.is_empty() {
        anyhow::bail!(
            "helix.client_id and helix.client_secret must be set. \
             Set them in config.toml or the secret via {}.",
            config::ENV_HELIX_CLIENT_SECRET
        );
    }
    Ok(HelixClient::new(
        cfg.helix.clone(),
        cfg.liveness.request_timeout(),
    )?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;
    init_logging(&cfg);
    for warning in cfg.validate() {
        warn!("config: {warning}");
    }

    match cli.command {
        Commands::Start => {
            let source = Arc::new(helix_client(&cfg)?);
            let scheduler = Arc::new(CloudTasksClient::new(
                cfg.tasks.clone(),
                cfg.liveness.request_timeout(),
            )?);

            println!("{}: starting", cfg.vigil.name);
            let gw = Arc::new(gateway::Gateway::new(cfg, source, scheduler));
            gw.run().await?;
        }
        Commands::Status => {
            println!("{}: status\n", cfg.vigil.name);
            println!("Config: {}", cli.config);
            println!("{}", serde_json::to_string_pretty(&cfg.redacted())?);

            let warnings = cfg.validate();
            if !warnings.is_empty() {
                println!();
                for warning in warnings {
                    println!("  warning: {warning}");
                }
            }
        }
        Commands::Reconcile { channels } => {
            let source = Arc::new(helix_client(&cfg)?);
            let activity = Arc::new(ActivityTracker::new(&cfg.channels));
            let reconciler = Reconciler::new(
                Arc::new(LifecycleState::new()),
                source,
                activity.clone(),
                activity,
                &cfg.liveness,
            );

            let live = reconciler.direct_check(&channels).await?;
            for channel in &channels {
                let channel = channel.trim().to_lowercase();
                let status = if live.contains(&channel) {
                    "live"
                } else {
                    "offline"
                };
                println!("  {channel}: {status}");
            }
        }
    }

    Ok(())
}
