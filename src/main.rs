use anyhow::Result;
use clap::Parser;
use fittrack_accounts::{config::Config, gateway};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

/// Account and credential service for the FitTrack tracker.
#[derive(Parser, Debug)]
#[command(name = "fittrack-accounts", version, about)]
struct Cli {
    /// Path to a TOML config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Database connection string, e.g. sqlite://fittrack.db
    #[arg(long)]
    database_url: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.gateway.host = host;
        }
        if let Some(port) = self.port {
            config.gateway.port = port;
        }
        if let Some(url) = self.database_url {
            config.storage.database_url = Some(url);
        }
    }
}

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    gateway::run_gateway(config).await
}
