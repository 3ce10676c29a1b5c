use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use trackgate::config::Config;
use trackgate::daemon;

#[derive(Parser)]
#[command(about = "Telemetry gateway client: reports position fixes and camera snapshots to a tracking server")]
struct Args {
    /// path to the YAML configuration file
    #[arg(long, default_value = "trackgate.yml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let raw = std::fs::read_to_string(&args.config)
        .with_context(|| format!("cannot read config file {}", args.config.display()))?;
    let config: Config = serde_yaml_ng::from_str(&raw)
        .with_context(|| format!("cannot parse config file {}", args.config.display()))?;
    config.validate()?;

    daemon::run(config).await;
    Ok(())
}
