use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use valvedevice::{DEFAULT_BIND, DeviceServer};

/// Valve device simulator
#[derive(Parser, Debug)]
#[command(name = "vd")]
#[command(author, version, about = "Irrigation valve device simulator", long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = DEFAULT_BIND)]
    bind: String,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", default_value = "INFO")]
    log_level: String,
}

fn setup_logging(level: &str) -> Result<()> {
    let level: tracing::Level = level
        .parse()
        .map_err(|_| eyre::eyre!("Unknown log-level '{}'", level))?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level).context("Failed to setup logging")?;

    let server = DeviceServer::bind(cli.bind.as_str()).await?;
    info!(addr = %server.local_addr()?, "valve device starting");

    let valve = server
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!(state = %valve.state(), actuations = valve.journal().len(), "valve device stopped");
    Ok(())
}
