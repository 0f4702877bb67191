use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use voicebridge::config::Config;
use voicebridge::gateway;
use voicebridge::relay::session::Session;

/// Two-party live speech translation relay.
#[derive(Debug, Parser)]
#[command(name = "voicebridge", version, about)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file.
    #[arg(long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("voicebridge=info")),
        )
        .init();

    let cli = Cli::parse();

    // Config problems are the only fatal errors: abort before any channel
    // or socket exists.
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }

    let session = Session::start(&config);
    gateway::serve(config.listen, &session).await
}
