//! Tether daemon.
//!
//! Keeps one Discord gateway session alive and fans its events out to the
//! configured handlers. If the session cannot be recovered the process exits
//! non-zero; restarting it is the service manager's job.
//!
//!   DISCORD_TOKEN=... tether-daemon --config tether.toml

mod config;
mod handlers;

use clap::Parser;
use config::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tether_connector_discord::DiscordConnector;
use tether_core::{Dispatcher, ProcessExit, Supervisor, Terminator};
use tracing_subscriber::EnvFilter;

/// Crates that log too much below `warn` to be useful by default.
const NOISY: [&str; 2] = ["twilight_gateway", "rustls"];

#[derive(Debug, Parser)]
#[command(name = "tether-daemon", version, about)]
struct Args {
    /// Path to a TOML config file.
    #[arg(long, env = "TETHER_CONFIG")]
    config: Option<PathBuf>,
    /// Bot token. Overrides `token` in the config file.
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Log filter used when RUST_LOG is unset.
    #[arg(long)]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(token) = args.token {
        config.token = token;
    }
    if let Some(filter) = args.log_filter {
        config.log_filter = filter;
    }
    config.validate()?;

    init_tracing(&config.log_filter)?;

    let terminator: Arc<dyn Terminator> = Arc::new(ProcessExit::default());
    let registry = Arc::new(handlers::compose(&config.handlers.disabled));
    tracing::info!(?registry, "Handlers composed");
    let dispatcher = Dispatcher::new(registry, terminator.clone());

    let (connector, transport) = DiscordConnector::new(config.token.clone())?;
    let supervisor = Supervisor::spawn(Arc::new(transport), terminator, config.supervisor());

    tokio::select! {
        result = connector.run(supervisor, dispatcher) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted, shutting down"),
    }
    Ok(())
}

fn init_tracing(default_filter: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let mut filter = EnvFilter::try_new(default_filter)?;
            for target in NOISY {
                filter = filter.add_directive(format!("{target}=warn").parse()?);
            }
            filter
        }
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}
