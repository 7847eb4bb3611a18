// Bolhousie node: rendezvous relay, game host and player over TCP.

mod audio;
mod channel;
mod config;
mod host;
mod player;
mod server;
mod transport;

use anyhow::Context;
use bolhousie_core::{Catalog, PeerId};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

const BUNDLED_CATALOG: &str = include_str!("../data/brands.json");

#[derive(Parser, Debug)]
#[command(name = "bolhousie", version, about = "Brand-tagline bingo over a rendezvous relay")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the rendezvous relay.
    Rendezvous {
        /// Listen port (default: configured peer port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Host a game; prints the game ID players join with.
    Host,
    /// Join a game.
    Play {
        /// Game ID printed by the host
        #[arg(long)]
        host_id: String,
        /// Display name
        #[arg(long)]
        name: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load();
    tracing::debug!(?cfg, "config loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let work = async {
            match cli.command {
                Command::Rendezvous { port } => {
                    let port = port.unwrap_or(cfg.peer_port);
                    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
                        .await
                        .with_context(|| format!("binding rendezvous port {port}"))?;
                    server::run_relay(listener, cfg.peer_secure).await?;
                    Ok::<(), anyhow::Error>(())
                }
                Command::Host => host::run(&cfg, load_catalog(&cfg)?).await,
                Command::Play { host_id, name } => {
                    let name = match name.trim() {
                        "" => bolhousie_core::session::DEFAULT_PLAYER_NAME.to_string(),
                        n => n.to_string(),
                    };
                    player::run(&cfg, load_catalog(&cfg)?, PeerId::from(host_id.trim()), name).await
                }
            }
        };
        tokio::select! {
            r = work => r,
            r = shutdown_signal() => {
                tracing::info!("shutting down");
                r
            }
        }
    })
}

fn load_catalog(cfg: &config::Config) -> anyhow::Result<Catalog> {
    let catalog = match &cfg.catalog {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading catalog {}", path.display()))?;
            Catalog::from_json(&json).with_context(|| format!("parsing catalog {}", path.display()))?
        }
        None => Catalog::from_json(BUNDLED_CATALOG).context("parsing bundled catalog")?,
    };
    tracing::info!(items = catalog.len(), "catalog loaded");
    Ok(catalog)
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
