use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use kvstore::{ConcurrentStore, StoreServer, cli::Cli};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let store = match &cli.store {
        Some(path) => ConcurrentStore::with_persistence(path)
            .with_context(|| format!("failed to load snapshot {}", path.display()))?,
        None => ConcurrentStore::new(),
    };

    let listener = TcpListener::bind(cli.listen).await?;
    let server = StoreServer::new(listener, Arc::new(store));
    let addr = server.local_addr()?;
    info!("kvstore listening on {}", addr);
    if let Err(err) = server.run_until_ctrl_c().await {
        warn!("kvstore exited with error: {err:?}");
        return Err(err);
    }

    Ok(())
}
