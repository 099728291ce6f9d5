use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use kvstore::{ConcurrentStore, Storage, StoreClient};
use tokio::net::TcpListener;
use tracing::{info, warn};
use warble::WarbleService;

use func::{Dispatcher, FuncServer, cli::Cli};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let storage: Arc<dyn Storage> = match cli.kvstore {
        Some(addr) => {
            info!(%addr, "using remote kvstore");
            Arc::new(StoreClient::new(addr))
        }
        None => {
            info!("using in-process store");
            Arc::new(ConcurrentStore::new())
        }
    };

    let dispatcher = Dispatcher::new(WarbleService::new(), storage);
    if cli.hook_defaults {
        dispatcher.install_default_hooks();
    }

    let listener = TcpListener::bind(cli.listen).await?;
    let server = FuncServer::new(listener, Arc::new(dispatcher));
    let addr = server.local_addr()?;
    info!("func listening on {}", addr);
    if let Err(err) = server.run_until_ctrl_c().await {
        warn!("func exited with error: {err:?}");
        return Err(err);
    }

    Ok(())
}
