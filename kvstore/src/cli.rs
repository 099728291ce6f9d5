use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Key-value store server", long_about = None)]
pub struct Cli {
    /// Socket address the store should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:50000")]
    pub listen: SocketAddr,

    /// Snapshot file to load at startup and write on shutdown.
    /// Without it the store lives in memory only.
    #[arg(long)]
    pub store: Option<PathBuf>,
}
