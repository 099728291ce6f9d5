use std::net::SocketAddr;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Func event dispatcher for Warble", long_about = None)]
pub struct Cli {
    /// Socket address the service should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:50001")]
    pub listen: SocketAddr,

    /// Address of a running kvstore. Without it the service keeps its data in
    /// memory, in process.
    #[arg(long)]
    pub kvstore: Option<SocketAddr>,

    /// Hook events 1 through 6 to register, warble, follow, read, profile and
    /// stream at startup.
    #[arg(long)]
    pub hook_defaults: bool,
}
