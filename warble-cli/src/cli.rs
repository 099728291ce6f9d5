use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};
use func::EventType;

#[derive(Parser, Debug)]
#[command(name = "warble", author, version, about = "Talk to Warble through the Func service", long_about = None)]
pub struct Cli {
    /// Address of the Func service.
    #[arg(long, global = true, default_value = "127.0.0.1:50001")]
    pub server: SocketAddr,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bind an event type to a function name.
    Hook(HookArgs),
    /// Remove the function bound to an event type.
    Unhook(UnhookArgs),
    /// Register a new user.
    Register(RegisterArgs),
    /// Post a warble, optionally as a reply.
    Warble(WarbleArgs),
    /// Follow another user.
    Follow(FollowArgs),
    /// Read a warble and its replies.
    Read(ReadArgs),
    /// Show a user's followers and followings.
    Profile(ProfileArgs),
    /// Print new warbles with a hashtag as they arrive, until interrupted.
    Stream(StreamArgs),
}

#[derive(Args, Debug, Clone)]
pub struct HookArgs {
    pub event_type: EventType,
    /// One of register, warble, follow, read, profile or stream.
    pub function: String,
}

#[derive(Args, Debug, Clone)]
pub struct UnhookArgs {
    pub event_type: EventType,
}

#[derive(Args, Debug, Clone)]
pub struct RegisterArgs {
    pub username: String,
}

#[derive(Args, Debug, Clone)]
pub struct WarbleArgs {
    /// Author of the warble.
    #[arg(long)]
    pub user: String,

    pub text: String,

    /// Id of the warble this one replies to.
    #[arg(long)]
    pub reply: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct FollowArgs {
    /// User who starts following.
    #[arg(long)]
    pub user: String,

    pub to_follow: String,
}

#[derive(Args, Debug, Clone)]
pub struct ReadArgs {
    pub warble_id: String,
}

#[derive(Args, Debug, Clone)]
pub struct ProfileArgs {
    #[arg(long)]
    pub user: String,
}

#[derive(Args, Debug, Clone)]
pub struct StreamArgs {
    /// Tag to follow, without the leading `#`.
    pub hashtag: String,

    /// Seconds between polls.
    #[arg(long, default_value_t = 5)]
    pub interval_secs: u64,
}
