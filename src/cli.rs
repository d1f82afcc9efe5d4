//! Command line interface for the chat room server binary.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `chatframe` binary.
#[derive(Debug, Parser)]
#[command(name = "chatframe", version, about = "Framed TCP chat room server")]
pub struct Cli {
    /// Address to listen on.
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Seconds between heartbeat monitor sweeps.
    #[arg(long, default_value_t = 10)]
    pub sweep_period: u64,

    /// Seconds of heartbeat silence before a session is evicted.
    #[arg(long, default_value_t = 20)]
    pub heartbeat_timeout: u64,

    /// Number of history events replayed to a fresh login.
    #[arg(long, default_value_t = 10)]
    pub history_replay: usize,
}
