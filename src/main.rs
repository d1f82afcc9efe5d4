//! Chat room server binary wiring the in-memory stores to the runtime.

mod cli;

use std::{sync::Arc, time::Duration};

use chatframe::{
    ChatServer, ServerConfig, ServerError,
    store::{MemoryAuthStore, MemoryHistoryStore, MemoryRankStore},
};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // Structured logging for the standalone server; embedders install
    // their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    let config = ServerConfig {
        bind_addr: cli.bind,
        heartbeat_period: Duration::from_secs(cli.sweep_period),
        heartbeat_timeout: Duration::from_secs(cli.heartbeat_timeout),
        history_replay: cli.history_replay,
        ..ServerConfig::default()
    };

    let server = ChatServer::new(
        config,
        Arc::new(MemoryAuthStore::new()),
        Arc::new(MemoryHistoryStore::new()),
        Arc::new(MemoryRankStore::new()),
    );
    server.run().await
}
