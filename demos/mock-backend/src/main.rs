//! Synthetic SubVT backend.
//!
//! Serves the network status, validator list and validator details feeds on
//! one WebSocket port, producing a block every tick:
//!   cargo run -p subvt-mock-backend -- --port 7888 --tick-ms 2000
//!
//! The CLI's built-in `local` network points here.

mod chain;
mod server;

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "subvt-mock-backend")]
#[command(about = "Serve synthetic SubVT feeds over WebSocket")]
struct Args {
    /// Port to listen on (127.0.0.1)
    #[arg(long, env = "SUBVT_MOCK_PORT", default_value_t = 7888)]
    port: u16,

    /// Block time in milliseconds
    #[arg(long, env = "SUBVT_MOCK_TICK_MS", default_value_t = 2000)]
    tick_ms: u64,

    /// Number of validators
    #[arg(long, default_value_t = 16)]
    validators: usize,

    /// How many of them are in the active set
    #[arg(long, default_value_t = 10)]
    active: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("subvt_mock_backend=info".parse()?),
        )
        .init();

    let args = Args::parse();
    anyhow::ensure!(
        args.active <= args.validators,
        "active set ({}) larger than validator count ({})",
        args.active,
        args.validators
    );
    anyhow::ensure!(args.tick_ms > 0, "tick must be positive");

    let addr: SocketAddr = ([127, 0, 0, 1], args.port).into();
    tracing::info!(
        validators = args.validators,
        active = args.active,
        tick_ms = args.tick_ms,
        "Starting mock backend on {}",
        addr
    );

    server::run(
        addr,
        Duration::from_millis(args.tick_ms),
        chain::Chain::new(args.validators, args.active),
    )
    .await
}
