//! tagwire relay binary.
//!
//! Usage:
//!
//!   tagwire-server [--listen ADDR] [--master-key HEX] [--participant NAME]...
//!
//! Logging is controlled with `RUST_LOG` (default `info`).

use clap::Parser;

use tagwire_server::{serve, ServerArgs, ServerConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = ServerArgs::parse();
    let config = ServerConfig::from_args(&args);

    if config.master_key.is_none() {
        tracing::warn!("no master key configured; generated one for this run only");
    }

    if let Err(e) = serve(args.listen, config).await {
        tracing::error!("relay error: {e}");
        std::process::exit(1);
    }
}
