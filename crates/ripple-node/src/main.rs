//! Ripple node binary
//!
//! Speaks the line-delimited JSON protocol on stdin/stdout. Logs go to stderr.

use ripple_node::NodeConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries protocol messages, so logs must stay on stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ripple_node=info,ripple_protocols=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();

    let config = NodeConfig::from_env()?;
    tracing::info!("Starting ripple node");

    ripple_node::stdio::run(config).await?;

    Ok(())
}
