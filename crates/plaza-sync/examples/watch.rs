//! Tail one user's session: connect, catch up and print every event as
//! JSON, one per line.
//!
//! ```sh
//! PLAZA_RELAY_URL=wss://relay.plaza.app/ws PLAZA_API_URL=https://api.plaza.app \
//!     cargo run -p plaza-sync --example watch -- amir
//! ```

use tracing::info;
use tracing_subscriber::EnvFilter;

use plaza_sync::{SyncConfig, SyncSession, UserId};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,plaza_sync=debug")),
        )
        .init();

    let user = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: watch <user-id>"))?;

    let config = SyncConfig::from_env();
    let (session, mut events) = SyncSession::open(config, UserId::new(user)).await?;
    info!(user = %session.user(), "Session open, streaming events (Ctrl+C to quit)");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => println!("{}", serde_json::to_string(&event)?),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    session.close().await;
    Ok(())
}
