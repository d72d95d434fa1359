//! Tracing initialization: a fmt subscriber filtered by `RUST_LOG`.
//!
//! Defaults to `info` when `RUST_LOG` is unset or invalid. For example,
//! `RUST_LOG=csvshelf=debug,tower_http=debug` shows store scans and every request.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
