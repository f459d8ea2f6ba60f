//! Logging infrastructure for the canonseal CLI.
//!
//! Diagnostics go through `tracing`; the protocol output the CLI prints
//! (`PASS:`/`FAIL:`/`OK:` lines) is deliberately not routed through the
//! logger, since external tooling parses those lines.
//!
//! The default level is `warn` so a verification run stays quiet unless
//! something needs attention; set `RUST_LOG=info` or `debug` to watch the
//! individual checks.

use anyhow::{Context as _, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

/// Initialize the tracing subscriber. Call once at startup.
pub fn init() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))
        .context("Failed to create env filter")?;

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}
