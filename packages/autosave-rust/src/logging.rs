//! Tracing subscriber setup for binaries embedding the engine.
//!
//! The library only emits `tracing` events; hosts decide where they go.

use anyhow::Context;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,gradesave_autosave=debug";

/// Installs a global fmt subscriber writing to stderr.
///
/// `RUST_LOG` overrides `default_filter`. With `json` set, events are
/// emitted as one JSON object per line.
///
/// # Errors
///
/// Returns an error if the filter does not parse or a global subscriber is
/// already installed.
pub fn init_tracing(default_filter: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .with_context(|| format!("invalid log filter: {default_filter}"))?;

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .context("tracing subscriber already installed")?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .compact()
                    .with_target(false),
            )
            .try_init()
            .context("tracing subscriber already installed")?;
    }
    Ok(())
}
