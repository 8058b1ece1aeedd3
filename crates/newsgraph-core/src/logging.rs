//! Tracing setup for binaries and tools embedding this crate

use tracing_subscriber::EnvFilter;

/// Directive applied when `RUST_LOG` does not mention this crate
pub const DEFAULT_DIRECTIVE: &str = "newsgraph=info";

/// Install a fmt subscriber filtered by `RUST_LOG` plus [`DEFAULT_DIRECTIVE`]
///
/// Fails when a global subscriber is already installed.
pub fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(DEFAULT_DIRECTIVE.parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}
