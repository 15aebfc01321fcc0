//! `tracing` subscriber setup for binaries and tests.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, EnvFilter};

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Installs a global fmt subscriber.
///
/// `filter` uses `EnvFilter` syntax (for example `"requester=debug"`); when
/// `None`, `RUST_LOG` is consulted and `info` is the fallback. Returns false
/// if a global subscriber was already installed, which makes repeated calls
/// harmless.
pub fn init_tracing(filter: Option<&str>, format: LogFormat) -> bool {
    let filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let builder = fmt().with_env_filter(filter).with_target(true);
    match format {
        LogFormat::Pretty => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(Some("requester=debug"), LogFormat::Pretty);
        assert!(!init_tracing(Some("requester=debug"), LogFormat::Json));
    }
}
