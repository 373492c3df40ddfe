//! Log output setup for applications embedding the client.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

/// Filter used when `RUST_LOG` is unset or unparseable.
pub const DEFAULT_FILTER: &str = "info";

/// Installs a global fmt subscriber filtered by `RUST_LOG`.
///
/// Does nothing if a global subscriber is already set, so tests and
/// embedding applications can call it freely.
pub fn init() {
    if try_init().is_err() {
        tracing::debug!("global tracing subscriber already installed");
    }
}

/// Like [`init`], but reports whether installation failed.
///
/// # Errors
/// Fails if a global subscriber is already installed.
pub fn try_init() -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init();
        init();
        assert!(try_init().is_err());
    }
}
