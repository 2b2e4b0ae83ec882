//! Logging setup utilities for the nagare binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Build the default `EnvFilter` directive for the given targets.
///
/// Crate and binary names are normalised to tracing targets (`-` becomes `_`),
/// so `"nagare-chat"` and `"nagare_chat"` produce the same directive.
pub fn default_directive(targets: &[&str], default_log_level: &str) -> String {
    targets
        .iter()
        .map(|target| format!("{}={}", target.replace('-', "_"), default_log_level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize the tracing subscriber with the specified default log level.
///
/// The level applies to every target in `targets` (typically the library crate
/// and the running binary). It can be overridden with the `RUST_LOG`
/// environment variable.
///
/// # Examples
///
/// ```ignore
/// use nagare_shared::logger::setup_logger;
///
/// setup_logger(&["nagare_client", env!("CARGO_BIN_NAME")], "info");
/// ```
pub fn setup_logger(targets: &[&str], default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive(targets, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
