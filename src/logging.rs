//! Tracing setup shared by both binaries.

use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber. `RUST_LOG` wins when set; otherwise
/// the default level is `debug`, dropped to `info` when `ENV=PROD`.
pub fn init() {
    let default_level =
        if std::env::var("ENV").is_ok_and(|env| env == "PROD") { "info" } else { "debug" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();
}
