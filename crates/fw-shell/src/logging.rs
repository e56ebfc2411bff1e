//! Log output for the shell: compact `fmt` lines on stderr, filtered by
//! `FIELDWATCH_LOG` (same directive syntax as `RUST_LOG`).

use tracing_subscriber::EnvFilter;

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "FIELDWATCH_LOG";

const DEFAULT_DIRECTIVES: &str = "warn";

/// Build the filter from `FIELDWATCH_LOG`, defaulting to `warn`.
#[must_use]
pub fn env_filter() -> EnvFilter {
    let directives = std::env::var(LOG_ENV).unwrap_or_else(|_| DEFAULT_DIRECTIVES.to_owned());
    EnvFilter::builder().parse_lossy(directives)
}

/// Install the global subscriber. A second call is a no-op.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .compact()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}
