//! Diagnostic logging.
//!
//! Events go to stderr through `tracing-subscriber`. The filter comes
//! from `RAG_LOG` (e.g. `RAG_LOG=notes_rag=debug`) and defaults to
//! `warn`, or `debug` with `--verbose`.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "RAG_LOG";

pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    // A second init (e.g. in tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
