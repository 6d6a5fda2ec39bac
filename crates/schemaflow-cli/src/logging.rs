//! Tracing subscriber setup for the binary

use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// `RUST_LOG` selects what is logged, `info` otherwise. Logs go to stderr
/// so reports on stdout stay machine-readable.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // Ignore a second install (tests, embedding)
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
