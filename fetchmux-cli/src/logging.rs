//! Logging setup.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "fetchmux=info";

/// Filter used with `--verbose` when `RUST_LOG` is not set.
pub const VERBOSE_FILTER: &str = "fetchmux=debug";

/// Installs the global subscriber. Logs go to stderr so response bodies can
/// be piped from stdout.
pub fn init(verbose: bool) {
    let default = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
