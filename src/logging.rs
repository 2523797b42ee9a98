//! Diagnostic logging setup.
//!
//! All log output goes to stderr so that the console shell and the
//! `ask`/`retrieve` commands keep stdout for answers. `RUST_LOG` overrides
//! the built-in filter.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "panchakarma_bot=info,panchakarma_core=info";
const VERBOSE_FILTER: &str = "panchakarma_bot=debug,panchakarma_core=debug,tower_http=debug";

/// The filter directive used when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_FILTER
    } else {
        DEFAULT_FILTER
    }
}

/// Install the global subscriber. Safe to call more than once.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
