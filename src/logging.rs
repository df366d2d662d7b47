//! Opt-in tracing setup for the CLI and other binary hosts.
//!
//! The library itself only emits events; installing a subscriber is the
//! host's call. `SATCHEL_LOG` takes the usual env-filter directives.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Install a JSON subscriber filtered by `SATCHEL_LOG` (default `error`).
///
/// Safe to call more than once; later calls lose the race and are ignored.
pub fn init() {
    let filter = EnvFilter::builder()
        .with_env_var("SATCHEL_LOG")
        .with_default_directive(LevelFilter::ERROR.into())
        .from_env_lossy();

    let format = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .try_init();
}
