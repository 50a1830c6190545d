//! Tracing subscriber setup for the library and CLI.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a stderr fmt subscriber.
///
/// The filter comes from `RUST_LOG` when set, otherwise `cfret_screen=info`
/// (`debug` when `verbose`). Calling this more than once is a no-op.
pub fn init_logging(verbose: bool) {
    let fallback = if verbose {
        "cfret_screen=debug,cfret=debug"
    } else {
        "cfret_screen=info,cfret=info"
    };

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}
