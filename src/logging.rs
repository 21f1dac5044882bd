use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes console logging on stderr.
///
/// `RUST_LOG` takes precedence; otherwise this crate logs at `info`, or
/// `debug` when `verbose` is set. Calling it twice is a no-op.
pub fn init_logging(verbose: bool) {
    let default_directive = if verbose {
        "igac_anomalies=debug"
    } else {
        "igac_anomalies=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    // stdout is reserved for the report itself.
    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .try_init();
}
