use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Calling this more than once is harmless: the second
/// call leaves the first subscriber in place.
pub fn init_logging(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("frameloop={level},warn")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stderr);

    let installed = if json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        tracing::debug!(level, json, "logging initialized");
    }
}
