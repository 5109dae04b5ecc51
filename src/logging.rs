use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Installs the diagnostics subscriber on stderr.
///
/// Stdout is reserved for the packet report lines written through
/// [`crate::Console`]. `RUST_LOG` takes precedence over `level`.
pub fn init_logging(level: LevelFilter) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .init();
}
