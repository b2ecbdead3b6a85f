use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// `-v` count to the default level used when `RUST_LOG` is unset.
pub(crate) fn default_level_for_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    }
}

/// Logs go to stderr so replay output on stdout stays one JSON object per line.
pub(crate) fn init_tracing(verbose: u8) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level_for_verbosity(verbose).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
