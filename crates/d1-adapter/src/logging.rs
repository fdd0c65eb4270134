use tracing_subscriber::EnvFilter;

/// Stderr subscriber; rows and protocol output own stdout. RUST_LOG wins
/// when set, otherwise the requested level applies to this crate only so
/// dependency noise stays out of the session log.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("d1_adapter={log_level}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
