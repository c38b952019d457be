use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install a global tracing subscriber for composition diagnostics.
///
/// Logs go to stderr in the compact format. The level comes from `RUST_LOG`
/// and falls back to `default_directive` (for example `"compose_core=debug"`).
/// Returns an error if a global subscriber is already installed.
pub fn init_with(default_directive: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_line_number(true)
        .compact();

    let filter_layer =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_directive))?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Same as [`init_with`], defaulting to `info`.
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_with("info")
}
