use anyhow::Context as _;
use tracing_subscriber::EnvFilter;

/// Environment variable holding archivist's own log filter.
pub const LOG_ENV: &str = "ARCHIVIST_LOG";

/// Installs the stderr subscriber. The filter comes from `ARCHIVIST_LOG`, then
/// `RUST_LOG`, then `default_level`.
pub fn init(default_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new(default_level))
        .with_context(|| format!("build log filter from {LOG_ENV}, RUST_LOG or {default_level:?}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}
