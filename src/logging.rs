// Structured logging setup
//
// Installs the global tracing subscriber from `LoggingConfig`. Output goes to
// stderr so command output on stdout stays machine-readable. `RUST_LOG`
// directives, when set, refine the configured default level.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Level used when no `RUST_LOG` directive overrides it
pub fn default_level(config: &LoggingConfig, verbose: bool) -> Result<Level> {
    if verbose {
        return Ok(Level::DEBUG);
    }
    config
        .level
        .to_lowercase()
        .parse()
        .map_err(|e| anyhow::anyhow!("Failed to parse log level '{}': {}", config.level, e))
}

/// Install the global subscriber
///
/// # Errors
///
/// Returns an error if the level is invalid or a global subscriber has
/// already been installed.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = default_level(config, verbose)?;
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match config.format.to_lowercase().as_str() {
        "json" => builder.json().try_init(),
        "pretty" => builder.pretty().try_init(),
        _ => builder.compact().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}
