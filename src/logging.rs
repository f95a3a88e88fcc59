use anyhow::{Context, Result};
use log::LevelFilter;

use crate::config::ServerConfig;

/// Route `log` records to stderr and, when configured, to a log file.
/// stdout carries the protocol and must never receive log output.
pub fn init(config: &ServerConfig) -> Result<()> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(config.log_level)
        // The PDF stack is chatty at debug level
        .level_for("lopdf", LevelFilter::Warn)
        .level_for("pdf_extract", LevelFilter::Warn)
        .chain(std::io::stderr());

    if let Some(path) = &config.log_file {
        let file = fern::log_file(path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        dispatch = dispatch.chain(file);
    }

    dispatch
        .apply()
        .context("A global logger is already installed")?;

    log::debug!("Logging initialized at level {}", config.log_level);
    Ok(())
}
