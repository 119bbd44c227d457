use super::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Reads and parses a config file. Settings that will be clamped or ignored
/// are reported as warnings, not errors.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Cannot read callscreen config {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Invalid callscreen config {}", path.display()))?;

    for problem in config.validate() {
        log::warn!("{}: {problem}", path.display());
    }
    log::debug!(
        "Screening budget {}ms, contact lookup {}ms",
        config.screening.budget().as_millis(),
        config.screening.contact_lookup_timeout().as_millis()
    );

    Ok(config)
}

/// Missing or broken config screens with the built-in defaults.
pub fn load_config_or_default<P: AsRef<Path>>(path: P) -> Config {
    let path = path.as_ref();
    match load_config(path) {
        Ok(config) => {
            log::info!("Using configuration {}", path.display());
            config
        }
        Err(e) => {
            log::warn!("{e:#}; screening with default settings");
            Config::default()
        }
    }
}

pub fn save_config<P: AsRef<Path>>(config: &Config, path: P) -> Result<()> {
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(&path, content)
        .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;
    Ok(())
}
