use std::env;
use std::path::PathBuf;

use super::probe_config::DEFAULT_RESULTS_DIR;
use super::request_file::parse_bool;

pub const DEFAULT_CONFIG_FILE: &str = "request.txt";

pub struct AppConfig {
    /// Request file holding the URL, options and candidate addresses.
    pub config_file: PathBuf,
    /// Where header and body artifacts are written. Cleared before every run.
    pub results_dir: PathBuf,
    /// Wait for Enter before exiting, so a double-clicked console window stays open.
    pub pause_on_exit: bool,
}

/// Load the application configuration from environment variables.
/// `main` loads `.env` into the environment beforehand.
pub fn load_config() -> AppConfig {
    AppConfig::from_lookup(|key| env::var(key).ok())
}

impl AppConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let config_file = lookup("CONFIG_FILE")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        let results_dir = lookup("RESULTS_DIR")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RESULTS_DIR.to_string());

        let pause_on_exit = lookup("PAUSE_ON_EXIT")
            .map(|value| parse_bool(&value))
            .unwrap_or(true);

        log::debug!("Using request file {config_file}, results in {results_dir}");

        AppConfig {
            config_file: PathBuf::from(config_file),
            results_dir: PathBuf::from(results_dir),
            pause_on_exit,
        }
    }
}
