//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use st_core::DEFAULT_OUTPUT_NAME;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Section event log level (0 = off).
    pub log_verbosity: u8,

    /// Column set used by `show` steps that do not name one (0-4).
    pub report_verbosity: u8,

    /// File name used by `save` steps that do not name one.
    pub output_name: String,

    /// Directory saved reports are written to.
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_verbosity: 0,
            report_verbosity: 0,
            output_name: DEFAULT_OUTPUT_NAME.to_string(),
            output_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (ST_*)
        figment = figment.merge(Env::prefixed("ST_"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for st.
///
/// On Linux: `~/.config/st`
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("st"))
}
