//! Tool settings: `<top-level>/.git-cipher/config.toml`, then environment
//! overrides.
//!
//! ```toml
//! recipient = "alice@example.com"
//! gpg_program = "gpg2"
//! ```

use crate::error::{GitCipherError, Result};
use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::env;
use std::path::Path;

pub const CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "GIT_CIPHER_";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// gpg identity the public secrets are encrypted for.
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default = "default_gpg_program")]
    pub gpg_program: String,
}

fn default_gpg_program() -> String {
    "gpg".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            recipient: None,
            gpg_program: default_gpg_program(),
        }
    }
}

impl Settings {
    pub fn load(top_level: &Path) -> Result<Self> {
        let config_path = top_level.join(crate::secrets::PUBLIC_DIR).join(CONFIG_FILE);

        let mut settings = if config_path.exists() {
            let path = config_path
                .to_str()
                .ok_or_else(|| GitCipherError::Config("Invalid config path".into()))?;
            Config::builder()
                .add_source(File::new(path, FileFormat::Toml))
                .build()
                .and_then(|cfg| cfg.try_deserialize::<Settings>())
                .map_err(|err| {
                    GitCipherError::Config(format!(
                        "Failed to load {}: {err}",
                        config_path.display()
                    ))
                })?
        } else {
            Settings::default()
        };

        if let Some(recipient) = non_empty_env("RECIPIENT") {
            settings.recipient = Some(recipient);
        }
        if let Some(program) = non_empty_env("GPG") {
            settings.gpg_program = program;
        }

        tracing::debug!(?settings, "loaded settings");
        Ok(settings)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{name}"))
        .ok()
        .filter(|v| !v.trim().is_empty())
}
