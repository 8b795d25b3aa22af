use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::host::HostProfile;
use crate::recorder::RecorderSettings;

/// Prefix of environment overrides, e.g. `AUDREC__RECORDER__MAX_DURATION=2:00`
const ENV_PREFIX: &str = "AUDREC";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub recorder: RecorderSettings,
    pub host: HostConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// User agent of the capture engine; selects the pause/resume acknowledgment path
    pub user_agent: String,
    pub backend: BackendKind,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            user_agent: String::new(),
            backend: BackendKind::Virtual,
        }
    }
}

impl HostConfig {
    pub fn profile(&self) -> HostProfile {
        HostProfile::from_user_agent(&self.user_agent)
    }
}

/// Microphone implementation to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Software microphone producing silence
    #[default]
    Virtual,
    /// System input device (requires the `cpal-backend` feature)
    Cpal,
}

impl Config {
    /// Load configuration from `path` (extension optional) layered with environment overrides
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        settings
            .try_deserialize()
            .with_context(|| format!("Invalid configuration in {}", path))
    }

    /// Load from an explicit file, which must exist
    pub fn load_file(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        settings
            .try_deserialize()
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }
}
