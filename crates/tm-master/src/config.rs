//! Player configuration files (TOML).

use serde::{Deserialize, Serialize};
use std::path::Path;
use tm_engine::MixerConfig;

use crate::PlayerError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default)]
    pub mixer: MixerConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

/// Limits for offline rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Stop exporting after this many seconds, even if the song loops
    #[serde(default = "default_max_seconds")]
    pub max_seconds: u32,
}

fn default_max_seconds() -> u32 {
    300
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { max_seconds: default_max_seconds() }
    }
}

impl PlayerConfig {
    /// Parse and validate a configuration document.
    pub fn from_toml(text: &str) -> Result<Self, PlayerError> {
        let mut config: PlayerConfig = toml::from_str(text)?;
        config.mixer = config.mixer.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, PlayerError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn to_toml(&self) -> Result<String, PlayerError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), PlayerError> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}
