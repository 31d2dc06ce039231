//! Tool configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use tile_pyramid::{EngineConfig, LayoutConfig};

/// Engine and layout settings used by every command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub engine: EngineConfig,
    pub layout: LayoutConfig,
}

impl ToolConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Load configuration from `PYRAMID_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            engine: EngineConfig::from_env(),
            layout: LayoutConfig::from_env(),
        }
    }

    /// YAML file when given, environment otherwise; validated either way.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_yaml(path)?,
            None => Self::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate().map_err(anyhow::Error::msg)?;
        self.layout.validate().map_err(anyhow::Error::msg)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tile_pyramid::{InterpolationMethod, ReadMode};

    #[test]
    fn test_yaml_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "engine:\n  read_mode: deferred\n  interpolation: cubic\nlayout:\n  tile_size: 128\n"
        )
        .unwrap();

        let config = ToolConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.engine.read_mode, ReadMode::Deferred);
        assert_eq!(config.engine.interpolation, InterpolationMethod::Cubic);
        assert_eq!(config.layout.tile_size, 128);
        assert_eq!(config.layout.downscale_factor, 2);
        assert_eq!(config.engine.max_idle_polls, EngineConfig::default().max_idle_polls);
    }

    #[test]
    fn test_invalid_layout_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "layout:\n  downscale_factor: 1\n").unwrap();
        assert!(ToolConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(ToolConfig::from_yaml("/nonexistent/pyramid-tool.yaml").is_err());
    }
}
