//! TOML configuration file support.
//!
//! Channel selections that are reused across many images can live in a
//! config file instead of on the command line:
//!
//! ```toml
//! # combine.toml
//! [combine]
//! nuclear_channel = "DAPI"
//! membrane_channels = ["TRITC", "CD45"]
//! combine_method = "max"
//! strict = false
//! compression = "lzw"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use combine_channels::stack::CombineMethod;
use combine_channels::tiff_io::TiffCompression;

/// Root configuration structure.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Settings for the combine command.
    #[serde(default)]
    pub combine: CombineConfig,
}

/// Configuration for the combine command.
#[derive(Debug, Default, Deserialize)]
pub struct CombineConfig {
    /// Nuclear channel name.
    pub nuclear_channel: Option<String>,

    /// Membrane channel names.
    pub membrane_channels: Option<Vec<String>>,

    /// Reduction for multiple membrane channels.
    pub combine_method: Option<CombineMethod>,

    /// Abort on metadata sync failure.
    pub strict: Option<bool>,

    /// Output compression.
    pub compression: Option<TiffCompression>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
            [combine]
            nuclear_channel = "DAPI"
            membrane_channels = ["TRITC", "CD45"]
            combine_method = "max"
            strict = true
            compression = "packbits"
        "#;

        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.combine.nuclear_channel.as_deref(), Some("DAPI"));
        assert_eq!(
            config.combine.membrane_channels,
            Some(vec!["TRITC".to_string(), "CD45".to_string()])
        );
        assert_eq!(config.combine.combine_method, Some(CombineMethod::Max));
        assert_eq!(config.combine.strict, Some(true));
        assert_eq!(config.combine.compression, Some(TiffCompression::PackBits));
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [combine]
            combine_method = "prod"
        "#;

        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.combine.combine_method, Some(CombineMethod::Prod));
        assert_eq!(config.combine.nuclear_channel, None);
    }

    #[test]
    fn test_empty_config() {
        let config = Config::from_str("").unwrap();
        assert!(config.combine.membrane_channels.is_none());
    }

    #[test]
    fn test_invalid_method() {
        let toml = r#"
            [combine]
            combine_method = "mean"
        "#;
        assert!(Config::from_str(toml).is_err());
    }
}
