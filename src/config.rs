//! Network configuration management via TOML files.
//!
//! Every field has a default, so a partial (or empty) `[network]` table is
//! valid and yields the reference architecture.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Convolution hyperparameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvParams {
    /// Number of convolution filters (output channels).
    pub filter_num: usize,
    /// Side length of the square filters.
    pub filter_size: usize,
    /// Zero-padding applied to each spatial edge.
    pub pad: usize,
    /// Window step in both spatial directions.
    pub stride: usize,
}

impl Default for ConvParams {
    fn default() -> Self {
        Self {
            filter_num: 30,
            filter_size: 5,
            pad: 0,
            stride: 1,
        }
    }
}

/// Weight initialization scheme. The scale multiplies samples drawn
/// uniformly from [-1, 1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeightInit {
    /// Scale of sqrt(2 / fan_in); pairs with rectified activations.
    He,
    /// Scale of sqrt(1 / fan_in).
    Xavier,
    /// Fixed scale, independent of fan-in.
    Std(f64),
}

impl WeightInit {
    /// Initialization scale for a layer with the given input fan.
    pub fn scale(&self, fan_in: usize) -> f64 {
        let fan_in = fan_in.max(1) as f64;
        match self {
            WeightInit::He => (2.0 / fan_in).sqrt(),
            WeightInit::Xavier => (1.0 / fan_in).sqrt(),
            WeightInit::Std(scale) => *scale,
        }
    }
}

/// Full architecture description for the convolutional classifier.
///
/// # Examples
///
/// ```
/// use scratchnet::NetworkConfig;
///
/// let config = NetworkConfig::load_from_file("config/network.toml")
///     .unwrap_or_else(|_| NetworkConfig::default());
///
/// println!("input: {:?}, classes: {}", config.input_dim, config.output_size);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Input dimensions as (channels, height, width).
    pub input_dim: (usize, usize, usize),
    /// Convolution stage hyperparameters.
    pub conv: ConvParams,
    /// Width of the fully-connected hidden layer.
    pub hidden_size: usize,
    /// Number of output classes.
    pub output_size: usize,
    /// Weight initialization scheme.
    pub weight_init: WeightInit,
    /// Random seed for deterministic initialization.
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            input_dim: (1, 28, 28),
            conv: ConvParams::default(),
            hidden_size: 100,
            output_size: 10,
            weight_init: WeightInit::Std(0.01),
            seed: 42,
        }
    }
}

impl NetworkConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(&path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let raw: RawNetworkFile =
            toml::from_str(toml_str).map_err(|err| ConfigError::Parse(err.to_string()))?;
        Ok(raw.network)
    }
}

#[derive(Debug, Deserialize)]
struct RawNetworkFile {
    #[serde(default)]
    network: NetworkConfig,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "IO error: {}", err),
            ConfigError::Parse(err) => write!(f, "Parse error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_table_missing() {
        let config = NetworkConfig::from_toml("").unwrap();
        assert_eq!(config.input_dim, (1, 28, 28));
        assert_eq!(config.conv.filter_num, 30);
        assert_eq!(config.hidden_size, 100);
        assert_eq!(config.output_size, 10);
        assert_eq!(config.weight_init, WeightInit::Std(0.01));
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn test_parses_custom_values() {
        let toml = r#"
[network]
input_dim = [1, 12, 12]
hidden_size = 32
output_size = 4
seed = 7

[network.conv]
filter_num = 8
filter_size = 3
"#;
        let config = NetworkConfig::from_toml(toml).unwrap();
        assert_eq!(config.input_dim, (1, 12, 12));
        assert_eq!(config.conv.filter_num, 8);
        assert_eq!(config.conv.filter_size, 3);
        // Unspecified conv fields keep their defaults.
        assert_eq!(config.conv.pad, 0);
        assert_eq!(config.conv.stride, 1);
        assert_eq!(config.hidden_size, 32);
        assert_eq!(config.output_size, 4);
        assert_eq!(config.seed, 7);
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let result = NetworkConfig::from_toml("[network\nhidden_size = 3");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_weight_init_scales() {
        assert!((WeightInit::He.scale(8) - 0.5).abs() < 1e-12);
        assert!((WeightInit::Xavier.scale(4) - 0.5).abs() < 1e-12);
        assert_eq!(WeightInit::Std(0.01).scale(1000), 0.01);
    }
}
