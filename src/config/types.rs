use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub embedded: EmbeddedConfig,

    #[serde(default)]
    pub fragmented: FragmentedConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddedConfig {
    /// Caption channels to extract: CC1 (field 1) and/or CC3 (field 2)
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,
}

impl Default for EmbeddedConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
        }
    }
}

fn default_channels() -> Vec<String> {
    vec!["CC1".to_string(), "CC3".to_string()]
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FragmentedConfig {
    /// Timescale used until an init segment supplies one
    #[serde(default = "default_timescale")]
    pub default_timescale: u32,

    /// Expected playback start of the first fragment, in seconds
    #[serde(default)]
    pub start_time: f64,
}

impl Default for FragmentedConfig {
    fn default() -> Self {
        Self {
            default_timescale: default_timescale(),
            start_time: 0.0,
        }
    }
}

fn default_timescale() -> u32 {
    90_000
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
