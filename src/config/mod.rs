mod types;

pub use types::*;

use anyhow::{Context, Result};
use captionforge_captions::CaptionChannel;
use captionforge_media::Timescale;
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./captionforge.toml", "~/.config/captionforge/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.embedded.channels.is_empty() {
        anyhow::bail!("No caption channels configured");
    }
    config.channels()?;

    if config.fragmented.default_timescale == 0 {
        anyhow::bail!("Fragmented text timescale cannot be 0");
    }

    let start = config.fragmented.start_time;
    if !start.is_finite() || start < 0.0 {
        anyhow::bail!("Fragmented text start time must be a non-negative number, got {}", start);
    }

    Ok(())
}

impl Config {
    /// Configured caption channels, parsed
    pub fn channels(&self) -> Result<Vec<CaptionChannel>> {
        let mut channels = Vec::with_capacity(self.embedded.channels.len());
        for id in &self.embedded.channels {
            let channel: CaptionChannel = id
                .parse()
                .with_context(|| format!("Invalid caption channel {:?}", id))?;
            if !channels.contains(&channel) {
                channels.push(channel);
            }
        }
        Ok(channels)
    }

    /// Timescale assumed for fragmented text before an init segment
    pub fn text_timescale(&self) -> Result<Timescale> {
        Timescale::new(self.fragmented.default_timescale)
            .context("Fragmented text timescale cannot be 0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(
            config.channels().unwrap(),
            vec![CaptionChannel::Cc1, CaptionChannel::Cc3]
        );
        assert_eq!(config.fragmented.default_timescale, 90_000);
        assert_eq!(config.output.format, OutputFormat::Text);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let file = write_config(
            r#"
[embedded]
channels = ["cc3"]

[output]
format = "json"
"#,
        );

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.channels().unwrap(), vec![CaptionChannel::Cc3]);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.fragmented.start_time, 0.0);
    }

    #[test]
    fn test_unsupported_channel_rejected() {
        let file = write_config("[embedded]\nchannels = [\"CC2\"]\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("CC2"));
    }

    #[test]
    fn test_invalid_fragmented_settings() {
        let mut config = Config::default();
        config.fragmented.default_timescale = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.fragmented.start_time = -1.0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.embedded.channels.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_unparseable_file() {
        let file = write_config("[output]\nformat = \"xml\"\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let missing = Path::new("/nonexistent/captionforge.toml");
        assert!(load_config_or_default(Some(missing)).is_err());
    }
}
