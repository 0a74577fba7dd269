mod cli;

use captionforge::{
    config::{self, OutputFormat},
    extract, text,
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "captionforge=debug,captionforge_captions=trace,captionforge_media=trace".to_string()
        } else {
            "captionforge=info,captionforge_captions=warn,captionforge_media=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Extract {
            init,
            segments,
            json,
        } => run_extract(&init, &segments, cli.config.as_deref(), json),
        Commands::Text {
            init,
            segments,
            start,
            json,
        } => run_text(&init, &segments, cli.config.as_deref(), start, json),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("captionforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        anyhow::bail!("File does not exist: {:?}", path);
    }
    std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))
}

fn read_segments(paths: &[PathBuf]) -> Result<Vec<(String, Vec<u8>)>> {
    paths
        .iter()
        .map(|path| Ok((path.display().to_string(), read_file(path)?)))
        .collect()
}

fn run_extract(
    init: &Path,
    segments: &[PathBuf],
    config_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let channels = config.channels()?;

    let init_data = read_file(init)?;
    let segment_data = read_segments(segments)?;

    tracing::info!(
        "Extracting {} from {} segments",
        channels
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("+"),
        segment_data.len()
    );

    let reports = extract::extract_embedded(
        &init_data,
        segment_data
            .iter()
            .map(|(name, data)| (name.clone(), data.as_slice())),
        &channels,
    )
    .with_context(|| format!("Failed to read init segment {:?}", init))?;

    if json || config.output.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print!("{}", extract::format_reports(&reports));
    }

    Ok(())
}

fn run_text(
    init: &Path,
    segments: &[PathBuf],
    config_path: Option<&Path>,
    start: Option<f64>,
    json: bool,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let start_time = start.unwrap_or(config.fragmented.start_time);
    if !start_time.is_finite() || start_time < 0.0 {
        anyhow::bail!("Start time must be a non-negative number, got {}", start_time);
    }

    let init_data = read_file(init)?;
    let segment_data = read_segments(segments)?;

    let report = text::extract_text(
        &init_data,
        segment_data
            .iter()
            .map(|(name, data)| (name.clone(), data.as_slice())),
        start_time,
        config.text_timescale()?,
    )
    .with_context(|| format!("Failed to read init segment {:?}", init))?;

    if json || config.output.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", text::format_text_report(&report));
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Channels: {}", config.embedded.channels.join(", "));
            println!(
                "  Fragmented text: timescale {}, start {}s",
                config.fragmented.default_timescale, config.fragmented.start_time
            );
            println!("  Output: {:?}", config.output.format);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Channels: {}", config.embedded.channels.join(", "));
        }
    }

    Ok(())
}
