use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "captionforge")]
#[command(author, version, about = "Closed caption extraction from fragmented MP4 streams")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract embedded CEA-608 caption data from fragmented H.264 video
    Extract {
        /// Initialization segment of the video track
        #[arg(required = true)]
        init: PathBuf,

        /// Media segments, in delivery order
        #[arg(required = true)]
        segments: Vec<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract cues from a fragmented text track
    Text {
        /// Initialization segment of the text track
        #[arg(required = true)]
        init: PathBuf,

        /// Media segments, in delivery order
        #[arg(required = true)]
        segments: Vec<PathBuf>,

        /// Expected playback start of the first segment, in seconds
        #[arg(long)]
        start: Option<f64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
