//! Error types for captionforge-captions

use crate::text::TextParseError;

/// Errors that can occur during caption extraction
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A NAL or SEI length field runs past the end of its sample or unit
    #[error("Truncated NAL unit at offset {offset}: need {needed} bytes, {available} available")]
    TruncatedNalUnit {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A sample's byte range lies outside the fragment buffer
    #[error("Sample {index} spans {start}..{end} but the fragment has {len} bytes")]
    SampleOutOfBounds {
        index: usize,
        start: usize,
        end: usize,
        len: usize,
    },

    /// Caption channel other than CC1 or CC3
    #[error("Unsupported caption channel: {0}")]
    UnsupportedChannel(String),

    /// Container-level failure (malformed fragment, bad init segment)
    #[error(transparent)]
    Media(#[from] captionforge_media::Error),

    /// A text sample could not be handed to, or was rejected by, the parser
    #[error("Text payload: {0}")]
    TextParse(#[from] TextParseError),
}

impl Error {
    /// Whether the error is the container reporting a malformed fragment.
    pub fn is_malformed_fragment(&self) -> bool {
        matches!(
            self,
            Self::Media(captionforge_media::Error::MalformedFragment(_))
        )
    }
}

/// Result type alias for caption extraction
pub type Result<T> = std::result::Result<T, Error>;
