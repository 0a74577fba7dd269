//! Error types for captionforge-media.

use std::io;
use thiserror::Error;

/// Result type for captionforge-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for captionforge-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid MP4 structure.
    #[error("Invalid MP4: {0}")]
    InvalidMp4(String),

    /// Missing required atom in an initialization segment.
    #[error("Missing required atom: {0}")]
    MissingAtom(&'static str),

    /// A media fragment lacks a box it cannot be read without.
    #[error("Malformed fragment: {0}")]
    MalformedFragment(String),

    /// Buffer too small for operation.
    #[error("Buffer underflow in {atom}: need {need} bytes, have {have}")]
    BufferUnderflow {
        atom: &'static str,
        need: usize,
        have: usize,
    },
}

impl Error {
    /// Create an invalid MP4 error.
    pub fn invalid_mp4(msg: impl Into<String>) -> Self {
        Self::InvalidMp4(msg.into())
    }

    /// Create a malformed fragment error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedFragment(msg.into())
    }
}
