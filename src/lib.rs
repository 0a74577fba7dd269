//! Captionforge - Closed caption extraction from fragmented MP4
//!
//! This library crate exposes the command implementations for integration testing.

pub mod config;
pub mod extract;
pub mod text;
