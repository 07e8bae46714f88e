//! Packet sources for the sensing pipeline.
//!
//! The serial source reads the live radio link; the replay source serves
//! recorded sessions. Both filter non-packet lines before anything reaches
//! the core.

pub mod replay;
pub mod serial;
pub mod types;

// Re-export commonly used types
pub use replay::ReplaySource;
pub use serial::{SerialSource, SourceError, DEFAULT_BAUD};
pub use types::RawPacket;
