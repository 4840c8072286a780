//! Error types for NNUE evaluation
//!
//! Load/save paths return `NnueResult`; evaluation itself never fails.

use super::NetSize;

/// NNUE-specific errors
#[derive(thiserror::Error, Debug)]
pub enum NnueError {
    /// Wrong magic string, version or trailing data
    #[error("Invalid network format: {0}")]
    Format(String),

    /// Architecture hash does not match the compiled-in dimensions
    #[error("Architecture hash mismatch: expected {expected:#010x}, got {actual:#010x}")]
    HashMismatch { expected: u32, actual: u32 },

    /// Stream ended before the declared size was consumed
    #[error("Truncated network stream")]
    Truncated,

    /// Weight memory could not be allocated
    #[error("Failed to allocate {bytes} bytes for network weights")]
    Allocation { bytes: usize },

    /// A network tier required for evaluation is not loaded
    #[error("Network for the {tier} tier ({file}) was not loaded successfully")]
    NetworkNotLoaded { tier: NetSize, file: String },

    /// Configuration value out of range
    #[error("Invalid value {value} for option {name}")]
    InvalidOption { name: &'static str, value: i64 },

    /// Configuration file could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// File I/O error
    #[error(transparent)]
    Io(std::io::Error),
}

impl From<std::io::Error> for NnueError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            NnueError::Truncated
        } else {
            NnueError::Io(e)
        }
    }
}

/// Result type for NNUE operations
pub type NnueResult<T> = Result<T, NnueError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_unexpected_eof_maps_to_truncated() {
        let e: NnueError = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(e, NnueError::Truncated));

        let e: NnueError = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        assert!(matches!(e, NnueError::Io(_)));
    }

    #[test]
    fn test_hash_mismatch_message() {
        let e = NnueError::HashMismatch { expected: 0x1234, actual: 0xabcd };
        assert_eq!(e.to_string(), "Architecture hash mismatch: expected 0x00001234, got 0x0000abcd");
    }
}
