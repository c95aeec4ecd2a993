// Error types
//
// Scanning never fails: malformed input is resolved by policy. Errors only
// come from dialect validation, the I/O layer feeding the scanner, and the
// streaming buffer limit.

use thiserror::Error;

/// A dialect assigns conflicting roles to its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DialectError {
    #[error("byte {byte:#04x} is used as both {first} and {second}")]
    Overlap {
        byte: u8,
        first: &'static str,
        second: &'static str,
    },
    #[error("dialect has no newline bytes")]
    NoNewline,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid dialect: {0}")]
    Dialect(#[from] DialectError),
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("partial row exceeds buffer limit of {limit} bytes")]
    BufferOverflow { limit: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
