// SPDX-License-Identifier: MIT

use core::fmt;

/// Result type for FlashIO operations.
pub type FlashIOResult<T = ()> = core::result::Result<T, FlashIOError>;

/// Error type for FlashIO operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashIOError {
    Other(&'static str),
    OutOfBounds,
    Unsupported,
}

impl FlashIOError {
    pub fn msg(&self) -> &'static str {
        match self {
            FlashIOError::Other(msg) => msg,
            FlashIOError::OutOfBounds => "Out of bounds",
            FlashIOError::Unsupported => "Unsupported operation",
        }
    }
}

impl From<&'static str> for FlashIOError {
    #[inline]
    fn from(msg: &'static str) -> Self {
        FlashIOError::Other(msg)
    }
}

impl fmt::Display for FlashIOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())
    }
}

impl std::error::Error for FlashIOError {}
