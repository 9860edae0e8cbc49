// SPDX-License-Identifier: MIT

use core::fmt;

use igfio::errors::*;

/// Unified error type for the IGF storage core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgfError {
    /// Open/read/write/seek failure on a device, image or stream.
    Io(FlashIOError),
    /// Expected magic absent ("not this format").
    NotFound,
    /// Magic present but a checksum does not match.
    Corrupt(&'static str),
    /// Two incompatible format hypotheses both validate.
    Ambiguous,
    /// Minor or index outside the fixed directory bounds.
    OutOfRange(&'static str),
    /// Contract violation that is neither an IO nor a checksum failure.
    Invalid(&'static str),
    /// Failure while processing one partition; names the minor.
    Partition { minor: u16, cause: &'static str },
}

impl IgfError {
    /// Attaches a partition minor to an error raised while streaming its
    /// sections, so callers learn which input failed.
    pub fn in_partition(self, minor: u16) -> Self {
        match self {
            IgfError::Io(e) => IgfError::Partition {
                minor,
                cause: e.msg(),
            },
            IgfError::Corrupt(cause) | IgfError::Invalid(cause) => {
                IgfError::Partition { minor, cause }
            }
            other => other,
        }
    }
}

impl From<FlashIOError> for IgfError {
    fn from(e: FlashIOError) -> Self {
        IgfError::Io(e)
    }
}

impl From<std::io::Error> for IgfError {
    fn from(e: std::io::Error) -> Self {
        IgfError::Io(FlashIOError::from(e))
    }
}

impl fmt::Display for IgfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgfError::Io(e) => write!(f, "IO error: {e}"),
            IgfError::NotFound => write!(f, "No IGF directory found"),
            IgfError::Corrupt(msg) => write!(f, "Corrupt: {msg}"),
            IgfError::Ambiguous => write!(f, "Ambiguous section format"),
            IgfError::OutOfRange(msg) => write!(f, "Out of range: {msg}"),
            IgfError::Invalid(msg) => write!(f, "{msg}"),
            IgfError::Partition { minor, cause } => {
                write!(f, "partition {minor}: {cause}")
            }
        }
    }
}

impl std::error::Error for IgfError {}

pub type IgfResult<T = ()> = Result<T, IgfError>;
