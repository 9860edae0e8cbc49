// SPDX-License-Identifier: MIT

pub mod errors;

mod mem;
mod std_io;

// Prelude re-exports (central entrypoint)
pub mod prelude {
    pub use super::FlashIO;
    pub use super::FlashIOSetLen;
    pub use super::FlashIOStructExt;
    pub use super::errors::*;
    pub use super::mem::MemFlashIO;
    pub use super::std_io::StdFlashIO;
}

use errors::*;

/// Flash/device IO abstraction trait.
///
/// Allows read/write/flush at arbitrary byte offsets. Implementations may
/// target RAM, plain files or raw block devices. Reads and writes are
/// full-length: a short transfer at this level is an error, never a partial
/// success.
pub trait FlashIO {
    /// Writes `data` at `offset` (absolute).
    fn write_at(&mut self, offset: u64, data: &[u8]) -> FlashIOResult;

    /// Reads `buf.len()` bytes into `buf` from `offset` (absolute).
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> FlashIOResult;

    /// Flushes any buffered data (may be a no-op).
    fn flush(&mut self) -> FlashIOResult;

    /// Total length of the underlying storage in bytes.
    fn len(&mut self) -> FlashIOResult<u64>;

    fn is_empty(&mut self) -> FlashIOResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Trait for resizing the underlying storage (if supported by the backend).
pub trait FlashIOSetLen: FlashIO {
    fn set_len(&mut self, len: u64) -> FlashIOResult;
}

/// Extension trait for reading and writing on-disk structs using zerocopy.
pub trait FlashIOStructExt: FlashIO {
    /// Reads a struct of type `T` from the given offset.
    fn read_struct<T: zerocopy::FromBytes + zerocopy::KnownLayout + zerocopy::Immutable>(
        &mut self,
        offset: u64,
    ) -> FlashIOResult<T> {
        let mut buf = vec![0u8; core::mem::size_of::<T>()];
        self.read_at(offset, &mut buf)?;
        T::read_from_bytes(&buf).map_err(|_| FlashIOError::Other("read_struct failed"))
    }

    /// Writes a struct of type `T` at the given offset.
    fn write_struct<T: zerocopy::IntoBytes + zerocopy::KnownLayout + zerocopy::Immutable>(
        &mut self,
        offset: u64,
        val: &T,
    ) -> FlashIOResult {
        self.write_at(offset, val.as_bytes())
    }
}

impl<T: FlashIO + ?Sized> FlashIOStructExt for T {}
