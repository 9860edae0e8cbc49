// SPDX-License-Identifier: MIT

use crate::{FlashIO, FlashIOSetLen};
use crate::errors::*;

/// In-memory implementation of `FlashIO`.
///
/// Owns a growable buffer: writes past the current end extend the storage,
/// which is what an append-style image rewrite needs when the final size is
/// not known up front. Reads past the end stay errors.
#[derive(Debug, Default)]
pub struct MemFlashIO {
    buffer: Vec<u8>,
}

impl MemFlashIO {
    #[inline]
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Pre-sized, zero-filled storage (fixed-size device stand-in).
    #[inline]
    pub fn with_len(len: usize) -> Self {
        Self {
            buffer: vec![0u8; len],
        }
    }

    #[inline]
    pub fn from_vec(buffer: Vec<u8>) -> Self {
        Self { buffer }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    #[inline]
    pub fn into_vec(self) -> Vec<u8> {
        self.buffer
    }

    #[inline]
    fn end_of(offset: u64, len: usize) -> FlashIOResult<usize> {
        let end = offset
            .checked_add(len as u64)
            .ok_or(FlashIOError::OutOfBounds)?;
        usize::try_from(end).map_err(|_| FlashIOError::OutOfBounds)
    }
}

impl FlashIO for MemFlashIO {
    #[inline]
    fn write_at(&mut self, offset: u64, data: &[u8]) -> FlashIOResult {
        let end = Self::end_of(offset, data.len())?;
        if end > self.buffer.len() {
            self.buffer.resize(end, 0);
        }
        self.buffer[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    #[inline]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> FlashIOResult {
        let end = Self::end_of(offset, buf.len())?;
        if end > self.buffer.len() {
            return Err(FlashIOError::OutOfBounds);
        }
        buf.copy_from_slice(&self.buffer[offset as usize..end]);
        Ok(())
    }

    #[inline]
    fn flush(&mut self) -> FlashIOResult {
        Ok(())
    }

    #[inline]
    fn len(&mut self) -> FlashIOResult<u64> {
        Ok(self.buffer.len() as u64)
    }
}

impl FlashIOSetLen for MemFlashIO {
    fn set_len(&mut self, len: u64) -> FlashIOResult {
        let len = usize::try_from(len).map_err(|_| FlashIOError::OutOfBounds)?;
        self.buffer.resize(len, 0);
        Ok(())
    }
}
