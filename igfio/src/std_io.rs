// SPDX-License-Identifier: MIT

use std::io::{Error, Read, Seek, SeekFrom, Write};

use crate::errors::*;
use crate::{FlashIO, FlashIOSetLen};

/// `FlashIO` over anything seekable, typically a `File` opened on an image
/// or a raw device node.
#[derive(Debug)]
pub struct StdFlashIO<'a, T: Read + Write + Seek> {
    io: &'a mut T,
}

impl<'a, T: Read + Write + Seek> StdFlashIO<'a, T> {
    #[inline]
    pub fn new(io: &'a mut T) -> Self {
        Self { io }
    }
}

impl<'a, T: Read + Write + Seek> FlashIO for StdFlashIO<'a, T> {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> FlashIOResult {
        self.io.seek(SeekFrom::Start(offset))?;
        self.io.write_all(data)?;
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> FlashIOResult {
        self.io.seek(SeekFrom::Start(offset))?;
        self.io.read_exact(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> FlashIOResult {
        self.io.flush()?;
        Ok(())
    }

    fn len(&mut self) -> FlashIOResult<u64> {
        let pos = self.io.seek(SeekFrom::Current(0))?;
        let end = self.io.seek(SeekFrom::End(0))?;
        self.io.seek(SeekFrom::Start(pos))?;
        Ok(end)
    }
}

impl<'a> FlashIOSetLen for StdFlashIO<'a, std::fs::File> {
    fn set_len(&mut self, len: u64) -> FlashIOResult {
        self.io.set_len(len)?;
        self.flush()?;
        Ok(())
    }
}

impl From<Error> for FlashIOError {
    #[cold]
    #[inline(never)]
    fn from(e: Error) -> Self {
        // Leak the string to produce a 'static str. Acceptable for error mapping.
        let leaked_str: &'static str = Box::leak(e.to_string().into_boxed_str());
        FlashIOError::Other(leaked_str)
    }
}
