// SPDX-License-Identifier: MIT

use igfio::prelude::*;
use zerocopy::IntoBytes;

use crate::crc::crc32;
use crate::errors::*;
use crate::layout::{DIR_CRC_START, DIR_OFFSET, DIRECTORY_MAGIC, Directory};

/// Reads and validates the partition directory at its fixed offset.
///
/// This is the single point of trust for everything that enumerates an
/// existing image: `NotFound` means "not this format" (wrong magic),
/// `Corrupt` means the magic matched but the stored CRC does not cover the
/// directory bytes. Pure read, no side effects.
pub fn read_directory<IO: FlashIO + ?Sized>(io: &mut IO) -> IgfResult<Directory> {
    let dir: Directory = io.read_struct(DIR_OFFSET)?;

    if dir.magic != DIRECTORY_MAGIC {
        return Err(IgfError::NotFound);
    }

    // Checksum of the whole structure except the first 8 bytes (magic, crc).
    if crc32(&dir.as_bytes()[DIR_CRC_START..]) != dir.crc {
        return Err(IgfError::Corrupt("directory CRC mismatch"));
    }

    Ok(dir)
}

/// Recomputes the directory CRC and writes the directory at [`DIR_OFFSET`].
///
/// Assembler and stripper call this last, after every section is on disk:
/// an interrupted rewrite leaves either the old directory or the complete
/// new one, never a half-committed state.
pub fn write_directory<IO: FlashIO + ?Sized>(io: &mut IO, dir: &mut Directory) -> IgfResult<()> {
    dir.update_crc();
    io.write_struct(DIR_OFFSET, dir)?;
    Ok(())
}
