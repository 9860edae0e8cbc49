// SPDX-License-Identifier: MIT

//! Heuristic section-format detection for raw flash devices.
//!
//! Runs before any directory exists to trust: the only evidence available
//! is whether section-header CRCs validate under the V5 or the V6 layout.

use igfio::prelude::*;
use log::debug;

use crate::crc::crc32;
use crate::errors::*;
use crate::layout::{IGF_SECTION_SIZE_V6, SectionFormat};

/// Read budget: at most this many blocks of the larger section size.
const DETECT_MAX_BLOCKS: usize = 1024;

/// How many CRC-confirmed headers one hypothesis needs before the device
/// counts as detected.
const DETECT_THRESHOLD: u32 = 2;

/// Detection outcome. A device where both layouts validate does not get a
/// guess; that case is [`IgfError::Ambiguous`] and callers must treat it as
/// a hard failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detected {
    Format(SectionFormat),
    Unknown,
}

/// Classifies a raw device/file as V5, V6 or unknown.
///
/// Scans blocks of the larger candidate section size, skipping block 0
/// (boot registry and directory, no section header). Each block is scored
/// independently under both hypotheses by recomputing the payload CRC of
/// every candidate sub-chunk. Runs until one hypothesis wins, the read
/// budget is spent, or the device is exhausted (exhaustion is `Unknown`,
/// not an error).
pub fn detect_format<IO: FlashIO + ?Sized>(io: &mut IO) -> IgfResult<Detected> {
    let block = IGF_SECTION_SIZE_V6;
    let device_len = io.len()?;

    let mut buf = vec![0u8; block];
    let mut found_v5: u32 = 0;
    let mut found_v6: u32 = 0;

    for i in 0..DETECT_MAX_BLOCKS {
        let offset = (i * block) as u64;
        if offset + block as u64 > device_len {
            return Ok(Detected::Unknown);
        }
        io.read_at(offset, &mut buf)?;

        // Block 0 holds bootreg + directory, never a section header.
        if i == 0 {
            continue;
        }

        found_v6 += count_valid_headers(&buf, SectionFormat::V6);
        found_v5 += count_valid_headers(&buf, SectionFormat::V5);

        if found_v5 >= DETECT_THRESHOLD || found_v6 >= DETECT_THRESHOLD {
            debug!(
                "igf detect: v5={found_v5} v6={found_v6} after {} block(s)",
                i + 1
            );
            return if found_v5 == 0 {
                Ok(Detected::Format(SectionFormat::V6))
            } else if found_v6 == 0 {
                Ok(Detected::Format(SectionFormat::V5))
            } else {
                Err(IgfError::Ambiguous)
            };
        }
    }

    Ok(Detected::Unknown)
}

/// Number of sub-chunks of `buf` whose stored header CRC matches the
/// recomputed CRC of their payload region under `fmt`.
fn count_valid_headers(buf: &[u8], fmt: SectionFormat) -> u32 {
    let size = fmt.section_size();
    let start = fmt.crc_start();

    let mut found = 0;
    for sect in buf.chunks_exact(size) {
        // In both layouts the crc field directly precedes its domain.
        let stored = u32::from_le_bytes(sect[start - 4..start].try_into().unwrap());
        if crc32(&sect[start..]) == stored {
            found += 1;
        }
    }
    found
}
