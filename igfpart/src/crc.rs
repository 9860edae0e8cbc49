// SPDX-License-Identifier: MIT

//! Checksum engine for sections and the partition directory.
//!
//! The format uses the gzip-family table CRC: generator polynomial terms
//! {0,1,2,4,5,7,8,10,11,12,16,22,23,26} (plus x^32), reflected, with the
//! running register pre/post conditioned with `0xFFFFFFFF`. That is exactly
//! CRC-32/ISO-HDLC, so `crc32fast` computes bit-identical values.
//!
//! Each independent checksum gets its own accumulator (`crc32fast::Hasher`
//! for streaming, [`crc32`] for one-shot); there is no shared register to
//! reset between computations.

pub use crc32fast::Hasher;

/// One-shot CRC of a complete byte region.
#[inline]
pub fn crc32(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}
