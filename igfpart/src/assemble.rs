// SPDX-License-Identifier: MIT

//! Builds a fresh IGF image from live partition section streams.

use std::io::Read;

use igfio::prelude::*;
use log::{debug, info};
use zerocopy::FromBytes;

use crate::crc::crc32;
use crate::directory::write_directory;
use crate::errors::*;
use crate::layout::*;

/// One live partition input: a minor to file it under and a byte stream of
/// complete V6 sections.
///
/// By the format's stream convention the first section's `next_section`
/// field carries the partition's total section count instead of a chain
/// pointer ([`SectHdrV6::stream_total_sections`]); every later section is a
/// plain on-image section whose header gets rewritten on output anyway.
pub struct SectionSource<R> {
    pub minor: u16,
    pub stream: R,
}

impl<R: Read> SectionSource<R> {
    pub fn new(minor: u16, stream: R) -> Self {
        Self { minor, stream }
    }
}

/// Assembles a complete image onto `out`: section 0 (boot registry, zeroed
/// elsewhere), one rewritten section chain per source in input order, and
/// the partition directory last.
///
/// `device_size` is the size in bytes of the flash region the image is
/// destined for; the freelist fragment is sized to cover its unused tail.
/// `bootreg` must be exactly [`BOOTREG_SIZE`] bytes and is copied verbatim.
///
/// Any stream error is fatal to the whole assembly and names the minor
/// being read; the caller must not treat a partially written output as
/// usable.
pub fn assemble<IO, R>(
    out: &mut IO,
    device_size: u64,
    bootreg: &[u8],
    sources: &mut [SectionSource<R>],
) -> IgfResult<()>
where
    IO: FlashIO + ?Sized,
    R: Read,
{
    if bootreg.len() != BOOTREG_SIZE {
        return Err(IgfError::Invalid("boot registry must be exactly 32 KiB"));
    }
    let total_sections = device_size / IGF_SECTION_SIZE as u64;

    let mut buf = vec![0u8; IGF_SECTION_SIZE];

    // Section 0: all zero except the boot registry range. Permanently
    // outside every partition chain.
    buf[BOOTREG_OFFSET as usize..BOOTREG_OFFSET as usize + BOOTREG_SIZE].copy_from_slice(bootreg);
    out.write_at(0, &buf)?;

    let mut dir = Directory::fresh();
    // Fragment slot 0 is reserved for the freelist; partition fragments
    // are recorded from slot 1 on.
    dir.n_fragments = 1;
    *dir.partition_mut(0)? = PartitionDesc {
        minor: 0,
        ptype: PTYPE_IGEL_FREELIST,
        first_fragment: 0,
        n_fragments: 1,
    };

    // Next output section index; section 0 is already written.
    let mut cursor: u32 = 1;

    for src in sources.iter_mut() {
        let minor = src.minor;
        if minor == 0 || minor as usize >= DIR_MAX_MINORS {
            return Err(IgfError::OutOfRange("source minor outside 1..=255"));
        }
        if dir.partition(minor)?.is_present() {
            return Err(IgfError::Partition {
                minor,
                cause: "duplicate minor in source list",
            });
        }

        debug!("assemble: reading section stream for minor {minor}");

        let first_section = cursor;
        read_section(&mut src.stream, &mut buf, minor)?;

        let (hdr, _) = SectHdrV6::mut_from_prefix(buf.as_mut_slice())
            .map_err(|_| IgfError::Invalid("section smaller than header"))?;
        let total = hdr.stream_total_sections();
        let record_minor = hdr.partition_minor as u16;
        if total == 0 {
            return Err(IgfError::Partition {
                minor,
                cause: "stream reports zero sections",
            });
        }

        // The partition header sits at the start of the first section's
        // payload; its leading field is the partition type.
        let ptype = u16::from_le_bytes([buf[IGF_SECT_HDR_LEN], buf[IGF_SECT_HDR_LEN + 1]]);

        for idx in 0..total {
            if idx > 0 {
                read_section(&mut src.stream, &mut buf, minor)?;
            }
            rewrite_section(&mut buf, idx, cursor, idx + 1 == total)?;
            out.write_at(u64::from(cursor) * IGF_SECTION_SIZE as u64, &buf)?;
            cursor += 1;
        }

        let slot = dir.n_fragments;
        if slot as usize >= MAX_FRAGMENTS {
            return Err(IgfError::OutOfRange("directory fragment table full"));
        }
        dir.fragment[slot as usize] = FragmentDesc {
            first_section,
            length: total,
        };
        *dir.partition_mut(minor)? = PartitionDesc {
            minor: record_minor,
            ptype,
            first_fragment: slot as u16,
            n_fragments: 1,
        };
        dir.n_fragments += 1;

        info!("assemble: minor {minor} -> {total} section(s) at {first_section}");
    }

    // Shrink the freelist to exactly the unused tail of the device.
    let data_sections = u64::from(cursor) - 1;
    if total_sections < 1 + data_sections {
        return Err(IgfError::OutOfRange("partitions exceed device size"));
    }
    dir.fragment[0] = FragmentDesc {
        first_section: cursor,
        length: (total_sections - 1 - data_sections) as u32,
    };

    write_directory(out, &mut dir)?;
    out.flush()?;
    Ok(())
}

/// Rewrites the in-buffer section header for its output position and stamps
/// the payload CRC.
pub(crate) fn rewrite_section(
    buf: &mut [u8],
    section_in_minor: u32,
    out_index: u32,
    last: bool,
) -> IgfResult<()> {
    let (hdr, _) = SectHdrV6::mut_from_prefix(buf)
        .map_err(|_| IgfError::Invalid("section smaller than header"))?;
    hdr.section_in_minor = section_in_minor;
    hdr.generation = 1;
    // The last section must end the chain; the flash driver's failsafe
    // path depends on the sentinel being present.
    hdr.next_section = if last { SECTION_END } else { out_index + 1 };

    let crc = crc32(&buf[SECTION_CRC_START_V6..]);
    buf[..4].copy_from_slice(&crc.to_le_bytes());
    Ok(())
}

/// Reads exactly one section from a partition stream.
fn read_section<R: Read>(stream: &mut R, buf: &mut [u8], minor: u16) -> IgfResult<()> {
    stream.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            IgfError::Partition {
                minor,
                cause: "short read from section stream",
            }
        } else {
            IgfError::from(e).in_partition(minor)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::read_directory;

    /// Builds a synthetic live stream of `total` sections for `minor`, with
    /// the first-section total-count convention and a partition type at the
    /// start of the first payload.
    fn make_stream(minor: u16, total: u32, ptype: u16) -> Vec<u8> {
        let mut stream = vec![0u8; total as usize * IGF_SECTION_SIZE];
        for (i, sect) in stream.chunks_exact_mut(IGF_SECTION_SIZE).enumerate() {
            let (hdr, _) = SectHdrV6::mut_from_prefix(sect).unwrap();
            hdr.magic = 0xB001_F00D;
            hdr.section_size = 2; // log2(0x40000 / 0x10000)
            hdr.partition_minor = u32::from(minor);
            hdr.section_in_minor = i as u32;
            hdr.next_section = if i == 0 { total } else { 0xDEAD_BEEF };
            if i == 0 {
                sect[IGF_SECT_HDR_LEN..IGF_SECT_HDR_LEN + 2].copy_from_slice(&ptype.to_le_bytes());
            }
            // Distinctive payload so chains can be told apart.
            sect[IGF_SECT_HDR_LEN + 2] = minor as u8;
            sect[IGF_SECT_HDR_LEN + 3] = i as u8;
        }
        stream
    }

    fn assemble_mem(
        device_sections: u64,
        parts: &[(u16, u32, u16)],
    ) -> (MemFlashIO, Vec<u8>) {
        let bootreg: Vec<u8> = (0..BOOTREG_SIZE).map(|i| (i % 251) as u8).collect();
        let mut sources: Vec<SectionSource<std::io::Cursor<Vec<u8>>>> = parts
            .iter()
            .map(|&(minor, total, ptype)| {
                SectionSource::new(minor, std::io::Cursor::new(make_stream(minor, total, ptype)))
            })
            .collect();
        let mut out = MemFlashIO::new();
        assemble(
            &mut out,
            device_sections * IGF_SECTION_SIZE as u64,
            &bootreg,
            &mut sources,
        )
        .unwrap();
        (out, bootreg)
    }

    #[test]
    fn round_trip_directory_matches_inputs() {
        let (mut out, _) = assemble_mem(64, &[(1, 3, PTYPE_IGEL_RAW), (7, 2, PTYPE_IGEL_RAW)]);

        let dir = read_directory(&mut out).unwrap();
        assert_eq!(dir.present_minors().collect::<Vec<_>>(), vec![1, 7]);
        assert_eq!(dir.section_count(1).unwrap(), 3);
        assert_eq!(dir.section_count(7).unwrap(), 2);
        assert_eq!(dir.partition(1).unwrap().ptype, PTYPE_IGEL_RAW);
        assert_eq!(dir.n_fragments, 3);

        // Freelist covers exactly the unused tail.
        let free = dir.fragments_of(0).unwrap();
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].first_section, 6);
        assert_eq!(free[0].length, 64 - 1 - 5);
    }

    #[test]
    fn bootreg_copied_verbatim_and_excluded_from_chains() {
        let (mut out, bootreg) = assemble_mem(16, &[(2, 1, PTYPE_IGEL_RAW)]);

        let mut sect0 = vec![0u8; IGF_SECTION_SIZE];
        out.read_at(0, &mut sect0).unwrap();
        assert_eq!(&sect0[BOOTREG_OFFSET as usize..BOOTREG_OFFSET as usize + BOOTREG_SIZE],
            bootreg.as_slice());
        // Below the bootreg nothing but zeroes.
        assert!(sect0[..BOOTREG_OFFSET as usize].iter().all(|&b| b == 0));

        let dir = read_directory(&mut out).unwrap();
        assert_eq!(dir.fragments_of(2).unwrap()[0].first_section, 1);
    }

    #[test]
    fn section_headers_rewritten_with_valid_crc() {
        let (mut out, _) = assemble_mem(16, &[(5, 2, PTYPE_IGEL_RAW)]);

        let mut sect = vec![0u8; IGF_SECTION_SIZE];
        for i in 0..2u32 {
            out.read_at(u64::from(1 + i) * IGF_SECTION_SIZE as u64, &mut sect)
                .unwrap();
            let (hdr, _) = SectHdrV6::mut_from_prefix(sect.as_mut_slice()).unwrap();
            assert_eq!({ hdr.section_in_minor }, i);
            assert_eq!({ hdr.generation }, 1);
            let next = hdr.next_section;
            if i == 1 {
                assert_eq!(next, SECTION_END);
            } else {
                assert_eq!(next, 2);
            }
            let stored = hdr.crc;
            assert_eq!(stored, crc32(&sect[SECTION_CRC_START_V6..]));
        }
    }

    #[test]
    fn short_stream_names_the_minor() {
        let bootreg = vec![0u8; BOOTREG_SIZE];
        let mut short = make_stream(9, 4, PTYPE_IGEL_RAW);
        short.truncate(2 * IGF_SECTION_SIZE + 100);
        let mut sources = vec![SectionSource::new(9, std::io::Cursor::new(short))];

        let mut out = MemFlashIO::new();
        let err = assemble(
            &mut out,
            64 * IGF_SECTION_SIZE as u64,
            &bootreg,
            &mut sources,
        )
        .unwrap_err();
        assert_eq!(
            err,
            IgfError::Partition {
                minor: 9,
                cause: "short read from section stream",
            }
        );
    }

    #[test]
    fn wrong_bootreg_length_is_invalid() {
        let mut sources: Vec<SectionSource<std::io::Cursor<Vec<u8>>>> = vec![];
        let mut out = MemFlashIO::new();
        let err = assemble(&mut out, 16 * IGF_SECTION_SIZE as u64, &[0u8; 16], &mut sources)
            .unwrap_err();
        assert!(matches!(err, IgfError::Invalid(_)));
    }

    #[test]
    fn oversized_partitions_do_not_fit() {
        let bootreg = vec![0u8; BOOTREG_SIZE];
        let mut sources = vec![SectionSource::new(
            3,
            std::io::Cursor::new(make_stream(3, 4, PTYPE_IGEL_RAW)),
        )];
        let mut out = MemFlashIO::new();
        let err = assemble(
            &mut out,
            4 * IGF_SECTION_SIZE as u64,
            &bootreg,
            &mut sources,
        )
        .unwrap_err();
        assert!(matches!(err, IgfError::OutOfRange(_)));
    }
}
