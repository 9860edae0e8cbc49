// SPDX-License-Identifier: MIT

//! Rewrites an existing, valid IGF image with selected partitions removed.

use igfio::prelude::*;
use log::{debug, info};

use crate::assemble::rewrite_section;
use crate::directory::{read_directory, write_directory};
use crate::errors::*;
use crate::layout::*;

/// Copies `input` to `output` leaving out every partition whose minor is in
/// `exclude`, rebuilding section chains and a fresh directory.
///
/// Unlike the assembler's live-stream case the input is already a valid
/// image, so chains are walked through the *input directory's* fragment
/// table, not the in-section `next_section` pointers. The output directory
/// is written last; its freelist is left without fragments, since the
/// output is a file trimmed to its content with no free tail to describe.
pub fn strip<I, O>(input: &mut I, output: &mut O, exclude: &[u16]) -> IgfResult<()>
where
    I: FlashIO + ?Sized,
    O: FlashIO + ?Sized,
{
    for &minor in exclude {
        if minor == 0 || minor as usize >= DIR_MAX_MINORS {
            return Err(IgfError::OutOfRange("minor to delete outside 1..=255"));
        }
    }

    // No format recovery path: a bad input directory aborts the rewrite.
    let src_dir = read_directory(input)?;

    let mut buf = vec![0u8; IGF_SECTION_SIZE];

    // Section 0 of the output: zeroed except the boot registry, copied
    // verbatim (and unvalidated) from the input. The directory area is
    // rewritten at the end.
    input.read_at(
        BOOTREG_OFFSET,
        &mut buf[BOOTREG_OFFSET as usize..BOOTREG_OFFSET as usize + BOOTREG_SIZE],
    )?;
    output.write_at(0, &buf)?;

    let mut dir = Directory::fresh();
    *dir.partition_mut(0)? = PartitionDesc {
        minor: 0,
        ptype: PTYPE_IGEL_FREELIST,
        first_fragment: 0,
        n_fragments: 0,
    };

    let mut cursor: u32 = 1;

    for minor in 1..DIR_MAX_MINORS as u16 {
        if exclude.contains(&minor) {
            if src_dir.partition(minor)?.is_present() {
                info!("strip: ignoring minor {minor}");
            }
            continue;
        }
        if !src_dir.partition(minor)?.is_present() {
            continue;
        }

        let frags = src_dir.fragments_of(minor)?;
        let total64 = src_dir.section_count(minor)?;
        let total = u32::try_from(total64)
            .map_err(|_| IgfError::OutOfRange("partition section count overflow"))?;

        debug!(
            "strip: copying minor {minor}: {} fragment(s), {total} section(s)",
            frags.len()
        );

        let first_section = cursor;
        let mut idx: u32 = 0;
        let mut ptype = PTYPE_EMPTY;

        for frag in frags {
            for s in 0..frag.length {
                let src_off = u64::from(frag.first_section + s) * IGF_SECTION_SIZE as u64;
                input
                    .read_at(src_off, &mut buf)
                    .map_err(|e| IgfError::from(e).in_partition(minor))?;

                if idx == 0 {
                    // Partition type lives at the start of the first
                    // section's payload.
                    ptype =
                        u16::from_le_bytes([buf[IGF_SECT_HDR_LEN], buf[IGF_SECT_HDR_LEN + 1]]);
                }

                rewrite_section(&mut buf, idx, cursor, idx + 1 == total)?;
                output.write_at(u64::from(cursor) * IGF_SECTION_SIZE as u64, &buf)?;
                cursor += 1;
                idx += 1;
            }
        }

        let slot = dir.n_fragments;
        dir.fragment[slot as usize] = FragmentDesc {
            first_section,
            length: idx,
        };
        *dir.partition_mut(minor)? = PartitionDesc {
            minor,
            ptype,
            first_fragment: slot as u16,
            n_fragments: 1,
        };
        dir.n_fragments += 1;
    }

    write_directory(output, &mut dir)?;
    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::{SectionSource, assemble};
    use zerocopy::FromBytes;

    fn make_stream(minor: u16, total: u32) -> Vec<u8> {
        let mut stream = vec![0u8; total as usize * IGF_SECTION_SIZE];
        for (i, sect) in stream.chunks_exact_mut(IGF_SECTION_SIZE).enumerate() {
            let (hdr, _) = SectHdrV6::mut_from_prefix(sect).unwrap();
            hdr.partition_minor = u32::from(minor);
            hdr.next_section = if i == 0 { total } else { 0 };
            if i == 0 {
                sect[IGF_SECT_HDR_LEN..IGF_SECT_HDR_LEN + 2]
                    .copy_from_slice(&PTYPE_IGEL_RAW.to_le_bytes());
            }
            sect[IGF_SECT_HDR_LEN + 2] = minor as u8;
            sect[IGF_SECT_HDR_LEN + 3] = i as u8;
        }
        stream
    }

    fn assembled_image(parts: &[(u16, u32)]) -> MemFlashIO {
        let bootreg: Vec<u8> = (0..BOOTREG_SIZE).map(|i| (i / 7) as u8).collect();
        let mut sources: Vec<SectionSource<std::io::Cursor<Vec<u8>>>> = parts
            .iter()
            .map(|&(minor, total)| {
                SectionSource::new(minor, std::io::Cursor::new(make_stream(minor, total)))
            })
            .collect();
        let mut out = MemFlashIO::new();
        assemble(&mut out, 64 * IGF_SECTION_SIZE as u64, &bootreg, &mut sources).unwrap();
        out
    }

    #[test]
    fn excluded_minor_is_dropped() {
        let mut input = assembled_image(&[(1, 3), (7, 2), (9, 4)]);
        let mut output = MemFlashIO::new();
        strip(&mut input, &mut output, &[7]).unwrap();

        let dir = read_directory(&mut output).unwrap();
        assert_eq!(dir.present_minors().collect::<Vec<_>>(), vec![1, 9]);
        assert_eq!(dir.section_count(1).unwrap(), 3);
        assert_eq!(dir.section_count(9).unwrap(), 4);
        // Section 0 plus the two kept chains, nothing else.
        assert_eq!(output.len().unwrap(), (1 + 3 + 4) * IGF_SECTION_SIZE as u64);
    }

    #[test]
    fn kept_payload_survives_the_move() {
        let mut input = assembled_image(&[(1, 3), (7, 2), (9, 4)]);
        let mut output = MemFlashIO::new();
        strip(&mut input, &mut output, &[1]).unwrap();

        let dir = read_directory(&mut output).unwrap();
        // Minor 9's chain moved from sections 6..10 to 3..7; its payload
        // marker bytes must be intact.
        let frag = dir.fragments_of(9).unwrap()[0];
        let mut sect = vec![0u8; IGF_SECTION_SIZE];
        for i in 0..frag.length {
            let off = u64::from(frag.first_section + i) * IGF_SECTION_SIZE as u64;
            output.read_at(off, &mut sect).unwrap();
            assert_eq!(sect[IGF_SECT_HDR_LEN + 2], 9);
            assert_eq!(sect[IGF_SECT_HDR_LEN + 3], i as u8);
            let crc = crate::crc::crc32(&sect[SECTION_CRC_START_V6..]);
            assert_eq!(sect[..4], crc.to_le_bytes());
        }
    }

    #[test]
    fn freelist_left_empty() {
        // Pins the deliberate asymmetry with the assembler: the stripper's
        // output has no free tail, so minor 0 gets zero fragments and data
        // fragments start at slot 0.
        let mut input = assembled_image(&[(1, 2), (9, 1)]);
        let mut output = MemFlashIO::new();
        strip(&mut input, &mut output, &[]).unwrap();

        let dir = read_directory(&mut output).unwrap();
        let freelist = dir.partition(0).unwrap();
        assert_eq!(freelist.n_fragments, 0);
        assert_eq!(dir.partition(1).unwrap().first_fragment, 0);
        assert_eq!(dir.n_fragments, 2);
    }

    #[test]
    fn bootreg_preserved_byte_for_byte() {
        let mut input = assembled_image(&[(1, 1)]);
        let mut output = MemFlashIO::new();
        strip(&mut input, &mut output, &[]).unwrap();

        let mut src = vec![0u8; BOOTREG_SIZE];
        let mut dst = vec![0u8; BOOTREG_SIZE];
        input.read_at(BOOTREG_OFFSET, &mut src).unwrap();
        output.read_at(BOOTREG_OFFSET, &mut dst).unwrap();
        assert_eq!(src, dst);
    }

    #[test]
    fn stripping_the_freelist_is_out_of_range() {
        let mut input = assembled_image(&[(1, 1)]);
        let mut output = MemFlashIO::new();
        let err = strip(&mut input, &mut output, &[0]).unwrap_err();
        assert!(matches!(err, IgfError::OutOfRange(_)));
    }

    #[test]
    fn invalid_input_directory_aborts() {
        let mut input = MemFlashIO::with_len(4 * IGF_SECTION_SIZE);
        let mut output = MemFlashIO::new();
        assert!(matches!(
            strip(&mut input, &mut output, &[2]),
            Err(IgfError::NotFound)
        ));
    }
}
