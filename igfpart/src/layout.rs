// SPDX-License-Identifier: MIT

//! On-disk model of the IGF flash format: section headers (both variants),
//! the partition directory and its inline descriptor tables.
//!
//! All multi-byte fields are little-endian; the structs below are only ever
//! read/written on LE targets, the only targets the format ships on.

use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::errors::*;

/// V5 section size (64 KiB).
pub const IGF_SECTION_SIZE_V5: usize = 0x1_0000;
/// V6 section size (256 KiB).
pub const IGF_SECTION_SIZE_V6: usize = 0x4_0000;
/// Section size of the write path; assembling and stripping is V6 only.
pub const IGF_SECTION_SIZE: usize = IGF_SECTION_SIZE_V6;

/// Bytes reserved for the V6 section header at the start of every section;
/// the partition payload starts here.
pub const IGF_SECT_HDR_LEN: usize = 32;

/// Start of the CRC domain within a section, per header variant. V5 places
/// `magic` before `crc`, V6 the other way around; in both cases the domain
/// is everything after the `crc` field up to the end of the section.
pub const SECTION_CRC_START_V5: usize = 8;
pub const SECTION_CRC_START_V6: usize = 4;

/// `next_section` sentinel marking the last section of a chain.
pub const SECTION_END: u32 = 0xFFFF_FFFF;
/// V5 counterpart of [`SECTION_END`] (signed 16-bit field).
pub const SECTION_END_V5: i16 = -1;

/// The boot registry is a 32 KiB opaque blob 32 KiB into section 0. It is
/// never partition payload and is carried verbatim across rebuilds.
pub const BOOTREG_OFFSET: u64 = 0x8000;
pub const BOOTREG_SIZE: usize = 0x8000;

/// The partition directory immediately follows the boot registry, still
/// inside section 0.
pub const DIR_OFFSET: u64 = BOOTREG_OFFSET + BOOTREG_SIZE as u64;

/// "PDIR" read little-endian.
pub const DIRECTORY_MAGIC: u32 = 0x5249_4450;
/// Placeholder CRC value before the real directory CRC is computed.
pub const CRC_DUMMY: u32 = 0x5555_5555;

/// Fixed directory table bounds, part of the on-disk contract.
pub const DIR_MAX_MINORS: usize = 256;
pub const MAX_FRAGMENTS: usize = 1404;

/// Partition types.
pub const PTYPE_EMPTY: u16 = 0;
pub const PTYPE_IGEL_RAW: u16 = 1;
pub const PTYPE_IGEL_COMPRESSED: u16 = 2;
pub const PTYPE_IGEL_FREELIST: u16 = 3;

/// Section-header variant of a device, decided once by the detector and
/// threaded explicitly through everything downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionFormat {
    V5,
    V6,
}

impl SectionFormat {
    #[inline]
    pub fn section_size(self) -> usize {
        match self {
            SectionFormat::V5 => IGF_SECTION_SIZE_V5,
            SectionFormat::V6 => IGF_SECTION_SIZE_V6,
        }
    }

    #[inline]
    pub fn crc_start(self) -> usize {
        match self {
            SectionFormat::V5 => SECTION_CRC_START_V5,
            SectionFormat::V6 => SECTION_CRC_START_V6,
        }
    }
}

impl core::fmt::Display for SectionFormat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SectionFormat::V5 => write!(f, "v5"),
            SectionFormat::V6 => write!(f, "v6"),
        }
    }
}

/// Legacy V5 section header. Only the detector ever looks at these.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct SectHdrV5 {
    pub magic: u32,
    pub crc: u32,
    pub partition: u32,
    pub section_in_minor: u8,
    pub version: u16,
    pub next_section: i16,
}

/// V6 section header, one per 256 KiB section.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct SectHdrV6 {
    pub crc: u32,
    pub magic: u32,
    pub section_type: u16,
    /// log2((section size in bytes) / 65536)
    pub section_size: u16,
    pub partition_minor: u32,
    pub generation: u16,
    pub section_in_minor: u32,
    pub next_section: u32,
}

impl SectHdrV6 {
    /// On the *first* section of a live partition stream, `next_section`
    /// does not point anywhere: it carries the total section count of the
    /// partition. Only the assembler, reading such streams, may call this;
    /// on-image headers always hold a chain pointer or [`SECTION_END`].
    #[inline]
    pub fn stream_total_sections(&self) -> u32 {
        self.next_section
    }

    #[inline]
    pub fn is_last(&self) -> bool {
        self.next_section == SECTION_END
    }
}

/// One logical partition slot of the directory, indexed by minor.
/// Minor 0 is the freelist pseudo-partition.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct PartitionDesc {
    pub minor: u16,
    pub ptype: u16,
    /// Index of the first fragment in the directory fragment table.
    pub first_fragment: u16,
    /// Number of consecutive fragments; 0 means "no such partition".
    pub n_fragments: u16,
}

impl PartitionDesc {
    #[inline]
    pub fn is_present(&self) -> bool {
        self.n_fragments > 0
    }
}

/// A contiguous run of sections owned by one partition (or the freelist).
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct FragmentDesc {
    pub first_section: u32,
    pub length: u32,
}

/// The partition directory: singular root metadata table at [`DIR_OFFSET`].
///
/// The descriptor arrays are fixed-size inline storage regardless of how
/// many entries are in use; `n_fragments` counts the used fragment slots.
/// The CRC covers every byte from offset 8 (after `magic` and `crc`) to the
/// end of the struct.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone)]
#[repr(C)]
pub struct Directory {
    pub magic: u32,
    pub crc: u32,
    pub dir_type: u16,
    pub max_minors: u16,
    pub version: u16,
    pub dummy: u16,
    pub n_fragments: u32,
    pub max_fragments: u32,
    pub extension: [u8; 8],
    pub partition: [PartitionDesc; DIR_MAX_MINORS],
    pub fragment: [FragmentDesc; MAX_FRAGMENTS],
}

/// Byte range of the directory excluded from its own CRC (`magic` + `crc`).
pub const DIR_CRC_START: usize = 8;

impl Directory {
    /// A fresh, empty directory with the fixed header fields filled in and
    /// all descriptor slots zeroed. `crc` holds [`CRC_DUMMY`] until
    /// [`Directory::update_crc`] runs.
    pub fn fresh() -> Self {
        let mut dir = Self::new_zeroed();
        dir.magic = DIRECTORY_MAGIC;
        dir.crc = CRC_DUMMY;
        dir.dir_type = 0;
        dir.max_minors = DIR_MAX_MINORS as u16;
        dir.version = 1;
        dir.n_fragments = 0;
        dir.max_fragments = MAX_FRAGMENTS as u32;
        dir
    }

    /// Bounds-checked partition slot lookup.
    pub fn partition(&self, minor: u16) -> IgfResult<&PartitionDesc> {
        self.partition
            .get(minor as usize)
            .ok_or(IgfError::OutOfRange("minor beyond directory bounds"))
    }

    pub fn partition_mut(&mut self, minor: u16) -> IgfResult<&mut PartitionDesc> {
        self.partition
            .get_mut(minor as usize)
            .ok_or(IgfError::OutOfRange("minor beyond directory bounds"))
    }

    /// Bounds-checked fragment slot lookup.
    pub fn fragment(&self, idx: u32) -> IgfResult<&FragmentDesc> {
        self.fragment
            .get(idx as usize)
            .ok_or(IgfError::OutOfRange("fragment index beyond directory bounds"))
    }

    /// The fragment run belonging to one partition, in chain order.
    pub fn fragments_of(&self, minor: u16) -> IgfResult<&[FragmentDesc]> {
        let part = self.partition(minor)?;
        let first = part.first_fragment as usize;
        let end = first + part.n_fragments as usize;
        self.fragment
            .get(first..end)
            .ok_or(IgfError::OutOfRange("fragment run beyond directory bounds"))
    }

    /// Minors of all data partitions present in the directory, ascending.
    /// Minor 0 (the freelist) is never reported.
    pub fn present_minors(&self) -> impl Iterator<Item = u16> + '_ {
        self.partition
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, p)| p.is_present())
            .map(|(i, _)| i as u16)
    }

    /// Total section count of a partition (sum of its fragment lengths).
    pub fn section_count(&self, minor: u16) -> IgfResult<u64> {
        Ok(self
            .fragments_of(minor)?
            .iter()
            .map(|f| u64::from(f.length))
            .sum())
    }

    /// Recomputes and stores the directory CRC over bytes `[8, len)`.
    pub fn update_crc(&mut self) {
        let crc = crate::crc::crc32(&self.as_bytes()[DIR_CRC_START..]);
        self.crc = crc;
    }
}
