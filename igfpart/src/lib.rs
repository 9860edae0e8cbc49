// SPDX-License-Identifier: MIT

//! Storage core for the IGF embedded flash format: the partition directory
//! and section-chain on-disk structures, format detection, and the whole-
//! image assemble/strip rewriters.
//!
//! Nothing here locks or retries: images are rewritten wholesale, the
//! directory always last, and callers serialize access to a device
//! themselves.

pub mod errors;

/// Checksum engine (CRC-32 of section payloads and the directory).
pub mod crc;
/// On-disk structures and format constants.
pub mod layout;

/// Section-format version detection for raw devices.
pub mod detect;
/// Partition directory reader/validator and writer.
pub mod directory;

/// Fresh-image assembly from live partition streams.
pub mod assemble;
/// Partition removal rewrite of an existing image.
pub mod strip;

pub use assemble::{SectionSource, assemble};
pub use detect::{Detected, detect_format};
pub use directory::{read_directory, write_directory};
pub use errors::{IgfError, IgfResult};
pub use layout::{Directory, FragmentDesc, PartitionDesc, SectionFormat};
pub use strip::strip;
