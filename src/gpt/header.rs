//! Handle GPT header
use super::partition::guid_bytes;
use crate::types::*;
use core::{mem, slice};
use crc::crc32;
use uuid::Uuid;

/// "EFI PART" constant as a u64
const EFI_PART: u64 = 0x5452_4150_2049_4645;

/// Current/supported GPT Header revision
pub const REVISION: u32 = 0x0001_0000;

/// Current/supported GPT Header size.
pub const HEADER_SIZE: u32 = 92;

/// Current/supported GPT Partition Entry size.
pub const PARTITION_ENTRY_SIZE: u32 = 128;

/// Byte offset of the header CRC32 field.
pub const HEADER_CRC_OFFSET: usize = 16;

/// Which of the two GPT copies is being described.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Structure {
    /// Header at the start of the disk, followed by its array.
    Primary,

    /// Mirror at the end of the disk, array first and header last.
    Backup,
}

/// Calculate the Header CRC for a [`RawHeader`].
fn calculate_crc(mut header: RawHeader) -> u32 {
    header.header_crc32 = 0;
    crc32::checksum_ieee(header.as_bytes())
}

/// The GPT Header Structure
///
/// Fields hold their little endian representation.
#[derive(Debug, Copy, Clone)]
#[repr(C, packed)]
struct RawHeader {
    /// Hard-coded to [`EFI_PART`]
    signature: u64,

    /// Hard-coded to [`REVISION`]
    revision: u32,

    /// Hard-coded to [`HEADER_SIZE`]
    header_size: u32,

    /// CRC32(bytes[0..header_size])
    ///
    /// Set to zero when computing CRC
    header_crc32: u32,

    /// Must be zero
    _reserved: u32,

    /// The logical block address we reside in
    this_lba: u64,

    /// The logical block address the other header is in
    alt_lba: u64,

    /// Where partitions can start
    first_usable_lba: u64,

    /// Where partitions must end
    last_usable_lba: u64,

    /// Disk GUID. See [`guid_bytes`] for details.
    disk_guid: [u8; 16],

    /// Where our partition array starts on disk.
    partition_array_start: u64,

    /// Number of partition entries
    partitions: u32,

    /// Size of each partition entry structure.
    partition_size: u32,

    /// CRC32 of the partition array
    partitions_crc32: u32,
}

impl RawHeader {
    fn as_bytes(&self) -> &[u8] {
        // # Safety
        // - `RawHeader` is repr(C, packed)
        // - Pointer will always be valid
        // - size_of used
        unsafe {
            slice::from_raw_parts(
                (self as *const RawHeader) as *const u8,
                mem::size_of::<RawHeader>(),
            )
        }
    }
}

impl Default for RawHeader {
    fn default() -> Self {
        RawHeader {
            signature: EFI_PART.to_le(),
            revision: REVISION.to_le(),
            header_size: HEADER_SIZE.to_le(),
            partition_size: PARTITION_ENTRY_SIZE.to_le(),
            // Default values
            header_crc32: Default::default(),
            _reserved: Default::default(),
            this_lba: Default::default(),
            alt_lba: Default::default(),
            first_usable_lba: Default::default(),
            last_usable_lba: Default::default(),
            disk_guid: Default::default(),
            partition_array_start: Default::default(),
            partitions: Default::default(),
            partitions_crc32: Default::default(),
        }
    }
}

/// GPT header values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    /// The logical block address this header is in
    pub this: Block,

    /// The logical block address the other header is in
    pub alt: Block,

    /// First valid LBA for partitions
    pub first_usable: Block,

    /// Last valid LBA for partitions
    pub last_usable: Block,

    /// Disk GUID
    pub uuid: Uuid,

    /// Number of partition entries
    pub partitions: u32,

    /// Where the partition array starts on disk.
    pub array: Block,

    /// CRC32 of the partition array
    pub partitions_crc32: u32,
}

impl Header {
    /// Header for `structure` on a disk whose GPT lives between
    /// `first` and `last`, each end reserving the header plus
    /// `array_lba_count` of partition array.
    ///
    /// Caller must ensure `last` leaves room for both reserved regions.
    pub fn new(
        structure: Structure,
        first: Block,
        last: Block,
        array_lba_count: u64,
        partitions: u32,
        partitions_crc32: u32,
        uuid: Uuid,
    ) -> Self {
        let (this, alt, array) = match structure {
            Structure::Primary => (first, last, first + 1),
            Structure::Backup => (last, first, last - array_lba_count),
        };
        Self {
            this,
            alt,
            // Header and partition array
            first_usable: first + 1 + array_lba_count,
            // Partition array and header
            last_usable: last - array_lba_count - 1,
            uuid,
            partitions,
            array,
            partitions_crc32,
        }
    }

    fn to_raw(&self) -> RawHeader {
        let mut raw = RawHeader::default();
        raw.this_lba = self.this.0.to_le();
        raw.alt_lba = self.alt.0.to_le();
        raw.first_usable_lba = self.first_usable.0.to_le();
        raw.last_usable_lba = self.last_usable.0.to_le();
        raw.disk_guid = guid_bytes(&self.uuid);
        raw.partition_array_start = self.array.0.to_le();
        raw.partitions = self.partitions.to_le();
        raw.partitions_crc32 = self.partitions_crc32.to_le();
        raw.header_crc32 = calculate_crc(raw).to_le();
        raw
    }

    /// CRC32 of the serialized header, with its own CRC field zeroed.
    pub fn crc32(&self) -> u32 {
        calculate_crc(self.to_raw())
    }

    /// Write the GPT header to `dest`
    ///
    /// `dest` must hold at least [`HEADER_SIZE`] bytes,
    /// anything after it is left untouched.
    pub fn to_bytes(&self, dest: &mut [u8]) {
        let raw = self.to_raw();
        dest[..HEADER_SIZE as usize].copy_from_slice(raw.as_bytes());
    }
}
