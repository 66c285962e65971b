//! Handle partitions
use super::{
    error::{Error, Result},
    header::PARTITION_ENTRY_SIZE,
};
use crate::types::*;
use alloc::string::String;
use arrayvec::ArrayVec;
use core::{char, mem, slice};
use uuid::Uuid;

/// Partition names are limited to 36 UTF-16 code units on disk.
pub const NAME_UNITS: usize = 36;

/// UTF-16 partition name storage.
type Name = ArrayVec<[u16; NAME_UNITS]>;

/// GPT stores UUID's with the first three fields little endian,
/// and the rest as-is.
///
/// The conversion is its own inverse.
pub(crate) fn guid_bytes(uuid: &Uuid) -> [u8; 16] {
    let mut b = *uuid.as_bytes();
    b[0..4].reverse();
    b[4..6].reverse();
    b[6..8].reverse();
    b
}

/// Recognized GPT Partition Types
///
/// This is non-exhaustive,
/// a UUID we don't know is [`PartitionType::Unknown`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PartitionType {
    /// Unused entry
    Unused,

    /// The partition type is unknown.
    Unknown,

    /// EFI System Partition
    EfiSystem,

    /// Microsoft Reserved Partition
    MicrosoftReserved,

    /// Microsoft Basic Data
    MicrosoftBasicData,

    /// Linux Filesystem
    LinuxFilesystemData,
}

impl PartitionType {
    /// The type GUID of this partition type.
    ///
    /// [`PartitionType::Unknown`] maps to the nil UUID,
    /// same as [`PartitionType::Unused`].
    pub fn to_uuid(self) -> Uuid {
        Uuid::from_u128(match self {
            PartitionType::Unused | PartitionType::Unknown => 0,
            PartitionType::EfiSystem => 0xC12A7328_F81F_11D2_BA4B_00A0C93EC93B,
            PartitionType::MicrosoftReserved => 0xE3C9E316_0B5C_4DB8_817D_F92DF00215AE,
            PartitionType::MicrosoftBasicData => 0xEBD0A0A2_B9E5_4433_87C0_68B6B72699C7,
            PartitionType::LinuxFilesystemData => 0x0FC63DAF_8483_4772_8E79_3D69D8477DE4,
        })
    }

    /// Recognize a type GUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        if uuid.is_nil() {
            return PartitionType::Unused;
        }
        [
            PartitionType::EfiSystem,
            PartitionType::MicrosoftReserved,
            PartitionType::MicrosoftBasicData,
            PartitionType::LinuxFilesystemData,
        ]
        .iter()
        .copied()
        .find(|t| t.to_uuid() == uuid)
        .unwrap_or(PartitionType::Unknown)
    }
}

/// Raw partition structure
#[derive(Copy, Clone)]
#[repr(C, packed)]
pub(crate) struct RawPartition {
    /// Defines the type of this partition
    partition_type_guid: [u8; 16],

    /// Unique identifer for this partition
    partition_guid: [u8; 16],

    /// Where it starts on disk
    starting_lba: u64,

    /// Where it ends on disk
    ending_lba: u64,

    /// Attributes
    attributes: u64,

    /// Zero padded UTF-16LE name
    name: [u16; NAME_UNITS],
}

/// A GPT Partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Defines the type of this partition
    partition_type_guid: Uuid,

    /// Unique identifer for this partition
    partition_guid: Uuid,

    /// Where it starts on disk
    starting_lba: Block,

    /// Where it ends on disk, inclusive
    ending_lba: Block,

    /// Attributes
    attributes: u64,

    /// UTF-16 name, without padding
    name: Name,
}

impl Partition {
    /// Partition type GUID
    pub fn type_guid(&self) -> Uuid {
        self.partition_type_guid
    }

    /// Known partition type, see [`PartitionType`].
    pub fn partition_type(&self) -> PartitionType {
        PartitionType::from_uuid(self.partition_type_guid)
    }

    /// Partition GUID
    pub fn uuid(&self) -> Uuid {
        self.partition_guid
    }

    /// First LBA, inclusive
    pub fn start(&self) -> Block {
        self.starting_lba
    }

    /// Last LBA, inclusive
    pub fn end(&self) -> Block {
        self.ending_lba
    }

    /// Attribute bits
    pub fn attributes(&self) -> u64 {
        self.attributes
    }

    /// Partition name
    pub fn name(&self) -> String {
        char::decode_utf16(self.name.iter().copied())
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }

    /// Number of sectors covered, both ends included.
    ///
    /// Saturates at [`u64::MAX`] for a partition spanning every LBA.
    pub fn sectors(&self) -> u64 {
        (self.ending_lba.0 - self.starting_lba.0).saturating_add(1)
    }

    /// Size in bytes, or [`None`] if it doesn't fit in a [`u64`].
    pub fn size(&self, sector_size: SectorSize) -> Option<Size> {
        (self.ending_lba.0 - self.starting_lba.0)
            .checked_add(1)
            .and_then(|n| n.checked_mul(sector_size.get()))
            .map(Size::from_bytes)
    }

    /// Whether the LBA ranges of `self` and `other` share a sector.
    pub fn overlaps(&self, other: &Partition) -> bool {
        self.starting_lba <= other.ending_lba && other.starting_lba <= self.ending_lba
    }

    pub(crate) fn set_end(&mut self, end: Block) {
        self.ending_lba = end;
    }

    /// Write the raw entry to `dest`, which must be [`PARTITION_ENTRY_SIZE`]
    /// bytes.
    pub(crate) fn to_bytes(&self, dest: &mut [u8]) {
        let mut name = [0u16; NAME_UNITS];
        for (d, s) in name.iter_mut().zip(self.name.iter()) {
            *d = s.to_le();
        }
        let raw = RawPartition {
            partition_type_guid: guid_bytes(&self.partition_type_guid),
            partition_guid: guid_bytes(&self.partition_guid),
            starting_lba: self.starting_lba.0.to_le(),
            ending_lba: self.ending_lba.0.to_le(),
            attributes: self.attributes.to_le(),
            name,
        };
        // # Safety
        // - `RawPartition` is repr(C, packed)
        // - Every field already holds its little endian representation
        let bytes = unsafe {
            slice::from_raw_parts(
                &raw as *const RawPartition as *const u8,
                mem::size_of::<RawPartition>(),
            )
        };
        dest[..PARTITION_ENTRY_SIZE as usize].copy_from_slice(bytes);
    }
}

/// Partition Builder
///
/// Nothing is checked until [`PartitionBuilder::finish`].
#[derive(Debug, Clone)]
pub struct PartitionBuilder<'a> {
    partition_type: Uuid,
    uuid: Uuid,
    start: Block,
    end: Block,
    attributes: u64,
    name: &'a str,
}

impl<'a> PartitionBuilder<'a> {
    /// Start a partition of `partition_type`
    pub fn new(partition_type: PartitionType) -> Self {
        Self::with_type_guid(partition_type.to_uuid())
    }

    /// Start a partition with a raw type GUID
    pub fn with_type_guid(partition_type: Uuid) -> Self {
        Self {
            partition_type,
            uuid: Uuid::nil(),
            start: Block(0),
            end: Block(0),
            attributes: 0,
            name: "",
        }
    }

    /// Partition GUID
    pub fn uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }

    /// First LBA, inclusive
    pub fn start(mut self, start: Block) -> Self {
        self.start = start;
        self
    }

    /// Last LBA, inclusive
    pub fn end(mut self, end: Block) -> Self {
        self.end = end;
        self
    }

    /// Attribute bits
    pub fn attributes(mut self, attributes: u64) -> Self {
        self.attributes = attributes;
        self
    }

    /// Partition name, at most [`NAME_UNITS`] UTF-16 code units.
    pub fn name(mut self, name: &'a str) -> Self {
        self.name = name;
        self
    }

    /// Build the [`Partition`]
    ///
    /// # Errors
    ///
    /// - If the name does not fit in [`NAME_UNITS`] code units.
    /// - If `start` is after `end`.
    pub fn finish(self) -> Result<Partition> {
        let mut name = Name::new();
        for unit in self.name.encode_utf16() {
            name.try_push(unit)
                .map_err(|_| Error::Configuration("Partition name is too long"))?;
        }
        if self.start > self.end {
            return Err(Error::Configuration("Partition starts after it ends"));
        }
        Ok(Partition {
            partition_type_guid: self.partition_type,
            partition_guid: self.uuid,
            starting_lba: self.start,
            ending_lba: self.end,
            attributes: self.attributes,
            name,
        })
    }
}
