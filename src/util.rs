//! Test utility stuff
use crate::{
    gpt::partition::{Partition, PartitionBuilder, PartitionType},
    types::*,
};
use uuid::Uuid;

/// Test data sector size
pub const SECTOR_SIZE: SectorSize = unsafe { SectorSize::new_unchecked(512) };

/// Expected Disk UUID
pub const DISK_GUID: &str = "A17875FB-1D86-EE4D-8DFE-E3E8ABBCD364";

/// Result type. Note that this must be imported explicitly or else it's
/// ambiguous with std prelude
pub type Result<T = ()> = anyhow::Result<T>;

/// Disk UUID used by tests
pub fn disk_uuid() -> Uuid {
    Uuid::parse_str(DISK_GUID).unwrap()
}

/// Linux `userdata` placeholder partition covering `start..=end`
pub fn placeholder(start: u64, end: u64) -> Partition {
    PartitionBuilder::new(PartitionType::LinuxFilesystemData)
        .uuid(Uuid::from_u128(0x97954376_2BB6_534B_A015_DF434A94ABA2))
        .start(Block(start))
        .end(Block(end))
        .name("userdata")
        .finish()
        .unwrap()
}
