//! GPT generation for flash devices dual hosting two operating systems.
//!
//! The disk starts with a primary OS whose last partition is a placeholder
//! spanning the free space. An EFI System Partition and a secondary OS
//! partition are carved from the tail of that placeholder on flash block
//! boundaries, and both GPT structures are encoded for the result.
//!
//! The protective MBR at LBA 0 is not produced here.
//!
//! # Usage
//!
//! ```rust
//! # use tailgpt::{types::*, *};
//! # use tailgpt::uuid::Uuid;
//! # fn main() -> Result<()> {
//! let userdata = PartitionBuilder::new(PartitionType::LinuxFilesystemData)
//!     .uuid(Uuid::from_u128(1))
//!     .start(Block(2048))
//!     .end(Block(2048))
//!     .name("userdata")
//!     .finish()?;
//! let sector_size = SectorSize::new(512).unwrap();
//! let images = make_gpt(
//!     Size::from_gib(128),
//!     sector_size,
//!     &[userdata],
//!     Uuid::from_u128(2),
//!     &TailConfig::default(),
//! )?;
//! for line in images.allocation.mkpart() {
//!     println!("{}", line);
//! }
//! // Write `images.primary` at `images.primary_offset()`
//! // and `images.backup` at `images.backup_offset()`.
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![deny(missing_docs)]

extern crate alloc;

#[cfg(test)]
mod util;

mod allocate;
mod disk;
mod gpt;
pub mod types;

pub use allocate::{
    allocate_tail_partitions,
    Allocation,
    EspSize,
    Strategy,
    TailConfig,
    TailLayout,
    LUN_USAGE_SECTORS,
    RESERVED_FLOOR,
    SECONDARY_FLOOR,
};
pub use disk::{make_gpt, GptImages};
pub use gpt::{
    encode::{encode_gpt, entry_count, min_array_lba_count, MAX_PARTITIONS},
    error::{Boundary, Error, Result},
    header::{
        Header,
        Structure,
        HEADER_CRC_OFFSET,
        HEADER_SIZE,
        PARTITION_ENTRY_SIZE,
        REVISION,
    },
    partition::{Partition, PartitionBuilder, PartitionType, NAME_UNITS},
};

// Re-exports
pub use uuid;
