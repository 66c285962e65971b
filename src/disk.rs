//! Whole disk GPT generation
use crate::{
    allocate::{allocate_tail_partitions, Allocation, TailConfig},
    gpt::{
        encode::{encode_gpt, entry_count, min_array_lba_count},
        error::{Error, Result},
        header::Structure,
        partition::Partition,
    },
    types::*,
};
use alloc::vec::Vec;
use log::debug;
use uuid::Uuid;

/// LBA of the primary GPT header. LBA 0 holds the protective MBR.
const PRIMARY_LBA: Block = Block(1);

/// Both GPT structures for a disk, ready to be written.
#[derive(Debug, Clone)]
pub struct GptImages {
    /// Primary header and partition array, written at LBA 1.
    pub primary: Vec<u8>,

    /// Backup partition array and header, written at the end of the disk.
    pub backup: Vec<u8>,

    /// The final partition table
    pub partitions: Vec<Partition>,

    /// How the tail of the disk was shared
    pub allocation: Allocation,

    /// Last LBA of the disk, where the backup header lives
    pub last_lba: Block,

    /// Sectors reserved for each partition array
    pub array_lba_count: u64,

    sector_size: SectorSize,
}

impl GptImages {
    /// Byte offset to write [`GptImages::primary`] at.
    pub fn primary_offset(&self) -> Offset {
        PRIMARY_LBA * self.sector_size
    }

    /// Byte offset to write [`GptImages::backup`] at.
    pub fn backup_offset(&self) -> Offset {
        (self.last_lba - self.array_lba_count) * self.sector_size
    }
}

/// Build the primary and backup GPT for a disk of `disk_size` bytes.
///
/// The last partition in `default_table` is the placeholder. It's stretched
/// to the last usable LBA before the ESP and secondary OS partitions are
/// carved from its tail, see [`allocate_tail_partitions`].
///
/// The partition array is sized for the header entry count,
/// rounded up to 32, 64 or 128 entries.
///
/// # Errors
///
/// - [`Error::Configuration`] if the disk can't hold the table, or the
///   allocation settings are invalid.
/// - [`Error::Capacity`] if the final table has more than 128 partitions.
/// - [`Error::Alignment`] if a tail boundary misses a flash block.
pub fn make_gpt(
    disk_size: Size,
    sector_size: SectorSize,
    default_table: &[Partition],
    disk_uuid: Uuid,
    config: &TailConfig,
) -> Result<GptImages> {
    let entries = entry_count(default_table.len() + 2)?;
    let array_lba_count = min_array_lba_count(entries, sector_size);
    let last_lba = (disk_size / sector_size)
        .0
        .checked_sub(1)
        .map(Block)
        .ok_or(Error::Configuration("Disk is empty"))?;
    let last_usable = last_lba
        .0
        .checked_sub(array_lba_count + 1)
        .filter(|lba| *lba > PRIMARY_LBA.0 + array_lba_count)
        .map(Block)
        .ok_or(Error::Configuration("Disk too small for a GPT"))?;
    debug!(
        "{} entries in {} sectors, last usable {}",
        entries, array_lba_count, last_usable
    );

    let mut partitions = default_table.to_vec();
    match partitions.last_mut() {
        Some(p) if p.start() <= last_usable => p.set_end(last_usable),
        Some(_) => {
            return Err(Error::Configuration(
                "Placeholder partition starts past the usable space",
            ))
        }
        None => return Err(Error::Configuration("Partition table is empty")),
    }
    let allocation = allocate_tail_partitions(&mut partitions, sector_size, config)?;

    let encode = |structure| {
        encode_gpt(
            PRIMARY_LBA,
            last_lba,
            sector_size,
            &partitions,
            disk_uuid,
            array_lba_count,
            structure,
        )
    };
    let primary = encode(Structure::Primary)?;
    let backup = encode(Structure::Backup)?;

    Ok(GptImages {
        primary,
        backup,
        partitions,
        allocation,
        last_lba,
        array_lba_count,
        sector_size,
    })
}
