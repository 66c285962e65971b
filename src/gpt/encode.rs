//! GPT encoding
use super::{
    error::{Error, Result},
    header::{Header, Structure, HEADER_SIZE, PARTITION_ENTRY_SIZE},
    partition::Partition,
};
use crate::types::*;
use alloc::{vec, vec::Vec};
use core::convert::TryFrom;
use crc::{crc32, Hasher32};
use uuid::Uuid;

/// Most partitions a table can hold.
pub const MAX_PARTITIONS: usize = 128;

/// Header entry counts a partition array is rounded up to.
const ENTRY_COUNTS: [usize; 3] = [32, 64, MAX_PARTITIONS];

/// Header partition entry count for `partitions` populated entries.
///
/// # Errors
///
/// - If `partitions` is more than [`MAX_PARTITIONS`].
pub fn entry_count(partitions: usize) -> Result<u32> {
    ENTRY_COUNTS
        .iter()
        .copied()
        .find(|n| partitions <= *n)
        .map(|n| n as u32)
        .ok_or(Error::Capacity {
            count: partitions,
            max: MAX_PARTITIONS,
        })
}

/// Sectors needed to store `entries` partition entries.
pub fn min_array_lba_count(entries: u32, sector_size: SectorSize) -> u64 {
    sector_size.sectors_for(u64::from(entries) * u64::from(PARTITION_ENTRY_SIZE))
}

/// Check `partitions` can be described by a GPT spanning `first..=last`.
fn validate(partitions: &[Partition], header: &Header) -> Result<()> {
    for (i, part) in partitions.iter().enumerate() {
        if part.start() > part.end() {
            return Err(Error::Configuration("Partition starts after it ends"));
        }
        if part.start() < header.first_usable || part.end() > header.last_usable {
            return Err(Error::Configuration("Partition outside of usable space"));
        }
        if partitions[..i].iter().any(|p| p.overlaps(part)) {
            return Err(Error::Configuration("Partitions overlap"));
        }
    }
    Ok(())
}

/// Encode one GPT structure, header and partition array, in disk order.
///
/// `first` is the LBA of the primary header and `last` the LBA of the
/// backup header. `array_lba_count` sectors are reserved for the partition
/// array next to each header.
///
/// For [`Structure::Primary`] the buffer is the header sector followed by
/// the array, to be written at `first`.
/// For [`Structure::Backup`] the array comes first and the header last,
/// to be written at `last - array_lba_count`.
///
/// # Errors
///
/// - [`Error::Capacity`] if there are more than [`MAX_PARTITIONS`]
///   partitions.
/// - [`Error::Configuration`] if `array_lba_count` can't hold the entry count,
///   the usable range is empty, or a partition is invalid, out of range,
///   or overlapping another.
pub fn encode_gpt(
    first: Block,
    last: Block,
    sector_size: SectorSize,
    partitions: &[Partition],
    disk_uuid: Uuid,
    array_lba_count: u64,
    structure: Structure,
) -> Result<Vec<u8>> {
    let entries = entry_count(partitions.len())?;
    if !sector_size.get().is_power_of_two() {
        return Err(Error::Configuration("Sector size must be a power of two"));
    }
    let block = usize::try_from(sector_size.get())
        .map_err(|_| Error::Configuration("Sector size too large"))?;
    if block < HEADER_SIZE as usize {
        return Err(Error::Configuration("Sector size smaller than the GPT header"));
    }
    if array_lba_count < min_array_lba_count(entries, sector_size) {
        return Err(Error::Configuration(
            "Too many partitions to fit in the partition array",
        ));
    }
    // Header and array at each end
    let reserved = array_lba_count
        .checked_add(1)
        .and_then(|n| n.checked_mul(2))
        .ok_or(Error::Configuration("Partition array too large"))?;
    // Both reserved regions plus at least one usable sector
    if last.0 < first.0 || last.0 - first.0 < reserved {
        return Err(Error::Configuration("Disk too small for a GPT"));
    }
    let array_len = usize::try_from(array_lba_count)
        .ok()
        .and_then(|n| n.checked_mul(block))
        .ok_or(Error::Configuration("Partition array too large"))?;

    // Validate against either header, usable space is the same.
    let header = Header::new(structure, first, last, array_lba_count, entries, 0, disk_uuid);
    validate(partitions, &header)?;

    // Entries, zero padded to `entries`, then to the array sectors
    let mut array = vec![0; array_len];
    let entry_size = PARTITION_ENTRY_SIZE as usize;
    for (part, dest) in partitions.iter().zip(array.chunks_exact_mut(entry_size)) {
        part.to_bytes(dest);
    }
    let mut digest = crc32::Digest::new(crc32::IEEE);
    digest.write(&array[..entries as usize * entry_size]);

    let header = Header {
        partitions_crc32: digest.sum32(),
        ..header
    };
    let mut header_buf = vec![0; block];
    header.to_bytes(&mut header_buf);

    let mut out = Vec::with_capacity(block + array_len);
    match structure {
        Structure::Primary => {
            out.extend_from_slice(&header_buf);
            out.extend_from_slice(&array);
        }
        Structure::Backup => {
            out.extend_from_slice(&array);
            out.extend_from_slice(&header_buf);
        }
    }
    Ok(out)
}
