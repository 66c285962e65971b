//! Tail partition allocation
//!
//! The last partition of the default table is a placeholder spanning the
//! free space. An EFI System Partition and the secondary OS partition are
//! carved from its tail, on flash block boundaries, and the placeholder is
//! shrunk to end right before the ESP.
use crate::{
    gpt::{
        encode::MAX_PARTITIONS,
        error::{Boundary, Error, Result},
        partition::{Partition, PartitionBuilder, PartitionType},
    },
    types::*,
};
use alloc::{format, string::String, vec::Vec};
use log::{debug, info};
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use uuid::Uuid;

/// Least space the fixed reservation strategy may leave the primary OS.
pub const RESERVED_FLOOR: Size = Size::from_gib(4);

/// Least space the secondary OS partition ever gets.
pub const SECONDARY_FLOOR: Size = Size::from_gib(64);

/// Sectors of another LUN that count towards the primary OS space.
///
/// Only used by [`Strategy::SplitInHalf`].
pub const LUN_USAGE_SECTORS: u64 = 8_679_372;

/// Name of the injected EFI System Partition
pub const ESP_NAME: &str = "esp";

/// Name of the injected secondary OS partition
pub const SECONDARY_NAME: &str = "win";

const ESP_UUID: u128 = 0xDEC2832A_5F6C_430A_BD85_42551BCE7B91;
const SECONDARY_UUID: u128 = 0x92DEE62D_ED67_4EC3_9DAA_C9A4BCE2C355;

/// How the tail space is shared between the two operating systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub enum Strategy {
    /// Half for each OS, counting [`LUN_USAGE_SECTORS`] as primary OS space.
    SplitInHalf,

    /// Leave [`TailConfig::reserved`] to the primary OS, the rest goes to the
    /// secondary OS.
    FixedReservation,
}

/// Minimum ESP size, before rounding up to a flash block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub enum EspSize {
    /// 65536 sectors
    Fixed,

    /// The FAT32 cluster count limit, 65525 + 1024 + 1 sectors
    Fat32Minimum,
}

impl EspSize {
    /// Size in sectors
    pub fn sectors(self) -> u64 {
        match self {
            EspSize::Fixed => 65536,
            EspSize::Fat32Minimum => 65525 + 1024 + 1,
        }
    }
}

/// Tail allocation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", default)
)]
pub struct TailConfig {
    /// Flash erase block, in sectors. Must be a power of two.
    pub flash_block: u64,

    /// Space sharing strategy
    pub strategy: Strategy,

    /// Primary OS space for [`Strategy::FixedReservation`].
    ///
    /// Must be at least [`RESERVED_FLOOR`], whatever the strategy.
    pub reserved: Size,

    /// ESP sizing
    pub esp: EspSize,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            flash_block: 4,
            strategy: Strategy::SplitInHalf,
            reserved: RESERVED_FLOOR,
            esp: EspSize::Fat32Minimum,
        }
    }
}

impl TailConfig {
    fn validate(&self, sector_size: SectorSize) -> Result<()> {
        if !sector_size.get().is_power_of_two() {
            return Err(Error::Configuration("Sector size must be a power of two"));
        }
        if !self.flash_block.is_power_of_two() {
            return Err(Error::Configuration(
                "Flash block size must be a power of two",
            ));
        }
        if self.reserved < RESERVED_FLOOR {
            return Err(Error::Configuration("Reserved space must be at least 4 GiB"));
        }
        Ok(())
    }
}

/// Round `n` down to a multiple of `block`
fn align_down(n: u64, block: u64) -> u64 {
    n - n % block
}

/// Round `n` up to a multiple of `block`
fn align_up(n: u64, block: u64) -> Result<u64> {
    match n % block {
        0 => Ok(n),
        rem => n
            .checked_add(block - rem)
            .ok_or(Error::Configuration("Partition size overflows")),
    }
}

/// Fail unless `lba` sits on a flash block boundary.
fn check_aligned(boundary: Boundary, lba: u64, block: u64) -> Result<()> {
    match lba % block {
        0 => Ok(()),
        rem => Err(Error::Alignment {
            boundary,
            lba: Block(lba),
            padding: block - rem,
        }),
    }
}

/// The planned tail of the table.
///
/// Nothing is changed until it's applied, see [`allocate_tail_partitions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailLayout {
    /// New last LBA of the placeholder partition
    pub primary_end: Block,

    /// The EFI System Partition
    pub esp: Partition,

    /// The secondary OS partition
    pub secondary: Partition,
}

impl TailLayout {
    /// Plan the ESP and secondary OS partitions at the end of the last
    /// partition in `partitions`.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] for invalid settings, an empty table,
    ///   or when both partitions don't fit in the placeholder.
    /// - [`Error::Capacity`] if the table would exceed
    ///   [`MAX_PARTITIONS`].
    /// - [`Error::Alignment`] if a boundary misses a flash block.
    pub fn plan(
        partitions: &[Partition],
        sector_size: SectorSize,
        config: &TailConfig,
    ) -> Result<Self> {
        config.validate(sector_size)?;
        let placeholder = partitions
            .last()
            .ok_or(Error::Configuration("Partition table is empty"))?;
        if partitions.len() + 2 > MAX_PARTITIONS {
            return Err(Error::Capacity {
                count: partitions.len() + 2,
                max: MAX_PARTITIONS,
            });
        }
        let block = config.flash_block;

        let first = placeholder.start().0;
        let last = align_down(placeholder.end().0, block);
        if last < first {
            return Err(Error::Configuration(
                "Placeholder partition is smaller than a flash block",
            ));
        }
        let usable = (last - first)
            .checked_add(1)
            .ok_or(Error::Configuration("Placeholder partition is too large"))?;

        let floor = align_up((SECONDARY_FLOOR / sector_size).0, block)?;
        let esp = align_up(config.esp.sectors(), block)?;
        let secondary = match config.strategy {
            Strategy::SplitInHalf => {
                let half = usable
                    .checked_add(LUN_USAGE_SECTORS)
                    .ok_or(Error::Configuration("Placeholder partition is too large"))?
                    .saturating_sub(esp)
                    / 2;
                align_up(half, block)?.max(floor)
            }
            Strategy::FixedReservation => {
                let reserved = (config.reserved / sector_size).0;
                let rest = usable.saturating_sub(esp).saturating_sub(reserved);
                align_down(rest, block).max(floor)
            }
        };
        debug!(
            "Tail of {} sectors from {}: ESP {} sectors, secondary {} sectors",
            usable, placeholder.start(), esp, secondary
        );

        // The placeholder keeps at least one sector
        let esp_first = esp
            .checked_add(secondary)
            .and_then(|total| last.checked_sub(total))
            .filter(|lba| *lba > first)
            .ok_or(Error::Configuration(
                "Not enough space for the ESP and secondary OS partitions",
            ))?;
        let esp_last = esp_first + esp - 1;
        let secondary_first = esp_last + 1;
        let secondary_last = esp_last + secondary;

        check_aligned(Boundary::EspStart, esp_first, block)?;
        check_aligned(Boundary::EspEnd, esp_last + 1, block)?;
        check_aligned(Boundary::SecondaryStart, secondary_first, block)?;
        check_aligned(Boundary::SecondaryEnd, secondary_last + 1, block)?;

        Ok(Self {
            primary_end: Block(esp_first - 1),
            esp: PartitionBuilder::new(PartitionType::EfiSystem)
                .uuid(Uuid::from_u128(ESP_UUID))
                .start(Block(esp_first))
                .end(Block(esp_last))
                .name(ESP_NAME)
                .finish()?,
            secondary: PartitionBuilder::new(PartitionType::MicrosoftBasicData)
                .uuid(Uuid::from_u128(SECONDARY_UUID))
                .start(Block(secondary_first))
                .end(Block(secondary_last))
                .name(SECONDARY_NAME)
                .finish()?,
        })
    }
}

/// Result of a tail allocation, for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// 1-based number of the primary OS partition in the table
    pub number: usize,

    /// The shrunk primary OS partition
    pub primary: Partition,

    /// The EFI System Partition
    pub esp: Partition,

    /// The secondary OS partition
    pub secondary: Partition,

    /// Primary OS usable space
    pub primary_space: Size,

    /// Secondary OS usable space
    pub secondary_space: Size,
}

impl Allocation {
    /// Equivalent parted commands for the tail of the table.
    pub fn mkpart(&self) -> Vec<String> {
        let n = self.number;
        alloc::vec![
            format!("resizepart {} {}s", n, self.primary.end().0),
            format!(
                "mkpart {} fat32 {}s {}s",
                ESP_NAME,
                self.esp.start().0,
                self.esp.end().0
            ),
            format!("set {} esp on", n + 1),
            format!(
                "mkpart {} ntfs {}s {}s",
                SECONDARY_NAME,
                self.secondary.start().0,
                self.secondary.end().0
            ),
        ]
    }
}

/// Inject the ESP and secondary OS partitions at the tail of `partitions`.
///
/// The last partition is shrunk and the ESP then the secondary OS partition
/// are appended. On error `partitions` is left untouched.
///
/// # Errors
///
/// See [`TailLayout::plan`].
pub fn allocate_tail_partitions(
    partitions: &mut Vec<Partition>,
    sector_size: SectorSize,
    config: &TailConfig,
) -> Result<Allocation> {
    let layout = TailLayout::plan(partitions, sector_size, config)?;
    let number = partitions.len();
    let mut primary = partitions
        .last()
        .cloned()
        .ok_or(Error::Configuration("Partition table is empty"))?;
    primary.set_end(layout.primary_end);
    let too_large = || Error::Configuration("Partition size in bytes overflows");
    let primary_space = primary.size(sector_size).ok_or_else(too_large)?;
    let secondary_space = layout.secondary.size(sector_size).ok_or_else(too_large)?;

    partitions[number - 1] = primary.clone();
    partitions.push(layout.esp.clone());
    partitions.push(layout.secondary.clone());

    let allocation = Allocation {
        number,
        primary_space,
        secondary_space,
        primary,
        esp: layout.esp,
        secondary: layout.secondary,
    };
    info!(
        "Primary OS usable space (in bytes): {}",
        allocation.primary_space.as_bytes()
    );
    info!(
        "Secondary OS usable space (in bytes): {}",
        allocation.secondary_space.as_bytes()
    );
    for line in allocation.mkpart() {
        debug!("{}", line);
    }
    Ok(allocation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{Result, *};
    use pretty_assertions::assert_eq;

    /// Single placeholder spanning a disk of `disk` bytes, GPT reserved.
    fn table(disk: Size, sector_size: SectorSize) -> Vec<Partition> {
        let sectors = (disk / sector_size).0;
        let array = sector_size.sectors_for(32 * 128);
        vec![placeholder(2048, sectors - 1 - array - 1)]
    }

    fn config(strategy: Strategy, flash_block: u64) -> TailConfig {
        TailConfig {
            flash_block,
            strategy,
            ..Default::default()
        }
    }

    fn check_layout(original: &Partition, parts: &[Partition], block: u64) {
        let (primary, esp, secondary) = (&parts[0], &parts[1], &parts[2]);
        assert_eq!(primary.start(), original.start());
        assert_eq!(primary.end().0 + 1, esp.start().0);
        assert_eq!(esp.end().0 + 1, secondary.start().0);
        assert!(secondary.end() <= original.end());
        for lba in &[
            esp.start().0,
            esp.end().0 + 1,
            secondary.start().0,
            secondary.end().0 + 1,
        ] {
            assert_eq!(lba % block, 0, "LBA {} not aligned to {}", lba, block);
        }
    }

    #[test]
    fn esp_sizes() {
        assert_eq!(EspSize::Fixed.sectors(), 65536);
        assert_eq!(EspSize::Fat32Minimum.sectors(), 66550);
        assert_eq!(align_up(66550, 4).unwrap(), 66552);
        assert_eq!(align_up(66552, 8).unwrap(), 66552);
        assert_eq!(align_down(66551, 8), 66544);
    }

    #[test]
    fn split_clamps_to_floor() -> Result {
        let mut parts = table(Size::from_gib(100), SECTOR_SIZE);
        let original = parts[0].clone();
        let alloc = allocate_tail_partitions(
            &mut parts,
            SECTOR_SIZE,
            &config(Strategy::SplitInHalf, 4),
        )?;

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].sectors(), 66552);
        assert_eq!(parts[2].sectors(), 134_217_728);
        assert_eq!(alloc.secondary_space, SECONDARY_FLOOR);
        assert_eq!(parts[0].end().0 + 1, parts[1].start().0);
        assert_eq!(parts[1].partition_type(), PartitionType::EfiSystem);
        assert_eq!(parts[2].partition_type(), PartitionType::MicrosoftBasicData);
        assert_eq!(parts[1].name(), "esp");
        assert_eq!(parts[2].name(), "win");
        check_layout(&original, &parts, 4);
        Ok(())
    }

    #[test]
    fn split_in_half() -> Result {
        let mut parts = table(Size::from_gib(512), SECTOR_SIZE);
        let original = parts[0].clone();
        allocate_tail_partitions(&mut parts, SECTOR_SIZE, &config(Strategy::SplitInHalf, 8))?;

        let last = align_down(original.end().0, 8);
        let usable = last - original.start().0 + 1;
        let expected = align_up((usable + LUN_USAGE_SECTORS - 66552) / 2, 8)?;
        assert_eq!(parts[2].sectors(), expected);
        assert_eq!(parts[2].end().0 + 1, last);
        check_layout(&original, &parts, 8);
        Ok(())
    }

    #[test]
    fn fixed_reservation() -> Result {
        let mut parts = table(Size::from_gib(256), SECTOR_SIZE);
        let original = parts[0].clone();
        let alloc = allocate_tail_partitions(
            &mut parts,
            SECTOR_SIZE,
            &TailConfig {
                reserved: Size::from_gib(8),
                esp: EspSize::Fixed,
                ..config(Strategy::FixedReservation, 4)
            },
        )?;

        let last = align_down(original.end().0, 4);
        let usable = last - original.start().0 + 1;
        let expected = align_down(usable - 65536 - 16_777_216, 4);
        assert_eq!(parts[1].sectors(), 65536);
        assert_eq!(parts[2].sectors(), expected);
        // What is left over is the reservation, give or take a block
        let left = alloc.primary_space.as_bytes();
        let reserved = Size::from_gib(8).as_bytes();
        assert!(left + 4 * 512 > reserved, "{} left", left);
        assert!(left < reserved + 4 * 512, "{} left", left);
        check_layout(&original, &parts, 4);
        Ok(())
    }

    #[test]
    fn reservation_below_floor() {
        let mut parts = table(Size::from_gib(256), SECTOR_SIZE);
        let before = parts.clone();
        let err = allocate_tail_partitions(
            &mut parts,
            SECTOR_SIZE,
            &TailConfig {
                reserved: Size::from_gib(2),
                ..config(Strategy::FixedReservation, 4)
            },
        );
        assert!(matches!(err, Err(Error::Configuration(_))));
        assert_eq!(parts, before);
    }

    #[test]
    fn too_small_disk() {
        // The 64 GiB secondary floor plus the ESP can't fit in what's left of
        // a 64 GiB disk, so this is rejected rather than clamped.
        let mut parts = table(Size::from_gib(64), SECTOR_SIZE);
        let before = parts.clone();
        let err = allocate_tail_partitions(&mut parts, SECTOR_SIZE, &TailConfig::default());
        assert!(matches!(err, Err(Error::Configuration(_))));
        assert_eq!(parts, before);
    }

    #[test]
    fn huge_placeholder() {
        let strategies = [Strategy::SplitInHalf, Strategy::FixedReservation];
        for (strategy, block, end) in strategies
            .iter()
            .map(|s| (*s, 4, u64::MAX - 3))
            .chain(Some((Strategy::SplitInHalf, 1, u64::MAX)))
        {
            let mut parts = vec![placeholder(0, end)];
            let before = parts.clone();
            let err = allocate_tail_partitions(&mut parts, SECTOR_SIZE, &config(strategy, block));
            assert!(
                matches!(err, Err(Error::Configuration(_))),
                "{:?} {}: {:?}",
                strategy,
                block,
                err
            );
            assert_eq!(parts, before);
        }
    }

    #[test]
    fn invalid_inputs() {
        let mut empty = Vec::new();
        assert!(matches!(
            allocate_tail_partitions(&mut empty, SECTOR_SIZE, &TailConfig::default()),
            Err(Error::Configuration(_))
        ));

        let mut parts = table(Size::from_gib(256), SECTOR_SIZE);
        assert!(matches!(
            allocate_tail_partitions(
                &mut parts,
                SECTOR_SIZE,
                &config(Strategy::SplitInHalf, 6)
            ),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            allocate_tail_partitions(
                &mut parts,
                SECTOR_SIZE,
                &config(Strategy::SplitInHalf, 0)
            ),
            Err(Error::Configuration(_))
        ));

        let mut full = vec![placeholder(2048, 4095); MAX_PARTITIONS - 1];
        assert!(matches!(
            allocate_tail_partitions(&mut full, SECTOR_SIZE, &TailConfig::default()),
            Err(Error::Capacity { count: 129, .. })
        ));
    }

    #[test]
    fn misaligned_boundary() {
        let err = check_aligned(Boundary::EspEnd, 66551, 8);
        match err {
            Err(Error::Alignment {
                boundary,
                lba,
                padding,
            }) => {
                assert_eq!(boundary, Boundary::EspEnd);
                assert_eq!(lba, Block(66551));
                assert_eq!(padding, 1);
            }
            e => panic!("Unexpected {:?}", e),
        }
        assert!(check_aligned(Boundary::SecondaryStart, 66552, 8).is_ok());
    }

    /// Every sector size, flash block and strategy keeps the tail aligned,
    /// contiguous and above the floor.
    #[test]
    fn alignment_grid() -> Result {
        for sector in &[512, 4096] {
            let sector_size = SectorSize::new(*sector).unwrap();
            for block in &[1, 4, 8] {
                for strategy in &[Strategy::SplitInHalf, Strategy::FixedReservation] {
                    for gib in &[128, 300, 1024] {
                        let mut parts = table(Size::from_gib(*gib), sector_size);
                        let original = parts[0].clone();
                        allocate_tail_partitions(
                            &mut parts,
                            sector_size,
                            &config(*strategy, *block),
                        )?;
                        check_layout(&original, &parts, *block);
                        assert!(parts[2].size(sector_size) >= Some(SECONDARY_FLOOR));
                    }
                }
            }
        }
        Ok(())
    }

    #[test]
    fn secondary_floor_across_sizes() {
        for gib in (32..=1024).step_by(32) {
            for strategy in &[Strategy::SplitInHalf, Strategy::FixedReservation] {
                let mut parts = table(Size::from_gib(gib), SECTOR_SIZE);
                match allocate_tail_partitions(&mut parts, SECTOR_SIZE, &config(*strategy, 4)) {
                    Ok(alloc) => {
                        assert!(alloc.secondary.sectors() >= (SECONDARY_FLOOR / SECTOR_SIZE).0)
                    }
                    // Only disks that can't hold the floor
                    Err(Error::Configuration(_)) => assert!(gib <= 64, "{} GiB failed", gib),
                    Err(e) => panic!("Unexpected {:?}", e),
                }
            }
        }
    }

    #[test]
    fn plan_is_pure() -> Result {
        let parts = table(Size::from_gib(200), SECTOR_SIZE);
        let layout = TailLayout::plan(&parts, SECTOR_SIZE, &TailConfig::default())?;
        assert_eq!(layout.primary_end.0 + 1, layout.esp.start().0);
        assert_eq!(parts, table(Size::from_gib(200), SECTOR_SIZE));
        Ok(())
    }

    #[test]
    fn parted_commands() -> Result {
        let mut parts = table(Size::from_gib(100), SECTOR_SIZE);
        let alloc = allocate_tail_partitions(&mut parts, SECTOR_SIZE, &TailConfig::default())?;
        let cmds = alloc.mkpart();
        assert_eq!(cmds.len(), 4);
        assert_eq!(cmds[0], format!("resizepart 1 {}s", parts[0].end().0));
        assert_eq!(
            cmds[1],
            format!("mkpart esp fat32 {}s {}s", parts[1].start().0, parts[1].end().0)
        );
        assert_eq!(cmds[2], "set 2 esp on");
        assert!(cmds[3].starts_with("mkpart win ntfs "));
        Ok(())
    }
}
