//! Error handling
use crate::types::Block;
use displaydoc::Display;
#[cfg(any(feature = "std", test))]
use thiserror::Error;

/// Partition boundaries that must sit on a flash block.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// ESP first LBA
    EspStart,

    /// ESP last LBA + 1
    EspEnd,

    /// Secondary OS first LBA
    SecondaryStart,

    /// Secondary OS last LBA + 1
    SecondaryEnd,
}

/// Error type.
///
/// Every variant aborts generation, nothing is written on error.
#[derive(Debug, Display)]
#[cfg_attr(any(feature = "std", test), derive(Error))]
#[non_exhaustive]
pub enum Error {
    /// Unsupported configuration: {0}
    Configuration(&'static str),

    /// {boundary} ({lba}) overflew block alignment by: {padding}
    Alignment {
        /// Which boundary was misaligned
        boundary: Boundary,

        /// Where it ended up
        lba: Block,

        /// Sectors missing to reach the next block boundary
        padding: u64,
    },

    /// {count} partitions do not fit in a {max} entry partition array
    Capacity {
        /// Partitions supplied
        count: usize,

        /// Entries the array supports
        max: usize,
    },
}

/// Result type.
pub type Result<T> = core::result::Result<T, Error>;
