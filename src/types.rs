//! Type-safe Newtype wrappers
use core::{num::NonZeroU64, ops};
use derive_more::*;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Helper to define Size from_* setters.
macro_rules! __SizeImplFrom {
    ("Bytes", $p:ident, $v:expr) => {
        /// Create a [`Size`] from the specified number of `Bytes`
        pub const fn $p($p: u64) -> Self {
            Self($p)
        }
    };

    ($m:expr, $p:ident, $v:expr) => {
        /// Create a [`Size`] from the specified number of `
        #[doc = $m]
        ///`
        pub const fn $p($p: u64) -> Self {
            Self($p * (1u64 << (10 * $v)))
        }
    };
}

/// Helper to define Size as_* getters.
macro_rules! __SizeImplAs {
    ("Bytes", $p:ident, $v:expr) => {
        /// Return the number of `Bytes` contained by this [`Size`].
        pub const fn $p(&self) -> u64 {
            self.0
        }
    };
    ($m:expr, $p:ident, $v:expr) => {
        /// Return the number of *whole* `
        #[doc = $m]
        ///` contained by this [`Size`].
        pub const fn $p(&self) -> u64 {
            self.0 >> (10 * $v)
        }
    };
}

/// Logical sector size, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
#[repr(transparent)]
pub struct SectorSize(NonZeroU64);

impl SectorSize {
    /// Create a new `SectorSize`.
    ///
    /// Returns `None` if `val` is zero.
    pub fn new(val: u64) -> Option<Self> {
        NonZeroU64::new(val).map(Self)
    }

    /// Create a new `SectorSize`.
    ///
    /// # Safety
    ///
    /// - `val` must not be zero.
    pub const unsafe fn new_unchecked(val: u64) -> Self {
        Self(NonZeroU64::new_unchecked(val))
    }

    /// Get the sector size as a `u64`
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// Number of whole sectors needed to hold `bytes`.
    pub const fn sectors_for(self, bytes: u64) -> u64 {
        (bytes + self.get() - 1) / self.get()
    }
}

/// Represents a byte offset.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Display, Into, From)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
#[repr(transparent)]
pub struct Offset(pub u64);

/// Device or Partition Size.
#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Default,
    Display,
    Into,
    From,
    Add,
    Sub,
    Mul,
    AddAssign,
    SubAssign,
)]
#[display(fmt = "{} Bytes", _0)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
#[repr(transparent)]
pub struct Size(u64);

impl Size {
    __SizeImplFrom!("Bytes", from_bytes, 0);
    __SizeImplFrom!("KiB", from_kib, 1);
    __SizeImplFrom!("MiB", from_mib, 2);
    __SizeImplFrom!("GiB", from_gib, 3);
    __SizeImplFrom!("TiB", from_tib, 4);
    //
    __SizeImplAs!("Bytes", as_bytes, 0);
    __SizeImplAs!("MiB", as_mib, 2);
    __SizeImplAs!("GiB", as_gib, 3);
}

/// A [`Size`] from a [`SectorSize`]
impl From<SectorSize> for Size {
    fn from(o: SectorSize) -> Self {
        Self(o.get())
    }
}

/// Whole sectors contained by this [`Size`], as a count.
impl ops::Div<SectorSize> for Size {
    type Output = Block;

    fn div(self, rhs: SectorSize) -> Self::Output {
        Block(self.0 / rhs.get())
    }
}

/// Device Logical Block Address
///
/// The size of a block is dependent on it's associated [`SectorSize`].
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
#[display(fmt = "LBA {}", _0)]
#[repr(transparent)]
pub struct Block(pub u64);

impl ops::Mul<SectorSize> for Block {
    type Output = Offset;

    fn mul(self, rhs: SectorSize) -> Self::Output {
        Offset(self.0 * rhs.get())
    }
}

impl ops::Add<u64> for Block {
    type Output = Block;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl ops::Sub<u64> for Block {
    type Output = Block;

    fn sub(self, rhs: u64) -> Self::Output {
        Self(self.0 - rhs)
    }
}
