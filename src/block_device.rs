//! The external block device contract (§6 of the driver's design): the one
//! thing this crate does not implement. Everything above this trait talks in
//! terms of fixed 512-byte sectors; the organization of those sectors into a
//! FAT volume is this crate's job, not the medium's.

use core::fmt::Debug;

use generic_array::{ArrayLength, GenericArray};
use typenum::consts::U512;
use typenum::marker_traits::Unsigned;

/// Implementors of this trait provide access to a fixed-size-sector storage
/// medium: an SD card, an SPI flash chip, a loopback file. The FAT driver
/// only ever reads or writes whole sectors, never sub-sector ranges, and
/// treats both operations as either succeeding or failing outright — there
/// is no partial-sector result, matching the `OK | IO_ERROR` block device
/// contract this driver is specified against.
pub trait Storage {
    type SECTOR_SIZE: ArrayLength<u8>;

    /// Opaque device-failure payload for reads. Folded into
    /// [`crate::FatError::Device`] untouched.
    type ReadErr: Debug;
    /// Opaque device-failure payload for writes.
    type WriteErr: Debug;

    /// Reads one `Self::SECTOR_SIZE`-byte sector. Must never panic.
    fn read_sector(
        &mut self,
        sector_idx: usize,
        buffer: &mut GenericArray<u8, Self::SECTOR_SIZE>,
    ) -> Result<(), Self::ReadErr>;

    /// Writes one `Self::SECTOR_SIZE`-byte sector. Must never panic.
    fn write_sector(
        &mut self,
        sector_idx: usize,
        buffer: &GenericArray<u8, Self::SECTOR_SIZE>,
    ) -> Result<(), Self::WriteErr>;

    /// Number of `Self::SECTOR_SIZE`-byte sectors on the medium.
    fn sector_count(&self) -> usize;

    /// One greater than the largest valid byte offset on the medium.
    fn byte_count(&self) -> usize {
        self.sector_count() * Self::SECTOR_SIZE::to_usize()
    }
}

/// The fixed 512-byte sector type this driver operates on throughout. The
/// FAT spec (§3) fixes `bytes_per_sec == 512`; this alias is what every
/// component in `fat::` actually names.
pub type Sector = GenericArray<u8, U512>;

/// A device error folded down to a single type regardless of whether it
/// came from a read or a write, so [`crate::FatError`] only needs one
/// `Device` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceError<R, W> {
    Read(R),
    Write(W),
}

using_std! {
    use std::fmt;

    impl<R: fmt::Debug, W: fmt::Debug> fmt::Display for DeviceError<R, W> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            fmt::Debug::fmt(self, f)
        }
    }
    impl<R: fmt::Debug, W: fmt::Debug> std::error::Error for DeviceError<R, W> { }
}
