//! The single-entry write-back sector cache (component B) — the central
//! invariant of this driver. Every other component that needs to see disk
//! content goes through here; nothing else is allowed to call
//! `Storage::read_sector`/`write_sector` directly.

use crate::block_device::{DeviceError, Sector, Storage};

use generic_array::GenericArray;

/// A step about to be taken against the block device, reported to a
/// [`YieldHook`] before the I/O happens so a cooperative scheduler can
/// suspend around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Read,
    Write,
    /// Bookkeeping that doesn't touch the device (e.g. a FAT computation
    /// between two sector loads).
    Internal,
}

/// Host-supplied cooperative-scheduling hook. The default no-op
/// implementation (on `()`) runs every call synchronously.
pub trait YieldHook {
    fn on_step(&mut self, step: Step);
}

impl YieldHook for () {
    fn on_step(&mut self, _step: Step) {}
}

/// The single 512-byte write-back cache. `addr` is `None` when no sector is
/// resident — unlike the original C driver, which overloaded sector `0` as
/// its own "nothing loaded" sentinel, `Option` lets sector 0 be cached like
/// any other.
#[derive(Debug)]
pub struct SectorBuffer {
    addr: Option<u64>,
    dirty: bool,
    bytes: Sector,
}

impl Default for SectorBuffer {
    fn default() -> Self {
        Self {
            addr: None,
            dirty: false,
            bytes: GenericArray::default(),
        }
    }
}

impl SectorBuffer {
    pub fn addr(&self) -> Option<u64> {
        self.addr
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn bytes(&self) -> &Sector {
        &self.bytes
    }

    /// Mutable access to the resident sector. Callers that write through
    /// this must call [`mark_dirty`](Self::mark_dirty) themselves — there is
    /// no automatic write detection, matching the original driver.
    pub fn bytes_mut(&mut self) -> &mut Sector {
        &mut self.bytes
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Writes the resident sector back if dirty. A no-op otherwise.
    pub fn flush<S>(&mut self, storage: &mut S, hook: &mut dyn YieldHook) -> Result<(), S::WriteErr>
    where
        S: Storage<SECTOR_SIZE = typenum::U512>,
    {
        if self.dirty {
            let addr = self.addr.expect("dirty buffer with no resident sector");
            hook.on_step(Step::Write);
            storage.write_sector(addr as usize, &self.bytes)?;
            self.dirty = false;
        }
        Ok(())
    }

    /// Loads `sector`, flushing whatever was resident first. A no-op if
    /// `sector` is already resident.
    pub fn load<S>(
        &mut self,
        sector: u64,
        storage: &mut S,
        hook: &mut dyn YieldHook,
    ) -> Result<(), DeviceError<S::ReadErr, S::WriteErr>>
    where
        S: Storage<SECTOR_SIZE = typenum::U512>,
    {
        if self.addr == Some(sector) {
            return Ok(());
        }

        self.flush(storage, hook).map_err(DeviceError::Write)?;

        hook.on_step(Step::Read);
        storage
            .read_sector(sector as usize, &mut self.bytes)
            .map_err(DeviceError::Read)?;
        self.addr = Some(sector);
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_device::Storage as _;
    use std::collections::HashMap;

    struct MemStorage {
        sectors: HashMap<usize, Sector>,
    }

    impl Storage for MemStorage {
        type SECTOR_SIZE = typenum::U512;
        type ReadErr = ();
        type WriteErr = ();

        fn read_sector(&mut self, idx: usize, buf: &mut Sector) -> Result<(), ()> {
            *buf = self.sectors.get(&idx).cloned().unwrap_or_default();
            Ok(())
        }

        fn write_sector(&mut self, idx: usize, buf: &Sector) -> Result<(), ()> {
            self.sectors.insert(idx, buf.clone());
            Ok(())
        }

        fn sector_count(&self) -> usize {
            16
        }
    }

    #[test]
    fn load_is_a_no_op_when_already_resident() {
        let mut storage = MemStorage { sectors: HashMap::new() };
        let mut buf = SectorBuffer::default();

        buf.load(3, &mut storage, &mut ()).unwrap();
        buf.mark_dirty();
        buf.load(3, &mut storage, &mut ()).unwrap();
        assert!(buf.is_dirty(), "re-loading the resident sector must not flush it");
    }

    #[test]
    fn loading_a_different_sector_flushes_first() {
        let mut storage = MemStorage { sectors: HashMap::new() };
        let mut buf = SectorBuffer::default();

        buf.load(1, &mut storage, &mut ()).unwrap();
        buf.bytes_mut()[0] = 0xAB;
        buf.mark_dirty();

        buf.load(2, &mut storage, &mut ()).unwrap();
        assert!(!buf.is_dirty());
        assert_eq!(storage.sectors[&1][0], 0xAB);
    }
}
