//! The public driver API (component I): a [`Driver<S>`] wrapping a single
//! process-wide [`Volume<S>`] behind a [`Mutex`], so the whole crate is
//! usable from `&self` methods the way a shared peripheral driver is meant
//! to be — exactly one mounted volume, exactly one sector buffer, guarded
//! by one lock.

use crate::block_device::{DeviceError, Storage};
use crate::error::FatError;
use crate::fat::dir::DirEntry;
pub use crate::fat::file::{OpenFlags, SeekFrom};
use crate::fat::sector_buffer::YieldHook;
use crate::fat::Volume;
use crate::mutex::{Mutex, MutexInterface};

type OpError<S> = FatError<DeviceError<<S as Storage>::ReadErr, <S as Storage>::WriteErr>>;

/// The process-wide driver handle. Construct with [`Driver::new`]
/// (unmounted) and call [`Driver::mount`] once a [`Storage`] backend is
/// available.
pub struct Driver<S: Storage<SECTOR_SIZE = typenum::U512>> {
    volume: Mutex<Option<Volume<S>>>,
}

impl<S> Driver<S>
where
    S: Storage<SECTOR_SIZE = typenum::U512>,
{
    pub fn new() -> Self {
        Self { volume: Mutex::new(None) }
    }

    /// Parses and validates the boot sector and installs the volume.
    /// Replaces whatever was previously mounted without flushing it —
    /// call [`Driver::umount`] first if that matters.
    pub fn mount(&self, storage: S, hook: &mut dyn YieldHook) -> Result<(), OpError<S>> {
        let volume = Volume::mount(storage, hook)?;
        self.volume.cs(|slot| *slot = Some(volume));
        Ok(())
    }

    /// Flushes, mirrors the FATs, and hands back the underlying storage.
    pub fn umount(&self, hook: &mut dyn YieldHook) -> Result<S, OpError<S>> {
        let taken = self.volume.cs(Option::take);
        let volume = taken.ok_or(FatError::NotMounted)?;
        volume.umount(hook)
    }

    pub fn is_mounted(&self) -> bool {
        self.volume.cs(|slot| slot.is_some())
    }

    fn with_volume<R>(&self, f: impl FnOnce(&mut Volume<S>) -> Result<R, OpError<S>>) -> Result<R, OpError<S>> {
        self.volume.cs(|slot| match slot {
            Some(v) => f(v),
            None => Err(FatError::NotMounted),
        })
    }

    pub fn open(&self, path: &str, flags: OpenFlags, hook: &mut dyn YieldHook) -> Result<usize, OpError<S>> {
        self.with_volume(|v| v.open_file(path, flags, hook))
    }

    pub fn close(&self, fd: usize, hook: &mut dyn YieldHook) -> Result<(), OpError<S>> {
        self.with_volume(|v| v.close_file(fd, hook))
    }

    pub fn read(&self, fd: usize, buf: &mut [u8], hook: &mut dyn YieldHook) -> Result<usize, OpError<S>> {
        self.with_volume(|v| v.read_file(fd, buf, hook))
    }

    pub fn write(&self, fd: usize, buf: &[u8], hook: &mut dyn YieldHook) -> Result<usize, OpError<S>> {
        self.with_volume(|v| v.write_file(fd, buf, hook))
    }

    pub fn seek(&self, fd: usize, pos: SeekFrom) -> Result<u64, OpError<S>> {
        self.with_volume(|v| v.seek_file(fd, pos))
    }

    pub fn file_size(&self, fd: usize) -> Result<u32, OpError<S>> {
        self.with_volume(|v| v.file_size(fd))
    }

    /// Unlinks the file at `path`: clears its directory entry slot and
    /// frees its entire cluster chain. Refuses to remove a directory or the
    /// volume label.
    pub fn remove(&self, path: &str, hook: &mut dyn YieldHook) -> Result<(), OpError<S>> {
        self.with_volume(|v| {
            let (entry, sector, offset) = v.resolve(path, false, hook)?;
            if !entry.is_file() {
                return Err(FatError::IsADirectory);
            }
            v.dir_remove(sector, offset, hook)?;
            v.truncate_to_empty(entry.first_cluster(), hook)?;
            v.flush(hook)?;
            Ok(())
        })
    }

    pub fn opendir(&self, path: &str, hook: &mut dyn YieldHook) -> Result<usize, OpError<S>> {
        self.with_volume(|v| v.open_dir(path, hook))
    }

    pub fn readdir(&self, fd: usize, hook: &mut dyn YieldHook) -> Result<Option<DirEntry>, OpError<S>> {
        self.with_volume(|v| v.read_dir(fd, hook))
    }

    pub fn closedir(&self, fd: usize) -> Result<(), OpError<S>> {
        self.with_volume(|v| {
            v.close_dir(fd);
            Ok(())
        })
    }

    /// Flushes the resident sector, regardless of dirtiness. Idempotent: a
    /// second call with no intervening write is a no-op.
    pub fn flush(&self, hook: &mut dyn YieldHook) -> Result<(), OpError<S>> {
        self.with_volume(|v| v.flush(hook))
    }

    /// Flushes the resident sector and mirrors the FATs without unmounting.
    pub fn sync(&self, hook: &mut dyn YieldHook) -> Result<(), OpError<S>> {
        self.with_volume(|v| {
            v.flush(hook)?;
            v.sync_fats(hook)
        })
    }
}

impl<S> Default for Driver<S>
where
    S: Storage<SECTOR_SIZE = typenum::U512>,
{
    fn default() -> Self {
        Self::new()
    }
}
