//! Open file handles and the read/write/seek engine (component H).

use crate::block_device::{DeviceError, Storage};
use crate::error::FatError;
use crate::fat::dir::DirEntry;
use crate::fat::sector_buffer::YieldHook;
use crate::fat::Volume;

/// Flags an open file was requested with. A plain bitset, not an enum:
/// `WRITE | APPEND` (truncate-and-append is nonsensical but harmless) is a
/// valid combination the way the original driver's `int flags` was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags(u8);

impl OpenFlags {
    pub const READ: OpenFlags = OpenFlags(0x01);
    pub const WRITE: OpenFlags = OpenFlags(0x02);
    pub const APPEND: OpenFlags = OpenFlags(0x04);

    pub fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for OpenFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        OpenFlags(self.0 | rhs.0)
    }
}

/// Where to seek from — mirrors `SeekFrom` from the standard library, which
/// this driver can't depend on directly under `no_std`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    Start(u64),
    Current(i64),
    End(i64),
}

/// An open file. The `(nth_cluster, n)` pair is a hint, not authoritative
/// state: it caches the cluster found at FAT-chain position `n` so
/// sequential access doesn't re-walk the chain from `first_cluster` on every
/// sector.
#[derive(Debug, Clone, Copy)]
pub struct FileHandle {
    pub(crate) dir_entry: DirEntry,
    pub(crate) dir_entry_sector: u64,
    pub(crate) dir_entry_offset: usize,
    pub(crate) first_cluster: u32,
    pub(crate) nth_cluster: u32,
    pub(crate) n: u32,
    pub(crate) offset: u64,
    pub(crate) flags: OpenFlags,
}

enum SectorLoadResult {
    Loaded,
    EndOfFile,
}

impl<S> Volume<S>
where
    S: Storage<SECTOR_SIZE = typenum::U512>,
{
    pub fn open_file(
        &mut self,
        path: &str,
        flags: OpenFlags,
        hook: &mut dyn YieldHook,
    ) -> Result<usize, FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        let slot = self.files.iter().position(Option::is_none).ok_or(FatError::NoFreeHandle)?;

        let wants_create = flags.contains(OpenFlags::WRITE) || flags.contains(OpenFlags::APPEND);
        let (entry, sector, offset) = self.resolve(path, wants_create, hook)?;

        if !entry.is_file() {
            return Err(FatError::IsADirectory);
        }
        if wants_create && entry.is_read_only() {
            return Err(FatError::ReadOnly);
        }

        let first_cluster = entry.first_cluster();
        self.files[slot] = Some(FileHandle {
            dir_entry: entry,
            dir_entry_sector: sector,
            dir_entry_offset: offset,
            first_cluster,
            nth_cluster: first_cluster,
            n: 0,
            offset: 0,
            flags,
        });

        if flags.contains(OpenFlags::APPEND) {
            // Opening for append seeks straight to end-of-file; this does
            // not go through `seek_file`, whose `SeekFrom::End` carries the
            // off-by-one from Open Question 2.
            let handle = self.files[slot].as_mut().unwrap();
            handle.offset = handle.dir_entry.file_size as u64;
        }

        Ok(slot)
    }

    /// Flushes the entry's metadata and releases the handle. Invalid `fd`s
    /// are silently ignored, matching the original driver's `cfs_close`.
    pub fn close_file(
        &mut self,
        fd: usize,
        hook: &mut dyn YieldHook,
    ) -> Result<(), FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        if self.files.get(fd).map_or(false, Option::is_some) {
            self.update_dir_entry(fd, hook)?;
            self.flush(hook)?;
            self.files[fd] = None;
        }
        Ok(())
    }

    pub fn read_file(
        &mut self,
        fd: usize,
        buf: &mut [u8],
        hook: &mut dyn YieldHook,
    ) -> Result<usize, FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        let handle = self.files.get(fd).and_then(Option::as_ref).ok_or(FatError::InvalidHandle)?;
        if !handle.flags.contains(OpenFlags::READ) {
            return Err(FatError::InvalidHandle);
        }
        if handle.first_cluster == 0 {
            return Ok(0);
        }

        let bytes_per_sec = self.info.bpb.bytes_per_sec as u64;
        let sec_per_clus = self.info.bpb.sec_per_clus as u64;

        let mut offset_in_sector = (handle.offset % bytes_per_sec) as usize;
        let mut cluster_n = (handle.offset / bytes_per_sec) / sec_per_clus;
        let mut clus_sector_offset = ((handle.offset / bytes_per_sec) % sec_per_clus) as u32;

        let mut written = 0usize;
        while written < buf.len() {
            match self.load_next_sector(fd, cluster_n, clus_sector_offset, false, hook)? {
                SectorLoadResult::EndOfFile => break,
                SectorLoadResult::Loaded => {}
            }

            let n = core::cmp::min(bytes_per_sec as usize - offset_in_sector, buf.len() - written);
            buf[written..written + n]
                .copy_from_slice(&self.buffer.bytes()[offset_in_sector..offset_in_sector + n]);

            let handle = self.files[fd].as_mut().unwrap();
            handle.offset += n as u64;
            written += n;

            offset_in_sector = 0;
            clus_sector_offset += 1;
            if clus_sector_offset as u64 == sec_per_clus {
                clus_sector_offset = 0;
                cluster_n += 1;
            }

            if handle.offset >= handle.dir_entry.file_size as u64 {
                break;
            }
        }

        Ok(written)
    }

    pub fn write_file(
        &mut self,
        fd: usize,
        buf: &[u8],
        hook: &mut dyn YieldHook,
    ) -> Result<usize, FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        let handle = self.files.get(fd).and_then(Option::as_ref).ok_or(FatError::InvalidHandle)?;
        if !handle.flags.contains(OpenFlags::WRITE) && !handle.flags.contains(OpenFlags::APPEND) {
            return Err(FatError::InvalidHandle);
        }

        let bytes_per_sec = self.info.bpb.bytes_per_sec as u64;
        let sec_per_clus = self.info.bpb.sec_per_clus as u64;

        let mut offset_in_sector = (handle.offset % bytes_per_sec) as usize;
        let mut cluster_n = (handle.offset / bytes_per_sec) / sec_per_clus;
        let mut clus_sector_offset = ((handle.offset / bytes_per_sec) % sec_per_clus) as u32;

        let mut written = 0usize;
        while written < buf.len() {
            self.load_next_sector(fd, cluster_n, clus_sector_offset, true, hook)?;

            let n = core::cmp::min(bytes_per_sec as usize - offset_in_sector, buf.len() - written);
            self.buffer.bytes_mut()[offset_in_sector..offset_in_sector + n]
                .copy_from_slice(&buf[written..written + n]);
            self.buffer.mark_dirty();

            let handle = self.files[fd].as_mut().unwrap();
            handle.offset += n as u64;
            if handle.offset > handle.dir_entry.file_size as u64 {
                handle.dir_entry.file_size = handle.offset as u32;
            }
            written += n;

            offset_in_sector = 0;
            clus_sector_offset += 1;
            if clus_sector_offset as u64 == sec_per_clus {
                clus_sector_offset = 0;
                cluster_n += 1;
            }
        }

        Ok(written)
    }

    /// Per the design notes' Open Question 2, `End` intentionally seeks to
    /// `file_size - 1`, not `file_size` — carried over unchanged from the
    /// original driver rather than "fixed", since nothing in the available
    /// source material says which behavior callers actually depend on.
    pub fn seek_file(
        &mut self,
        fd: usize,
        pos: SeekFrom,
    ) -> Result<u64, FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        let handle = self.files.get_mut(fd).and_then(Option::as_mut).ok_or(FatError::InvalidHandle)?;
        let file_size = handle.dir_entry.file_size as i64;

        let mut new_offset: i64 = match pos {
            SeekFrom::Start(o) => o as i64,
            SeekFrom::Current(o) => handle.offset as i64 + o,
            SeekFrom::End(o) => (file_size - 1) + o,
        };

        if new_offset >= file_size {
            new_offset = file_size - 1;
        }
        if new_offset < 0 {
            new_offset = 0;
        }

        handle.offset = new_offset as u64;
        Ok(handle.offset)
    }

    pub fn file_size(&self, fd: usize) -> Result<u32, FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        self.files
            .get(fd)
            .and_then(Option::as_ref)
            .map(|h| h.dir_entry.file_size)
            .ok_or(FatError::InvalidHandle)
    }

    /// Loads the sector at chain position `(cluster_n, clus_sector_offset)`
    /// relative to `fd`'s first cluster, using the `(nth_cluster, n)` hint
    /// when it covers the requested position and walking the chain from
    /// scratch otherwise. When the chain doesn't reach that far: on a read,
    /// reports end-of-file; on a write, extends the chain first.
    fn load_next_sector(
        &mut self,
        fd: usize,
        cluster_n: u64,
        clus_sector_offset: u32,
        write: bool,
        hook: &mut dyn YieldHook,
    ) -> Result<SectorLoadResult, FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        let handle = self.files[fd].as_ref().unwrap();
        let mut cluster = if cluster_n == handle.n as u64 {
            handle.nth_cluster
        } else if cluster_n == handle.n as u64 + 1 {
            self.read_entry(handle.nth_cluster, hook)?
        } else {
            self.find_nth(handle.first_cluster, cluster_n as u32, hook)?
        };

        if cluster == 0 || self.is_eoc(cluster) {
            if write {
                self.extend_file(fd, hook)?;
                cluster = self.files[fd].as_ref().unwrap().nth_cluster;
            } else {
                return Ok(SectorLoadResult::EndOfFile);
            }
        } else {
            let handle = self.files[fd].as_mut().unwrap();
            handle.nth_cluster = cluster;
            handle.n = cluster_n as u32;
        }

        let sector = self.info.cluster_to_sector(cluster) + clus_sector_offset as u64;
        self.buffer.load(sector, &mut self.storage, hook)?;
        Ok(SectorLoadResult::Loaded)
    }

    /// Extends `fd`'s cluster chain by one cluster (component E's
    /// `extend`), walking from the current `nth_cluster` hint forward to the
    /// true tail — the hint can lag behind a chain another handle extended
    /// in the meantime.
    fn extend_file(
        &mut self,
        fd: usize,
        hook: &mut dyn YieldHook,
    ) -> Result<(), FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        let handle = self.files[fd].as_ref().unwrap();

        if handle.first_cluster == 0 {
            let free = self.link_new_cluster(None, hook)?;
            let handle = self.files[fd].as_mut().unwrap();
            handle.first_cluster = free;
            handle.dir_entry.set_first_cluster(free);
            handle.nth_cluster = free;
            handle.n = 0;
            self.update_dir_entry(fd, hook)?;
            return Ok(());
        }

        let mut last_real = handle.nth_cluster;
        let mut cur_val = last_real;
        let mut n_field = handle.n;

        while !self.is_eoc(cur_val) {
            last_real = cur_val;
            cur_val = self.read_entry(last_real, hook)?;
            n_field += 1;
        }

        let free = self.link_new_cluster(Some(last_real), hook)?;
        let handle = self.files[fd].as_mut().unwrap();
        handle.nth_cluster = free;
        handle.n = n_field;

        Ok(())
    }

    fn update_dir_entry(
        &mut self,
        fd: usize,
        hook: &mut dyn YieldHook,
    ) -> Result<(), FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        let handle = self.files[fd].as_ref().unwrap();
        let (sector, offset, entry) = (handle.dir_entry_sector, handle.dir_entry_offset, handle.dir_entry);

        self.buffer.load(sector, &mut self.storage, hook)?;
        entry.write_into(self.buffer.bytes_mut(), offset);
        self.buffer.mark_dirty();
        Ok(())
    }
}
