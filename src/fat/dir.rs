//! Directory entries and the directory engine (component G): lookup,
//! insert, update, remove, and path resolution.

use crate::block_device::{DeviceError, Storage};
use crate::error::FatError;
use crate::fat::sector_buffer::YieldHook;
use crate::fat::table::Advance;
use crate::fat::path::PathResolver;
use crate::fat::{FatType, Volume, MAX_PATH_COMPONENTS};
use crate::util::Bits;

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
/// All four of `READ_ONLY|HIDDEN|SYSTEM|VOLUME_ID` set at once marks a VFAT
/// long-name entry, which this driver only ever skips over.
pub const ATTR_LONG_NAME: u8 = 0x0F;

/// A 32-byte FAT directory entry, parsed from or serialized to its on-disk
/// layout. Long filenames are out of scope; `name` is always the 8.3 short
/// name, space-padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub name: [u8; 11],
    pub attr: u8,
    pub nt_res: u8,
    pub crt_time_tenth: u8,
    pub crt_time: u16,
    pub crt_date: u16,
    pub last_access_date: u16,
    pub fst_clus_hi: u16,
    pub wrt_time: u16,
    pub wrt_date: u16,
    pub fst_clus_lo: u16,
    pub file_size: u32,
}

impl DirEntry {
    pub fn empty(name: [u8; 11]) -> Self {
        Self {
            name,
            attr: 0,
            nt_res: 0,
            crt_time_tenth: 0,
            crt_time: 0,
            crt_date: 0,
            last_access_date: 0,
            fst_clus_hi: 0,
            wrt_time: 0,
            wrt_date: 0,
            fst_clus_lo: 0,
            file_size: 0,
        }
    }

    pub fn parse(bytes: &[u8]) -> Self {
        Self {
            name: bytes[0..11].try_into().unwrap(),
            attr: bytes[11],
            nt_res: bytes[12],
            crt_time_tenth: bytes[13],
            crt_time: u16::from_le_bytes([bytes[14], bytes[15]]),
            crt_date: u16::from_le_bytes([bytes[16], bytes[17]]),
            last_access_date: u16::from_le_bytes([bytes[18], bytes[19]]),
            fst_clus_hi: u16::from_le_bytes([bytes[20], bytes[21]]),
            wrt_time: u16::from_le_bytes([bytes[22], bytes[23]]),
            wrt_date: u16::from_le_bytes([bytes[24], bytes[25]]),
            fst_clus_lo: u16::from_le_bytes([bytes[26], bytes[27]]),
            file_size: u32::from_le_bytes([bytes[28], bytes[29], bytes[30], bytes[31]]),
        }
    }

    pub fn write_into(&self, sector: &mut [u8], offset: usize) {
        let bytes = &mut sector[offset..offset + 32];
        bytes[0..11].copy_from_slice(&self.name);
        bytes[11] = self.attr;
        bytes[12] = self.nt_res;
        bytes[13] = self.crt_time_tenth;
        bytes[14..16].copy_from_slice(&self.crt_time.to_le_bytes());
        bytes[16..18].copy_from_slice(&self.crt_date.to_le_bytes());
        bytes[18..20].copy_from_slice(&self.last_access_date.to_le_bytes());
        bytes[20..22].copy_from_slice(&self.fst_clus_hi.to_le_bytes());
        bytes[22..24].copy_from_slice(&self.wrt_time.to_le_bytes());
        bytes[24..26].copy_from_slice(&self.wrt_date.to_le_bytes());
        bytes[26..28].copy_from_slice(&self.fst_clus_lo.to_le_bytes());
        bytes[28..32].copy_from_slice(&self.file_size.to_le_bytes());
    }

    pub fn first_cluster(&self) -> u32 {
        ((self.fst_clus_hi as u32) << 16) | self.fst_clus_lo as u32
    }

    pub fn set_first_cluster(&mut self, cluster: u32) {
        self.fst_clus_hi = (cluster >> 16) as u16;
        self.fst_clus_lo = cluster as u16;
    }

    pub fn is_directory(&self) -> bool {
        self.attr.bit(4)
    }

    pub fn is_volume_id(&self) -> bool {
        self.attr.bit(3)
    }

    pub fn is_read_only(&self) -> bool {
        self.attr.bit(0)
    }

    /// `true` for an ordinary file — not a subdirectory, not the volume
    /// label.
    pub fn is_file(&self) -> bool {
        !self.is_directory() && !self.is_volume_id()
    }

    /// `true` for a VFAT long-name continuation entry, which this driver
    /// never interprets and must skip over wherever it enumerates a
    /// directory (Open Question 5).
    pub fn is_long_name(&self) -> bool {
        self.attr & 0x3F == ATTR_LONG_NAME
    }
}

/// Where a directory's entries live. The FAT16 root directory is a fixed
/// region of contiguous sectors that cannot be extended; every other
/// directory (FAT32 root included) is an ordinary cluster chain. Modeling
/// this as one enum lets `lookup`/`insert` share a single "advance to the
/// next sector of this directory" operation instead of special-casing the
/// root everywhere (design notes, "Directory vs. FAT16 root").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirContainer {
    Chain { first_cluster: u32 },
    FixedRegion { start_sector: u64, sector_count: u64 },
}

impl DirContainer {
    fn first_sector(&self, info: &crate::fat::VolumeInfo) -> u64 {
        match *self {
            DirContainer::Chain { first_cluster } => info.cluster_to_sector(first_cluster),
            DirContainer::FixedRegion { start_sector, .. } => start_sector,
        }
    }
}

/// An open directory (from `opendir`). Unlike the original driver, the
/// enumeration cursor lives here, per-handle, rather than in a single
/// process-global — this was the source's Open Question 3, and concurrent
/// traversal of two directories is a straightforward consequence of fixing
/// it.
#[derive(Debug, Clone, Copy)]
pub struct DirHandle {
    pub(crate) container: DirContainer,
    pub(crate) cursor: u32,
}

impl<S> Volume<S>
where
    S: Storage<SECTOR_SIZE = typenum::U512>,
{
    fn root_container(&self) -> DirContainer {
        match self.info.fat_type {
            FatType::Fat16 => DirContainer::FixedRegion {
                start_sector: self.info.fat16_root_dir_sector(),
                sector_count: self.info.bpb.root_dir_sectors() as u64,
            },
            FatType::Fat32 => DirContainer::Chain {
                first_cluster: self.info.bpb.root_clus,
            },
        }
    }

    fn advance_directory(
        &mut self,
        container: DirContainer,
        hook: &mut dyn YieldHook,
    ) -> Result<Advance, FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        match container {
            DirContainer::Chain { .. } => self.next_sector(hook),
            DirContainer::FixedRegion { start_sector, sector_count } => {
                self.buffer.flush(&mut self.storage, hook).map_err(DeviceError::Write)?;
                let addr = self.buffer.addr().expect("advance with no resident sector");
                let next = addr + 1;
                if next >= start_sector + sector_count {
                    return Ok(Advance::EndOfChain);
                }
                self.buffer.load(next, &mut self.storage, hook)?;
                Ok(Advance::Loaded)
            }
        }
    }

    /// Scans `container` for `name`. `Ok(None)` covers both "ran off the
    /// end of a live directory" (first byte `0x00`) and "ran off the end of
    /// the chain/region" — the original driver collapses these the same
    /// way.
    pub fn dir_lookup(
        &mut self,
        name: &[u8; 11],
        container: DirContainer,
        hook: &mut dyn YieldHook,
    ) -> Result<Option<(DirEntry, u64, usize)>, FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        self.buffer.load(container.first_sector(&self.info), &mut self.storage, hook)?;

        loop {
            for offset in (0..512).step_by(32) {
                let bytes = self.buffer.bytes();
                if bytes[offset] == 0x00 {
                    return Ok(None);
                }
                if &bytes[offset..offset + 11] == name {
                    let entry = DirEntry::parse(&bytes[offset..offset + 32]);
                    let addr = self.buffer.addr().unwrap();
                    return Ok(Some((entry, addr, offset)));
                }
            }

            match self.advance_directory(container, hook)? {
                Advance::Loaded => continue,
                Advance::EndOfChain => return Ok(None),
            }
        }
    }

    /// Places `entry` into the first free (`0x00` or `0xE5`) slot of
    /// `container`, extending the chain (and zero-filling the new cluster,
    /// Open Question 7) if none is found. Extending a `FixedRegion` is
    /// never permitted.
    pub fn dir_insert(
        &mut self,
        entry: &DirEntry,
        container: DirContainer,
        hook: &mut dyn YieldHook,
    ) -> Result<(u64, usize), FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        self.buffer.load(container.first_sector(&self.info), &mut self.storage, hook)?;

        loop {
            for offset in (0..512).step_by(32) {
                let b0 = self.buffer.bytes()[offset];
                if b0 == 0x00 || b0 == 0xE5 {
                    entry.write_into(self.buffer.bytes_mut(), offset);
                    self.buffer.mark_dirty();
                    return Ok((self.buffer.addr().unwrap(), offset));
                }
            }

            match self.advance_directory(container, hook)? {
                Advance::Loaded => continue,
                Advance::EndOfChain => match container {
                    DirContainer::FixedRegion { .. } => return Err(FatError::RootDirectoryFull),
                    DirContainer::Chain { .. } => {
                        let tail_cluster = self.info.sector_to_cluster(self.buffer.addr().unwrap());
                        let new_cluster = self.link_new_cluster(Some(tail_cluster), hook)?;
                        self.zero_fill_cluster(new_cluster, hook)?;

                        let new_sector = self.info.cluster_to_sector(new_cluster);
                        self.buffer.load(new_sector, &mut self.storage, hook)?;
                        entry.write_into(self.buffer.bytes_mut(), 0);
                        self.buffer.mark_dirty();
                        return Ok((new_sector, 0));
                    }
                },
            }
        }
    }

    /// Zeroes the entry's first byte and marks the slot `0xE5` (reusable).
    /// Does not free the entry's own cluster chain — callers that remove a
    /// file must `truncate_to_empty` it separately.
    pub fn dir_remove(
        &mut self,
        sector: u64,
        offset: usize,
        hook: &mut dyn YieldHook,
    ) -> Result<(), FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        self.buffer.load(sector, &mut self.storage, hook)?;
        let bytes = self.buffer.bytes_mut();
        for b in &mut bytes[offset..offset + 32] {
            *b = 0;
        }
        bytes[offset] = 0xE5;
        self.buffer.mark_dirty();
        Ok(())
    }

    /// Resolves an ASCII `/`-separated 8.3 path to its directory entry and
    /// on-disk location, optionally creating the final component as an
    /// empty file if it doesn't exist.
    pub fn resolve(
        &mut self,
        path: &str,
        create: bool,
        hook: &mut dyn YieldHook,
    ) -> Result<(DirEntry, u64, usize), FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        let mut resolver = PathResolver::new(path);
        let mut container = self.root_container();

        let mut result: Option<(DirEntry, u64, usize)> = None;

        for _ in 0..MAX_PATH_COMPONENTS {
            let name = match resolver.next_part().map_err(FatError::InvalidPath)? {
                Some(name) => name,
                None => break,
            };

            match self.dir_lookup(&name, container, hook)? {
                Some(found) => {
                    if !resolver.is_current_part_a_file() {
                        container = DirContainer::Chain {
                            first_cluster: found.0.first_cluster(),
                        };
                    }
                    result = Some(found);
                }
                None => {
                    if resolver.is_current_part_a_file() && create {
                        let entry = DirEntry::empty(name);
                        let (sector, offset) = self.dir_insert(&entry, container, hook)?;
                        result = Some((entry, sector, offset));
                    } else {
                        return Err(FatError::NotFound);
                    }
                }
            }
        }

        result.ok_or(FatError::NotFound)
    }

    pub fn open_dir(
        &mut self,
        path: &str,
        hook: &mut dyn YieldHook,
    ) -> Result<usize, FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        let container = if is_root_path(path) {
            self.root_container()
        } else {
            let (entry, _, _) = self.resolve(path, false, hook)?;
            if !entry.is_directory() {
                return Err(FatError::NotADirectory);
            }
            DirContainer::Chain {
                first_cluster: entry.first_cluster(),
            }
        };

        let slot = self.dirs.iter().position(Option::is_none).ok_or(FatError::NoFreeDirHandle)?;
        self.dirs[slot] = Some(DirHandle { container, cursor: 0 });
        Ok(slot)
    }

    /// Reads the next live (non-deleted, non-VFAT) entry from `fd`'s
    /// directory, advancing its per-handle cursor. `Ok(None)` at the end of
    /// the directory.
    pub fn read_dir(
        &mut self,
        fd: usize,
        hook: &mut dyn YieldHook,
    ) -> Result<Option<DirEntry>, FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        let entries_per_sector = self.info.bpb.bytes_per_sec as u32 / 32;

        loop {
            let handle = self.dirs.get(fd).and_then(|d| d.as_ref()).ok_or(FatError::InvalidHandle)?;
            let container = handle.container;
            let cursor = handle.cursor;

            let first_cluster = match container {
                DirContainer::Chain { first_cluster } => first_cluster,
                DirContainer::FixedRegion { .. } => 0,
            };

            let dir_off = cursor as u64 * 32;
            let entries_per_cluster = entries_per_sector as u64 * self.info.bpb.sec_per_clus as u64;
            let cluster_index = (dir_off / 32) / entries_per_cluster as u64;

            let sector = match container {
                DirContainer::Chain { .. } => {
                    let cluster = self.find_nth(first_cluster, cluster_index as u32, hook)?;
                    if self.is_eoc(cluster) {
                        return Ok(None);
                    }
                    let sector_in_cluster = (dir_off / self.info.bpb.bytes_per_sec as u64) % self.info.bpb.sec_per_clus as u64;
                    self.info.cluster_to_sector(cluster) + sector_in_cluster
                }
                DirContainer::FixedRegion { start_sector, sector_count } => {
                    let s = start_sector + dir_off / self.info.bpb.bytes_per_sec as u64;
                    if s >= start_sector + sector_count {
                        return Ok(None);
                    }
                    s
                }
            };

            self.buffer.load(sector, &mut self.storage, hook)?;
            let offset_in_sector = (dir_off % self.info.bpb.bytes_per_sec as u64) as usize;
            let bytes = self.buffer.bytes();

            if bytes[offset_in_sector] == 0x00 {
                return Ok(None);
            }

            let entry = DirEntry::parse(&bytes[offset_in_sector..offset_in_sector + 32]);
            self.dirs[fd].as_mut().unwrap().cursor += 1;

            // Skip deleted slots and VFAT long-name continuations
            // (Open Question 5).
            if bytes[offset_in_sector] == 0xE5 || entry.is_long_name() {
                continue;
            }

            return Ok(Some(entry));
        }
    }

    pub fn close_dir(&mut self, fd: usize) {
        if let Some(d) = self.dirs.get_mut(fd) {
            *d = None;
        }
    }
}

/// `true` for the paths that name the root directory itself (`""` or `"/"`).
/// `PathResolver` has no component to yield for these — `resolve` would
/// otherwise report `NotFound` for the one directory this driver can always
/// open, since there is no `mkdir` to create any other.
fn is_root_path(path: &str) -> bool {
    matches!(path, "" | "/")
}

/// Builds the human-readable `base.ext` form of a short name, stripping the
/// pad spaces and reinserting the `.` (only present when there's an
/// extension).
pub fn readable_name(name: &[u8; 11]) -> ([u8; 12], usize) {
    let mut out = [0u8; 12];
    let mut j = 0;

    for (i, &c) in name.iter().enumerate() {
        if c != b' ' {
            out[j] = c;
            j += 1;
        }
        if i == 7 && name[8..11].iter().any(|&b| b != b' ') {
            out[j] = b'.';
            j += 1;
        }
    }

    (out, j)
}
