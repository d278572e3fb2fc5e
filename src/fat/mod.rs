//! The FAT16/FAT32 metadata engine.
//!
//! [`Volume`] is the process-wide state this driver's design notes call for:
//! the mounted descriptor, the single sector buffer, and the file/directory
//! handle pools, all in one place with an explicit `mount`/`umount`
//! lifecycle rather than scattered statics.

pub mod api;
pub mod boot_sector;
pub mod chain;
pub mod dir;
pub mod file;
pub mod path;
pub mod sector_buffer;
pub mod table;

use crate::block_device::{DeviceError, Storage};
use crate::error::FatError;
use crate::fat::boot_sector::BiosParameterBlock;
use crate::fat::dir::DirHandle;
use crate::fat::file::FileHandle;
use crate::fat::sector_buffer::{SectorBuffer, YieldHook};

/// Upper bound on simultaneously open files. A fixed-size pool, not a
/// configurable one: this driver targets devices where the handle count is
/// known ahead of time, not general-purpose multi-tasking.
pub const MAX_OPEN_FILES: usize = 4;
/// Upper bound on simultaneously open directories.
pub const MAX_OPEN_DIRS: usize = 2;
/// Defensive bound on path-component iterations (§4.G).
pub const MAX_PATH_COMPONENTS: usize = 255;

/// FAT12 is detected and rejected at mount; only these two are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatType {
    Fat16,
    Fat32,
}

/// The parsed, derived, and validated volume geometry — everything the rest
/// of the driver needs to turn a cluster number into a sector address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeInfo {
    pub bpb: BiosParameterBlock,
    pub fat_type: FatType,
    pub first_data_sector: u32,
}

impl VolumeInfo {
    pub fn cluster_to_sector(&self, cluster: u32) -> u64 {
        ((cluster - 2) as u64 * self.bpb.sec_per_clus as u64) + self.first_data_sector as u64
    }

    pub fn sector_to_cluster(&self, sector: u64) -> u32 {
        (((sector - self.first_data_sector as u64) / self.bpb.sec_per_clus as u64) + 2) as u32
    }

    /// First sector of the FAT16 fixed-size root directory region. Not
    /// meaningful on FAT32, where the root directory is an ordinary cluster
    /// chain rooted at `bpb.root_clus`.
    pub fn fat16_root_dir_sector(&self) -> u64 {
        self.bpb.rsvd_sec_cnt as u64 + (self.bpb.num_fats as u64 * self.bpb.fat_size() as u64)
    }
}

/// The mounted volume: geometry, the single sector buffer, and the open
/// file/directory handle pools, all owned together so there is exactly one
/// of each per mounted device (§3, "Ownership").
pub struct Volume<S: Storage<SECTOR_SIZE = typenum::U512>> {
    storage: S,
    info: VolumeInfo,
    buffer: SectorBuffer,
    files: [Option<FileHandle>; MAX_OPEN_FILES],
    dirs: [Option<DirHandle>; MAX_OPEN_DIRS],
}

impl<S> Volume<S>
where
    S: Storage<SECTOR_SIZE = typenum::U512>,
{
    /// Reads sector 0, validates the BPB, classifies the FAT type, and
    /// installs the volume descriptor. Rejects FAT12 and any structurally
    /// invalid BPB.
    pub fn mount(
        mut storage: S,
        hook: &mut dyn YieldHook,
    ) -> Result<Self, FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        let mut buffer = SectorBuffer::default();
        buffer.load(0, &mut storage, hook)?;

        let (bpb, flags) = BiosParameterBlock::parse(buffer.bytes());
        if flags != 0 {
            return Err(FatError::BadBootSector { flags });
        }

        let count_of_clusters = bpb.count_of_clusters();
        let fat_type = if count_of_clusters < 4085 {
            return Err(FatError::UnsupportedFatType);
        } else if count_of_clusters < 65525 {
            FatType::Fat16
        } else {
            FatType::Fat32
        };

        let info = VolumeInfo {
            bpb,
            fat_type,
            first_data_sector: bpb.first_data_sector(),
        };

        log::debug!("mounted {:?} volume, {} clusters", fat_type, count_of_clusters);

        Ok(Self {
            storage,
            info,
            buffer,
            files: Default::default(),
            dirs: Default::default(),
        })
    }

    /// Flushes, mirrors FAT #1 to every other FAT, and invalidates every
    /// handle. Consumes the volume, returning the underlying storage.
    pub fn umount(mut self, hook: &mut dyn YieldHook) -> Result<S, FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        self.buffer.flush(&mut self.storage, hook).map_err(DeviceError::Write)?;
        self.sync_fats(hook)?;
        Ok(self.storage)
    }

    pub fn info(&self) -> &VolumeInfo {
        &self.info
    }

    /// Explicit flush of the resident sector, regardless of dirtiness
    /// (a no-op if clean).
    pub fn flush(&mut self, hook: &mut dyn YieldHook) -> Result<(), FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        self.buffer.flush(&mut self.storage, hook).map_err(DeviceError::Write)?;
        Ok(())
    }
}
