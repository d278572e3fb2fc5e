//! Reading, writing, and allocating FAT entries (component D), plus
//! `Volume::next_sector`, the sector-buffer hop that needs table access to
//! find the next cluster in a chain (component B's `next()` as specified,
//! necessarily implemented here since it has to call back into the table).

use crate::block_device::{DeviceError, Storage};
use crate::error::FatError;
use crate::fat::sector_buffer::{Step, YieldHook};
use crate::fat::{FatType, Volume};

/// What `next_sector` found past the end of the currently loaded sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Loaded,
    EndOfChain,
}

impl<S> Volume<S>
where
    S: Storage<SECTOR_SIZE = typenum::U512>,
{
    fn calc_fat_block(&self, cluster: u32) -> (u64, usize) {
        let entry_size = self.info.fat_type.entry_size();
        let byte_offset = cluster as u64 * entry_size as u64;
        let fat_sector = self.info.bpb.rsvd_sec_cnt as u64 + byte_offset / self.info.bpb.bytes_per_sec as u64;
        let ent_offset = (byte_offset % self.info.bpb.bytes_per_sec as u64) as usize;
        (fat_sector, ent_offset)
    }

    /// Decodes the FAT entry for `cluster`.
    pub fn read_entry(
        &mut self,
        cluster: u32,
        hook: &mut dyn YieldHook,
    ) -> Result<u32, FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        let (fat_sector, off) = self.calc_fat_block(cluster);
        self.buffer.load(fat_sector, &mut self.storage, hook)?;
        let bytes = self.buffer.bytes();

        Ok(match self.info.fat_type {
            FatType::Fat16 => u16::from_le_bytes([bytes[off], bytes[off + 1]]) as u32,
            FatType::Fat32 => {
                u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]]) & 0x0FFF_FFFF
            }
        })
    }

    /// Encodes `value` into the FAT entry for `cluster`. On FAT32 the upper
    /// 4 bits of the on-disk word are preserved untouched.
    pub fn write_entry(
        &mut self,
        cluster: u32,
        value: u32,
        hook: &mut dyn YieldHook,
    ) -> Result<(), FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        let (fat_sector, off) = self.calc_fat_block(cluster);
        self.buffer.load(fat_sector, &mut self.storage, hook)?;
        let bytes = self.buffer.bytes_mut();

        match self.info.fat_type {
            FatType::Fat16 => {
                let v = value as u16;
                bytes[off..off + 2].copy_from_slice(&v.to_le_bytes());
            }
            FatType::Fat32 => {
                let preserved = bytes[off + 3] & 0xF0;
                let v = value.to_le_bytes();
                bytes[off] = v[0];
                bytes[off + 1] = v[1];
                bytes[off + 2] = v[2];
                bytes[off + 3] = (v[3] & 0x0F) | preserved;
            }
        }

        self.buffer.mark_dirty();
        Ok(())
    }

    pub fn is_eoc(&self, entry: u32) -> bool {
        self.info.fat_type.is_eoc(entry)
    }

    /// Scans forward from the FAT sector covering `start_cluster_hint` for
    /// the first free (zero) entry. Per the design notes this search does
    /// not wrap around the table; once every sector through the end of the
    /// FAT has been scanned without finding a free entry,
    /// [`FatError::ChainExhausted`] is returned (the original `get_free_cluster`
    /// never detected this and looped forever — see Open Question 1).
    pub fn alloc_free(
        &mut self,
        start_cluster_hint: u32,
        hook: &mut dyn YieldHook,
    ) -> Result<u32, FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        let entry_size = self.info.fat_type.entry_size() as u64;
        let entries_per_sector = self.info.bpb.bytes_per_sec as u64 / entry_size;

        let (mut fat_sector, _) = self.calc_fat_block(start_cluster_hint);
        let fat_region_end = self.info.bpb.rsvd_sec_cnt as u64 + self.info.bpb.fat_size() as u64;

        while fat_sector < fat_region_end {
            self.buffer.load(fat_sector, &mut self.storage, hook)?;

            let free_slot = {
                let bytes = self.buffer.bytes();
                (0..entries_per_sector as usize).find(|&i| match self.info.fat_type {
                    FatType::Fat16 => {
                        let off = i * 2;
                        u16::from_le_bytes([bytes[off], bytes[off + 1]]) == 0
                    }
                    FatType::Fat32 => {
                        let off = i * 4;
                        let v = u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]]);
                        (v & 0x0FFF_FFFF) == 0
                    }
                })
            };

            if let Some(slot) = free_slot {
                let cluster = ((fat_sector - self.info.bpb.rsvd_sec_cnt as u64) * entries_per_sector) as u32
                    + slot as u32;
                return Ok(cluster);
            }

            fat_sector += 1;
        }

        log::warn!("no free cluster found scanning from hint {}", start_cluster_hint);
        Err(FatError::ChainExhausted)
    }

    /// Mirrors FAT #1 onto every other FAT (`2..num_fats`).
    pub fn sync_fats(
        &mut self,
        hook: &mut dyn YieldHook,
    ) -> Result<(), FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        self.buffer.flush(&mut self.storage, hook).map_err(DeviceError::Write)?;

        let fat_size = self.info.bpb.fat_size() as u64;
        for fat_block in 0..fat_size {
            let primary = self.info.bpb.rsvd_sec_cnt as u64 + fat_block;
            self.buffer.load(primary, &mut self.storage, hook)?;
            let contents = self.buffer.bytes().clone();

            for mirror in 1..self.info.bpb.num_fats as u64 {
                let mirror_sector = primary + mirror * fat_size;
                hook.on_step(Step::Write);
                self.storage
                    .write_sector(mirror_sector as usize, &contents)
                    .map_err(DeviceError::Write)?;
            }
        }

        Ok(())
    }

    /// Advances the sector buffer to the sector immediately following the
    /// resident one, hopping to the next cluster in the chain when a
    /// cluster boundary is crossed. This is component B's `next()`; it
    /// lives here (not on `SectorBuffer`) because crossing a cluster
    /// boundary requires reading a FAT entry, which itself goes through
    /// this very buffer.
    pub fn next_sector(
        &mut self,
        hook: &mut dyn YieldHook,
    ) -> Result<Advance, FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        self.buffer.flush(&mut self.storage, hook).map_err(DeviceError::Write)?;

        let addr = self.buffer.addr().expect("next_sector with no resident sector");
        let sec_per_clus = self.info.bpb.sec_per_clus as u64;

        if (addr + 1) % sec_per_clus == 0 {
            let cluster = self.info.sector_to_cluster(addr);
            let entry = self.read_entry(cluster, hook)?;
            if self.is_eoc(entry) {
                return Ok(Advance::EndOfChain);
            }
            self.buffer
                .load(self.info.cluster_to_sector(entry), &mut self.storage, hook)?;
        } else {
            self.buffer.load(addr + 1, &mut self.storage, hook)?;
        }

        Ok(Advance::Loaded)
    }
}

impl FatType {
    pub fn entry_size(self) -> u8 {
        match self {
            FatType::Fat16 => 2,
            FatType::Fat32 => 4,
        }
    }

    pub fn is_eoc(self, entry: u32) -> bool {
        match self {
            FatType::Fat16 => entry >= 0xFFF8,
            FatType::Fat32 => (entry & 0x0FFF_FFFF) >= 0x0FFF_FFF8,
        }
    }

    /// The marker value this driver writes to terminate a chain.
    pub fn eoc_marker(self) -> u32 {
        match self {
            FatType::Fat16 => 0xFFFF,
            FatType::Fat32 => 0x0FFF_FFFF,
        }
    }
}
