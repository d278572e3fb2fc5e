//! Cluster-chain walking, truncation, and extension (component E). Built on
//! top of component D ([`crate::fat::table`]) — everything here is just FAT
//! entry reads and writes in a particular pattern.

use crate::block_device::{DeviceError, Storage};
use crate::error::FatError;
use crate::fat::sector_buffer::YieldHook;
use crate::fat::Volume;

impl<S> Volume<S>
where
    S: Storage<SECTOR_SIZE = typenum::U512>,
{
    /// Follows the chain from `start` through `n` FAT entries. Meaningless
    /// if the chain is shorter than `n` — callers are expected to know the
    /// chain reaches at least that far (the file engine tracks this via the
    /// `(nth_cluster, n)` hint).
    pub fn find_nth(
        &mut self,
        start: u32,
        n: u32,
        hook: &mut dyn YieldHook,
    ) -> Result<u32, FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        let mut cluster = start;
        for _ in 0..n {
            cluster = self.read_entry(cluster, hook)?;
        }
        Ok(cluster)
    }

    /// Walks the chain rooted at `first_cluster`, zeroing every FAT entry
    /// it visits (including the terminal EOC marker), returning every
    /// cluster in the chain to the free pool. A no-op for cluster `0`
    /// (a file that never held any data).
    pub fn truncate_to_empty(
        &mut self,
        first_cluster: u32,
        hook: &mut dyn YieldHook,
    ) -> Result<(), FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        if first_cluster == 0 {
            return Ok(());
        }

        let mut cluster = first_cluster;
        let mut next = self.read_entry(cluster, hook)?;

        while !self.is_eoc(next) {
            self.write_entry(cluster, 0, hook)?;
            cluster = next;
            next = self.read_entry(cluster, hook)?;
        }
        self.write_entry(cluster, 0, hook)?;

        Ok(())
    }

    /// Allocates a free cluster, marks it the chain's new terminal EOC, and
    /// (when `after` is `Some`) links it onto the chain. Shared primitive
    /// for file-chain extension ([`Volume::extend_file`]) and directory
    /// cluster allocation.
    pub(crate) fn link_new_cluster(
        &mut self,
        after: Option<u32>,
        hook: &mut dyn YieldHook,
    ) -> Result<u32, FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        let free = self.alloc_free(0, hook)?;
        if let Some(after) = after {
            self.write_entry(after, free, hook)?;
        }
        self.write_entry(free, self.info.fat_type.eoc_marker(), hook)?;
        Ok(free)
    }

    /// Zero-fills every sector of `cluster`. A freshly allocated cluster
    /// carries whatever garbage was previously on disk; a directory reading
    /// that garbage as entries would misinterpret it as live content
    /// (Open Question 7), so directory cluster allocation always zero-fills
    /// before use. File data clusters don't need this: reads are bounded by
    /// `file_size`, which only ever covers bytes the driver itself wrote.
    pub(crate) fn zero_fill_cluster(
        &mut self,
        cluster: u32,
        hook: &mut dyn YieldHook,
    ) -> Result<(), FatError<DeviceError<S::ReadErr, S::WriteErr>>> {
        let start = self.info.cluster_to_sector(cluster);
        for s in 0..self.info.bpb.sec_per_clus as u64 {
            self.buffer.load(start + s, &mut self.storage, hook)?;
            for b in self.buffer.bytes_mut().iter_mut() {
                *b = 0;
            }
            self.buffer.mark_dirty();
        }
        Ok(())
    }
}
