//! The FAT BIOS Parameter Block: the 512-byte sector 0 header that describes
//! a volume's geometry (component C).
//!
//! Field offsets below are sourced from the common DOS 2.0 / 3.31 / FAT32
//! extended BPB layout; only the fields this driver actually consults are
//! kept (no CHS geometry, no volume-label/serial cosmetics).

use crate::block_device::Sector;

use core::convert::TryInto;

/// `BPB_BytesPerSec` is not a power of two.
pub const BAD_BYTES_PER_SEC: u8 = 1;
/// `BPB_SecPerClus` is not a power of two.
pub const BAD_SEC_PER_CLUS: u8 = 2;
/// `BPB_BytesPerSec * BPB_SecPerClus` exceeds 32 KiB.
pub const BAD_CLUSTER_SIZE: u8 = 4;
/// More than two FATs.
pub const BAD_NUM_FATS: u8 = 8;
/// Total sector count is zero.
pub const BAD_TOT_SEC: u8 = 16;
/// Sectors-per-FAT is zero.
pub const BAD_FAT_SZ: u8 = 32;
/// Missing `0x55 0xAA` boot signature.
pub const BAD_BOOT_SIG: u8 = 64;

/// The parsed BIOS Parameter Block. Holds both the FAT16 fields
/// (`root_ent_cnt`, `fat_sz16`, `tot_sec16`) and the FAT32 extensions
/// (`fat_sz32`, `root_clus`) since which set is populated is exactly what
/// distinguishes the two volume types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BiosParameterBlock {
    pub bytes_per_sec: u16,
    pub sec_per_clus: u8,
    pub rsvd_sec_cnt: u16,
    pub num_fats: u8,
    pub root_ent_cnt: u16,
    pub tot_sec16: u16,
    pub media: u8,
    pub fat_sz16: u16,
    pub tot_sec32: u32,
    pub fat_sz32: u32,
    pub root_clus: u32,
}

impl BiosParameterBlock {
    /// Parses `sector` and validates every invariant in one pass. The
    /// returned flag byte mirrors the original `parse_bootsector`'s bit
    /// assignments so more than one violation can be reported at once; `0`
    /// means the BPB is well-formed (FAT12-vs-16-vs-32 classification is a
    /// separate step, done in [`crate::fat::Volume::mount`]).
    pub fn parse(sector: &Sector) -> (Self, u8) {
        let sector = sector.as_slice();

        macro_rules! e {
            ($ty:tt, $offset:literal) => {
                $ty::from_le_bytes(
                    sector[$offset..($offset + core::mem::size_of::<$ty>())]
                        .try_into()
                        .unwrap(),
                )
            };
        }

        let bpb = Self {
            bytes_per_sec: e!(u16, 0x00B),
            sec_per_clus: e!(u8, 0x00D),
            rsvd_sec_cnt: e!(u16, 0x00E),
            num_fats: e!(u8, 0x010),
            root_ent_cnt: e!(u16, 0x011),
            tot_sec16: e!(u16, 0x013),
            media: e!(u8, 0x015),
            fat_sz16: e!(u16, 0x016),
            tot_sec32: e!(u32, 0x020),
            fat_sz32: e!(u32, 0x024),
            root_clus: e!(u32, 0x02C),
        };

        let mut flags = 0;

        if !crate::util::is_power_of_two(bpb.bytes_per_sec as u32) {
            flags |= BAD_BYTES_PER_SEC;
        }
        if !crate::util::is_power_of_two(bpb.sec_per_clus as u32) {
            flags |= BAD_SEC_PER_CLUS;
        }
        if (bpb.bytes_per_sec as u32) * (bpb.sec_per_clus as u32) > 32 * 1024 {
            flags |= BAD_CLUSTER_SIZE;
        }
        if bpb.num_fats > 2 {
            flags |= BAD_NUM_FATS;
        }
        if bpb.total_sectors() == 0 {
            flags |= BAD_TOT_SEC;
        }
        if bpb.fat_size() == 0 {
            flags |= BAD_FAT_SZ;
        }
        if sector[510] != 0x55 || sector[511] != 0xAA {
            flags |= BAD_BOOT_SIG;
        }

        (bpb, flags)
    }

    /// `fat_sz16` if nonzero (FAT12/16), else the FAT32-extended `fat_sz32`.
    pub fn fat_size(&self) -> u32 {
        if self.fat_sz16 != 0 {
            self.fat_sz16 as u32
        } else {
            self.fat_sz32
        }
    }

    /// `tot_sec16` if nonzero, else `tot_sec32`.
    pub fn total_sectors(&self) -> u32 {
        if self.tot_sec16 != 0 {
            self.tot_sec16 as u32
        } else {
            self.tot_sec32
        }
    }

    /// Sectors occupied by the FAT16 fixed-size root directory; `0` on
    /// FAT32, where the root directory is an ordinary cluster chain.
    pub fn root_dir_sectors(&self) -> u32 {
        ((self.root_ent_cnt as u32 * 32) + (self.bytes_per_sec as u32 - 1)) / self.bytes_per_sec as u32
    }

    /// The absolute sector at which the data region (cluster 2) begins.
    pub fn first_data_sector(&self) -> u32 {
        self.rsvd_sec_cnt as u32 + (self.num_fats as u32 * self.fat_size()) + self.root_dir_sectors()
    }

    /// `count_of_clusters`, the sole quantity that distinguishes FAT12 from
    /// FAT16 from FAT32 (§3).
    pub fn count_of_clusters(&self) -> u32 {
        let data_sectors = self.total_sectors() - self.first_data_sector();
        data_sectors / self.sec_per_clus as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sector_with(patches: &[(usize, &[u8])]) -> Sector {
        let mut bytes = [0u8; 512];
        bytes[510] = 0x55;
        bytes[511] = 0xAA;
        for (offset, data) in patches {
            bytes[*offset..*offset + data.len()].copy_from_slice(data);
        }
        Sector::clone_from_slice(&bytes)
    }

    #[test]
    fn parses_a_well_formed_fat16_bpb() {
        let sector = sector_with(&[
            (0x00B, &512u16.to_le_bytes()),
            (0x00D, &[8]),
            (0x00E, &32u16.to_le_bytes()),
            (0x010, &[2]),
            (0x011, &512u16.to_le_bytes()),
            (0x013, &8192u16.to_le_bytes()),
            (0x016, &32u16.to_le_bytes()),
        ]);

        let (bpb, flags) = BiosParameterBlock::parse(&sector);
        assert_eq!(flags, 0);
        assert_eq!(bpb.fat_size(), 32);
        assert_eq!(bpb.total_sectors(), 8192);
        assert_eq!(bpb.first_data_sector(), 32 + 2 * 32 + 32);
    }

    #[test]
    fn flags_a_missing_boot_signature() {
        let mut bytes = [0u8; 512];
        bytes[0x00B..0x00D].copy_from_slice(&512u16.to_le_bytes());
        bytes[0x00D] = 8;
        bytes[0x010] = 1;
        let sector = Sector::clone_from_slice(&bytes);

        let (_, flags) = BiosParameterBlock::parse(&sector);
        assert_ne!(flags & BAD_BOOT_SIG, 0);
    }

    #[test]
    fn flags_non_power_of_two_sector_size() {
        let sector = sector_with(&[(0x00B, &500u16.to_le_bytes()), (0x00D, &[8])]);
        let (_, flags) = BiosParameterBlock::parse(&sector);
        assert_ne!(flags & BAD_BYTES_PER_SEC, 0);
    }
}
