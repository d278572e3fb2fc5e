// Run with --no-default-features: the default feature set selects the
// `external_mutex` FFI backend, which has no implementation to link against
// in a plain `cargo test` run.
//
// Integration tests against the public API only, driven by a tiny
// in-memory `Storage` rather than a real block device.

use embedded_fat::{Driver, FatError, OpenFlags, SeekFrom, Storage};

use generic_array::GenericArray;
use std::collections::HashMap;
use typenum::consts::U512;

struct MemStorage {
    sectors: HashMap<usize, [u8; 512]>,
    count: usize,
}

impl Storage for MemStorage {
    type SECTOR_SIZE = U512;
    type ReadErr = ();
    type WriteErr = ();

    fn read_sector(&mut self, idx: usize, buf: &mut GenericArray<u8, U512>) -> Result<(), ()> {
        buf.copy_from_slice(&self.sectors.get(&idx).copied().unwrap_or([0u8; 512]));
        Ok(())
    }

    fn write_sector(&mut self, idx: usize, buf: &GenericArray<u8, U512>) -> Result<(), ()> {
        let mut bytes = [0u8; 512];
        bytes.copy_from_slice(buf.as_slice());
        self.sectors.insert(idx, bytes);
        Ok(())
    }

    fn sector_count(&self) -> usize {
        self.count
    }
}

/// A from-scratch FAT16 image: one FAT, one sector of 16 root entries, 4090
/// free data clusters (1 sector each) — just over the FAT12/16 boundary.
fn blank_fat16_image() -> MemStorage {
    let rsvd_sec_cnt: u16 = 1;
    let num_fats: u8 = 1;
    let fat_sz16: u16 = 17;
    let root_ent_cnt: u16 = 16;
    let root_dir_sectors: u16 = 1;
    let data_sectors: u16 = 4090;
    let tot_sec16 = rsvd_sec_cnt + num_fats as u16 * fat_sz16 + root_dir_sectors + data_sectors;

    let mut boot = [0u8; 512];
    boot[0x00B..0x00D].copy_from_slice(&512u16.to_le_bytes());
    boot[0x00D] = 1; // sec_per_clus
    boot[0x00E..0x010].copy_from_slice(&rsvd_sec_cnt.to_le_bytes());
    boot[0x010] = num_fats;
    boot[0x011..0x013].copy_from_slice(&root_ent_cnt.to_le_bytes());
    boot[0x013..0x015].copy_from_slice(&tot_sec16.to_le_bytes());
    boot[0x016..0x018].copy_from_slice(&fat_sz16.to_le_bytes());
    boot[510] = 0x55;
    boot[511] = 0xAA;

    let mut sectors = HashMap::new();
    sectors.insert(0, boot);

    MemStorage {
        sectors,
        count: tot_sec16 as usize,
    }
}

fn mounted() -> Driver<MemStorage> {
    let driver = Driver::new();
    driver.mount(blank_fat16_image(), &mut ()).expect("mount should succeed on a fresh image");
    driver
}

#[test]
fn write_then_read_back_a_file() {
    let driver = mounted();

    let fd = driver.open("hello.txt", OpenFlags::WRITE, &mut ()).unwrap();
    let n = driver.write(fd, b"hello, fat", &mut ()).unwrap();
    assert_eq!(n, 10);
    driver.close(fd, &mut ()).unwrap();

    let fd = driver.open("hello.txt", OpenFlags::READ, &mut ()).unwrap();
    assert_eq!(driver.file_size(fd).unwrap(), 10);

    let mut buf = [0u8; 10];
    let n = driver.read(fd, &mut buf, &mut ()).unwrap();
    assert_eq!(n, 10);
    assert_eq!(&buf, b"hello, fat");
    driver.close(fd, &mut ()).unwrap();
}

#[test]
fn append_continues_after_existing_content() {
    let driver = mounted();

    let fd = driver.open("log.txt", OpenFlags::WRITE, &mut ()).unwrap();
    driver.write(fd, b"first", &mut ()).unwrap();
    driver.close(fd, &mut ()).unwrap();

    let fd = driver.open("log.txt", OpenFlags::APPEND, &mut ()).unwrap();
    driver.write(fd, b"second", &mut ()).unwrap();
    driver.close(fd, &mut ()).unwrap();

    let fd = driver.open("log.txt", OpenFlags::READ, &mut ()).unwrap();
    assert_eq!(driver.file_size(fd).unwrap(), 11);
    let mut buf = [0u8; 11];
    driver.read(fd, &mut buf, &mut ()).unwrap();
    assert_eq!(&buf, b"firstsecond");
}

#[test]
fn opening_a_missing_file_read_only_fails() {
    let driver = mounted();
    let err = driver.open("nope.txt", OpenFlags::READ, &mut ()).unwrap_err();
    assert_eq!(err, FatError::NotFound);
}

#[test]
fn readdir_lists_written_files_and_skips_removed_ones() {
    let driver = mounted();

    for name in ["a.txt", "b.txt"] {
        let fd = driver.open(name, OpenFlags::WRITE, &mut ()).unwrap();
        driver.close(fd, &mut ()).unwrap();
    }

    driver.remove("a.txt", &mut ()).unwrap();

    let dd = driver.opendir("/", &mut ()).unwrap();
    let mut names = Vec::new();
    while let Some(entry) = driver.readdir(dd, &mut ()).unwrap() {
        names.push(entry.name);
    }
    driver.closedir(dd).unwrap();

    assert_eq!(names, vec![*b"B       TXT"]);
}

#[test]
fn seek_end_lands_on_the_last_byte_not_past_it() {
    let driver = mounted();

    let fd = driver.open("f.txt", OpenFlags::WRITE, &mut ()).unwrap();
    driver.write(fd, b"0123456789", &mut ()).unwrap();

    let pos = driver.seek(fd, SeekFrom::End(0)).unwrap();
    assert_eq!(pos, 9, "SeekFrom::End intentionally lands one byte short of file_size");
}

#[test]
fn operations_on_an_unmounted_driver_report_not_mounted() {
    let driver: Driver<MemStorage> = Driver::new();
    let err = driver.open("x.txt", OpenFlags::READ, &mut ()).unwrap_err();
    assert_eq!(err, FatError::NotMounted);
}

#[test]
fn rejects_a_path_component_with_multiple_dots() {
    let driver = mounted();
    let err = driver.open("a.b.c", OpenFlags::WRITE, &mut ()).unwrap_err();
    assert!(matches!(err, FatError::InvalidPath(_)));
}
