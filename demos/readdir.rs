// Requires the `no_std` feature to be disabled so that `Driver` can be
// built over a plain `std::fs::File`.
//
// Run with --no-default-features --example readdir -- <image-path>

use embedded_fat::{Driver, Storage};

use generic_array::GenericArray;
use std::env;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use typenum::consts::U512;

struct FileStorage {
    file: std::fs::File,
    sectors: usize,
}

impl FileStorage {
    fn open(path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let sectors = (file.metadata()?.len() / 512) as usize;
        Ok(Self { file, sectors })
    }
}

impl Storage for FileStorage {
    type SECTOR_SIZE = U512;
    type ReadErr = std::io::Error;
    type WriteErr = std::io::Error;

    fn read_sector(&mut self, idx: usize, buf: &mut GenericArray<u8, U512>) -> Result<(), Self::ReadErr> {
        self.file.seek(SeekFrom::Start((idx * 512) as u64))?;
        self.file.read_exact(buf)
    }

    fn write_sector(&mut self, idx: usize, buf: &GenericArray<u8, U512>) -> Result<(), Self::WriteErr> {
        self.file.seek(SeekFrom::Start((idx * 512) as u64))?;
        self.file.write_all(buf)
    }

    fn sector_count(&self) -> usize {
        self.sectors
    }
}

fn main() {
    env_logger::init();

    let path = env::args().nth(1).unwrap_or_else(|| "assets/fat16.img".into());
    let storage = FileStorage::open(&path).expect("couldn't open image");

    let driver: Driver<FileStorage> = Driver::new();
    driver.mount(storage, &mut ()).expect("mount failed");

    let dd = driver.opendir("/", &mut ()).expect("opendir failed");
    while let Some(entry) = driver.readdir(dd, &mut ()).expect("readdir failed") {
        let (name, len) = embedded_fat::readable_name(&entry.name);
        println!(
            "{:<12} {:>10} bytes  attr={:#04x}",
            core::str::from_utf8(&name[..len]).unwrap_or("<?>"),
            entry.file_size,
            entry.attr,
        );
    }
    driver.closedir(dd).unwrap();

    driver.umount(&mut ()).expect("umount failed");
}
