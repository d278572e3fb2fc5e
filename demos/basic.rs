// Requires the `no_std` feature to be disabled so that `Driver` can be
// built over a plain `std::fs::File`.
//
// Run with --no-default-features --example basic -- <image-path>

use embedded_fat::{Driver, FatError, OpenFlags, SeekFrom, Storage};

use generic_array::GenericArray;
use std::env;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom as IoSeekFrom, Write};
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
        self.file.seek(IoSeekFrom::Start((idx * 512) as u64))?;
        self.file.read_exact(buf)
    }

    fn write_sector(&mut self, idx: usize, buf: &GenericArray<u8, U512>) -> Result<(), Self::WriteErr> {
        self.file.seek(IoSeekFrom::Start((idx * 512) as u64))?;
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

    let fd = driver
        .open("hello.txt", OpenFlags::WRITE, &mut ())
        .expect("open failed");
    driver.write(fd, b"hello from the driver\n", &mut ()).unwrap();
    driver.close(fd, &mut ()).unwrap();

    let fd = driver.open("hello.txt", OpenFlags::READ, &mut ()).expect("reopen failed");
    let mut buf = [0u8; 64];
    let n = driver.read(fd, &mut buf, &mut ()).unwrap();
    println!("read back: {:?}", core::str::from_utf8(&buf[..n]));

    match driver.seek(fd, SeekFrom::Start(0)) {
        Ok(pos) => println!("seeked to {}", pos),
        Err(FatError::InvalidHandle) => println!("handle went away"),
        Err(e) => println!("seek error: {:?}", e),
    }

    driver.close(fd, &mut ()).unwrap();
    driver.umount(&mut ()).expect("umount failed");
}
