
// Mark the crate as no_std if the feature is enabled (and only)
#![cfg_attr(all(feature = "no_std", not(test)), no_std)]

#[allow(unused_extern_crates)]
extern crate core; // makes rls actually look into the standard library (hack)

// Bare-metal targets need a panic handler regardless of crate type.
// (it'd be nicer to be able to use `panic_halt` or its ilk, but alas)

#[cfg_attr(target_os = "none", panic_handler)]
#[cfg(target_os = "none")]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

macro_rules! using_std { ($($i:item)*) => ($(#[cfg(not(feature = "no_std"))]$i)*) }

pub mod block_device;
pub mod error;
pub mod mutex;
pub mod util;

pub mod fat;

pub use block_device::{DeviceError, Storage};
pub use error::{FatError, PathError};
pub use fat::api::{Driver, OpenFlags, SeekFrom};
pub use fat::dir::{readable_name, DirEntry};
