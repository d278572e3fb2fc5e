//! The crate-wide error type.
//!
//! Every fallible operation in [`fat`](crate::fat) returns a [`FatError<E>`],
//! parameterized over the backing [`Storage`](crate::Storage)'s own error
//! type so a device failure is never silently flattened into `()`.

use core::fmt::{self, Debug};

/// Why a short-name path component failed to canonicalize.
///
/// Numbered to match the four outcomes of the C source's
/// `_make_valid_name`: `0` (ok) and `1` (end-of-path) are not errors and are
/// folded into `Ok`/`None` by [`crate::fat::path::PathResolver`]; `2` and `3`
/// and `4` become these variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathError {
    /// More than 11 significant characters in a single path component.
    NameTooLong,
    /// A component had more than one `.`.
    MultipleDots,
    /// The basename (before the `.`) was longer than 8 characters.
    BasenameTooLong,
}

/// Errors surfaced by the FAT driver.
///
/// `E` is the backing [`Storage`](crate::Storage) implementation's error
/// type; it is folded in verbatim via [`Device`](FatError::Device) rather
/// than stringified, so callers on a `no_std` target keep full fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FatError<E> {
    /// The block device itself failed a read or write.
    Device(E),
    /// The boot sector failed one or more of the invariants in §3 of the
    /// driver's data model (power-of-two checks, `num_fats`, boot
    /// signature, ...). The bits set mirror the flag return of the
    /// original `parse_bootsector`.
    BadBootSector { flags: u8 },
    /// `count_of_clusters < 4085`: this is a FAT12 volume, which this
    /// driver never mounts.
    UnsupportedFatType,
    /// No volume is currently mounted.
    NotMounted,
    /// A path component did not resolve to an existing directory entry.
    NotFound,
    /// The resolved entry is a directory (or volume label) where a file
    /// was expected.
    IsADirectory,
    /// The resolved entry is not a directory where one was expected
    /// (e.g. `opendir` on a plain file).
    NotADirectory,
    /// `WRITE`/`APPEND` was requested on a `READ_ONLY` entry.
    ReadOnly,
    /// The file handle pool is exhausted.
    NoFreeHandle,
    /// The directory handle pool is exhausted.
    NoFreeDirHandle,
    /// `fd` does not name a live handle, or lacks the flag the operation
    /// requires.
    InvalidHandle,
    /// A write needed to extend a cluster chain but the FAT has no more
    /// free clusters (resolves Open Question 1 of the design notes: the
    /// original `get_free_cluster` never detected this and looped
    /// forever).
    ChainExhausted,
    /// The FAT16 fixed-size root directory is full; unlike a directory
    /// cluster chain it cannot be extended (Open Question 6).
    RootDirectoryFull,
    /// A path component failed to canonicalize into a short name.
    InvalidPath(PathError),
}

impl<E> From<E> for FatError<E> {
    fn from(e: E) -> Self {
        FatError::Device(e)
    }
}

using_std! {
    impl<E: Debug> fmt::Display for FatError<E> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            Debug::fmt(self, f)
        }
    }

    impl<E: Debug> std::error::Error for FatError<E> { }
}
