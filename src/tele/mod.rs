//! Inspecting a Beltway heap from outside the process that owns it.
//!
//! An observer reads the target's memory through a [`MemorySource`]: a live process, or a
//! boot image mapped from disk. Reads go through a [`RemotePageCache`], which keeps a copy
//! of every page it has read, stamped with the epoch of the source at the time of the read.
//! A live source advances its epoch whenever the target stops after running, so a cached
//! page is read again only when the target may have changed it.
//!
//! What the collector publishes about its heap (see
//! [`InspectableHeapInfo`](crate::util::heap::InspectableHeapInfo)) is read back by
//! [`TeleHeapInfo`].

mod boot_image;
mod buffer_pool;
mod heap_info;
mod page;
mod page_cache;
pub mod source;

pub use self::boot_image::{
    BootImageError, BootImageHeader, BOOT_IMAGE_HEADER_SIZE, BOOT_IMAGE_MAGIC, BOOT_IMAGE_VERSION,
};
pub use self::buffer_pool::{BufferPool, PageBuffer};
pub use self::heap_info::{HeapSnapshot, RemoteRegion, TeleHeapInfo};
pub use self::page::Page;
pub use self::page_cache::RemotePageCache;
pub use self::source::{MemorySource, ProcessChannel};

use crate::util::Address;
use std::io;
use thiserror::Error;

/// Errors of the observer side.
#[derive(Debug, Error)]
pub enum TeleError {
    #[error("the target process must be stopped to {0}")]
    ProcessNotStopped(&'static str),
    #[error("the target process has terminated")]
    ProcessTerminated,
    #[error("{length} bytes at {address} are not mapped in the target")]
    Unmapped { address: Address, length: usize },
    #[error("remote I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("attempt to {0} a read-only boot image with no live process")]
    UnsupportedOnReadOnlySource(&'static str),
    #[error(transparent)]
    BootImage(#[from] BootImageError),
    #[error("the target is collecting (collection epoch {collection_epoch}, root epoch {root_epoch})")]
    CollectionInProgress {
        collection_epoch: u64,
        root_epoch: u64,
    },
}

/// Byte order of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// The byte order of this process.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::BigEndian
        } else {
            ByteOrder::LittleEndian
        }
    }

    pub fn u16_from(self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(bytes),
            ByteOrder::BigEndian => u16::from_be_bytes(bytes),
        }
    }

    pub fn u32_from(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(bytes),
            ByteOrder::BigEndian => u32::from_be_bytes(bytes),
        }
    }

    pub fn u64_from(self, bytes: [u8; 8]) -> u64 {
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(bytes),
            ByteOrder::BigEndian => u64::from_be_bytes(bytes),
        }
    }

    pub fn u16_to(self, value: u16) -> [u8; 2] {
        match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        }
    }

    pub fn u32_to(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        }
    }

    pub fn u64_to(self, value: u64) -> [u8; 8] {
        match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        }
    }
}

/// What a memory source knows about the process behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessState {
    /// Stopped; memory may be read and written.
    Stopped,
    Running,
    Terminated,
    /// There is no process; the memory comes from an image.
    NoProcess,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn byte_order_decoding() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(ByteOrder::LittleEndian.u32_from([1, 2, 3, 4]), 0x0403_0201);
        assert_eq!(ByteOrder::BigEndian.u32_from([1, 2, 3, 4]), 0x0102_0304);
        assert_eq!(ByteOrder::BigEndian.u64_from(bytes), 0x0102_0304_0506_0708);
        assert_eq!(ByteOrder::LittleEndian.u16_to(0x0102), [2, 1]);
        assert_eq!(ByteOrder::BigEndian.u64_to(0x0102_0304_0506_0708), bytes);
    }

    #[test]
    fn names() {
        assert_eq!(ProcessState::NoProcess.to_string(), "NO_PROCESS");
        assert_eq!(ProcessState::Stopped.to_string(), "STOPPED");
        assert_eq!(ByteOrder::BigEndian.to_string(), "big_endian");
        assert_eq!(
            ByteOrder::from_str("little_endian").unwrap(),
            ByteOrder::LittleEndian
        );
    }
}
