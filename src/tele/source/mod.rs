//! Where the memory of the target comes from.

mod channel;
mod live;
mod read_only;

pub use self::channel::ProcessChannel;
#[cfg(target_os = "linux")]
pub use self::channel::ProcfsChannel;
pub use self::live::LiveProcess;
pub use self::read_only::ReadOnlyImage;

use super::{ByteOrder, ProcessState, TeleError};
use crate::util::Address;

/// "Read N bytes at address A" from a target, plus control of the process behind it, if
/// there is one.
///
/// A source has a modification epoch that never decreases. Memory read at some epoch stays
/// valid until the epoch advances, which lets a cache skip reads of memory it already has.
pub trait MemorySource: Send + Sync {
    /// The modification epoch of the target memory.
    fn epoch(&self) -> u64;

    fn page_size(&self) -> usize;

    fn byte_order(&self) -> ByteOrder;

    /// Width of a word of the target, 4 or 8 bytes.
    fn word_size(&self) -> usize;

    fn state(&self) -> ProcessState;

    /// Fill `buf` with the memory at `address`. Fails without a partial result.
    fn read(&self, address: Address, buf: &mut [u8]) -> Result<(), TeleError>;

    /// Write `bytes` to the memory at `address`. Does not advance the epoch.
    fn write(&self, address: Address, bytes: &[u8]) -> Result<(), TeleError>;

    fn suspend(&self) -> Result<(), TeleError>;

    fn resume(&self) -> Result<(), TeleError>;

    fn kill(&self) -> Result<(), TeleError>;

    /// The ids of the threads of the target.
    fn enumerate_threads(&self) -> Result<Vec<u64>, TeleError>;
}
