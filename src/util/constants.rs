/// log2 of the number of bytes in a megabyte
pub const LOG_BYTES_IN_MBYTE: u8 = 20;
/// The number of bytes in a megabyte
pub const BYTES_IN_MBYTE: usize = 1 << LOG_BYTES_IN_MBYTE;

/// log2 of the number of bytes in a kilobyte
pub const LOG_BYTES_IN_KBYTE: u8 = 10;
/// The number of bytes in a kilobyte
pub const BYTES_IN_KBYTE: usize = 1 << LOG_BYTES_IN_KBYTE;

#[cfg(target_pointer_width = "32")]
/// log2 of the number of bytes in an address
pub const LOG_BYTES_IN_ADDRESS: u8 = 2;
#[cfg(target_pointer_width = "64")]
/// log2 of the number of bytes in an address
pub const LOG_BYTES_IN_ADDRESS: u8 = 3;
/// The number of bytes in an address
pub const BYTES_IN_ADDRESS: usize = 1 << LOG_BYTES_IN_ADDRESS;

/// log2 of the number of bytes in a word
pub const LOG_BYTES_IN_WORD: u8 = LOG_BYTES_IN_ADDRESS;
/// The number of bytes in a word
pub const BYTES_IN_WORD: usize = 1 << LOG_BYTES_IN_WORD;

/// log2 of the number of bytes in a page
pub const LOG_BYTES_IN_PAGE: u8 = 12;
/// The number of bytes in a page
pub const BYTES_IN_PAGE: usize = 1 << LOG_BYTES_IN_PAGE;

/// log2 of the default card size. A 512-byte card.
pub const DEFAULT_LOG_BYTES_IN_CARD: usize = 9;
/// Smallest card we accept. One card must at least hold a reference slot.
pub const MIN_LOG_BYTES_IN_CARD: usize = LOG_BYTES_IN_WORD as usize;

/// Default maximum heap size, split between the belts.
pub const DEFAULT_MAX_HEAP_SIZE: usize = 256 << LOG_BYTES_IN_MBYTE;
/// The smallest heap we can lay belts out in: one page per belt at least.
pub const MIN_HEAP_SIZE: usize = 64 << LOG_BYTES_IN_KBYTE;

/// Default split of the heap between the belts, in belt order.
pub const DEFAULT_BELT_PERCENTAGES: [u8; 2] = [70, 30];

/// Default capacity of the root table in entries (a megabyte of reference slots).
pub const DEFAULT_ROOT_TABLE_CAPACITY: usize = BYTES_IN_MBYTE / BYTES_IN_ADDRESS;

/// Default size of the pool of preallocated page buffers used by the remote page cache.
pub const DEFAULT_DIRECT_BUFFER_POOL_SIZE: usize = 100 << LOG_BYTES_IN_MBYTE;

/// Heap regions the inspectable heap info can publish to an observer.
pub const MAX_INSPECTABLE_REGIONS: usize = 16;
