use crate::policy::belt_manager::BeltLayoutError;
use crate::util::constants::*;
use crate::util::options::Options;
use thiserror::Error;

/// Why an allocation request could not be satisfied.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocationError {
    /// Collecting did not free enough space for the request in either belt.
    #[error("heap exhausted: no room for {requested} bytes after collecting")]
    HeapExhausted { requested: usize },
    /// A previous collection ran out of memory. No collection runs until the mature belt
    /// is expanded.
    #[error("heap is out of memory, {requested} bytes requested; the mature belt must be expanded first")]
    OutOfMemoryLatched { requested: usize },
}

#[derive(Debug, Error)]
pub enum HeapInitError {
    #[error("the collector needs exactly two belts, {0} configured")]
    BeltCount(usize),
    #[error("heap size {0} is below the minimum of {min} bytes", min = MIN_HEAP_SIZE)]
    HeapTooSmall(usize),
    #[error("log card size {0} is outside [{min}, {max}]", min = MIN_LOG_BYTES_IN_CARD, max = LOG_BYTES_IN_PAGE)]
    CardSize(usize),
    #[error("the root table needs room for at least one entry")]
    EmptyRootTable,
    #[error(transparent)]
    Layout(#[from] BeltLayoutError),
    #[error("failed to reserve the heap: {0}")]
    Mmap(#[source] std::io::Error),
    #[error("failed to start the collector thread: {0}")]
    CollectorThread(#[source] std::io::Error),
}

/// Everything needed to lay out a heap. Built from [`Options`], or directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapConfig {
    pub max_heap_size: usize,
    /// Share of the heap for each belt, lowest address first. Belt 0 starts as the
    /// nursery, belt 1 as the mature belt.
    pub belt_percentages: Vec<u8>,
    pub log_bytes_in_card: usize,
    pub mature_expandable: bool,
    pub root_table_capacity: usize,
}

impl HeapConfig {
    pub fn from_options(options: &Options) -> Self {
        HeapConfig {
            max_heap_size: options.max_heap_size,
            belt_percentages: options.belt_percentages.as_slice().to_vec(),
            log_bytes_in_card: options.log_bytes_in_card,
            mature_expandable: options.mature_expandable,
            root_table_capacity: options.root_table_capacity,
        }
    }

    /// A heap of `max_heap_size` bytes with every other setting at its default.
    pub fn with_heap_size(max_heap_size: usize, belt_percentages: &[u8]) -> Self {
        HeapConfig {
            max_heap_size,
            belt_percentages: belt_percentages.to_vec(),
            log_bytes_in_card: DEFAULT_LOG_BYTES_IN_CARD,
            mature_expandable: true,
            root_table_capacity: DEFAULT_ROOT_TABLE_CAPACITY,
        }
    }

    /// Mature occupancy at which a minor collection is followed by a major one. Always
    /// half of the heap.
    pub fn usable_memory(&self) -> usize {
        self.max_heap_size / 2
    }

    pub fn validate(&self) -> Result<(), HeapInitError> {
        if self.belt_percentages.len() != 2 {
            return Err(HeapInitError::BeltCount(self.belt_percentages.len()));
        }
        if self.max_heap_size < MIN_HEAP_SIZE {
            return Err(HeapInitError::HeapTooSmall(self.max_heap_size));
        }
        if !(MIN_LOG_BYTES_IN_CARD..=LOG_BYTES_IN_PAGE as usize).contains(&self.log_bytes_in_card)
        {
            return Err(HeapInitError::CardSize(self.log_bytes_in_card));
        }
        if self.root_table_capacity == 0 {
            return Err(HeapInitError::EmptyRootTable);
        }
        Ok(())
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        HeapConfig::from_options(&Options::default())
    }
}
