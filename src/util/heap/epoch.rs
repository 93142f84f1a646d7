use std::sync::atomic::{AtomicU64, Ordering};

/// The two counters an observer uses to tell whether the heap is stable.
///
/// `collection_epoch` is bumped when a collection begins, before anything moves.
/// `root_epoch` catches up with it once the collection has finished and every root
/// refers to the new location of its object. An observer that sees the root epoch
/// change knows that addresses it read before are no longer valid; one that sees the
/// two differ knows a collection is in progress. The layout is fixed so an observer in
/// another process can read both counters through a memory source.
#[repr(C)]
#[derive(Debug, Default)]
pub struct EpochRegistry {
    collection_epoch: AtomicU64,
    root_epoch: AtomicU64,
}

static_assertions::const_assert_eq!(std::mem::size_of::<EpochRegistry>(), 16);

impl EpochRegistry {
    /// Returns the epoch of the collection that begins.
    pub fn begin_collection(&self) -> u64 {
        let epoch = self.collection_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        trace!("collection epoch {} begins", epoch);
        epoch
    }

    pub fn end_collection(&self) {
        let epoch = self.collection_epoch.load(Ordering::SeqCst);
        self.root_epoch.store(epoch, Ordering::SeqCst);
        trace!("collection epoch {} ends", epoch);
    }

    pub fn collection_epoch(&self) -> u64 {
        self.collection_epoch.load(Ordering::SeqCst)
    }

    pub fn root_epoch(&self) -> u64 {
        self.root_epoch.load(Ordering::SeqCst)
    }

    pub fn is_collecting(&self) -> bool {
        self.root_epoch() < self.collection_epoch()
    }

    /// Byte offset of the collection epoch within the registry.
    pub fn collection_epoch_offset() -> usize {
        memoffset::offset_of!(EpochRegistry, collection_epoch)
    }

    /// Byte offset of the root epoch within the registry.
    pub fn root_epoch_offset() -> usize {
        memoffset::offset_of!(EpochRegistry, root_epoch)
    }
}
