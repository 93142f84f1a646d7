use super::page_cache::RemotePageCache;
use super::TeleError;
use crate::util::constants::MAX_INSPECTABLE_REGIONS;
use crate::util::heap::{EpochRegistry, InspectableHeapInfo};
use crate::util::{Address, ObjectReference};

/// A heap region as published by the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteRegion {
    pub start: Address,
    pub size: usize,
}

impl RemoteRegion {
    pub fn contains(&self, address: Address) -> bool {
        self.start <= address && address < self.start + self.size
    }
}

/// The heap of the target as of one root epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapSnapshot {
    pub root_epoch: u64,
    pub regions: Vec<RemoteRegion>,
    /// The objects in the root table of the target.
    pub roots: Vec<ObjectReference>,
}

/// Reads the [`InspectableHeapInfo`] of a target at a known address.
pub struct TeleHeapInfo<'a> {
    cache: &'a RemotePageCache,
    address: Address,
}

impl<'a> TeleHeapInfo<'a> {
    pub fn new(cache: &'a RemotePageCache, address: Address) -> Self {
        TeleHeapInfo { cache, address }
    }

    fn read_usize(&self, offset: usize) -> Result<usize, TeleError> {
        Ok(self.cache.read_word(self.address + offset)? as usize)
    }

    pub fn collection_epoch(&self) -> Result<u64, TeleError> {
        self.cache.read_u64(
            self.address
                + InspectableHeapInfo::epochs_offset()
                + EpochRegistry::collection_epoch_offset(),
        )
    }

    /// The epoch of the last collection the target finished. Addresses read in an earlier
    /// root epoch may be out of date.
    pub fn root_epoch(&self) -> Result<u64, TeleError> {
        self.cache.read_u64(
            self.address + InspectableHeapInfo::epochs_offset() + EpochRegistry::root_epoch_offset(),
        )
    }

    pub fn is_collecting(&self) -> Result<bool, TeleError> {
        Ok(self.root_epoch()? < self.collection_epoch()?)
    }

    pub fn regions(&self) -> Result<Vec<RemoteRegion>, TeleError> {
        let count = self
            .read_usize(InspectableHeapInfo::region_count_offset())?
            .min(MAX_INSPECTABLE_REGIONS);
        let word = self.cache.source().word_size();
        (0..count)
            .map(|i| {
                let record = InspectableHeapInfo::regions_offset() + i * 2 * word;
                Ok(RemoteRegion {
                    start: unsafe { Address::from_usize(self.read_usize(record)?) },
                    size: self.read_usize(record + word)?,
                })
            })
            .collect()
    }

    pub fn roots(&self) -> Result<Vec<ObjectReference>, TeleError> {
        let table = unsafe {
            Address::from_usize(self.read_usize(InspectableHeapInfo::roots_address_offset())?)
        };
        let capacity = self.read_usize(InspectableHeapInfo::roots_capacity_offset())?;
        let word = self.cache.source().word_size();
        let mut roots = vec![];
        for i in 0..capacity {
            let raw = self.cache.read_word(table + i * word)? as usize;
            if raw != 0 {
                roots.push(ObjectReference::from_raw_address(unsafe {
                    Address::from_usize(raw)
                }));
            }
        }
        Ok(roots)
    }

    /// Everything published about the heap. Fails if the target stopped in the middle of
    /// a collection, when roots and regions are not to be trusted.
    pub fn snapshot(&self) -> Result<HeapSnapshot, TeleError> {
        let collection_epoch = self.collection_epoch()?;
        let root_epoch = self.root_epoch()?;
        if root_epoch < collection_epoch {
            return Err(TeleError::CollectionInProgress {
                collection_epoch,
                root_epoch,
            });
        }
        Ok(HeapSnapshot {
            root_epoch,
            regions: self.regions()?,
            roots: self.roots()?,
        })
    }
}
