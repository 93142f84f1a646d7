use crate::util::constants::MAX_INSPECTABLE_REGIONS;
use crate::util::heap::epoch::EpochRegistry;
use crate::util::{Address, ObjectReference};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A named range of memory an observer may want to look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub description: String,
    pub start: Address,
    pub size: usize,
}

impl MemoryRegion {
    pub fn new(description: impl Into<String>, start: Address, size: usize) -> Self {
        MemoryRegion {
            description: description.into(),
            start,
            size,
        }
    }

    pub fn end(&self) -> Address {
        self.start + self.size
    }
}

#[repr(C)]
#[derive(Debug, Default)]
struct RegionRecord {
    start: AtomicUsize,
    size: AtomicUsize,
}

/// What the collector publishes about its heap for an observer outside the process.
///
/// The fields up to and including the region records have a fixed layout, so an
/// observer that knows the address of this structure can read the epochs, the root
/// table and the registered regions with plain memory reads. The offset functions
/// describe that layout.
#[repr(C)]
pub struct InspectableHeapInfo {
    epochs: EpochRegistry,
    roots_address: AtomicUsize,
    roots_capacity: AtomicUsize,
    region_count: AtomicUsize,
    regions: [RegionRecord; MAX_INSPECTABLE_REGIONS],
    descriptions: Mutex<Vec<MemoryRegion>>,
}

impl InspectableHeapInfo {
    pub fn new(roots: &RootTable) -> Self {
        InspectableHeapInfo {
            epochs: EpochRegistry::default(),
            roots_address: AtomicUsize::new(roots.address().as_usize()),
            roots_capacity: AtomicUsize::new(roots.capacity()),
            region_count: AtomicUsize::new(0),
            regions: Default::default(),
            descriptions: Mutex::new(vec![]),
        }
    }

    pub fn address(&self) -> Address {
        Address::from_ref(self)
    }

    pub fn epochs(&self) -> &EpochRegistry {
        &self.epochs
    }

    /// Publish the regions of the heap. Replaces whatever was registered before. Only the
    /// first `MAX_INSPECTABLE_REGIONS` regions are visible through the fixed layout.
    pub fn register_heap_regions(&self, regions: &[MemoryRegion]) {
        if regions.len() > MAX_INSPECTABLE_REGIONS {
            warn!(
                "{} heap regions registered, only the first {} are published",
                regions.len(),
                MAX_INSPECTABLE_REGIONS
            );
        }
        let published = regions.len().min(MAX_INSPECTABLE_REGIONS);
        // Hide the records while they are rewritten.
        self.region_count.store(0, Ordering::SeqCst);
        for (record, region) in self.regions.iter().zip(regions) {
            record.start.store(region.start.as_usize(), Ordering::Relaxed);
            record.size.store(region.size, Ordering::Relaxed);
        }
        self.region_count.store(published, Ordering::SeqCst);
        for region in regions {
            debug!(
                "registered heap region {}: [{}, {})",
                region.description,
                region.start,
                region.end()
            );
        }
        *self.descriptions.lock().unwrap() = regions.to_vec();
    }

    pub fn heap_regions(&self) -> Vec<MemoryRegion> {
        self.descriptions.lock().unwrap().clone()
    }

    pub fn epochs_offset() -> usize {
        memoffset::offset_of!(InspectableHeapInfo, epochs)
    }

    pub fn roots_address_offset() -> usize {
        memoffset::offset_of!(InspectableHeapInfo, roots_address)
    }

    pub fn roots_capacity_offset() -> usize {
        memoffset::offset_of!(InspectableHeapInfo, roots_capacity)
    }

    pub fn region_count_offset() -> usize {
        memoffset::offset_of!(InspectableHeapInfo, region_count)
    }

    /// Offset of the first region record. Each record is a start address word followed by
    /// a size word.
    pub fn regions_offset() -> usize {
        memoffset::offset_of!(InspectableHeapInfo, regions)
    }
}

/// A handle to an entry of the [`RootTable`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RootHandle(usize);

impl RootHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

struct RootTableState {
    high_water: usize,
    free: Vec<usize>,
}

/// A fixed-capacity table of references that the runtime keeps alive, at an address that
/// never changes. The collector treats every non-null entry as a root and rewrites it
/// when the referent moves; an observer reads the same entries to find live objects.
pub struct RootTable {
    slots: Box<[AtomicUsize]>,
    state: Mutex<RootTableState>,
}

impl RootTable {
    pub fn new(capacity: usize) -> Self {
        RootTable {
            slots: (0..capacity).map(|_| AtomicUsize::new(0)).collect(),
            state: Mutex::new(RootTableState {
                high_water: 0,
                free: vec![],
            }),
        }
    }

    pub fn address(&self) -> Address {
        Address::from_ptr(self.slots.as_ptr())
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns `None` when the table is full.
    pub fn add(&self, object: ObjectReference) -> Option<RootHandle> {
        let mut state = self.state.lock().unwrap();
        let index = match state.free.pop() {
            Some(index) => index,
            None if state.high_water < self.slots.len() => {
                state.high_water += 1;
                state.high_water - 1
            }
            None => {
                warn!("root table is full ({} entries)", self.slots.len());
                return None;
            }
        };
        self.slots[index].store(object.value(), Ordering::Release);
        Some(RootHandle(index))
    }

    pub fn get(&self, handle: RootHandle) -> ObjectReference {
        let raw = self.slots[handle.0].load(Ordering::Acquire);
        ObjectReference::from_raw_address(unsafe { Address::from_usize(raw) })
    }

    pub fn set(&self, handle: RootHandle, object: ObjectReference) {
        self.slots[handle.0].store(object.value(), Ordering::Release);
    }

    pub fn remove(&self, handle: RootHandle) {
        let mut state = self.state.lock().unwrap();
        self.slots[handle.0].store(0, Ordering::Release);
        debug_assert!(!state.free.contains(&handle.0));
        state.free.push(handle.0);
    }

    /// Number of entries in use.
    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.high_water - state.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit the slot of every entry that holds a reference.
    pub fn slots_do(&self, mut visitor: impl FnMut(Address)) {
        let high_water = self.state.lock().unwrap().high_water;
        for slot in &self.slots[..high_water] {
            if slot.load(Ordering::Acquire) != 0 {
                visitor(Address::from_ref(slot));
            }
        }
    }
}
