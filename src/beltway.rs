use crate::plan::{
    AllocationError, Barrier, BeltwayPlan, CardMarkingBarrier, HeapConfig, HeapInitError,
};
use crate::policy::belt_manager::ExpansionError;
use crate::scheduler::SingleThreadExecutor;
use crate::util::conversions::raw_align_up;
use crate::util::heap::{MemoryRegion, RootHandle};
use crate::util::options::Options;
use crate::util::{Address, ObjectReference};
use crate::vm::VMBinding;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};

/// A Beltway instance: a heap, the collector thread that collects it, and everything an
/// observer needs to inspect it. Nothing is global; a process may create several.
pub struct Beltway<VM: VMBinding> {
    plan: Arc<BeltwayPlan<VM>>,
    options: Options,
    collector: SingleThreadExecutor,
    /// Held for the duration of a collection, and by a mutator on the allocation slow path.
    gc_lock: Mutex<()>,
    /// Mutators hold this shared while they touch the heap. Collecting takes it exclusively,
    /// which stops every mutator at its next allocation, store or root access.
    mutators: RwLock<()>,
}

impl<VM: VMBinding> Beltway<VM> {
    /// Create an instance from options; the heap layout comes from the options.
    pub fn new(options: Options) -> Result<Self, HeapInitError> {
        let config = HeapConfig::from_options(&options);
        Self::with_config(options, config)
    }

    pub fn with_config(options: Options, config: HeapConfig) -> Result<Self, HeapInitError> {
        let plan = Arc::new(BeltwayPlan::new(config)?);
        let collector = SingleThreadExecutor::spawn("beltway-collector")
            .map_err(HeapInitError::CollectorThread)?;
        Ok(Beltway {
            plan,
            options,
            collector,
            gc_lock: Mutex::new(()),
            mutators: RwLock::new(()),
        })
    }

    pub fn plan(&self) -> &BeltwayPlan<VM> {
        &self.plan
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Allocate `size` bytes, rounded up to `VM::MIN_ALIGNMENT`. The memory is zeroed.
    pub fn alloc(&self, size: usize) -> Result<Address, AllocationError> {
        let size = raw_align_up(size.max(VM::MIN_ALIGNMENT), VM::MIN_ALIGNMENT);
        let fast = {
            let _mutator = self.enter_mutator();
            self.plan.allocate_nursery(size)
        };
        match fast {
            Some(addr) => Ok(addr),
            None => self.alloc_slow(size),
        }
    }

    /// Wait until no collection is in flight and keep the next one from starting.
    fn enter_mutator(&self) -> RwLockReadGuard<'_, ()> {
        self.mutators.read().unwrap()
    }

    fn alloc_slow(&self, size: usize) -> Result<Address, AllocationError> {
        // Only a holder of `gc_lock` collects or expands, so the heap does not change
        // under us here without the shared lock.
        let _gc = self.gc_lock.lock().unwrap();
        // Another mutator may have collected while we waited for the lock.
        if let Some(addr) = self.plan.allocate_nursery(size) {
            return Ok(addr);
        }
        if self.plan.is_out_of_memory() {
            return Err(AllocationError::OutOfMemoryLatched { requested: size });
        }
        if self.dispatch_collection(size) {
            if let Some(addr) = self.plan.allocate_nursery(size) {
                return Ok(addr);
            }
        }
        // Too large for the nursery, or the nursery is still short after collecting.
        if !self.plan.is_out_of_memory() {
            if let Some(addr) = self.plan.allocate_mature(size) {
                debug!("pretenured {} bytes at {}", size, addr);
                return Ok(addr);
            }
        }
        Err(AllocationError::HeapExhausted { requested: size })
    }

    /// Stop the mutators and collect on the collector thread. The caller holds `gc_lock`.
    fn dispatch_collection(&self, requested_free_space: usize) -> bool {
        let _world = self.mutators.write().unwrap();
        let plan = self.plan.clone();
        self.collector
            .execute(move || plan.collect_garbage(requested_free_space))
    }

    /// Run a collection now, as if an allocation of `requested_free_space` bytes had
    /// failed. Returns whether the nursery has that much room afterwards.
    pub fn collect_garbage(&self, requested_free_space: usize) -> bool {
        let _gc = self.gc_lock.lock().unwrap();
        self.dispatch_collection(requested_free_space)
    }

    /// Store `target` into the field at `offset` of `src`, through the write barrier.
    pub fn object_reference_write(
        &self,
        src: ObjectReference,
        offset: usize,
        target: ObjectReference,
    ) {
        let _mutator = self.enter_mutator();
        let slot = src.to_raw_address() + offset;
        CardMarkingBarrier::new(&self.plan).object_reference_write(src, slot, target);
    }

    /// Grow the mature belt into the empty belt above it, and let collections run again
    /// after the heap ran out of memory.
    pub fn expand_mature(&self, bytes: usize) -> Result<(), ExpansionError> {
        let _gc = self.gc_lock.lock().unwrap();
        let _world = self.mutators.write().unwrap();
        self.plan.expand_mature(bytes)
    }

    pub fn is_out_of_memory(&self) -> bool {
        self.plan.is_out_of_memory()
    }

    /// Keep `object` alive. Returns `None` if the root table is full.
    pub fn add_root(&self, object: ObjectReference) -> Option<RootHandle> {
        let _mutator = self.enter_mutator();
        self.plan.roots().add(object)
    }

    /// The current location of a rooted object.
    pub fn get_root(&self, handle: RootHandle) -> ObjectReference {
        let _mutator = self.enter_mutator();
        self.plan.roots().get(handle)
    }

    pub fn set_root(&self, handle: RootHandle, object: ObjectReference) {
        let _mutator = self.enter_mutator();
        self.plan.roots().set(handle, object)
    }

    pub fn remove_root(&self, handle: RootHandle) {
        let _mutator = self.enter_mutator();
        self.plan.roots().remove(handle)
    }

    pub fn current_root_epoch(&self) -> u64 {
        self.plan.epochs().root_epoch()
    }

    pub fn current_collection_epoch(&self) -> u64 {
        self.plan.epochs().collection_epoch()
    }

    pub fn is_collecting(&self) -> bool {
        self.plan.epochs().is_collecting()
    }

    pub fn register_heap_regions(&self, regions: &[MemoryRegion]) {
        self.plan.register_heap_regions(regions)
    }

    pub fn heap_regions(&self) -> Vec<MemoryRegion> {
        self.plan.heap_info().heap_regions()
    }

    /// Where an observer finds the epochs, the root table and the heap regions.
    pub fn heap_info_address(&self) -> Address {
        self.plan.heap_info().address()
    }
}
