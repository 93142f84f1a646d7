use super::gc_work::{Collection, CollectionKind};
use super::{role_description, MATURE, NURSERY};
use crate::plan::global::{HeapConfig, HeapInitError};
use crate::policy::belt::Belt;
use crate::policy::belt_manager::{BeltManager, ExpansionError};
use crate::policy::cardtable::CardTable;
use crate::policy::first_object_table::CardFirstObjectTable;
use crate::util::heap::{EpochRegistry, InspectableHeapInfo, MemoryRegion, RootTable};
use crate::util::memory::AnonymousMapping;
use crate::util::Address;
use crate::vm::VMBinding;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Counters of the collections run so far.
#[derive(Debug, Default)]
pub struct CollectionStats {
    minor: AtomicUsize,
    major: AtomicUsize,
    full_heap: AtomicUsize,
    promoted_bytes: AtomicUsize,
}

impl CollectionStats {
    pub fn minor_collections(&self) -> usize {
        self.minor.load(Ordering::Relaxed)
    }

    pub fn major_collections(&self) -> usize {
        self.major.load(Ordering::Relaxed)
    }

    /// Minor collections that escalated to a full-heap pass because the survivors did not
    /// fit in the mature belt.
    pub fn full_heap_collections(&self) -> usize {
        self.full_heap.load(Ordering::Relaxed)
    }

    /// Bytes moved out of the nursery into the mature belt.
    pub fn promoted_bytes(&self) -> usize {
        self.promoted_bytes.load(Ordering::Relaxed)
    }
}

pub struct BeltwayPlan<VM: VMBinding> {
    config: HeapConfig,
    belts: BeltManager,
    card_table: CardTable,
    first_objects: CardFirstObjectTable,
    roots: RootTable,
    heap_info: InspectableHeapInfo,
    /// Regions registered by the runtime, published after the belts.
    runtime_regions: Mutex<Vec<MemoryRegion>>,
    out_of_memory: AtomicBool,
    stats: CollectionStats,
    // Dropped last: everything above points into it.
    heap: AnonymousMapping,
    phantom: PhantomData<VM>,
}

impl<VM: VMBinding> BeltwayPlan<VM> {
    pub fn new(config: HeapConfig) -> Result<Self, HeapInitError> {
        config.validate()?;
        let heap = AnonymousMapping::new(config.max_heap_size).map_err(HeapInitError::Mmap)?;
        let belts =
            BeltManager::initialize(heap.start(), config.max_heap_size, &config.belt_percentages)?;
        belts.belt(MATURE).set_expandable(config.mature_expandable);
        let covered = belts.application_heap();
        let card_table = CardTable::new(covered.clone(), config.log_bytes_in_card);
        let first_objects = CardFirstObjectTable::new(covered, config.log_bytes_in_card);
        let roots = RootTable::new(config.root_table_capacity);
        let heap_info = InspectableHeapInfo::new(&roots);
        info!("Beltway heap of {} bytes at {}", config.max_heap_size, heap.start());
        debug!("{}", card_table);
        let plan = BeltwayPlan {
            config,
            belts,
            card_table,
            first_objects,
            roots,
            heap_info,
            runtime_regions: Mutex::new(vec![]),
            out_of_memory: AtomicBool::new(false),
            stats: CollectionStats::default(),
            heap,
            phantom: PhantomData,
        };
        plan.publish_regions();
        Ok(plan)
    }

    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    pub fn belts(&self) -> &BeltManager {
        &self.belts
    }

    pub fn nursery(&self) -> &Belt {
        self.belts.belt(NURSERY)
    }

    pub fn mature(&self) -> &Belt {
        self.belts.belt(MATURE)
    }

    pub fn card_table(&self) -> &CardTable {
        &self.card_table
    }

    pub(crate) fn first_objects(&self) -> &CardFirstObjectTable {
        &self.first_objects
    }

    pub fn roots(&self) -> &RootTable {
        &self.roots
    }

    pub fn heap_info(&self) -> &InspectableHeapInfo {
        &self.heap_info
    }

    pub fn epochs(&self) -> &EpochRegistry {
        self.heap_info.epochs()
    }

    pub fn stats(&self) -> &CollectionStats {
        &self.stats
    }

    pub fn heap_start(&self) -> Address {
        self.heap.start()
    }

    pub fn is_out_of_memory(&self) -> bool {
        self.out_of_memory.load(Ordering::SeqCst)
    }

    fn latch_out_of_memory(&self) {
        self.out_of_memory.store(true, Ordering::SeqCst);
    }

    /// The belts as heap regions, described by the role they currently play.
    pub fn belt_regions(&self) -> Vec<MemoryRegion> {
        self.belts
            .belts()
            .iter()
            .map(|belt| {
                MemoryRegion::new(
                    role_description(self.belts.role_of(belt)),
                    belt.start(),
                    belt.size(),
                )
            })
            .collect()
    }

    pub fn print_belts(&self) {
        for belt in self.belts.belts() {
            belt.print_info(role_description(self.belts.role_of(belt)));
        }
    }

    /// Mutator allocation in the nursery.
    pub fn allocate_nursery(&self, size: usize) -> Option<Address> {
        self.nursery().allocate(size)
    }

    /// Allocation straight into the mature belt, for requests the nursery cannot hold.
    /// Only called with the collection lock held, so no collection moves the object before
    /// its first-object entry is written.
    pub fn allocate_mature(&self, size: usize) -> Option<Address> {
        let addr = self.mature().allocate(size)?;
        self.first_objects.record(addr, size);
        Some(addr)
    }

    /// Collect so that the nursery has `requested_free_space` bytes free. Runs a minor
    /// collection, then a major one if the mature belt has filled up to half the heap.
    /// Returns false if the request still cannot be met, in which case the caller has to
    /// fail the allocation or find the space elsewhere.
    ///
    /// Runs on the collector thread, with the mutators stopped.
    pub fn collect_garbage(&self, requested_free_space: usize) -> bool {
        let mut success = self.minor_collect(requested_free_space);
        if success && self.mature().used_bytes() >= self.config.usable_memory() {
            debug!(
                "mature belt holds {} bytes, at least half the heap: collecting it",
                self.mature().used_bytes()
            );
            success = self.major_collect(requested_free_space);
        }
        // No mature slot can refer to an empty nursery. A failed collection left the
        // nursery populated and its cards are still needed.
        if self.nursery().is_empty() {
            self.card_table.clear_all_cards();
        }
        success
    }

    /// Promote the live part of the nursery into the mature belt. Escalates to a full-heap
    /// pass if the survivors do not fit.
    pub fn minor_collect(&self, requested_free_space: usize) -> bool {
        if self.is_out_of_memory() {
            debug!("out of memory: skipping minor collection");
            return false;
        }
        let epoch = self.epochs().begin_collection();
        self.snapshot_marks();
        self.stats.minor.fetch_add(1, Ordering::Relaxed);

        let outcome = match Collection::<VM>::new(self, CollectionKind::Minor).run() {
            Ok(summary) => Ok(summary),
            Err(failure) => {
                info!("{}: escalating to a full-heap collection", failure);
                self.stats.full_heap.fetch_add(1, Ordering::Relaxed);
                Collection::<VM>::new(self, CollectionKind::FullHeap).run()
            }
        };
        match outcome {
            Ok(summary) => {
                self.stats
                    .promoted_bytes
                    .fetch_add(summary.promoted_bytes, Ordering::Relaxed);
                info!(
                    "collection {} ({:?}): {} objects, {} bytes promoted, mature {} / {} bytes",
                    epoch,
                    summary.kind,
                    summary.objects,
                    summary.promoted_bytes,
                    self.mature().used_bytes(),
                    self.mature().size()
                );
            }
            Err(failure) => {
                warn!("collection {} failed: {}. Heap is out of memory", epoch, failure);
                self.latch_out_of_memory();
            }
        }
        self.publish_regions();
        self.epochs().end_collection();
        !self.is_out_of_memory() && self.nursery().remaining_bytes() >= requested_free_space
    }

    /// Compact the mature belt, into the empty nursery belt when the survivors fit there.
    pub fn major_collect(&self, requested_free_space: usize) -> bool {
        if self.is_out_of_memory() {
            return false;
        }
        let epoch = self.epochs().begin_collection();
        self.snapshot_marks();
        self.stats.major.fetch_add(1, Ordering::Relaxed);

        match Collection::<VM>::new(self, CollectionKind::Major).run() {
            Ok(summary) => info!(
                "collection {} ({:?}): {} objects, mature {} / {} bytes",
                epoch,
                summary.kind,
                summary.objects,
                self.mature().used_bytes(),
                self.mature().size()
            ),
            Err(failure) => {
                warn!("collection {} failed: {}", epoch, failure);
                self.latch_out_of_memory();
            }
        }
        if self.mature().remaining_bytes() < requested_free_space {
            warn!(
                "mature belt has {} bytes free after a major collection, {} needed. Heap is out of memory",
                self.mature().remaining_bytes(),
                requested_free_space
            );
            self.latch_out_of_memory();
        }
        self.publish_regions();
        self.epochs().end_collection();
        !self.is_out_of_memory()
    }

    /// Grow the mature belt by `bytes` into the empty belt above it. Clears the
    /// out-of-memory latch.
    pub fn expand_mature(&self, bytes: usize) -> Result<(), ExpansionError> {
        self.belts.expand(MATURE, bytes)?;
        self.out_of_memory.store(false, Ordering::SeqCst);
        self.publish_regions();
        Ok(())
    }

    /// Called by the collection when it has moved the mature belt's survivors into the
    /// nursery belt.
    pub(super) fn swap_roles(&self) {
        let expandable = self.mature().is_expandable();
        self.mature().set_expandable(false);
        self.belts.swap_belts(NURSERY, MATURE);
        self.mature().set_expandable(expandable);
    }

    fn snapshot_marks(&self) {
        for belt in self.belts.belts() {
            belt.set_allocation_mark_snapshot();
        }
    }

    /// Publish `regions` to observers, next to the belts.
    pub fn register_heap_regions(&self, regions: &[MemoryRegion]) {
        *self.runtime_regions.lock().unwrap() = regions.to_vec();
        self.publish_regions();
    }

    fn publish_regions(&self) {
        let mut regions = self.belt_regions();
        regions.extend(self.runtime_regions.lock().unwrap().iter().cloned());
        self.heap_info.register_heap_regions(&regions);
        self.print_belts();
    }
}
