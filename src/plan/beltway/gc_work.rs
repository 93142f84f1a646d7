use super::global::BeltwayPlan;
use crate::util::memory;
use crate::util::{Address, ObjectReference};
use crate::vm::{ObjectModel, Scanning, VMBinding};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Range;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum CollectionKind {
    /// Promote nursery survivors to the end of the mature belt.
    Minor,
    /// Compact the mature belt, into the nursery belt if it can hold the survivors.
    Major,
    /// Compact both belts into the mature belt.
    FullHeap,
}

#[derive(Debug)]
pub(crate) struct SurvivorsDoNotFit {
    kind: CollectionKind,
    live_bytes: usize,
    available: usize,
}

impl fmt::Display for SurvivorsDoNotFit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:?} collection found {} live bytes, only {} bytes available",
            self.kind, self.live_bytes, self.available
        )
    }
}

pub(crate) struct CollectionSummary {
    pub kind: CollectionKind,
    pub objects: usize,
    pub promoted_bytes: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Destination {
    /// After the objects already in the mature belt.
    AppendToMature,
    /// Into the empty nursery belt, which then becomes the mature belt.
    EvacuateToNursery,
    /// Down to the start of the mature belt.
    SlideInMature,
}

struct Move {
    from: Address,
    to: Address,
    size: usize,
}

/// One collection. Everything reachable in the condemned belts is found first, then given
/// a new address, then every slot referring to it is rewritten, and only then are the
/// objects copied. A collection whose survivors do not fit fails before anything changes.
pub(crate) struct Collection<'a, VM: VMBinding> {
    plan: &'a BeltwayPlan<VM>,
    kind: CollectionKind,
    condemned: Vec<Range<Address>>,
    root_slots: Vec<Address>,
    remembered_slots: Vec<Address>,
    marked: HashSet<ObjectReference>,
    live: Vec<(ObjectReference, usize)>,
    queue: Vec<ObjectReference>,
    forwarding: HashMap<ObjectReference, ObjectReference>,
}

impl<'a, VM: VMBinding> Collection<'a, VM> {
    pub fn new(plan: &'a BeltwayPlan<VM>, kind: CollectionKind) -> Self {
        let nursery = plan.nursery();
        let mature = plan.mature();
        let condemned = match kind {
            CollectionKind::Minor => vec![nursery.start()..nursery.allocation_mark()],
            CollectionKind::Major => vec![mature.start()..mature.allocation_mark()],
            CollectionKind::FullHeap => vec![
                mature.start()..mature.allocation_mark(),
                nursery.start()..nursery.allocation_mark(),
            ],
        };
        Collection {
            plan,
            kind,
            condemned,
            root_slots: vec![],
            remembered_slots: vec![],
            marked: HashSet::new(),
            live: vec![],
            queue: vec![],
            forwarding: HashMap::new(),
        }
    }

    pub fn run(mut self) -> Result<CollectionSummary, SurvivorsDoNotFit> {
        debug!("{:?} collection: condemned {:?}", self.kind, self.condemned);
        self.trace();
        let (destination, moves) = self.assign_addresses()?;
        self.update_slots(&moves);
        let promoted_bytes = self.move_objects(&moves);
        self.finish(destination, &moves);
        #[cfg(feature = "extreme_assertions")]
        self.verify_mature();
        Ok(CollectionSummary {
            kind: self.kind,
            objects: moves.len(),
            promoted_bytes,
        })
    }

    fn is_condemned(&self, object: ObjectReference) -> bool {
        let addr = object.to_raw_address();
        self.condemned.iter().any(|range| range.contains(&addr))
    }

    fn scan_object(object: ObjectReference) -> Vec<Address> {
        let mut slots = vec![];
        VM::VMScanning::scan_object(object, &mut |slot: Address| slots.push(slot));
        slots
    }

    fn trace(&mut self) {
        let mut root_slots = vec![];
        self.plan.roots().slots_do(|slot| root_slots.push(slot));
        VM::VMScanning::scan_vm_roots(&mut |slot: Address| root_slots.push(slot));
        // A slot reported twice would be forwarded twice.
        root_slots.sort();
        root_slots.dedup();
        self.root_slots = root_slots;
        if self.kind == CollectionKind::Minor {
            self.scan_dirty_cards();
        }
        trace!(
            "{} root slots, {} remembered slots",
            self.root_slots.len(),
            self.remembered_slots.len()
        );

        let seeds: Vec<Address> = self
            .root_slots
            .iter()
            .chain(self.remembered_slots.iter())
            .copied()
            .collect();
        for slot in seeds {
            self.trace_slot(slot);
        }
        while let Some(object) = self.queue.pop() {
            for slot in Self::scan_object(object) {
                self.trace_slot(slot);
            }
        }
    }

    fn trace_slot(&mut self, slot: Address) {
        let object = unsafe { ObjectReference::load_from_slot(slot) };
        if object.is_null() || !self.is_condemned(object) {
            return;
        }
        if self.marked.insert(object) {
            let size = VM::VMObjectModel::get_current_size(object);
            self.live.push((object, size));
            self.queue.push(object);
        }
    }

    /// Collect the slots of mature objects that lie on dirty cards.
    fn scan_dirty_cards(&mut self) {
        let card_table = self.plan.card_table();
        let first_objects = self.plan.first_objects();
        let mature = self.plan.mature();
        let used = mature.start()..mature.allocation_mark();
        let mut remembered = vec![];
        card_table.dirty_cards_do(|card| {
            let card_start = card_table.card_start(card);
            let card_end = card_start + card_table.bytes_in_card();
            if card_start >= used.end || card_end <= used.start {
                return;
            }
            let Some(mut cursor) = first_objects.first_object(card) else {
                warn!("dirty card {} at {} has no first object", card, card_start);
                return;
            };
            let limit = card_end.min(used.end);
            while cursor < limit {
                let object = ObjectReference::from_raw_address(cursor);
                let size = VM::VMObjectModel::get_current_size(object);
                assert!(size > 0, "object {} in the mature belt has size 0", object);
                for slot in Self::scan_object(object) {
                    if card_start <= slot && slot < card_end {
                        remembered.push(slot);
                    }
                }
                cursor += size;
            }
        });
        self.remembered_slots = remembered;
    }

    fn assign_addresses(&mut self) -> Result<(Destination, Vec<Move>), SurvivorsDoNotFit> {
        let plan = self.plan;
        let nursery = plan.nursery();
        let mature = plan.mature();
        // Address order, so sliding never overwrites a survivor that has not moved yet.
        // Mature survivors go first when both belts are condemned.
        self.live
            .sort_by_key(|(object, _)| (nursery.contains(object.to_raw_address()), *object));
        let live_bytes: usize = self.live.iter().map(|(_, size)| size).sum();

        let (destination, start, available) = match self.kind {
            CollectionKind::Minor => (
                Destination::AppendToMature,
                mature.allocation_mark(),
                mature.remaining_bytes(),
            ),
            CollectionKind::Major if nursery.is_empty() && live_bytes <= nursery.size() => {
                (Destination::EvacuateToNursery, nursery.start(), nursery.size())
            }
            CollectionKind::Major | CollectionKind::FullHeap => {
                (Destination::SlideInMature, mature.start(), mature.size())
            }
        };
        if live_bytes > available {
            return Err(SurvivorsDoNotFit {
                kind: self.kind,
                live_bytes,
                available,
            });
        }
        debug!(
            "{} live objects, {} bytes, to {:?} at {}",
            self.live.len(),
            live_bytes,
            destination,
            start
        );

        let mut cursor = start;
        let mut moves = Vec::with_capacity(self.live.len());
        for (object, size) in self.live.iter() {
            let to = ObjectReference::from_raw_address(cursor);
            self.forwarding.insert(*object, to);
            moves.push(Move {
                from: object.to_raw_address(),
                to: cursor,
                size: *size,
            });
            cursor += *size;
        }
        Ok((destination, moves))
    }

    fn forward_slot(&self, slot: Address) {
        let object = unsafe { ObjectReference::load_from_slot(slot) };
        if let Some(new) = self.forwarding.get(&object) {
            unsafe { new.store_to_slot(slot) };
        }
    }

    /// Point every slot at the new location of its referent. The slots of survivors are
    /// rewritten in place, before the survivors are copied.
    fn update_slots(&self, moves: &[Move]) {
        for slot in self.root_slots.iter().chain(self.remembered_slots.iter()) {
            self.forward_slot(*slot);
        }
        for m in moves {
            for slot in Self::scan_object(ObjectReference::from_raw_address(m.from)) {
                self.forward_slot(slot);
            }
        }
    }

    /// Returns the number of bytes that moved out of the nursery.
    fn move_objects(&self, moves: &[Move]) -> usize {
        let nursery = self.plan.nursery();
        let mut promoted = 0;
        for m in moves {
            if nursery.contains(m.from) && !nursery.contains(m.to) {
                promoted += m.size;
            }
            if m.from != m.to {
                // Source and destination overlap when sliding.
                unsafe {
                    std::ptr::copy(m.from.to_ptr::<u8>(), m.to.to_mut_ptr::<u8>(), m.size);
                }
            }
        }
        promoted
    }

    fn finish(&self, destination: Destination, moves: &[Move]) {
        let plan = self.plan;
        let nursery = plan.nursery();
        let mature = plan.mature();
        let first_objects = plan.first_objects();
        let end = moves.last().map(|m| m.to + m.size);
        match destination {
            Destination::AppendToMature => {
                if let Some(end) = end {
                    mature.set_allocation_mark(end);
                }
                nursery.reset();
            }
            Destination::EvacuateToNursery => {
                first_objects.clear_range(mature.range());
                nursery.set_allocation_mark(end.unwrap_or(nursery.start()));
                mature.reset();
                plan.swap_roles();
            }
            Destination::SlideInMature => {
                let old_mark = mature.allocation_mark();
                let new_mark = end.unwrap_or(mature.start());
                first_objects.clear_range(mature.range());
                // A full-heap pass may end above the old mark with the nursery survivors.
                if new_mark < old_mark {
                    memory::zero(new_mark, old_mark - new_mark);
                }
                mature.set_allocation_mark(new_mark);
                if self.kind == CollectionKind::FullHeap {
                    nursery.reset();
                }
            }
        }
        // The belts may have swapped roles above.
        for m in moves {
            debug_assert!(plan.mature().contains(m.to));
            first_objects.record(m.to, m.size);
        }
    }

    /// Walk the mature belt and check that every reference in it points into the allocated
    /// part of the mature belt.
    #[cfg(feature = "extreme_assertions")]
    fn verify_mature(&self) {
        let mature = self.plan.mature();
        let mut cursor = mature.start();
        while cursor < mature.allocation_mark() {
            let object = ObjectReference::from_raw_address(cursor);
            for slot in Self::scan_object(object) {
                let target = unsafe { ObjectReference::load_from_slot(slot) };
                assert!(
                    target.is_null() || mature.contains_allocated(target.to_raw_address()),
                    "{} in {} refers to {} outside the mature belt",
                    slot,
                    object,
                    target
                );
            }
            cursor += VM::VMObjectModel::get_current_size(object);
        }
    }
}
