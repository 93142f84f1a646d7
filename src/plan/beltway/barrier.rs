//! The generational write barrier.

use super::global::BeltwayPlan;
use crate::util::{Address, ObjectReference};
use crate::vm::VMBinding;

/// A barrier wraps the reference stores of the mutator.
pub trait Barrier {
    /// Store `target` into `slot`, a field of `src`, and record whatever the collector
    /// needs to know about the store.
    fn object_reference_write(&self, src: ObjectReference, slot: Address, target: ObjectReference);
}

/// Card marking barrier. A store of a nursery reference into a mature object dirties the
/// card holding the slot, so the next minor collection finds the slot without scanning
/// the whole mature belt. It never blocks and never fails.
pub struct CardMarkingBarrier<'a, VM: VMBinding> {
    plan: &'a BeltwayPlan<VM>,
}

impl<'a, VM: VMBinding> CardMarkingBarrier<'a, VM> {
    pub fn new(plan: &'a BeltwayPlan<VM>) -> Self {
        CardMarkingBarrier { plan }
    }

    /// The part of the barrier that runs after the store.
    pub fn object_reference_write_post(
        &self,
        _src: ObjectReference,
        slot: Address,
        target: ObjectReference,
    ) {
        if target.is_null() {
            return;
        }
        if self.plan.mature().contains(slot)
            && self.plan.nursery().contains(target.to_raw_address())
        {
            let card_table = self.plan.card_table();
            card_table.mark_dirty(card_table.table_entry_index(slot));
        }
    }
}

impl<VM: VMBinding> Barrier for CardMarkingBarrier<'_, VM> {
    fn object_reference_write(&self, src: ObjectReference, slot: Address, target: ObjectReference) {
        unsafe { target.store_to_slot(slot) };
        self.object_reference_write_post(src, slot, target);
    }
}
