use crate::util::{Address, ObjectReference};
use crate::vm::VMBinding;

/// Callback trait of scanning functions that report reference slots. A slot is the
/// address of a word holding an `ObjectReference` (null for an empty slot).
pub trait SlotVisitor {
    /// Call this function for each slot.
    fn visit_slot(&mut self, slot: Address);
}

/// This lets us use closures as SlotVisitor.
impl<F: FnMut(Address)> SlotVisitor for F {
    fn visit_slot(&mut self, slot: Address) {
        self(slot)
    }
}

/// VM-specific methods for scanning roots/objects.
pub trait Scanning<VM: VMBinding> {
    /// Delegated scanning of an object, visiting each reference slot found.
    ///
    /// Arguments:
    /// * `object`: The object to be scanned.
    /// * `slot_visitor`: Called back for each slot.
    fn scan_object<SV: SlotVisitor>(object: ObjectReference, slot_visitor: &mut SV);

    /// Report the roots the runtime holds outside the root table, such as thread stacks
    /// and globals. The collector rewrites these slots when it moves their referents.
    /// The mutators are stopped while this is called.
    fn scan_vm_roots<SV: SlotVisitor>(_slot_visitor: &mut SV) {}
}
