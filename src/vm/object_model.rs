use crate::util::{Address, ObjectReference};
use crate::vm::VMBinding;

/// VM-specific methods for object model.
///
/// The collector copies objects with a plain byte copy, so an object may not hold
/// pointers into itself. An object reference is the address of the first byte of the
/// object; the default `ref_to_object_start` reflects that and a binding should not
/// need to override it.
pub trait ObjectModel<VM: VMBinding> {
    /// Return the size used by an object, including its header. The size must be a
    /// multiple of `VM::MIN_ALIGNMENT`.
    ///
    /// Arguments:
    /// * `object`: The object to be queried.
    fn get_current_size(object: ObjectReference) -> usize;

    /// Return the lowest address of the storage associated with an object.
    fn ref_to_object_start(object: ObjectReference) -> Address {
        object.to_raw_address()
    }
}
