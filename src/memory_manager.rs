//! Runtime-to-Beltway interface: safe Rust APIs.
//!
//! A runtime binding is expected to wrap these functions and, if its mutators are not
//! written in Rust, expose them to native code, taking care of the unsafety that comes
//! with that.
//!
//! Every function takes the [`Beltway`] instance it operates on. There is no global
//! instance; a binding that wants one should store the instance returned by
//! [`beltway_init`] in a static of its own.

use crate::beltway::Beltway;
use crate::plan::{AllocationError, HeapInitError};
use crate::policy::belt_manager::ExpansionError;
use crate::util::heap::{MemoryRegion, RootHandle};
use crate::util::options::Options;
use crate::util::{Address, ObjectReference};
use crate::vm::VMBinding;

/// Create a Beltway instance with the given options. Reserves the heap and starts the
/// collector thread.
///
/// This attempts to initialize a logger. A runtime that has its own logger should install
/// it before calling this function.
///
/// Arguments:
/// * `options`: The options of the instance, usually `Options::default()`, which reads the
///   `BELTWAY_` environment variables.
pub fn beltway_init<VM: VMBinding>(options: Options) -> Result<Box<Beltway<VM>>, HeapInitError> {
    match crate::util::logger::try_init() {
        Ok(_) => debug!("Beltway initialized the logger."),
        Err(_) => debug!(
            "Beltway failed to initialize the logger. Possibly a logger has been initialized by user."
        ),
    }
    let beltway = Beltway::new(options)?;
    info!(
        "Initialized Beltway: heap {} bytes, belts {}",
        beltway.options().max_heap_size,
        beltway.options().belt_percentages
    );
    #[cfg(feature = "extreme_assertions")]
    warn!("The feature 'extreme_assertions' is enabled. Beltway will verify the mature belt after every collection. Slow performance should be expected.");
    Ok(Box::new(beltway))
}

/// Allocate memory for an object. The memory is zeroed. This may run a collection, and
/// objects referenced only from the caller's stack move unless they are rooted.
///
/// Arguments:
/// * `beltway`: A reference to a Beltway instance.
/// * `size`: The number of bytes required for the object.
pub fn alloc<VM: VMBinding>(
    beltway: &Beltway<VM>,
    size: usize,
) -> Result<Address, AllocationError> {
    beltway.alloc(size)
}

/// Store a reference into a field of an object, through the write barrier. A runtime must
/// use this (or an equivalent inlined barrier) for every reference store into a heap object.
///
/// Arguments:
/// * `beltway`: A reference to a Beltway instance.
/// * `src`: The object being modified.
/// * `offset`: The offset of the field from the start of `src`.
/// * `target`: The reference to store, possibly null.
pub fn object_reference_write<VM: VMBinding>(
    beltway: &Beltway<VM>,
    src: ObjectReference,
    offset: usize,
    target: ObjectReference,
) {
    beltway.object_reference_write(src, offset, target)
}

/// Trigger a collection as requested by the user (e.g. `System.gc()`). Returns whether the
/// nursery is empty afterwards.
///
/// Arguments:
/// * `beltway`: A reference to a Beltway instance.
pub fn handle_user_collection_request<VM: VMBinding>(beltway: &Beltway<VM>) -> bool {
    beltway.collect_garbage(0) && beltway.plan().nursery().is_empty()
}

/// Is the heap out of memory? When it is, no collection runs until
/// [`expand_mature`] succeeds.
pub fn is_out_of_memory<VM: VMBinding>(beltway: &Beltway<VM>) -> bool {
    beltway.is_out_of_memory()
}

/// Grow the mature belt into the empty belt above it and clear the out-of-memory state.
///
/// Arguments:
/// * `beltway`: A reference to a Beltway instance.
/// * `bytes`: The number of bytes to add to the mature belt.
pub fn expand_mature<VM: VMBinding>(
    beltway: &Beltway<VM>,
    bytes: usize,
) -> Result<(), ExpansionError> {
    beltway.expand_mature(bytes)
}

/// Add an object to the root table. The collector keeps it alive and updates the entry
/// when it moves. Returns `None` if the table is full.
pub fn add_root<VM: VMBinding>(
    beltway: &Beltway<VM>,
    object: ObjectReference,
) -> Option<RootHandle> {
    beltway.add_root(object)
}

/// The current address of a rooted object.
pub fn get_root<VM: VMBinding>(beltway: &Beltway<VM>, handle: RootHandle) -> ObjectReference {
    beltway.get_root(handle)
}

/// Remove an entry from the root table.
pub fn remove_root<VM: VMBinding>(beltway: &Beltway<VM>, handle: RootHandle) {
    beltway.remove_root(handle)
}

/// The epoch of the last finished collection. An observer that read this value before and
/// after reading the heap, and saw the same value and no collection in progress, saw a
/// consistent heap.
pub fn current_root_epoch<VM: VMBinding>(beltway: &Beltway<VM>) -> u64 {
    beltway.current_root_epoch()
}

/// Publish the regions of the runtime (code, boot image, ...) to observers, after the
/// belts. Replaces regions registered earlier.
pub fn register_heap_regions<VM: VMBinding>(beltway: &Beltway<VM>, regions: &[MemoryRegion]) {
    beltway.register_heap_regions(regions)
}

/// The address an observer reads the heap description from.
/// See [`InspectableHeapInfo`](crate::util::heap::InspectableHeapInfo) for its layout.
pub fn heap_info_address<VM: VMBinding>(beltway: &Beltway<VM>) -> Address {
    beltway.heap_info_address()
}
