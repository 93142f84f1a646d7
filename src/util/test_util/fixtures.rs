//! A minimal runtime for tests.
//!
//! An object is a run of words:
//!
//! ```text
//! | size in bytes | number of references n | ref 0 | ... | ref n-1 | payload ... |
//! ```

use crate::beltway::Beltway;
use crate::plan::{AllocationError, HeapConfig};
use crate::util::constants::BYTES_IN_WORD;
use crate::util::options::Options;
use crate::util::{Address, ObjectReference};
use crate::vm::{ObjectModel, Scanning, SlotVisitor, VMBinding};

/// Words before the reference slots.
pub const HEADER_WORDS: usize = 2;

/// Root table capacity of the test heaps.
pub const TEST_ROOT_TABLE_CAPACITY: usize = 1024;

#[derive(Default)]
pub struct DummyVM;

pub struct DummyObjectModel;

pub struct DummyScanning;

impl VMBinding for DummyVM {
    type VMObjectModel = DummyObjectModel;
    type VMScanning = DummyScanning;
}

impl ObjectModel<DummyVM> for DummyObjectModel {
    fn get_current_size(object: ObjectReference) -> usize {
        unsafe { object.to_raw_address().load::<usize>() }
    }
}

impl Scanning<DummyVM> for DummyScanning {
    fn scan_object<SV: SlotVisitor>(object: ObjectReference, slot_visitor: &mut SV) {
        for i in 0..num_refs(object) {
            slot_visitor.visit_slot(object.to_raw_address() + ref_offset(i));
        }
    }
}

pub fn object_size(refs: usize, payload_words: usize) -> usize {
    (HEADER_WORDS + refs + payload_words) * BYTES_IN_WORD
}

pub fn dummy_config(heap_size: usize, belt_percentages: &[u8]) -> HeapConfig {
    let mut config = HeapConfig::with_heap_size(heap_size, belt_percentages);
    config.root_table_capacity = TEST_ROOT_TABLE_CAPACITY;
    config
}

pub fn dummy_beltway(heap_size: usize, belt_percentages: &[u8]) -> Beltway<DummyVM> {
    dummy_beltway_with_config(dummy_config(heap_size, belt_percentages))
}

pub fn dummy_beltway_with_config(config: HeapConfig) -> Beltway<DummyVM> {
    Beltway::with_config(Options::default(), config).unwrap()
}

/// Allocate an object with `refs` null references. The payload is left as allocated.
pub fn alloc_object(
    beltway: &Beltway<DummyVM>,
    refs: usize,
    payload_words: usize,
) -> Result<ObjectReference, AllocationError> {
    let size = object_size(refs, payload_words);
    let addr = beltway.alloc(size)?;
    unsafe {
        addr.store::<usize>(size);
        (addr + BYTES_IN_WORD).store::<usize>(refs);
        for i in 0..refs {
            (addr + ref_offset(i)).store::<usize>(0);
        }
    }
    Ok(ObjectReference::from_raw_address(addr))
}

pub fn num_refs(object: ObjectReference) -> usize {
    unsafe { (object.to_raw_address() + BYTES_IN_WORD).load::<usize>() }
}

/// Offset of reference slot `i` from the start of the object.
pub fn ref_offset(i: usize) -> usize {
    (HEADER_WORDS + i) * BYTES_IN_WORD
}

pub fn ref_slot(object: ObjectReference, i: usize) -> Address {
    assert!(i < num_refs(object));
    object.to_raw_address() + ref_offset(i)
}

pub fn get_ref(object: ObjectReference, i: usize) -> ObjectReference {
    unsafe { ObjectReference::load_from_slot(ref_slot(object, i)) }
}

/// Store a reference through the write barrier.
pub fn set_ref(
    beltway: &Beltway<DummyVM>,
    object: ObjectReference,
    i: usize,
    target: ObjectReference,
) {
    assert!(i < num_refs(object));
    beltway.object_reference_write(object, ref_offset(i), target);
}

fn payload_slot(object: ObjectReference, i: usize) -> Address {
    let refs = num_refs(object);
    let slot = object.to_raw_address() + ref_offset(refs) + i * BYTES_IN_WORD;
    assert!(slot < object.to_raw_address() + DummyObjectModel::get_current_size(object));
    slot
}

pub fn write_payload(object: ObjectReference, i: usize, value: usize) {
    unsafe { payload_slot(object, i).store::<usize>(value) }
}

pub fn read_payload(object: ObjectReference, i: usize) -> usize {
    unsafe { payload_slot(object, i).load::<usize>() }
}
