//! A runtime that holds the collector in the middle of a collection, while another mutator
//! tries to allocate.

use beltway::memory_manager;
use beltway::util::options::Options;
use beltway::util::ObjectReference;
use beltway::vm::{ObjectModel, Scanning, SlotVisitor, VMBinding};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::Duration;

const MARKER: usize = 0xdead_beef;

/// (collector parked, collector released)
static GATE: Mutex<(bool, bool)> = Mutex::new((false, false));
static GATE_CHANGED: Condvar = Condvar::new();

#[derive(Default)]
struct ParkingVM;
struct ParkingObjectModel;
struct ParkingScanning;

impl VMBinding for ParkingVM {
    type VMObjectModel = ParkingObjectModel;
    type VMScanning = ParkingScanning;
}

impl ObjectModel<ParkingVM> for ParkingObjectModel {
    fn get_current_size(object: ObjectReference) -> usize {
        unsafe { object.to_raw_address().load::<usize>() }
    }
}

impl Scanning<ParkingVM> for ParkingScanning {
    fn scan_object<SV: SlotVisitor>(_object: ObjectReference, _slot_visitor: &mut SV) {}

    fn scan_vm_roots<SV: SlotVisitor>(_slot_visitor: &mut SV) {
        let mut gate = GATE.lock().unwrap();
        gate.0 = true;
        GATE_CHANGED.notify_all();
        while !gate.1 {
            gate = GATE_CHANGED.wait(gate).unwrap();
        }
    }
}

#[test]
fn allocation_waits_for_a_collection_in_flight() {
    let mut options = Options::default();
    options.max_heap_size = 1 << 20;
    options.root_table_capacity = 64;
    let beltway = memory_manager::beltway_init::<ParkingVM>(options).unwrap();
    for _ in 0..16 {
        let garbage = memory_manager::alloc(&beltway, 64).unwrap();
        unsafe { garbage.store::<usize>(64) };
    }

    let allocated = AtomicBool::new(false);
    let epoch_after_alloc = AtomicU64::new(u64::MAX);
    thread::scope(|s| {
        let collector = s.spawn(|| beltway.collect_garbage(0));
        {
            let mut gate = GATE.lock().unwrap();
            while !gate.0 {
                gate = GATE_CHANGED.wait(gate).unwrap();
            }
        }
        assert!(beltway.is_collecting());

        let mutator = s.spawn(|| {
            let addr = memory_manager::alloc(&beltway, 32).unwrap();
            epoch_after_alloc.store(memory_manager::current_root_epoch(&beltway), Ordering::SeqCst);
            allocated.store(true, Ordering::SeqCst);
            unsafe {
                addr.store::<usize>(32);
                (addr + 8usize).store::<usize>(MARKER);
            }
            addr
        });

        thread::sleep(Duration::from_millis(100));
        assert!(!allocated.load(Ordering::SeqCst));

        GATE.lock().unwrap().1 = true;
        GATE_CHANGED.notify_all();
        assert!(collector.join().unwrap());
        let addr = mutator.join().unwrap();

        assert_eq!(epoch_after_alloc.load(Ordering::SeqCst), 1);
        let nursery = beltway.plan().nursery();
        assert!(nursery.contains_allocated(addr));
        assert_eq!(nursery.allocation_mark(), addr + 32usize);
        assert_eq!(unsafe { (addr + 8usize).load::<usize>() }, MARKER);
    });
}
