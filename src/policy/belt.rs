use crate::util::memory;
use crate::util::Address;
use atomic::{Atomic, Ordering};
use std::ops::Range;
use std::sync::atomic::AtomicBool;

/// A belt: a contiguous region of the heap allocated by bumping an allocation mark.
///
/// Objects live in `[start, mark)`, `[mark, end)` is free. The mark only moves forward
/// between collections; a collection that empties the belt resets it to `start`.
/// Which role a belt plays (nursery or mature) is decided by the
/// [`BeltManager`](crate::policy::belt_manager::BeltManager), and can change without
/// the belt's memory moving.
pub struct Belt {
    index: usize,
    start: Atomic<Address>,
    end: Atomic<Address>,
    mark: Atomic<Address>,
    /// The mark as of the start of the last collection.
    prev_mark: Atomic<Address>,
    expandable: AtomicBool,
}

impl Belt {
    pub fn new(index: usize, start: Address, size: usize) -> Self {
        Belt {
            index,
            start: Atomic::new(start),
            end: Atomic::new(start + size),
            mark: Atomic::new(start),
            prev_mark: Atomic::new(start),
            expandable: AtomicBool::new(false),
        }
    }

    /// The position of this belt in address order.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn start(&self) -> Address {
        self.start.load(Ordering::Relaxed)
    }

    pub fn end(&self) -> Address {
        self.end.load(Ordering::Relaxed)
    }

    pub fn size(&self) -> usize {
        self.end() - self.start()
    }

    pub fn range(&self) -> Range<Address> {
        self.start()..self.end()
    }

    pub fn allocation_mark(&self) -> Address {
        self.mark.load(Ordering::Acquire)
    }

    /// Is `addr` within the bounds of this belt, allocated or not?
    pub fn contains(&self, addr: Address) -> bool {
        self.start() <= addr && addr < self.end()
    }

    /// Is `addr` within the allocated part of this belt?
    pub fn contains_allocated(&self, addr: Address) -> bool {
        self.start() <= addr && addr < self.allocation_mark()
    }

    pub fn used_bytes(&self) -> usize {
        self.allocation_mark() - self.start()
    }

    pub fn remaining_bytes(&self) -> usize {
        self.end() - self.allocation_mark()
    }

    pub fn is_empty(&self) -> bool {
        self.allocation_mark() == self.start()
    }

    pub fn is_expandable(&self) -> bool {
        self.expandable.load(Ordering::Relaxed)
    }

    pub fn set_expandable(&self, expandable: bool) {
        self.expandable.store(expandable, Ordering::Relaxed)
    }

    /// Mutator allocation. Bumps the mark with a CAS, retrying when another thread moved it
    /// first. Returns `None` if the request does not fit in what is left of the belt.
    pub fn allocate(&self, size: usize) -> Option<Address> {
        let end = self.end();
        let mut old = self.mark.load(Ordering::Relaxed);
        loop {
            let new = old + size;
            if new > end {
                trace!(
                    "belt {} cannot fit {} bytes: mark {} end {}",
                    self.index,
                    size,
                    old,
                    end
                );
                return None;
            }
            match self
                .mark
                .compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return Some(old),
                Err(current) => old = current,
            }
        }
    }

    /// Collector allocation. Only the collector thread calls this, while the mutators are
    /// stopped, so a plain load and store of the mark is enough.
    pub fn gc_allocate(&self, size: usize) -> Option<Address> {
        let old = self.mark.load(Ordering::Relaxed);
        let new = old + size;
        if new > self.end() {
            return None;
        }
        self.mark.store(new, Ordering::Release);
        Some(old)
    }

    /// Move the mark. The collector uses this after compacting or filling the belt.
    pub fn set_allocation_mark(&self, mark: Address) {
        debug_assert!(
            self.start() <= mark && mark <= self.end(),
            "mark {} outside belt {} [{}, {})",
            mark,
            self.index,
            self.start(),
            self.end()
        );
        self.mark.store(mark, Ordering::Release);
    }

    pub fn set_allocation_mark_snapshot(&self) {
        self.prev_mark
            .store(self.allocation_mark(), Ordering::Relaxed);
    }

    pub fn allocation_mark_snapshot(&self) -> Address {
        self.prev_mark.load(Ordering::Relaxed)
    }

    /// Forget everything allocated in the belt, zeroing the used bytes so the next round of
    /// allocation starts from zeroed memory.
    pub fn reset(&self) {
        let start = self.start();
        memory::zero(start, self.allocation_mark() - start);
        self.mark.store(start, Ordering::Release);
        self.prev_mark.store(start, Ordering::Relaxed);
    }

    /// Move the bounds of this belt. Only the belt manager does this, while the mutators are
    /// stopped and only for an empty range of address space.
    pub(crate) fn set_bounds(&self, start: Address, end: Address) {
        debug_assert!(start <= end);
        let mark = self.allocation_mark();
        self.start.store(start, Ordering::Relaxed);
        self.end.store(end, Ordering::Relaxed);
        if mark < start {
            self.mark.store(start, Ordering::Release);
            self.prev_mark.store(start, Ordering::Relaxed);
        }
    }

    pub fn print_info(&self, description: &str) {
        debug!(
            "{} (belt {}): [{}, {}) mark {} used {} remaining {}{}",
            description,
            self.index,
            self.start(),
            self.end(),
            self.allocation_mark(),
            self.used_bytes(),
            self.remaining_bytes(),
            if self.is_expandable() {
                " expandable"
            } else {
                ""
            }
        );
    }
}
