use crate::util::Address;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

/// For every card of the covered area, the start of the object covering the first byte of
/// the card, if any. Scanning a dirty card starts from that object instead of walking the
/// belt from its start.
///
/// Entries are maintained for objects in the mature belt only: the collector records every
/// object it moves there, and so does mature allocation outside a collection.
pub struct CardFirstObjectTable {
    covered_start: Address,
    log_bytes_in_card: usize,
    table: Box<[AtomicUsize]>,
}

impl CardFirstObjectTable {
    pub fn new(covered: Range<Address>, log_bytes_in_card: usize) -> Self {
        let num_cards = (covered.end - covered.start).div_ceil(1 << log_bytes_in_card);
        CardFirstObjectTable {
            covered_start: covered.start,
            log_bytes_in_card,
            table: (0..num_cards).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    fn index(&self, addr: Address) -> usize {
        (addr - self.covered_start) >> self.log_bytes_in_card
    }

    fn card_start(&self, index: usize) -> Address {
        self.covered_start + (index << self.log_bytes_in_card)
    }

    /// Note an object occupying `[start, start + size)`.
    pub fn record(&self, start: Address, size: usize) {
        debug_assert!(size > 0);
        let mut first = self.index(start);
        if self.card_start(first) < start {
            first += 1;
        }
        let last = self.index(start + size - 1usize);
        for card in first..=last {
            self.table[card].store(start.as_usize(), Ordering::Relaxed);
        }
    }

    /// The object covering the first byte of `card`.
    pub fn first_object(&self, card: usize) -> Option<Address> {
        match self.table[card].load(Ordering::Relaxed) {
            0 => None,
            raw => Some(unsafe { Address::from_usize(raw) }),
        }
    }

    /// Forget the entries of the cards starting in `range`.
    pub fn clear_range(&self, range: Range<Address>) {
        if range.start >= range.end {
            return;
        }
        let first = self.index(range.start.align_up(1 << self.log_bytes_in_card));
        let last = self.index(range.end - 1usize);
        for card in first..=last.min(self.table.len() - 1) {
            self.table[card].store(0, Ordering::Relaxed);
        }
    }
}
