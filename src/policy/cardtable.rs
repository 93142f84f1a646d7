use crate::util::Address;
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU8, Ordering};
use thiserror::Error;

#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CardState {
    Clean = 0,
    Dirty = 1,
}

/// An address that the card table does not cover was used to index it. The heap and the
/// card table disagree about where the heap is, which the collector cannot recover from.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("address {address} is outside the area [{start}, {end}) covered by the card table")]
pub struct CardIndexOutOfRange {
    pub address: Address,
    pub start: Address,
    pub end: Address,
}

/// A byte map over `[covered_start, covered_end)`, one byte per card. A dirty card may hold
/// a slot of a mature object that refers into the nursery; a clean card holds none.
pub struct CardTable {
    covered: Range<Address>,
    log_bytes_in_card: usize,
    table: Box<[AtomicU8]>,
}

impl CardTable {
    pub fn new(covered: Range<Address>, log_bytes_in_card: usize) -> Self {
        debug_assert!(covered.start.is_aligned_to(1 << log_bytes_in_card));
        let bytes_in_card = 1usize << log_bytes_in_card;
        let num_cards = (covered.end - covered.start).div_ceil(bytes_in_card);
        let table = (0..num_cards)
            .map(|_| AtomicU8::new(CardState::Clean as u8))
            .collect();
        CardTable {
            covered,
            log_bytes_in_card,
            table,
        }
    }

    /// The address of the first entry of the table.
    pub fn table_address(&self) -> Address {
        Address::from_ptr(self.table.as_ptr())
    }

    pub fn covered_area(&self) -> Range<Address> {
        self.covered.clone()
    }

    pub fn log_bytes_in_card(&self) -> usize {
        self.log_bytes_in_card
    }

    pub fn bytes_in_card(&self) -> usize {
        1 << self.log_bytes_in_card
    }

    pub fn num_cards(&self) -> usize {
        self.table.len()
    }

    pub fn try_table_entry_index(&self, addr: Address) -> Result<usize, CardIndexOutOfRange> {
        if self.covered.contains(&addr) {
            Ok((addr - self.covered.start) >> self.log_bytes_in_card)
        } else {
            Err(CardIndexOutOfRange {
                address: addr,
                start: self.covered.start,
                end: self.covered.end,
            })
        }
    }

    /// The card holding `addr`. Panics if the table does not cover `addr`.
    pub fn table_entry_index(&self, addr: Address) -> usize {
        match self.try_table_entry_index(addr) {
            Ok(index) => index,
            Err(e) => panic!("{}", e),
        }
    }

    pub fn card_start(&self, index: usize) -> Address {
        debug_assert!(index < self.num_cards());
        self.covered.start + (index << self.log_bytes_in_card)
    }

    /// Dirty a card. Called from the write barrier, concurrently with other mutators doing
    /// the same; a relaxed store is enough because cards are only read with the world stopped.
    pub fn mark_dirty(&self, index: usize) {
        self.table[index].store(CardState::Dirty as u8, Ordering::Relaxed);
    }

    pub fn is_dirty(&self, index: usize) -> bool {
        self.table[index].load(Ordering::Relaxed) == CardState::Dirty as u8
    }

    /// Only while the mutators are stopped.
    pub fn clear_all_cards(&self) {
        for card in self.table.iter() {
            card.store(CardState::Clean as u8, Ordering::Relaxed);
        }
    }

    pub fn dirty_cards_do(&self, mut visitor: impl FnMut(usize)) {
        for (index, card) in self.table.iter().enumerate() {
            if card.load(Ordering::Relaxed) == CardState::Dirty as u8 {
                visitor(index);
            }
        }
    }

    pub fn num_dirty_cards(&self) -> usize {
        let mut count = 0;
        self.dirty_cards_do(|_| count += 1);
        count
    }
}

impl fmt::Display for CardTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "card table @{} = [{}, {}]",
            self.table_address(),
            self.covered.start,
            self.covered.end
        )
    }
}
