use crate::policy::belt::Belt;
use crate::util::constants::BYTES_IN_PAGE;
use crate::util::conversions::{page_aligned_share, raw_is_aligned};
use crate::util::Address;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BeltLayoutError {
    #[error("belt percentages {0:?} must be positive and add up to 100")]
    InvalidPercentages(Vec<u8>),
    #[error("a heap of {heap_size} bytes leaves belt {index} without a single page")]
    BeltTooSmall { heap_size: usize, index: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpansionError {
    #[error("the belt playing role {0} is not expandable")]
    NotExpandable(usize),
    #[error("the belt playing role {0} has no neighbour above it")]
    NoNeighbour(usize),
    #[error("belts grow by whole pages, {0} bytes requested")]
    NotPageAligned(usize),
    #[error("the neighbour of the belt playing role {0} still holds objects")]
    NeighbourInUse(usize),
    #[error("the neighbour of the belt playing role {role} has only {available} bytes, {requested} requested")]
    NeighbourTooSmall {
        role: usize,
        requested: usize,
        available: usize,
    },
}

/// Owns the belts of the heap, laid out contiguously in address order, and the mapping
/// from roles to belts. Role `i` starts out played by belt `i`.
pub struct BeltManager {
    belts: Vec<Belt>,
    /// `roles[r]` is the index of the belt currently playing role `r`.
    roles: Vec<AtomicUsize>,
    heap: Range<Address>,
}

impl BeltManager {
    /// Split `[heap_start, heap_start + max_heap_size)` between belts by percentage. Every belt
    /// but the last gets its share rounded down to a page; the last takes the rest.
    pub fn initialize(
        heap_start: Address,
        max_heap_size: usize,
        percentages: &[u8],
    ) -> Result<Self, BeltLayoutError> {
        if percentages.is_empty()
            || percentages.iter().any(|p| *p == 0)
            || percentages.iter().map(|p| *p as u32).sum::<u32>() != 100
        {
            return Err(BeltLayoutError::InvalidPercentages(percentages.to_vec()));
        }
        let heap_end = heap_start + max_heap_size;
        let mut belts = Vec::with_capacity(percentages.len());
        let mut cursor = heap_start;
        for (index, percent) in percentages.iter().enumerate() {
            let size = if index == percentages.len() - 1 {
                heap_end - cursor
            } else {
                page_aligned_share(max_heap_size, *percent)
            };
            if size == 0 {
                return Err(BeltLayoutError::BeltTooSmall {
                    heap_size: max_heap_size,
                    index,
                });
            }
            belts.push(Belt::new(index, cursor, size));
            cursor += size;
        }
        let roles = (0..belts.len()).map(AtomicUsize::new).collect();
        Ok(BeltManager {
            belts,
            roles,
            heap: heap_start..heap_end,
        })
    }

    /// The belt currently playing `role`.
    pub fn belt(&self, role: usize) -> &Belt {
        &self.belts[self.roles[role].load(Ordering::Acquire)]
    }

    /// All belts in address order.
    pub fn belts(&self) -> &[Belt] {
        &self.belts
    }

    pub fn num_belts(&self) -> usize {
        self.belts.len()
    }

    /// The role a belt plays.
    pub fn role_of(&self, belt: &Belt) -> usize {
        self.roles
            .iter()
            .position(|r| r.load(Ordering::Acquire) == belt.index())
            .unwrap_or_else(|| panic!("belt {} plays no role", belt.index()))
    }

    /// Swap the belts playing roles `a` and `b`. No memory moves.
    pub fn swap_belts(&self, a: usize, b: usize) {
        let belt_a = self.roles[a].load(Ordering::Relaxed);
        let belt_b = self.roles[b].load(Ordering::Relaxed);
        self.roles[a].store(belt_b, Ordering::Release);
        self.roles[b].store(belt_a, Ordering::Release);
        debug!(
            "swapped roles {} and {}: now belts {} and {}",
            a, b, belt_b, belt_a
        );
    }

    /// The address range covered by all the belts.
    pub fn application_heap(&self) -> Range<Address> {
        self.heap.clone()
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.heap.contains(&addr)
    }

    pub fn belt_containing(&self, addr: Address) -> Option<&Belt> {
        self.belts.iter().find(|b| b.contains(addr))
    }

    /// Grow the belt playing `role` by `bytes`, a positive number of whole pages, into the
    /// belt directly above it. The neighbour must be empty; it shrinks by the same amount and
    /// keeps at least one page.
    pub fn expand(&self, role: usize, bytes: usize) -> Result<(), ExpansionError> {
        let belt = self.belt(role);
        if !belt.is_expandable() {
            return Err(ExpansionError::NotExpandable(role));
        }
        if bytes == 0 || !raw_is_aligned(bytes, BYTES_IN_PAGE) {
            return Err(ExpansionError::NotPageAligned(bytes));
        }
        let neighbour = self
            .belts
            .get(belt.index() + 1)
            .ok_or(ExpansionError::NoNeighbour(role))?;
        if !neighbour.is_empty() {
            return Err(ExpansionError::NeighbourInUse(role));
        }
        let available = neighbour.size().saturating_sub(BYTES_IN_PAGE);
        if available < bytes {
            return Err(ExpansionError::NeighbourTooSmall {
                role,
                requested: bytes,
                available,
            });
        }
        let boundary = belt.end() + bytes;
        belt.set_bounds(belt.start(), boundary);
        neighbour.set_bounds(boundary, neighbour.end());
        info!(
            "expanded belt {} by {} bytes to [{}, {})",
            belt.index(),
            bytes,
            belt.start(),
            belt.end()
        );
        Ok(())
    }
}
