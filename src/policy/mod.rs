//! The memory regions of the heap and the side tables the collector keeps over them.

/// A bump-allocated, contiguous region of the heap.
pub mod belt;
/// Owns the belts and decides which belt plays which role.
pub mod belt_manager;
/// The remembered set between the mature belt and the nursery.
pub mod cardtable;
pub mod first_object_table;
