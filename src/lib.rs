//! Beltway is a generational, belt-organized garbage collector, and the tooling that lets
//! another process inspect its heap consistently while it runs.
//!
//! The heap is split into two belts. Mutators allocate into the nursery belt; a minor
//! collection promotes its survivors into the mature belt, remembering mature-to-nursery
//! references in a card table. When the mature belt fills half the heap, a major
//! collection compacts it, into the nursery belt when the survivors fit there, after which
//! the two belts swap roles.
//!
//! Each collection bumps an epoch before any object moves and publishes it as the root
//! epoch once every root has been updated. The [`tele`] module reads a heap from outside,
//! through a [`RemotePageCache`](tele::RemotePageCache) that refreshes a cached page only
//! when its source has advanced past the epoch the page was read at.
//!
//! A runtime implements [`vm::VMBinding`] to describe its objects, creates a [`Beltway`]
//! instance, and calls the functions in [`memory_manager`].

#[macro_use]
extern crate log;
#[cfg(test)]
#[macro_use]
extern crate lazy_static;

mod beltway;
pub use crate::beltway::Beltway;

pub mod memory_manager;
pub mod plan;
pub mod policy;
pub mod scheduler;
pub mod tele;
pub mod util;
pub mod vm;
