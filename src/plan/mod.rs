//! The collector. Beltway has exactly one plan: a generational collector over two belts,
//! a nursery that mutators allocate into and a mature belt that survivors are promoted to.

pub mod beltway;
mod global;

pub use self::beltway::barrier::{Barrier, CardMarkingBarrier};
pub use self::beltway::{BeltwayPlan, CollectionStats, MATURE, NURSERY};
pub use self::global::{AllocationError, HeapConfig, HeapInitError};
