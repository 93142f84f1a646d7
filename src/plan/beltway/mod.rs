//! Beltway: the generational collector over a nursery belt and a mature belt.

pub mod barrier;
pub(super) mod gc_work;
pub(super) mod global;

pub use self::global::BeltwayPlan;
pub use self::global::CollectionStats;

/// The role played by the belt mutators allocate into.
pub const NURSERY: usize = 0;
/// The role played by the belt survivors are promoted into.
pub const MATURE: usize = 1;

/// Describes the role a belt plays.
pub fn role_description(role: usize) -> &'static str {
    match role {
        NURSERY => "Nursery Belt",
        MATURE => "Mature Belt",
        _ => "Belt",
    }
}
