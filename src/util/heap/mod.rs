pub mod epoch;
pub mod inspection;

pub use self::epoch::EpochRegistry;
pub use self::inspection::InspectableHeapInfo;
pub use self::inspection::MemoryRegion;
pub use self::inspection::RootHandle;
pub use self::inspection::RootTable;
