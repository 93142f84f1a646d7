//! The runtime binding. A runtime using Beltway implements [`VMBinding`] and the traits
//! named by its associated types, which is how the collector learns the size of an
//! object and where its reference slots are.

mod object_model;
mod scanning;
mod vmbinding;
pub use self::object_model::ObjectModel;
pub use self::scanning::Scanning;
pub use self::scanning::SlotVisitor;
pub use self::vmbinding::VMBinding;
