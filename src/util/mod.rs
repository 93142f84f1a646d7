/// Address and object reference.
pub mod address;
/// Constants used in Beltway.
pub mod constants;
/// Calculation, conversion and rounding for memory related numbers.
pub mod conversions;
/// Structures published to heap observers.
pub mod heap;
/// Logger initialization.
pub mod logger;
/// Wrapping of OS memory calls.
pub mod memory;
/// Beltway options, read from the environment or set by the runtime.
pub mod options;

#[cfg(test)]
pub mod test_util;

pub use self::address::Address;
pub use self::address::ObjectReference;
