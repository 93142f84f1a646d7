//! The dedicated threads Beltway runs work on.

pub mod controller;

pub use controller::SingleThreadExecutor;
