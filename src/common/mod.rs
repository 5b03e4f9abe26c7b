//! Common types, errors and capability traits shared across the crate

pub mod clock;
pub mod errors;
pub mod fill;
pub mod money;
pub mod traits;
pub mod types;
