//! The trait every step crate implements
pub mod step_traits;
