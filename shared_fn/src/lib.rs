//! Helpers shared by the engine and the steps
pub mod logging;
pub mod report;
