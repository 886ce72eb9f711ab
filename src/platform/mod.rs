//! Platform abstraction layer: the `Platform` trait, its live implementation,
//! service control and external process execution.

pub mod pal;
pub mod process;
pub mod service;
pub mod system;
