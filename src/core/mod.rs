//! Core types: errors, configuration, tiers and path patterns.

pub mod config;
pub mod errors;
pub mod paths;
pub mod tier;
