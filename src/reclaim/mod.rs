//! Reclamation engine: task matrix, removal primitive, large-file scan and
//! the run orchestrator.

pub mod defaults;
pub mod large_files;
pub mod matrix;
pub mod orchestrator;
pub mod removal;
