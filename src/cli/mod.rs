//! Operator-facing pieces shared by the library and the binary: prompts and
//! report formatting.

pub mod prompt;
pub mod report;
