//! Run logging: the per-run session recorder and the `RunLog` sink trait.

pub mod session;
