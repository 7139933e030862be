//! Shared trait-first kernel substrate.
//!
//! This module defines the construction/execution error types, the
//! lifecycle contract and the 1D buffer adapters used by the veto kernels.

mod errors;
mod io;
mod lifecycle;

pub use errors::*;
pub use io::*;
pub use lifecycle::*;
