//! Frequency-binned chi-squared veto for matched-filter searches.
//!
//! Given the frequency-domain correlation `qtilde` of a data segment with a
//! template and its inverse transform `q`, the veto reports for every time
//! sample how far the correlation departs from the power distribution the
//! template predicts. Large values flag non-stationary noise masquerading
//! as a signal.
//!
//! Kernels follow one contract: configuration is validated once by
//! [`kernel::KernelLifecycle::try_new`], and execution returns
//! [`kernel::ExecInvariantViolation`] for anything wrong with the call.
//! The crate-level [`Error`] wraps both.
//!
//! Optional features:
//! - `parallel`: reduce samples on the rayon thread pool.
//! - `serde`: derive `Serialize`/`Deserialize` for configs and families.

pub mod error;
pub mod kernel;
pub mod veto;

pub use error::{Error, ErrorKind, Result};
