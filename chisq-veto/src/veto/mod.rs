//! Chi-squared veto over frequency bins of equal expected power.
//!
//! A matched filter correlates a segment against a template and produces a
//! complex signal-to-noise series. A true signal spreads its power across
//! frequency the way the template does; a glitch usually does not. The
//! kernels here split the template's frequency band into bins that each
//! carry an equal share of its expected power, transform each bin of the
//! correlation back to the time domain, and measure how unevenly the
//! correlation is spread across bins at every sample.
//!
//! The building blocks can be used one at a time:
//!
//! - [`BinPartitionKernel`] turns a cumulative expected-power curve into
//!   [`BinBoundaries`].
//! - [`SubbandTransform`] computes the per-bin time series into a
//!   [`BinSeries`].
//! - [`single_phase_into`] and [`two_phase_into`] reduce bin series to the
//!   statistic.
//!
//! [`ChisqVeto`] owns all of the above for one template family and exposes
//! the init/veto/finalize lifecycle.

mod bins;
mod chisq;
mod family;
mod input;
mod statistic;
mod subband;
mod traits;

pub use bins::{BinBoundaries, BinPartitionConfig, BinPartitionKernel};
pub use chisq::{ChisqVeto, ChisqVetoConfig};
pub use family::{BankFitCoefficients, TemplateFamily, TemplateParams};
pub use input::CorrelationInput;
pub use statistic::{chisq_norm, single_phase_into, two_phase_into};
pub use subband::{
    BinSeries, SpectrumConvention, SubbandConfig, SubbandTransform, TransformWorkspace,
};
pub use traits::{PartitionBins, SinglePhaseVeto, TwoPhaseVeto};
