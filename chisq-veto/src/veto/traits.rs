//! Trait interfaces for the veto capabilities.

use crate::kernel::{ExecInvariantViolation, Fresh1D, Read1D, Write1D};
use crate::veto::bins::BinBoundaries;
use crate::veto::input::CorrelationInput;

/// Equal-power bin partitioning capability.
pub trait PartitionBins<F> {
    /// Number of bins produced.
    fn num_bins(&self) -> usize;

    /// Partition a non-decreasing cumulative expected-power curve.
    fn run<I>(&self, cumulative: &I) -> Result<BinBoundaries, ExecInvariantViolation>
    where
        I: Read1D<F> + ?Sized;
}

/// Chi-squared veto for single-phase templates.
pub trait SinglePhaseVeto<F> {
    /// Compute into an empty container the call populates.
    fn run_into<O>(
        &mut self,
        input: &CorrelationInput<'_, F>,
        out: &mut O,
    ) -> Result<(), ExecInvariantViolation>
    where
        O: Fresh1D<F> + ?Sized;

    /// Compute into a caller-provided buffer of exactly `num_samples` values.
    fn run_write<O>(
        &mut self,
        input: &CorrelationInput<'_, F>,
        out: &mut O,
    ) -> Result<(), ExecInvariantViolation>
    where
        O: Write1D<F> + ?Sized;

    /// Compute and allocate output.
    fn run_alloc(&mut self, input: &CorrelationInput<'_, F>)
        -> Result<Vec<F>, ExecInvariantViolation>;
}

/// Chi-squared veto for two-phase (BCV) templates.
pub trait TwoPhaseVeto<F> {
    /// Compute into an empty container the call populates.
    fn run_into<O>(
        &mut self,
        input: &CorrelationInput<'_, F>,
        input_bcv: &CorrelationInput<'_, F>,
        out: &mut O,
    ) -> Result<(), ExecInvariantViolation>
    where
        O: Fresh1D<F> + ?Sized;

    /// Compute into a caller-provided buffer of exactly `num_samples` values.
    fn run_write<O>(
        &mut self,
        input: &CorrelationInput<'_, F>,
        input_bcv: &CorrelationInput<'_, F>,
        out: &mut O,
    ) -> Result<(), ExecInvariantViolation>
    where
        O: Write1D<F> + ?Sized;

    /// Compute and allocate output.
    fn run_alloc(
        &mut self,
        input: &CorrelationInput<'_, F>,
        input_bcv: &CorrelationInput<'_, F>,
    ) -> Result<Vec<F>, ExecInvariantViolation>;
}
