//! Per-bin inverse transforms of the matched-filter correlation spectrum.
//!
//! Every bin restricts the spectrum to its index range, zeroes the rest and
//! runs the same pre-planned inverse FFT. The result for bin `i` is the
//! contribution of that frequency band to the correlation at every sample.

use std::sync::Arc;

use ndarray::{Array2, ArrayView1, ArrayView2};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftNum, FftPlanner};

use crate::kernel::{
    try_alloc, validate_bins_and_samples, ConfigError, ExecInvariantViolation, KernelLifecycle,
};
use crate::veto::bins::BinBoundaries;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which frequency indices of the full-length spectrum belong to a bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SpectrumConvention {
    /// Only the bin's own one-sided indices are copied. Matches a complex
    /// filter output whose negative frequencies are zero.
    #[default]
    OneSided,
    /// The bin's indices and their mirrors `N - k` are copied.
    Hermitian,
}

/// Constructor config for [`SubbandTransform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SubbandConfig {
    /// Number of chi-squared bins.
    pub num_bins: usize,
    /// Number of samples in the analysis segment (transform length).
    pub num_samples: usize,
    /// Bin membership convention.
    #[cfg_attr(feature = "serde", serde(default))]
    pub convention: SpectrumConvention,
}

/// Scratch space for [`SubbandTransform`].
///
/// Owned by the caller and lent to every transform call so that two
/// transforms never share hidden state.
pub struct TransformWorkspace<F> {
    spectrum: Vec<Complex<F>>,
    fft_scratch: Vec<Complex<F>>,
}

impl<F: FftNum> TransformWorkspace<F> {
    /// Reserve the per-bin spectrum for `num_samples`; FFT scratch is added
    /// by [`SubbandTransform::reserve_scratch`] once a plan exists.
    pub fn try_new(num_samples: usize) -> Result<Self, ConfigError> {
        if num_samples == 0 {
            return Err(ConfigError::InvalidSampleCount { got: num_samples });
        }
        let zero = Complex::new(F::zero(), F::zero());
        Ok(Self {
            spectrum: try_alloc("qtilde_bin", num_samples, zero)?,
            fft_scratch: Vec::new(),
        })
    }
}

impl<F> core::fmt::Debug for TransformWorkspace<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransformWorkspace")
            .field("spectrum_len", &self.spectrum.len())
            .field("fft_scratch_len", &self.fft_scratch.len())
            .finish()
    }
}

/// Per-bin complex time series in one contiguous `(num_bins, num_samples)` buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct BinSeries<F> {
    data: Array2<Complex<F>>,
}

impl<F: FftNum> BinSeries<F> {
    /// Allocate a zeroed buffer.
    pub fn try_new(num_bins: usize, num_samples: usize) -> Result<Self, ConfigError> {
        validate_bins_and_samples(num_bins, num_samples)?;
        let elements = num_bins
            .checked_mul(num_samples)
            .ok_or(ConfigError::AllocationFailure {
                arg: "bin_series",
                elements: usize::MAX,
            })?;
        let buf = try_alloc("bin_series", elements, Complex::new(F::zero(), F::zero()))?;
        let data = Array2::from_shape_vec((num_bins, num_samples), buf).map_err(|_| {
            ConfigError::InvalidArgument {
                arg: "bin_series",
                reason: "buffer does not match (num_bins, num_samples)",
            }
        })?;
        Ok(Self { data })
    }
}

impl<F> BinSeries<F> {
    /// Number of bins (rows).
    pub fn num_bins(&self) -> usize {
        self.data.nrows()
    }

    /// Number of samples (columns).
    pub fn num_samples(&self) -> usize {
        self.data.ncols()
    }

    /// Time series of one bin.
    ///
    /// # Panics
    /// If `bin >= self.num_bins()`.
    pub fn bin(&self, bin: usize) -> ArrayView1<'_, Complex<F>> {
        self.data.row(bin)
    }

    /// Whole buffer, bin-major.
    pub fn view(&self) -> ArrayView2<'_, Complex<F>> {
        self.data.view()
    }
}

/// Trait-first sub-band inverse transform engine.
///
/// Holds one inverse FFT plan sized to the segment length; the plan is
/// reused for every bin and every call.
#[derive(Clone)]
pub struct SubbandTransform<F: FftNum> {
    num_bins: usize,
    num_samples: usize,
    convention: SpectrumConvention,
    plan: Arc<dyn Fft<F>>,
}

impl<F: FftNum> core::fmt::Debug for SubbandTransform<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SubbandTransform")
            .field("num_bins", &self.num_bins)
            .field("num_samples", &self.num_samples)
            .field("convention", &self.convention)
            .finish_non_exhaustive()
    }
}

impl<F: FftNum> KernelLifecycle for SubbandTransform<F> {
    type Config = SubbandConfig;

    fn try_new(config: Self::Config) -> Result<Self, ConfigError> {
        validate_bins_and_samples(config.num_bins, config.num_samples)?;
        let mut planner = FftPlanner::<F>::new();
        let plan = planner.plan_fft_inverse(config.num_samples);
        Ok(Self {
            num_bins: config.num_bins,
            num_samples: config.num_samples,
            convention: config.convention,
            plan,
        })
    }
}

impl<F: FftNum> SubbandTransform<F> {
    /// Number of bins this engine transforms.
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Transform length.
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Bin membership convention.
    pub fn convention(&self) -> SpectrumConvention {
        self.convention
    }

    /// Allocate scratch space sized for this engine's plan.
    pub fn workspace(&self) -> Result<TransformWorkspace<F>, ConfigError> {
        let mut ws = TransformWorkspace::try_new(self.num_samples)?;
        self.reserve_scratch(&mut ws)?;
        Ok(ws)
    }

    /// Grow the FFT scratch of `ws` to what this engine's plan needs.
    pub fn reserve_scratch(&self, ws: &mut TransformWorkspace<F>) -> Result<(), ConfigError> {
        let scratch_len = self.plan.get_outofplace_scratch_len();
        if ws.fft_scratch.len() < scratch_len {
            let zero = Complex::new(F::zero(), F::zero());
            ws.fft_scratch = try_alloc("fft_scratch", scratch_len, zero)?;
        }
        Ok(())
    }

    fn check_workspace(&self, ws: &TransformWorkspace<F>) -> Result<(), ExecInvariantViolation> {
        if ws.spectrum.len() != self.num_samples {
            return Err(ExecInvariantViolation::LengthMismatch {
                arg: "workspace",
                expected: self.num_samples,
                got: ws.spectrum.len(),
            });
        }
        let scratch_len = self.plan.get_outofplace_scratch_len();
        if ws.fft_scratch.len() < scratch_len {
            return Err(ExecInvariantViolation::LengthMismatch {
                arg: "fft_scratch",
                expected: scratch_len,
                got: ws.fft_scratch.len(),
            });
        }
        Ok(())
    }

    /// Compute every bin's time series from `qtilde` into `out`.
    ///
    /// Only `ws` and `out` are written; nothing is allocated.
    pub fn run_into(
        &self,
        qtilde: &[Complex<F>],
        boundaries: &BinBoundaries,
        ws: &mut TransformWorkspace<F>,
        out: &mut BinSeries<F>,
    ) -> Result<(), ExecInvariantViolation> {
        if qtilde.len() != self.num_samples {
            return Err(ExecInvariantViolation::LengthMismatch {
                arg: "qtilde",
                expected: self.num_samples,
                got: qtilde.len(),
            });
        }
        if boundaries.num_bins() != self.num_bins {
            return Err(ExecInvariantViolation::LengthMismatch {
                arg: "bin_boundaries",
                expected: self.num_bins + 1,
                got: boundaries.edges().len(),
            });
        }
        if boundaries.nyquist() != self.num_samples / 2 {
            return Err(ExecInvariantViolation::LengthMismatch {
                arg: "bin_boundaries",
                expected: self.num_samples / 2,
                got: boundaries.nyquist(),
            });
        }
        if out.num_bins() != self.num_bins || out.num_samples() != self.num_samples {
            return Err(ExecInvariantViolation::LengthMismatch {
                arg: "bin_series",
                expected: self.num_bins * self.num_samples,
                got: out.num_bins() * out.num_samples(),
            });
        }
        self.check_workspace(ws)?;

        let n = self.num_samples;
        let zero = Complex::new(F::zero(), F::zero());
        for (range, mut row) in boundaries.ranges().zip(out.data.outer_iter_mut()) {
            ws.spectrum.fill(zero);
            ws.spectrum[range.clone()].copy_from_slice(&qtilde[range.clone()]);
            if self.convention == SpectrumConvention::Hermitian {
                for k in range.filter(|&k| k > 0 && n - k != k) {
                    ws.spectrum[n - k] = qtilde[n - k];
                }
            }
            let row = row
                .as_slice_mut()
                .ok_or(ConfigError::NonContiguous { arg: "bin_series" })?;
            self.plan
                .process_outofplace_with_scratch(&mut ws.spectrum, row, &mut ws.fft_scratch);
        }
        Ok(())
    }

    /// Inverse transform of the whole spectrum, unbinned.
    ///
    /// Produces the total correlation series consistent with [`Self::run_into`]:
    /// with the same convention, the bin series sum to this output whenever
    /// the spectrum is zero outside the binned range.
    pub fn inverse_into(
        &self,
        qtilde: &[Complex<F>],
        ws: &mut TransformWorkspace<F>,
        out: &mut [Complex<F>],
    ) -> Result<(), ExecInvariantViolation> {
        for (arg, len) in [("qtilde", qtilde.len()), ("q", out.len())] {
            if len != self.num_samples {
                return Err(ExecInvariantViolation::LengthMismatch {
                    arg,
                    expected: self.num_samples,
                    got: len,
                });
            }
        }
        self.check_workspace(ws)?;
        ws.spectrum.copy_from_slice(qtilde);
        self.plan
            .process_outofplace_with_scratch(&mut ws.spectrum, out, &mut ws.fft_scratch);
        Ok(())
    }
}
