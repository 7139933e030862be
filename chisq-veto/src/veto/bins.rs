//! Equal-power partition of the one-sided frequency axis.

use core::ops::Range;

use itertools::Itertools;
use num_traits::{AsPrimitive, Float};

use crate::kernel::{
    validate_bins_and_samples, ConfigError, ExecInvariantViolation, KernelLifecycle, Read1D,
};
use crate::veto::traits::PartitionBins;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Ascending frequency-index boundaries of the chi-squared bins.
///
/// Bin `i` covers the half-open index range `edges[i]..edges[i + 1]`. The
/// last edge is the Nyquist index `num_samples / 2`, so the Nyquist sample
/// itself lies outside every bin. Edges are strictly increasing, hence no
/// bin is empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinBoundaries {
    edges: Vec<usize>,
}

impl BinBoundaries {
    /// Validate a hand-built boundary set for a segment of `num_samples`.
    pub fn try_from_edges(edges: Vec<usize>, num_samples: usize) -> Result<Self, ConfigError> {
        if num_samples == 0 {
            return Err(ConfigError::InvalidSampleCount { got: num_samples });
        }
        if edges.len() < 2 {
            return Err(ConfigError::InvalidBinCount {
                num_bins: edges.len().saturating_sub(1),
                limit: num_samples,
            });
        }
        validate_bins_and_samples(edges.len() - 1, num_samples)?;
        if !edges.iter().tuple_windows().all(|(a, b)| a < b) {
            return Err(ConfigError::InvalidArgument {
                arg: "edges",
                reason: "bin boundaries must be strictly increasing",
            });
        }
        if edges.last() != Some(&(num_samples / 2)) {
            return Err(ConfigError::InvalidArgument {
                arg: "edges",
                reason: "last bin boundary must be the Nyquist index",
            });
        }
        Ok(Self { edges })
    }

    /// Equal-width bins over `low_index..num_samples / 2`.
    ///
    /// Widths differ by at most one sample.
    pub fn uniform(
        num_bins: usize,
        num_samples: usize,
        low_index: usize,
    ) -> Result<Self, ConfigError> {
        let config = BinPartitionConfig {
            num_bins,
            num_samples,
            low_index,
        };
        let kernel = BinPartitionKernel::try_new(config)?;
        Ok(kernel.uniform_edges())
    }

    /// Number of bins.
    pub fn num_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// All `num_bins + 1` edges.
    pub fn edges(&self) -> &[usize] {
        &self.edges
    }

    /// Index one past the last binned frequency sample.
    pub fn nyquist(&self) -> usize {
        self.edges[self.edges.len() - 1]
    }

    /// Index range covered by `bin`.
    ///
    /// # Panics
    /// If `bin >= self.num_bins()`.
    pub fn range(&self, bin: usize) -> Range<usize> {
        self.edges[bin]..self.edges[bin + 1]
    }

    /// Index ranges of every bin, lowest frequency first.
    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.edges.iter().tuple_windows().map(|(&lo, &hi)| lo..hi)
    }

    /// Width in samples of every bin.
    pub fn widths(&self) -> impl Iterator<Item = usize> + '_ {
        self.ranges().map(|r| r.len())
    }
}

/// Constructor config for [`BinPartitionKernel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BinPartitionConfig {
    /// Number of bins to produce.
    pub num_bins: usize,
    /// Number of time samples in the analysis segment.
    pub num_samples: usize,
    /// First binned frequency index (low-frequency cutoff).
    #[cfg_attr(feature = "serde", serde(default))]
    pub low_index: usize,
}

/// Trait-first greedy equal-power bin partitioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinPartitionKernel {
    num_bins: usize,
    low_index: usize,
    nyquist: usize,
}

impl KernelLifecycle for BinPartitionKernel {
    type Config = BinPartitionConfig;

    fn try_new(config: Self::Config) -> Result<Self, ConfigError> {
        validate_bins_and_samples(config.num_bins, config.num_samples)?;
        let nyquist = config.num_samples / 2;
        if config.low_index >= nyquist {
            return Err(ConfigError::InvalidArgument {
                arg: "low_index",
                reason: "low-frequency cutoff must lie below the Nyquist index",
            });
        }
        let available = nyquist - config.low_index;
        if config.num_bins > available {
            return Err(ConfigError::InvalidBinCount {
                num_bins: config.num_bins,
                limit: available + 1,
            });
        }
        Ok(Self {
            num_bins: config.num_bins,
            low_index: config.low_index,
            nyquist,
        })
    }
}

impl BinPartitionKernel {
    /// Expected length of the power/cumulative curves: `num_samples / 2 + 1`.
    pub fn curve_len(&self) -> usize {
        self.nyquist + 1
    }

    /// Partition from a per-frequency expected power spectrum.
    ///
    /// The spectrum is accumulated and handed to [`PartitionBins::run`].
    pub fn from_power<F, I>(&self, power: &I) -> Result<BinBoundaries, ExecInvariantViolation>
    where
        F: Float + 'static,
        usize: AsPrimitive<F>,
        I: Read1D<F> + ?Sized,
    {
        let power = power.read_slice().map_err(ExecInvariantViolation::from)?;
        self.check_curve_len("power", power.len())?;
        if power.iter().any(|p| !p.is_finite() || *p < F::zero()) {
            return Err(ConfigError::InvalidArgument {
                arg: "power",
                reason: "expected power must be finite and non-negative",
            }
            .into());
        }
        let cumulative = power
            .iter()
            .scan(F::zero(), |acc, &p| {
                *acc = *acc + p;
                Some(*acc)
            })
            .collect::<Vec<_>>();
        PartitionBins::<F>::run(self, &cumulative)
    }

    fn check_curve_len(&self, arg: &'static str, got: usize) -> Result<(), ExecInvariantViolation> {
        if got != self.curve_len() {
            return Err(ExecInvariantViolation::LengthMismatch {
                arg,
                expected: self.curve_len(),
                got,
            });
        }
        Ok(())
    }

    fn uniform_edges(&self) -> BinBoundaries {
        let width = self.nyquist - self.low_index;
        let edges = (0..=self.num_bins)
            .map(|q| self.low_index + q * width / self.num_bins)
            .collect();
        BinBoundaries { edges }
    }

    /// Greedy walk of the cumulative curve emitting at most one edge per
    /// sample, while leaving one sample for each bin still to be closed.
    fn greedy_edges<F>(&self, cumulative: &[F]) -> (BinBoundaries, bool)
    where
        F: Float + 'static,
        usize: AsPrimitive<F>,
    {
        let bins = self.num_bins;
        let base = if self.low_index == 0 {
            F::zero()
        } else {
            cumulative[self.low_index - 1]
        };
        let total = cumulative[self.nyquist - 1] - base;
        let as_f = |n: usize| -> F { n.as_() };
        let target = |q: usize| base + total * as_f(q) / as_f(bins);

        let mut edges = Vec::with_capacity(bins + 1);
        edges.push(self.low_index);
        let mut adjusted = false;
        let mut q = 1;
        for k in self.low_index..self.nyquist {
            if q == bins {
                break;
            }
            if cumulative[k] >= target(q) {
                let ceiling = self.nyquist - (bins - q);
                if k + 1 > ceiling {
                    adjusted = true;
                }
                edges.push((k + 1).min(ceiling));
                q += 1;
                // one crossing per sample; a skipped quantile lands on the next sample
                if q < bins && cumulative[k] >= target(q) {
                    adjusted = true;
                }
            }
        }
        while edges.len() < bins {
            adjusted = true;
            let next = edges[edges.len() - 1] + 1;
            edges.push(next);
        }
        edges.push(self.nyquist);
        (BinBoundaries { edges }, adjusted)
    }
}

impl<F> PartitionBins<F> for BinPartitionKernel
where
    F: Float + 'static,
    usize: AsPrimitive<F>,
{
    fn num_bins(&self) -> usize {
        self.num_bins
    }

    fn run<I>(&self, cumulative: &I) -> Result<BinBoundaries, ExecInvariantViolation>
    where
        I: Read1D<F> + ?Sized,
    {
        let cumulative = cumulative
            .read_slice()
            .map_err(ExecInvariantViolation::from)?;
        if cumulative.is_empty() {
            return Err(ExecInvariantViolation::NullInput { arg: "cumulative" });
        }
        self.check_curve_len("cumulative", cumulative.len())?;
        if cumulative.iter().any(|c| !c.is_finite()) {
            return Err(ConfigError::InvalidArgument {
                arg: "cumulative",
                reason: "cumulative power must be finite",
            }
            .into());
        }
        if !cumulative.iter().tuple_windows().all(|(a, b)| a <= b) {
            return Err(ConfigError::InvalidArgument {
                arg: "cumulative",
                reason: "cumulative power must be non-decreasing",
            }
            .into());
        }

        let base = if self.low_index == 0 {
            F::zero()
        } else {
            cumulative[self.low_index - 1]
        };
        if cumulative[self.nyquist - 1] - base <= F::zero() {
            log::warn!(
                "no expected power in bins {}..{}, falling back to {} uniform bins",
                self.low_index,
                self.nyquist,
                self.num_bins
            );
            return Ok(self.uniform_edges());
        }

        let (boundaries, adjusted) = self.greedy_edges(cumulative);
        if adjusted {
            log::warn!(
                "power too concentrated for {} equal bins, widened to {:?}",
                self.num_bins,
                boundaries.edges()
            );
        }
        Ok(boundaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel(num_bins: usize, num_samples: usize, low_index: usize) -> BinPartitionKernel {
        BinPartitionKernel::try_new(BinPartitionConfig {
            num_bins,
            num_samples,
            low_index,
        })
        .expect("valid partition config")
    }

    fn assert_well_formed(b: &BinBoundaries, num_bins: usize, low: usize, nyquist: usize) {
        assert_eq!(b.num_bins(), num_bins);
        assert_eq!(b.edges()[0], low);
        assert_eq!(b.nyquist(), nyquist);
        assert!(b.edges().iter().tuple_windows().all(|(a, c)| a < c));
    }

    #[test]
    fn uniform_power_gives_equal_widths() {
        for (bins, n) in [(4usize, 16usize), (3, 64), (7, 256), (16, 4096)] {
            let k = kernel(bins, n, 0);
            let power = vec![1.0f64; k.curve_len()];
            let b = k.from_power(&power).expect("partition");
            assert_well_formed(&b, bins, 0, n / 2);
            let (min, max) = b.widths().minmax().into_option().expect("widths");
            assert!(max - min <= 1, "widths {:?}", b.widths().collect_vec());
        }
    }

    #[test]
    fn uniform_power_with_cutoff_starts_at_cutoff() {
        let k = kernel(4, 64, 8);
        let power = vec![2.0f32; k.curve_len()];
        let b = k.from_power(&power).expect("partition");
        assert_well_formed(&b, 4, 8, 32);
        assert_eq!(b.edges(), &[8, 14, 20, 26, 32]);
    }

    #[test]
    fn power_weighted_towards_low_frequencies_narrows_low_bins() {
        let k = kernel(4, 256, 1);
        let power = (0..k.curve_len())
            .map(|i| if i == 0 { 0.0 } else { (i as f64).powf(-7.0 / 3.0) })
            .collect::<Vec<_>>();
        let b = k.from_power(&power).expect("partition");
        assert_well_formed(&b, 4, 1, 128);
        let widths = b.widths().collect_vec();
        assert!(widths[0] < widths[3], "widths {widths:?}");
    }

    #[test]
    fn concentrated_power_never_collapses_a_bin() {
        let k = kernel(4, 32, 0);
        let mut power = vec![0.0f64; k.curve_len()];
        power[3] = 10.0;
        let b = k.from_power(&power).expect("partition");
        assert_well_formed(&b, 4, 0, 16);
        assert!(b.widths().all(|w| w >= 1));
    }

    #[test]
    fn power_at_the_top_leaves_room_for_every_bin() {
        let k = kernel(4, 32, 0);
        let mut power = vec![0.0f64; k.curve_len()];
        power[15] = 1.0;
        let b = k.from_power(&power).expect("partition");
        assert_well_formed(&b, 4, 0, 16);
    }

    #[test]
    fn zero_power_falls_back_to_uniform() {
        let k = kernel(4, 16, 0);
        let b = k.from_power(&vec![0.0f64; k.curve_len()]).expect("partition");
        assert_eq!(b.edges(), &[0, 2, 4, 6, 8]);
    }

    #[test]
    fn rejects_bad_curves() {
        let k = kernel(4, 16, 0);
        let err = PartitionBins::<f64>::run(&k, &[0.0f64; 3][..]).expect_err("short curve");
        assert!(matches!(err, ExecInvariantViolation::LengthMismatch { .. }));

        let mut decreasing = (0..k.curve_len()).map(|i| i as f64).collect::<Vec<_>>();
        decreasing[4] = 0.0;
        assert!(k.run(&decreasing).is_err());

        let empty: [f64; 0] = [];
        let err = k.run(&empty).expect_err("empty curve");
        assert_eq!(err, ExecInvariantViolation::NullInput { arg: "cumulative" });
    }

    #[test]
    fn config_errors_for_invalid_bin_counts() {
        let cfg = |num_bins, num_samples| BinPartitionConfig {
            num_bins,
            num_samples,
            low_index: 0,
        };
        assert!(matches!(
            BinPartitionKernel::try_new(cfg(0, 16)),
            Err(ConfigError::InvalidBinCount { .. })
        ));
        assert!(matches!(
            BinPartitionKernel::try_new(cfg(9, 16)),
            Err(ConfigError::InvalidBinCount { .. })
        ));
        assert!(matches!(
            BinPartitionKernel::try_new(cfg(2, 0)),
            Err(ConfigError::InvalidSampleCount { .. })
        ));
        assert!(BinPartitionKernel::try_new(cfg(8, 16)).is_ok());
    }

    #[test]
    fn hand_built_edges_are_validated() {
        assert!(BinBoundaries::try_from_edges(vec![0, 2, 2, 8], 16).is_err());
        assert!(BinBoundaries::try_from_edges(vec![0, 2, 4, 7], 16).is_err());
        assert!(BinBoundaries::try_from_edges(vec![0], 16).is_err());
        let b = BinBoundaries::try_from_edges(vec![0, 1, 5, 8], 16).expect("valid edges");
        assert_eq!(b.range(1), 1..5);
        assert_eq!(b.widths().collect_vec(), vec![1, 4, 3]);
    }
}
