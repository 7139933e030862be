//! Template families and the per-template parameters each one needs.

use core::fmt;
use core::str::FromStr;

use num_traits::Float;

use crate::kernel::ConfigError;
use crate::veto::bins::BinBoundaries;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Template family a veto workspace is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TemplateFamily {
    /// Stationary-phase templates: one complex correlation per segment.
    SinglePhase,
    /// BCV templates: two correlations combined with bank-fit coefficients.
    TwoPhase,
}

impl TemplateFamily {
    /// Human readable family name.
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateFamily::SinglePhase => "single-phase",
            TemplateFamily::TwoPhase => "two-phase",
        }
    }

    /// Chi-squared degrees of freedom for `num_bins` bins.
    ///
    /// Each bin contributes two real components per correlation, minus the
    /// constraint that the bins add up to the total.
    pub fn degrees_of_freedom(self, num_bins: usize) -> usize {
        match self {
            TemplateFamily::SinglePhase => 2 * num_bins.saturating_sub(1),
            TemplateFamily::TwoPhase => 4 * num_bins.saturating_sub(1),
        }
    }
}

impl fmt::Display for TemplateFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a family tag or waveform approximant name.
///
/// ```
/// use chisq_veto::veto::TemplateFamily;
///
/// assert_eq!("TaylorF2".parse::<TemplateFamily>().unwrap(), TemplateFamily::SinglePhase);
/// assert_eq!("bcv".parse::<TemplateFamily>().unwrap(), TemplateFamily::TwoPhase);
/// assert!("EOB".parse::<TemplateFamily>().is_err());
/// ```
impl FromStr for TemplateFamily {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sp" | "single-phase" | "stationaryphase" | "stationary-phase" | "taylorf2" => {
                Ok(TemplateFamily::SinglePhase)
            }
            "bcv" | "bcvspin" | "two-phase" => Ok(TemplateFamily::TwoPhase),
            _ => Err(ConfigError::UnknownTemplateFamily {
                name: s.to_string(),
            }),
        }
    }
}

/// Bank-fit coefficients combining the two BCV correlation components.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BankFitCoefficients<F> {
    /// Weight of component A in the first orthonormal direction.
    pub a1: F,
    /// Weight of component B in the first orthonormal direction.
    pub b1: F,
    /// Weight of component B in the second orthonormal direction.
    pub b2: F,
}

impl<F: Float> BankFitCoefficients<F> {
    /// Coefficients that reduce the two-phase statistic to the single-phase one.
    pub fn single_phase_equivalent() -> Self {
        Self {
            a1: F::one(),
            b1: F::zero(),
            b2: F::zero(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if [self.a1, self.b1, self.b2].iter().any(|c| !c.is_finite()) {
            return Err(ConfigError::InvalidArgument {
                arg: "bank_fit",
                reason: "bank-fit coefficients must be finite",
            });
        }
        Ok(())
    }
}

/// Everything a veto needs to know about the current template.
///
/// Loaded once per template, reused for every segment filtered with it.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateParams<F> {
    /// Stationary-phase template.
    SinglePhase {
        /// Equal-power bins of the template.
        bins: BinBoundaries,
        /// Statistic normalization, see [`crate::veto::chisq_norm`].
        norm: F,
    },
    /// BCV template.
    TwoPhase {
        /// Bins for component A.
        bins_a: BinBoundaries,
        /// Bins for component B; its expected power differs from A's.
        bins_b: BinBoundaries,
        /// Statistic normalization.
        norm: F,
        /// Bank-fit coefficients.
        coeffs: BankFitCoefficients<F>,
    },
}

impl<F: Float> TemplateParams<F> {
    /// Family these parameters belong to.
    pub fn family(&self) -> TemplateFamily {
        match self {
            TemplateParams::SinglePhase { .. } => TemplateFamily::SinglePhase,
            TemplateParams::TwoPhase { .. } => TemplateFamily::TwoPhase,
        }
    }

    /// Statistic normalization.
    pub fn norm(&self) -> F {
        match self {
            TemplateParams::SinglePhase { norm, .. } | TemplateParams::TwoPhase { norm, .. } => {
                *norm
            }
        }
    }

    /// Check internal consistency for a `(num_bins, num_samples)` workspace.
    pub fn validate(&self, num_bins: usize, num_samples: usize) -> Result<(), ConfigError> {
        let norm = self.norm();
        if !norm.is_finite() || norm < F::zero() {
            return Err(ConfigError::InvalidArgument {
                arg: "norm",
                reason: "normalization must be finite and non-negative",
            });
        }
        let check_bins = |arg: &'static str, bins: &BinBoundaries| {
            if bins.num_bins() != num_bins {
                return Err(ConfigError::LengthMismatch {
                    arg,
                    expected: num_bins + 1,
                    got: bins.edges().len(),
                });
            }
            if bins.nyquist() != num_samples / 2 {
                return Err(ConfigError::InvalidArgument {
                    arg,
                    reason: "last bin boundary must be the workspace's Nyquist index",
                });
            }
            Ok(())
        };
        match self {
            TemplateParams::SinglePhase { bins, .. } => check_bins("bin_boundaries", bins),
            TemplateParams::TwoPhase {
                bins_a,
                bins_b,
                coeffs,
                ..
            } => {
                check_bins("bin_boundaries", bins_a)?;
                check_bins("bin_boundaries_bcv", bins_b)?;
                coeffs.validate()
            }
        }
    }
}
