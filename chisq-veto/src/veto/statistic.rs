//! Per-sample chi-squared reductions.
//!
//! For every sample `j` the statistic compares each bin's correlation,
//! scaled up by the bin count `P`, against the total correlation:
//!
//! ```text
//! single-phase:  chisq[j] = norm * sum_i |P q_i[j] - q[j]|^2
//! two-phase:     d1 = a1 (P qa_i[j] - qa[j]) + b1 (P qb_i[j] - qb[j])
//!                d2 = b2 (P qb_i[j] - qb[j])
//!                chisq[j] = norm * sum_i (|d1|^2 + |d2|^2)
//! ```
//!
//! Samples are independent; with the `parallel` feature they are reduced
//! on the rayon thread pool.

use ndarray::ArrayView2;
use num_traits::{AsPrimitive, Float};
use rustfft::num_complex::Complex;

use crate::kernel::{ConfigError, ExecInvariantViolation, Write1D};
use crate::veto::family::BankFitCoefficients;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Normalization of the statistic: `4 * delta_t / (num_samples * seg_norm)`.
///
/// `delta_t` is the sampling interval and `seg_norm` the template/segment
/// amplitude normalization computed by the matched filter.
pub fn chisq_norm<F>(delta_t: F, num_samples: usize, seg_norm: F) -> Result<F, ConfigError>
where
    F: Float + 'static,
    usize: AsPrimitive<F>,
{
    if num_samples == 0 {
        return Err(ConfigError::InvalidSampleCount { got: num_samples });
    }
    if !delta_t.is_finite() || delta_t <= F::zero() {
        return Err(ConfigError::InvalidArgument {
            arg: "delta_t",
            reason: "sampling interval must be finite and > 0",
        });
    }
    if !seg_norm.is_finite() || seg_norm <= F::zero() {
        return Err(ConfigError::InvalidArgument {
            arg: "seg_norm",
            reason: "segment normalization must be finite and > 0",
        });
    }
    let four = F::one() + F::one() + F::one() + F::one();
    Ok(four * delta_t / (num_samples.as_() * seg_norm))
}

fn check_shape<F>(
    arg: &'static str,
    bins: &ArrayView2<'_, Complex<F>>,
    num_samples: usize,
) -> Result<(), ExecInvariantViolation> {
    if bins.nrows() == 0 {
        return Err(ExecInvariantViolation::NullInput { arg });
    }
    if bins.ncols() != num_samples {
        return Err(ExecInvariantViolation::LengthMismatch {
            arg,
            expected: num_samples,
            got: bins.ncols(),
        });
    }
    Ok(())
}

fn check_norm<F: Float>(norm: F) -> Result<(), ExecInvariantViolation> {
    if !norm.is_finite() || norm < F::zero() {
        return Err(ConfigError::InvalidArgument {
            arg: "norm",
            reason: "normalization must be finite and non-negative",
        }
        .into());
    }
    Ok(())
}

fn check_out(out: &[impl Sized], num_samples: usize) -> Result<(), ExecInvariantViolation> {
    if out.len() != num_samples {
        return Err(ExecInvariantViolation::LengthMismatch {
            arg: "chisq",
            expected: num_samples,
            got: out.len(),
        });
    }
    Ok(())
}

/// Single-phase statistic into a caller-provided buffer of length `total.len()`.
///
/// `bins` holds one row per bin and one column per sample.
pub fn single_phase_into<F, O>(
    total: &[Complex<F>],
    bins: ArrayView2<'_, Complex<F>>,
    norm: F,
    out: &mut O,
) -> Result<(), ExecInvariantViolation>
where
    F: Float + Send + Sync + 'static,
    usize: AsPrimitive<F>,
    O: Write1D<F> + ?Sized,
{
    if total.is_empty() {
        return Err(ExecInvariantViolation::NullInput { arg: "q" });
    }
    check_shape("q_bins", &bins, total.len())?;
    check_norm(norm)?;
    let out = out.write_slice_mut().map_err(ExecInvariantViolation::from)?;
    check_out(out, total.len())?;
    single_phase_impl(total, bins, norm, out);
    Ok(())
}

/// Two-phase statistic into a caller-provided buffer of length `total_a.len()`.
pub fn two_phase_into<F, O>(
    total_a: &[Complex<F>],
    total_b: &[Complex<F>],
    bins_a: ArrayView2<'_, Complex<F>>,
    bins_b: ArrayView2<'_, Complex<F>>,
    coeffs: BankFitCoefficients<F>,
    norm: F,
    out: &mut O,
) -> Result<(), ExecInvariantViolation>
where
    F: Float + Send + Sync + 'static,
    usize: AsPrimitive<F>,
    O: Write1D<F> + ?Sized,
{
    if total_a.is_empty() {
        return Err(ExecInvariantViolation::NullInput { arg: "q" });
    }
    if total_b.is_empty() {
        return Err(ExecInvariantViolation::NullInput { arg: "q_bcv" });
    }
    if total_b.len() != total_a.len() {
        return Err(ExecInvariantViolation::LengthMismatch {
            arg: "q_bcv",
            expected: total_a.len(),
            got: total_b.len(),
        });
    }
    check_shape("q_bins", &bins_a, total_a.len())?;
    check_shape("q_bins_bcv", &bins_b, total_a.len())?;
    if bins_b.nrows() != bins_a.nrows() {
        return Err(ExecInvariantViolation::LengthMismatch {
            arg: "q_bins_bcv",
            expected: bins_a.nrows(),
            got: bins_b.nrows(),
        });
    }
    check_norm(norm)?;
    let out = out.write_slice_mut().map_err(ExecInvariantViolation::from)?;
    check_out(out, total_a.len())?;
    two_phase_impl(total_a, total_b, bins_a, bins_b, coeffs, norm, out);
    Ok(())
}

/// Apply `sample` to every output index, in parallel when enabled.
fn for_each_sample<F, S>(out: &mut [F], sample: S)
where
    F: Send,
    S: Fn(usize) -> F + Send + Sync,
{
    #[cfg(feature = "parallel")]
    out.par_iter_mut()
        .enumerate()
        .for_each(|(j, o)| *o = sample(j));

    #[cfg(not(feature = "parallel"))]
    out.iter_mut()
        .enumerate()
        .for_each(|(j, o)| *o = sample(j));
}

pub(crate) fn single_phase_impl<F>(
    total: &[Complex<F>],
    bins: ArrayView2<'_, Complex<F>>,
    norm: F,
    out: &mut [F],
) where
    F: Float + Send + Sync + 'static,
    usize: AsPrimitive<F>,
{
    let p: F = bins.nrows().as_();
    for_each_sample(out, |j| {
        let q = total[j];
        let sum = bins
            .column(j)
            .iter()
            .fold(F::zero(), |acc, qi| acc + (*qi * p - q).norm_sqr());
        sum * norm
    });
}

pub(crate) fn two_phase_impl<F>(
    total_a: &[Complex<F>],
    total_b: &[Complex<F>],
    bins_a: ArrayView2<'_, Complex<F>>,
    bins_b: ArrayView2<'_, Complex<F>>,
    coeffs: BankFitCoefficients<F>,
    norm: F,
    out: &mut [F],
) where
    F: Float + Send + Sync + 'static,
    usize: AsPrimitive<F>,
{
    let p: F = bins_a.nrows().as_();
    let BankFitCoefficients { a1, b1, b2 } = coeffs;
    for_each_sample(out, |j| {
        let (qa, qb) = (total_a[j], total_b[j]);
        let sum = bins_a
            .column(j)
            .iter()
            .zip(bins_b.column(j).iter())
            .fold(F::zero(), |acc, (qa_i, qb_i)| {
                let delta_a = *qa_i * p - qa;
                let delta_b = *qb_i * p - qb;
                let d1 = delta_a * a1 + delta_b * b1;
                let d2 = delta_b * b2;
                acc + d1.norm_sqr() + d2.norm_sqr()
            });
        sum * norm
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use rand::Rng;

    fn random_complex(rng: &mut impl Rng) -> Complex<f64> {
        Complex::new(rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0))
    }

    fn random_case(p: usize, n: usize) -> (Vec<Complex<f64>>, Array2<Complex<f64>>) {
        let mut rng = rand::thread_rng();
        let total = (0..n).map(|_| random_complex(&mut rng)).collect();
        let bins = Array2::from_shape_fn((p, n), |_| random_complex(&mut rng));
        (total, bins)
    }

    #[test]
    fn statistic_is_non_negative() {
        let (total, bins) = random_case(8, 128);
        let mut out = vec![0.0; 128];
        single_phase_into(&total, bins.view(), 0.3, &mut out).expect("chisq");
        assert!(out.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn evenly_spread_power_gives_zero() {
        let n = 32;
        let p = 4;
        let (total, _) = random_case(p, n);
        let bins = Array2::from_shape_fn((p, n), |(_, j)| total[j] / p as f64);
        let mut out = vec![1.0; n];
        single_phase_into(&total, bins.view(), 2.0, &mut out).expect("chisq");
        out.iter()
            .for_each(|v| assert_relative_eq!(*v, 0.0, epsilon = 1e-12));
    }

    #[test]
    fn linear_in_normalization() {
        let (total, bins) = random_case(4, 64);
        let mut once = vec![0.0; 64];
        let mut twice = vec![0.0; 64];
        single_phase_into(&total, bins.view(), 0.7, &mut once).expect("chisq");
        single_phase_into(&total, bins.view(), 1.4, &mut twice).expect("chisq");
        once.iter()
            .zip(twice.iter())
            .for_each(|(a, b)| assert_relative_eq!(2.0 * a, *b, max_relative = 1e-12));
    }

    #[test]
    fn matches_hand_computed_value() {
        // two bins, one sample: P q_0 - q = 2(1+i) - (1+i) = 1+i, P q_1 - q = -(1+i)
        let total = [Complex::new(1.0, 1.0)];
        let bins = Array2::from_shape_vec(
            (2, 1),
            vec![Complex::new(1.0, 1.0), Complex::new(0.0, 0.0)],
        )
        .expect("shape");
        let mut out = [0.0];
        single_phase_into(&total, bins.view(), 0.5, &mut out).expect("chisq");
        assert_relative_eq!(out[0], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn two_phase_reduces_to_single_phase() {
        let (total, bins) = random_case(4, 64);
        let zeros = vec![Complex::new(0.0, 0.0); 64];
        let zero_bins = Array2::from_elem((4, 64), Complex::new(0.0, 0.0));
        let mut single = vec![0.0; 64];
        let mut two = vec![0.0; 64];
        single_phase_into(&total, bins.view(), 1.3, &mut single).expect("single");
        two_phase_into(
            &total,
            &zeros,
            bins.view(),
            zero_bins.view(),
            BankFitCoefficients {
                a1: 1.0,
                b1: 1.0,
                b2: 0.0,
            },
            1.3,
            &mut two,
        )
        .expect("two-phase");
        single
            .iter()
            .zip(two.iter())
            .for_each(|(a, b)| assert_relative_eq!(*a, *b, max_relative = 1e-12));
    }

    #[test]
    fn two_phase_second_direction_adds_component_b() {
        let n = 16;
        let (total_a, _) = random_case(2, n);
        let bins_a = Array2::from_shape_fn((2, n), |(_, j)| total_a[j] / 2.0);
        let total_b = vec![Complex::new(1.0, 0.0); n];
        let bins_b = Array2::from_shape_fn((2, n), |(i, _)| {
            if i == 0 {
                Complex::new(1.0, 0.0)
            } else {
                Complex::new(0.0, 0.0)
            }
        });
        let mut out = vec![0.0; n];
        two_phase_into(
            &total_a,
            &total_b,
            bins_a.view(),
            bins_b.view(),
            BankFitCoefficients {
                a1: 1.0,
                b1: 0.0,
                b2: 2.0,
            },
            1.0,
            &mut out,
        )
        .expect("two-phase");
        // delta_b is +1 and -1 in the two bins, each weighted by b2 = 2
        out.iter()
            .for_each(|v| assert_relative_eq!(*v, 8.0, epsilon = 1e-12));
    }

    #[test]
    fn rejects_bad_arguments() {
        let (total, bins) = random_case(4, 8);
        let mut short = vec![0.0; 7];
        assert!(matches!(
            single_phase_into(&total, bins.view(), 1.0, &mut short),
            Err(ExecInvariantViolation::LengthMismatch { arg: "chisq", .. })
        ));
        let mut out = vec![0.0; 8];
        assert!(single_phase_into(&total, bins.view(), f64::NAN, &mut out).is_err());
        assert!(matches!(
            single_phase_into(&[], bins.view(), 1.0, &mut out),
            Err(ExecInvariantViolation::NullInput { arg: "q" })
        ));
        let empty = Array2::<Complex<f64>>::from_elem((0, 8), Complex::new(0.0, 0.0));
        assert!(matches!(
            single_phase_into(&total, empty.view(), 1.0, &mut out),
            Err(ExecInvariantViolation::NullInput { arg: "q_bins" })
        ));
    }

    #[test]
    fn chisq_norm_matches_formula() {
        let norm = chisq_norm(1.0f64 / 4096.0, 1 << 20, 2.5).expect("norm");
        assert_relative_eq!(norm, 4.0 / 4096.0 / ((1 << 20) as f64 * 2.5));
        assert!(chisq_norm(0.0f32, 16, 1.0).is_err());
        assert!(chisq_norm(1.0f32, 0, 1.0).is_err());
        assert!(chisq_norm(1.0f32, 16, f32::INFINITY).is_err());
    }
}
