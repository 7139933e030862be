use rustfft::num_complex::Complex;

use crate::kernel::{ConfigError, Read1D};

/// Borrowed matched-filter output for one segment.
///
/// `qtilde` is the frequency-domain correlation and `q` its inverse
/// transform, both `num_samples` long. The veto reads them and never keeps
/// them past the call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationInput<'a, F> {
    qtilde: &'a [Complex<F>],
    q: &'a [Complex<F>],
}

impl<'a, F> CorrelationInput<'a, F> {
    /// Bind a correlation spectrum and its time series.
    pub fn try_new<I1, I2>(qtilde: &'a I1, q: &'a I2) -> Result<Self, ConfigError>
    where
        I1: Read1D<Complex<F>> + ?Sized,
        I2: Read1D<Complex<F>> + ?Sized,
    {
        let qtilde = qtilde.read_slice()?;
        let q = q.read_slice()?;
        if qtilde.is_empty() {
            return Err(ConfigError::EmptyInput { arg: "qtilde" });
        }
        if q.is_empty() {
            return Err(ConfigError::EmptyInput { arg: "q" });
        }
        if q.len() != qtilde.len() {
            return Err(ConfigError::LengthMismatch {
                arg: "q",
                expected: qtilde.len(),
                got: q.len(),
            });
        }
        Ok(Self { qtilde, q })
    }

    /// Frequency-domain correlation.
    pub fn qtilde(&self) -> &'a [Complex<F>] {
        self.qtilde
    }

    /// Time-domain correlation (raw SNR series).
    pub fn q(&self) -> &'a [Complex<F>] {
        self.q
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.q.len()
    }

    /// Always false for a bound input.
    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }
}
