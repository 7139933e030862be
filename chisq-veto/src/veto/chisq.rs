//! Workspace-owning chi-squared veto handle.

use ndarray::ArrayView2;
use num_traits::{AsPrimitive, Float};
use rustfft::num_complex::Complex;
use rustfft::FftNum;

use crate::error::Result;
use crate::kernel::{
    validate_bins_and_samples, ConfigError, ExecInvariantViolation, Fresh1D, KernelLifecycle,
    LifecycleState, Write1D,
};
use crate::veto::family::{BankFitCoefficients, TemplateFamily, TemplateParams};
use crate::veto::input::CorrelationInput;
use crate::veto::statistic::{single_phase_impl, two_phase_impl};
use crate::veto::subband::{
    BinSeries, SpectrumConvention, SubbandConfig, SubbandTransform, TransformWorkspace,
};
use crate::veto::traits::{SinglePhaseVeto, TwoPhaseVeto};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Workspace sizing for [`ChisqVeto`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChisqVetoConfig {
    /// Number of chi-squared bins `P`, `1 <= P < num_samples`.
    pub num_bins: usize,
    /// Number of samples `N` in every analysed segment.
    pub num_samples: usize,
    /// Template family the workspace serves.
    pub family: TemplateFamily,
    /// Bin membership convention of the correlation spectrum.
    #[cfg_attr(feature = "serde", serde(default))]
    pub convention: SpectrumConvention,
}

struct Workspace<F: FftNum> {
    transform: SubbandTransform<F>,
    scratch: TransformWorkspace<F>,
    series: BinSeries<F>,
    series_bcv: Option<BinSeries<F>>,
}

impl<F: FftNum> Workspace<F> {
    /// Segment-sized buffers are reserved before the FFT is planned.
    fn try_new(config: &ChisqVetoConfig) -> core::result::Result<Self, ConfigError> {
        validate_bins_and_samples(config.num_bins, config.num_samples)?;
        let series = BinSeries::try_new(config.num_bins, config.num_samples)?;
        let series_bcv = match config.family {
            TemplateFamily::SinglePhase => None,
            TemplateFamily::TwoPhase => {
                Some(BinSeries::try_new(config.num_bins, config.num_samples)?)
            }
        };
        let mut scratch = TransformWorkspace::try_new(config.num_samples)?;
        let transform = SubbandTransform::try_new(SubbandConfig {
            num_bins: config.num_bins,
            num_samples: config.num_samples,
            convention: config.convention,
        })?;
        transform.reserve_scratch(&mut scratch)?;
        Ok(Self {
            transform,
            scratch,
            series,
            series_bcv,
        })
    }
}

/// Chi-squared veto over frequency bins of equal expected power.
///
/// The handle owns the inverse FFT plan, the transform scratch and the
/// per-bin series of one template analysis. Call [`ChisqVeto::init`] once,
/// [`ChisqVeto::load_template`] whenever the template changes, one of the
/// veto calls per filtered segment and finally [`ChisqVeto::finalize`].
///
/// ```
/// use chisq_veto::veto::{
///     BinBoundaries, ChisqVeto, ChisqVetoConfig, CorrelationInput, SpectrumConvention,
///     TemplateFamily, TemplateParams,
/// };
/// use rustfft::num_complex::Complex;
///
/// let mut veto = ChisqVeto::<f32>::new();
/// veto.init(ChisqVetoConfig {
///     num_bins: 4,
///     num_samples: 16,
///     family: TemplateFamily::SinglePhase,
///     convention: SpectrumConvention::OneSided,
/// })?;
/// veto.load_template(TemplateParams::SinglePhase {
///     bins: BinBoundaries::uniform(4, 16, 0)?,
///     norm: 1.0,
/// })?;
///
/// let qtilde = vec![Complex::new(0.0f32, 0.0); 16];
/// let q = vec![Complex::new(0.0f32, 0.0); 16];
/// let chisq = veto.veto(&CorrelationInput::try_new(&qtilde, &q)?)?;
/// assert_eq!(chisq.len(), 16);
/// veto.finalize()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct ChisqVeto<F: FftNum> {
    state: LifecycleState,
    config: Option<ChisqVetoConfig>,
    workspace: Option<Workspace<F>>,
    template: Option<TemplateParams<F>>,
}

impl<F: FftNum> core::fmt::Debug for ChisqVeto<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChisqVeto")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("template_loaded", &self.template.is_some())
            .finish_non_exhaustive()
    }
}

impl<F: FftNum> Default for ChisqVeto<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FftNum> KernelLifecycle for ChisqVeto<F> {
    type Config = ChisqVetoConfig;

    fn try_new(config: Self::Config) -> core::result::Result<Self, ConfigError> {
        let workspace = Workspace::try_new(&config)?;
        log::debug!(
            "chisq veto ready: {} bins x {} samples ({})",
            config.num_bins,
            config.num_samples,
            config.family
        );
        Ok(Self {
            state: LifecycleState::Ready,
            config: Some(config),
            workspace: Some(workspace),
            template: None,
        })
    }
}

impl<F: FftNum> ChisqVeto<F> {
    /// Uninitialised handle with no workspace.
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            config: None,
            workspace: None,
            template: None,
        }
    }

    /// Allocate the FFT plan and all workspace buffers.
    ///
    /// On failure the handle stays uninitialised. Initialising a handle that
    /// already owns a workspace is rejected rather than leaking it.
    pub fn init(&mut self, config: ChisqVetoConfig) -> Result<()> {
        match self.state {
            LifecycleState::Uninitialized => {}
            LifecycleState::Ready | LifecycleState::Computing => {
                return Err(ExecInvariantViolation::UnexpectedNonNull { arg: "workspace" }.into())
            }
            LifecycleState::Finalized => {
                return Err(ExecInvariantViolation::InvalidState {
                    state: self.state,
                    reason: "a finalized veto cannot be initialized again",
                }
                .into())
            }
        }
        *self = Self::try_new(config)?;
        Ok(())
    }

    /// Release the FFT plan and every workspace buffer.
    ///
    /// Finalizing twice is an error, not a no-op.
    pub fn finalize(&mut self) -> Result<()> {
        if self.state != LifecycleState::Ready {
            return Err(ExecInvariantViolation::InvalidState {
                state: self.state,
                reason: "only a ready veto can be finalized",
            }
            .into());
        }
        self.workspace = None;
        self.template = None;
        self.state = LifecycleState::Finalized;
        log::debug!("chisq veto finalized");
        Ok(())
    }

    /// Install the bins, normalization and coefficients of a new template.
    pub fn load_template(&mut self, template: TemplateParams<F>) -> Result<()>
    where
        F: Float,
    {
        let config = self.ready_config()?;
        if template.family() != config.family {
            return Err(ExecInvariantViolation::WrongTemplateFamily {
                expected: config.family.as_str(),
                got: template.family().as_str(),
            }
            .into());
        }
        template.validate(config.num_bins, config.num_samples)?;
        log::debug!(
            "chisq veto template loaded ({}), norm {:?}",
            template.family(),
            template.norm()
        );
        self.template = Some(template);
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Workspace sizing, once initialised.
    pub fn config(&self) -> Option<&ChisqVetoConfig> {
        self.config.as_ref()
    }

    /// Number of bins, once initialised.
    pub fn num_bins(&self) -> Option<usize> {
        self.config.map(|c| c.num_bins)
    }

    /// Segment length, once initialised.
    pub fn num_samples(&self) -> Option<usize> {
        self.config.map(|c| c.num_samples)
    }

    /// Template family the workspace serves, once initialised.
    pub fn family(&self) -> Option<TemplateFamily> {
        self.config.map(|c| c.family)
    }

    /// Currently loaded template.
    pub fn template(&self) -> Option<&TemplateParams<F>> {
        self.template.as_ref()
    }

    /// Degrees of freedom of the statistic for the configured family.
    pub fn degrees_of_freedom(&self) -> Option<usize> {
        self.config
            .as_ref()
            .map(|c| c.family.degrees_of_freedom(c.num_bins))
    }

    /// Per-bin series left by the most recent veto call.
    pub fn bin_series(&self) -> Option<ArrayView2<'_, Complex<F>>> {
        self.workspace.as_ref().map(|ws| ws.series.view())
    }

    /// Per-bin series of the second BCV component left by the most recent call.
    pub fn bin_series_bcv(&self) -> Option<ArrayView2<'_, Complex<F>>> {
        self.workspace
            .as_ref()
            .and_then(|ws| ws.series_bcv.as_ref())
            .map(BinSeries::view)
    }

    fn ready_config(&self) -> core::result::Result<ChisqVetoConfig, ExecInvariantViolation> {
        let reason = match self.state {
            LifecycleState::Ready => None,
            LifecycleState::Uninitialized => Some("veto used before init"),
            LifecycleState::Computing => Some("a previous computation did not complete"),
            LifecycleState::Finalized => Some("veto used after finalize"),
        };
        match (reason, self.config) {
            (None, Some(config)) => Ok(config),
            (reason, _) => Err(ExecInvariantViolation::InvalidState {
                state: self.state,
                reason: reason.unwrap_or("workspace is missing"),
            }),
        }
    }

    /// Check state, family and template before any work; returns `num_samples`.
    fn prepare(
        &self,
        family: TemplateFamily,
    ) -> core::result::Result<usize, ExecInvariantViolation> {
        let config = self.ready_config()?;
        if config.family != family {
            return Err(ExecInvariantViolation::WrongTemplateFamily {
                expected: config.family.as_str(),
                got: family.as_str(),
            });
        }
        if self.template.is_none() {
            return Err(ExecInvariantViolation::NullInput {
                arg: "bin_boundaries",
            });
        }
        Ok(config.num_samples)
    }

    /// Abandon a computation that failed before producing output.
    fn abort(&mut self, err: ExecInvariantViolation) -> ExecInvariantViolation {
        self.state = LifecycleState::Ready;
        err
    }
}

fn check_input<F>(
    arg: &'static str,
    input: &CorrelationInput<'_, F>,
    num_samples: usize,
) -> core::result::Result<(), ExecInvariantViolation> {
    if input.len() != num_samples {
        return Err(ExecInvariantViolation::LengthMismatch {
            arg,
            expected: num_samples,
            got: input.len(),
        });
    }
    Ok(())
}

fn check_write_len<F>(
    out: &[F],
    num_samples: usize,
) -> core::result::Result<(), ExecInvariantViolation> {
    if out.len() != num_samples {
        return Err(ExecInvariantViolation::LengthMismatch {
            arg: "chisq",
            expected: num_samples,
            got: out.len(),
        });
    }
    Ok(())
}

impl<F> ChisqVeto<F>
where
    F: FftNum + Float,
    usize: AsPrimitive<F>,
{
    /// Single-phase veto of one segment; fresh output of length `num_samples`.
    pub fn veto(&mut self, input: &CorrelationInput<'_, F>) -> Result<Vec<F>> {
        log::trace!("single-phase veto over {} samples", input.len());
        Ok(SinglePhaseVeto::run_alloc(self, input)?)
    }

    /// Two-phase (BCV) veto of one segment; fresh output of length `num_samples`.
    pub fn veto_bcv(
        &mut self,
        input: &CorrelationInput<'_, F>,
        input_bcv: &CorrelationInput<'_, F>,
    ) -> Result<Vec<F>> {
        log::trace!("two-phase veto over {} samples", input.len());
        Ok(TwoPhaseVeto::run_alloc(self, input, input_bcv)?)
    }

    /// Fill the bin series from `input` and enter the computing state.
    ///
    /// Returns the template normalization. On error the state is unchanged.
    fn transform_single(
        &mut self,
        input: &CorrelationInput<'_, F>,
    ) -> core::result::Result<F, ExecInvariantViolation> {
        let (Some(ws), Some(template)) = (self.workspace.as_mut(), self.template.as_ref()) else {
            return Err(ExecInvariantViolation::NullInput {
                arg: "bin_boundaries",
            });
        };
        let TemplateParams::SinglePhase { bins, norm } = template else {
            return Err(ExecInvariantViolation::WrongTemplateFamily {
                expected: template.family().as_str(),
                got: TemplateFamily::SinglePhase.as_str(),
            });
        };
        let norm = *norm;
        self.state = LifecycleState::Computing;
        let result = ws
            .transform
            .run_into(input.qtilde(), bins, &mut ws.scratch, &mut ws.series);
        if let Err(err) = result {
            return Err(self.abort(err));
        }
        Ok(norm)
    }

    fn reduce_single(&mut self, input: &CorrelationInput<'_, F>, norm: F, out: &mut [F]) {
        if let Some(ws) = self.workspace.as_ref() {
            single_phase_impl(input.q(), ws.series.view(), norm, out);
        }
        self.state = LifecycleState::Ready;
    }

    /// Fill both components' bin series and enter the computing state.
    fn transform_two(
        &mut self,
        input: &CorrelationInput<'_, F>,
        input_bcv: &CorrelationInput<'_, F>,
    ) -> core::result::Result<(F, BankFitCoefficients<F>), ExecInvariantViolation> {
        let (Some(ws), Some(template)) = (self.workspace.as_mut(), self.template.as_ref()) else {
            return Err(ExecInvariantViolation::NullInput {
                arg: "bin_boundaries",
            });
        };
        let TemplateParams::TwoPhase {
            bins_a,
            bins_b,
            norm,
            coeffs,
        } = template
        else {
            return Err(ExecInvariantViolation::WrongTemplateFamily {
                expected: template.family().as_str(),
                got: TemplateFamily::TwoPhase.as_str(),
            });
        };
        let Some(series_bcv) = ws.series_bcv.as_mut() else {
            return Err(ExecInvariantViolation::NullInput { arg: "q_bins_bcv" });
        };
        let params = (*norm, *coeffs);
        self.state = LifecycleState::Computing;
        let result = ws
            .transform
            .run_into(input.qtilde(), bins_a, &mut ws.scratch, &mut ws.series)
            .and_then(|()| {
                ws.transform
                    .run_into(input_bcv.qtilde(), bins_b, &mut ws.scratch, series_bcv)
            });
        if let Err(err) = result {
            return Err(self.abort(err));
        }
        Ok(params)
    }

    fn reduce_two(
        &mut self,
        input: &CorrelationInput<'_, F>,
        input_bcv: &CorrelationInput<'_, F>,
        (norm, coeffs): (F, BankFitCoefficients<F>),
        out: &mut [F],
    ) {
        if let Some(ws) = self.workspace.as_ref() {
            if let Some(series_bcv) = ws.series_bcv.as_ref() {
                two_phase_impl(
                    input.q(),
                    input_bcv.q(),
                    ws.series.view(),
                    series_bcv.view(),
                    coeffs,
                    norm,
                    out,
                );
            }
        }
        self.state = LifecycleState::Ready;
    }
}

impl<F> SinglePhaseVeto<F> for ChisqVeto<F>
where
    F: FftNum + Float,
    usize: AsPrimitive<F>,
{
    fn run_into<O>(
        &mut self,
        input: &CorrelationInput<'_, F>,
        out: &mut O,
    ) -> core::result::Result<(), ExecInvariantViolation>
    where
        O: Fresh1D<F> + ?Sized,
    {
        let n = self.prepare(TemplateFamily::SinglePhase)?;
        check_input("qtilde", input, n)?;
        out.ensure_fresh("chisq")?;
        let norm = self.transform_single(input)?;
        let out = match out.fill_fresh("chisq", n, F::zero()) {
            Ok(out) => out,
            Err(err) => return Err(self.abort(err)),
        };
        self.reduce_single(input, norm, out);
        Ok(())
    }

    fn run_write<O>(
        &mut self,
        input: &CorrelationInput<'_, F>,
        out: &mut O,
    ) -> core::result::Result<(), ExecInvariantViolation>
    where
        O: Write1D<F> + ?Sized,
    {
        let n = self.prepare(TemplateFamily::SinglePhase)?;
        check_input("qtilde", input, n)?;
        let out = out.write_slice_mut().map_err(ExecInvariantViolation::from)?;
        check_write_len(out, n)?;
        let norm = self.transform_single(input)?;
        self.reduce_single(input, norm, out);
        Ok(())
    }

    fn run_alloc(
        &mut self,
        input: &CorrelationInput<'_, F>,
    ) -> core::result::Result<Vec<F>, ExecInvariantViolation> {
        let mut out = Vec::new();
        SinglePhaseVeto::run_into(self, input, &mut out)?;
        Ok(out)
    }
}

impl<F> TwoPhaseVeto<F> for ChisqVeto<F>
where
    F: FftNum + Float,
    usize: AsPrimitive<F>,
{
    fn run_into<O>(
        &mut self,
        input: &CorrelationInput<'_, F>,
        input_bcv: &CorrelationInput<'_, F>,
        out: &mut O,
    ) -> core::result::Result<(), ExecInvariantViolation>
    where
        O: Fresh1D<F> + ?Sized,
    {
        let n = self.prepare(TemplateFamily::TwoPhase)?;
        check_input("qtilde", input, n)?;
        check_input("qtilde_bcv", input_bcv, n)?;
        out.ensure_fresh("chisq")?;
        let params = self.transform_two(input, input_bcv)?;
        let out = match out.fill_fresh("chisq", n, F::zero()) {
            Ok(out) => out,
            Err(err) => return Err(self.abort(err)),
        };
        self.reduce_two(input, input_bcv, params, out);
        Ok(())
    }

    fn run_write<O>(
        &mut self,
        input: &CorrelationInput<'_, F>,
        input_bcv: &CorrelationInput<'_, F>,
        out: &mut O,
    ) -> core::result::Result<(), ExecInvariantViolation>
    where
        O: Write1D<F> + ?Sized,
    {
        let n = self.prepare(TemplateFamily::TwoPhase)?;
        check_input("qtilde", input, n)?;
        check_input("qtilde_bcv", input_bcv, n)?;
        let out = out.write_slice_mut().map_err(ExecInvariantViolation::from)?;
        check_write_len(out, n)?;
        let params = self.transform_two(input, input_bcv)?;
        self.reduce_two(input, input_bcv, params, out);
        Ok(())
    }

    fn run_alloc(
        &mut self,
        input: &CorrelationInput<'_, F>,
        input_bcv: &CorrelationInput<'_, F>,
    ) -> core::result::Result<Vec<F>, ExecInvariantViolation> {
        let mut out = Vec::new();
        TwoPhaseVeto::run_into(self, input, input_bcv, &mut out)?;
        Ok(out)
    }
}
