use approx::assert_abs_diff_eq;
use chisq_veto::kernel::KernelLifecycle;
use chisq_veto::veto::{
    BinBoundaries, BinPartitionConfig, BinPartitionKernel, ChisqVeto, ChisqVetoConfig,
    CorrelationInput, SpectrumConvention, SubbandConfig, SubbandTransform, TemplateFamily,
    TemplateParams,
};
use rustfft::num_complex::Complex;

const BINS: usize = 4;
const SAMPLES: usize = 16;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Time series matching `qtilde` under the same transform as the veto.
fn correlation(qtilde: &[Complex<f64>]) -> Vec<Complex<f64>> {
    let engine = SubbandTransform::try_new(SubbandConfig {
        num_bins: BINS,
        num_samples: SAMPLES,
        convention: SpectrumConvention::OneSided,
    })
    .expect("engine");
    let mut ws = engine.workspace().expect("workspace");
    let mut q = vec![Complex::new(0.0, 0.0); SAMPLES];
    engine.inverse_into(qtilde, &mut ws, &mut q).expect("inverse");
    q
}

fn energy(qtilde: &[Complex<f64>]) -> f64 {
    qtilde.iter().map(|c| c.norm_sqr()).sum()
}

fn veto_for(bins: BinBoundaries) -> ChisqVeto<f64> {
    let mut veto = ChisqVeto::new();
    veto.init(ChisqVetoConfig {
        num_bins: BINS,
        num_samples: SAMPLES,
        family: TemplateFamily::SinglePhase,
        convention: SpectrumConvention::OneSided,
    })
    .expect("init");
    veto.load_template(TemplateParams::SinglePhase { bins, norm: 1.0 })
        .expect("template");
    veto
}

fn peak_index(q: &[Complex<f64>]) -> usize {
    q.iter()
        .enumerate()
        .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
        .map(|(j, _)| j)
        .expect("non-empty series")
}

#[test]
fn power_in_one_bin_is_vetoed_against_evenly_spread_power() {
    init_logger();

    // flat expected power gives bins [0, 2, 4, 6, 8]
    let partition = BinPartitionKernel::try_new(BinPartitionConfig {
        num_bins: BINS,
        num_samples: SAMPLES,
        low_index: 0,
    })
    .expect("partition config");
    let bins = partition
        .from_power(&vec![1.0f64; partition.curve_len()])
        .expect("bins");
    assert_eq!(bins.edges(), &[0, 2, 4, 6, 8]);
    let mut veto = veto_for(bins);

    let mut glitch = vec![Complex::new(0.0, 0.0); SAMPLES];
    glitch[4] = Complex::new(1.0, 0.0);
    glitch[5] = Complex::new(1.0, 0.0);
    let mut chirp = vec![Complex::new(0.0, 0.0); SAMPLES];
    for c in chirp.iter_mut().take(SAMPLES / 2) {
        *c = Complex::new(0.5, 0.0);
    }
    assert_abs_diff_eq!(energy(&glitch), energy(&chirp), epsilon = 1e-12);

    let q_glitch = correlation(&glitch);
    let q_chirp = correlation(&chirp);
    let chisq_glitch = veto
        .veto(&CorrelationInput::try_new(&glitch, &q_glitch).expect("input"))
        .expect("veto glitch");
    let chisq_chirp = veto
        .veto(&CorrelationInput::try_new(&chirp, &q_chirp).expect("input"))
        .expect("veto chirp");

    // at the correlation peak every bin of the spread signal contributes q / P
    let j_glitch = peak_index(&q_glitch);
    let j_chirp = peak_index(&q_chirp);
    assert_abs_diff_eq!(chisq_chirp[j_chirp], 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(chisq_glitch[j_glitch], 48.0, epsilon = 1e-9);

    // relative to the squared correlation peak the glitch is still far worse
    let reduced = |chisq: &[f64], q: &[Complex<f64>], j: usize| {
        chisq.iter().copied().fold(0.0, f64::max) / q[j].norm_sqr()
    };
    let glitch_ratio = reduced(&chisq_glitch, &q_glitch, j_glitch);
    let chirp_ratio = reduced(&chisq_chirp, &q_chirp, j_chirp);
    assert!(
        glitch_ratio > 3.0 * chirp_ratio,
        "glitch {glitch_ratio}, chirp {chirp_ratio}"
    );

    veto.finalize().expect("finalize");
}

#[test]
fn hermitian_real_signal_gives_real_finite_statistic() {
    init_logger();
    let mut veto = ChisqVeto::<f64>::new();
    veto.init(ChisqVetoConfig {
        num_bins: BINS,
        num_samples: SAMPLES,
        family: TemplateFamily::SinglePhase,
        convention: SpectrumConvention::Hermitian,
    })
    .expect("init");
    veto.load_template(TemplateParams::SinglePhase {
        bins: BinBoundaries::uniform(BINS, SAMPLES, 1).expect("bins"),
        norm: 0.25,
    })
    .expect("template");

    let mut qtilde = vec![Complex::new(0.0, 0.0); SAMPLES];
    for k in 1..SAMPLES / 2 {
        let c = Complex::new(1.0 / k as f64, 0.5);
        qtilde[k] = c;
        qtilde[SAMPLES - k] = c.conj();
    }
    let q = correlation(&qtilde);
    assert!(q.iter().all(|c| c.im.abs() < 1e-9));

    let chisq = veto
        .veto(&CorrelationInput::try_new(&qtilde, &q).expect("input"))
        .expect("veto");
    assert!(chisq.iter().all(|x| x.is_finite() && *x >= 0.0));
    let series = veto.bin_series().expect("series");
    assert!(series.iter().all(|c| c.im.abs() < 1e-9));
}
