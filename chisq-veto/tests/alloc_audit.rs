//! Heap audit of the veto lifecycle.
//!
//! A counting global allocator records allocations made on the auditing
//! thread only, so concurrently running tests do not disturb each other.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

use chisq_veto::kernel::KernelLifecycle;
use chisq_veto::veto::{
    BinBoundaries, BinSeries, ChisqVeto, ChisqVetoConfig, CorrelationInput, SpectrumConvention,
    SubbandConfig, SubbandTransform, TemplateFamily, TemplateParams,
};
use rustfft::num_complex::Complex;

struct CountingAllocator;

thread_local! {
    static TRACKING: Cell<bool> = const { Cell::new(false) };
    static ALLOCATIONS: Cell<u64> = const { Cell::new(0) };
    static LIVE_BYTES: Cell<i64> = const { Cell::new(0) };
}

fn record(bytes: i64, allocation: bool) {
    let _ = TRACKING.try_with(|tracking| {
        if tracking.get() {
            if allocation {
                let _ = ALLOCATIONS.try_with(|a| a.set(a.get() + 1));
            }
            let _ = LIVE_BYTES.try_with(|b| b.set(b.get() + bytes));
        }
    });
}

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            record(layout.size() as i64, true);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        record(-(layout.size() as i64), false);
        System.dealloc(ptr, layout);
    }
}

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Audit {
    allocations: u64,
    live_bytes: i64,
}

/// Run `f` with allocation tracking enabled on this thread.
fn audit<R>(f: impl FnOnce() -> R) -> (R, Audit) {
    ALLOCATIONS.with(|a| a.set(0));
    LIVE_BYTES.with(|b| b.set(0));
    TRACKING.with(|t| t.set(true));
    let result = f();
    TRACKING.with(|t| t.set(false));
    let audit = Audit {
        allocations: ALLOCATIONS.with(Cell::get),
        live_bytes: LIVE_BYTES.with(Cell::get),
    };
    (result, audit)
}

const BINS: usize = 16;
const SAMPLES: usize = 1024;

fn config() -> ChisqVetoConfig {
    ChisqVetoConfig {
        num_bins: BINS,
        num_samples: SAMPLES,
        family: TemplateFamily::SinglePhase,
        convention: SpectrumConvention::OneSided,
    }
}

fn spectrum() -> Vec<Complex<f64>> {
    (0..SAMPLES)
        .map(|k| {
            if k < SAMPLES / 2 {
                Complex::new((k as f64 * 0.37).sin(), (k as f64 * 0.11).cos())
            } else {
                Complex::new(0.0, 0.0)
            }
        })
        .collect()
}

#[test]
fn init_and_finalize_release_every_byte() {
    let ((), audit) = audit(|| {
        let mut veto = ChisqVeto::<f64>::new();
        veto.init(config()).expect("init");
        veto.load_template(TemplateParams::SinglePhase {
            bins: BinBoundaries::uniform(BINS, SAMPLES, 0).expect("bins"),
            norm: 1.0,
        })
        .expect("template");
        veto.finalize().expect("finalize");
    });
    assert!(audit.allocations > 0, "workspace was never allocated");
    assert_eq!(audit.live_bytes, 0, "finalize leaked workspace memory");
}

#[test]
fn steady_state_transform_does_not_allocate() {
    let engine = SubbandTransform::<f64>::try_new(SubbandConfig {
        num_bins: BINS,
        num_samples: SAMPLES,
        convention: SpectrumConvention::OneSided,
    })
    .expect("engine");
    let mut ws = engine.workspace().expect("workspace");
    let mut series = BinSeries::try_new(BINS, SAMPLES).expect("series");
    let bins = BinBoundaries::uniform(BINS, SAMPLES, 0).expect("bins");
    let qtilde = spectrum();
    engine
        .run_into(&qtilde, &bins, &mut ws, &mut series)
        .expect("warm-up");

    let (result, audit) = audit(|| {
        (0..4).try_for_each(|_| engine.run_into(&qtilde, &bins, &mut ws, &mut series))
    });
    result.expect("transform");
    assert_eq!(audit.allocations, 0);
}

#[cfg(not(feature = "parallel"))]
#[test]
fn steady_state_veto_into_caller_buffer_does_not_allocate() {
    use chisq_veto::veto::SinglePhaseVeto;

    let mut veto = ChisqVeto::<f64>::new();
    veto.init(config()).expect("init");
    veto.load_template(TemplateParams::SinglePhase {
        bins: BinBoundaries::uniform(BINS, SAMPLES, 0).expect("bins"),
        norm: 1.0,
    })
    .expect("template");
    let qtilde = spectrum();
    let q = qtilde.clone();
    let input = CorrelationInput::try_new(&qtilde, &q).expect("input");
    let mut out = vec![0.0; SAMPLES];
    SinglePhaseVeto::run_write(&mut veto, &input, &mut out).expect("warm-up");

    let (result, audit) = audit(|| SinglePhaseVeto::run_write(&mut veto, &input, &mut out));
    result.expect("veto");
    assert_eq!(audit.allocations, 0);
    veto.finalize().expect("finalize");
}
