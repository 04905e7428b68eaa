//! Resonant low-pass stage with a precomputed coefficient table.
//!
//! Coefficients for every {cutoff step, resonance step} combination are
//! designed once at initialization with the bilinear-transform design in
//! `arpa_core`. Per-sample work is then two direct-form biquad sections
//! reading shared coefficients against per-partial history, so 32
//! partials share one table and never design filters in the hot path.
//!
//! The numeric backend sits behind [`FilterKernel`]; one portable f32
//! kernel ships here, selected once at engine construction.

use arpa_core::{SectionCoefficients, flush_denormal, resonant_lowpass_sections};
use core::f32::consts::FRAC_1_SQRT_2;
use libm::powf;

/// Number of quantized cutoff steps in the coefficient table.
pub const CUTOFF_STEPS: usize = 128;

/// Number of quantized resonance steps in the coefficient table.
pub const RESONANCE_STEPS: usize = 32;

/// Highest usable resonance index. The hardware exhibits the same
/// ceiling at 15/16 of the table.
pub const RESONANCE_MAX: usize = RESONANCE_STEPS * 15 / 16;

/// Cutoff of the lowest table step in Hz.
const CUTOFF_FLOOR_HZ: f32 = 100.0;

/// Octaves spanned by the cutoff axis.
const CUTOFF_OCTAVES: f32 = 7.0;

/// Per-section history for one partial's filter.
///
/// Kept outside the engine so the coefficient table can be shared; each
/// partial carries its own copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterHistory {
    sections: [SectionState; 2],
}

#[derive(Debug, Clone, Copy, Default)]
struct SectionState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl FilterHistory {
    /// Zero all delay state.
    pub fn clear(&mut self) {
        self.sections = [SectionState::default(); 2];
    }
}

/// Numeric backend seam: consumes the shared coefficient shape and a
/// partial's history, produces one filtered sample.
///
/// Only the portable f32 kernel ships; fixed-point variants would slot
/// in here without touching the table.
pub trait FilterKernel {
    /// Run both sections over one input sample.
    fn run(
        &self,
        coefficients: &[SectionCoefficients; 2],
        history: &mut FilterHistory,
        input: f32,
    ) -> f32;
}

/// Reference f32 direct-form I kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortableKernel;

impl FilterKernel for PortableKernel {
    #[inline]
    fn run(
        &self,
        coefficients: &[SectionCoefficients; 2],
        history: &mut FilterHistory,
        input: f32,
    ) -> f32 {
        let mut sample = input;
        for (c, s) in coefficients.iter().zip(history.sections.iter_mut()) {
            let y = flush_denormal(
                c.b0 * sample + c.b1 * s.x1 + c.b2 * s.x2 - c.a1 * s.y1 - c.a2 * s.y2,
            );
            s.x2 = s.x1;
            s.x1 = sample;
            s.y2 = s.y1;
            s.y1 = y;
            sample = y;
        }
        sample
    }
}

/// Shared filter stage: coefficient table plus the selected kernel.
///
/// # Example
///
/// ```rust
/// use arpa_synth::filter::{FilterEngine, FilterHistory};
///
/// let engine = FilterEngine::new(32000.0);
/// let mut history = FilterHistory::default();
///
/// let out = engine.process(64.0, 8.0, &mut history, 0.5);
/// assert!(out.is_finite());
/// ```
#[derive(Debug)]
pub struct FilterEngine {
    table: Vec<[SectionCoefficients; 2]>,
    kernel: PortableKernel,
}

impl FilterEngine {
    /// Design the full cutoff x resonance table for a sample rate.
    pub fn new(sample_rate: f32) -> Self {
        let mut table = Vec::with_capacity(CUTOFF_STEPS * RESONANCE_STEPS);
        for cutoff_step in 0..CUTOFF_STEPS {
            let octave = cutoff_step as f32 / (CUTOFF_STEPS - 1) as f32 * CUTOFF_OCTAVES;
            let cutoff_hz = CUTOFF_FLOOR_HZ * powf(2.0, octave);
            for resonance_step in 0..RESONANCE_STEPS {
                let q = FRAC_1_SQRT_2 * powf(1.12, resonance_step as f32);
                table.push(resonant_lowpass_sections(cutoff_hz, q, sample_rate));
            }
        }
        Self {
            table,
            kernel: PortableKernel,
        }
    }

    /// Filter one sample.
    ///
    /// `cutoff` and `resonance` are continuous table positions; both are
    /// clamped into range here so the render path can pass raw envelope
    /// sums without bounds concern. Resonance clamps at [`RESONANCE_MAX`],
    /// below the physical top of the table.
    #[inline]
    pub fn process(
        &self,
        cutoff: f32,
        resonance: f32,
        history: &mut FilterHistory,
        input: f32,
    ) -> f32 {
        let coefficients = &self.table[Self::table_index(cutoff, resonance)];
        self.kernel.run(coefficients, history, input)
    }

    /// Clamp and quantize a (cutoff, resonance) pair to a table slot.
    fn table_index(cutoff: f32, resonance: f32) -> usize {
        let cutoff_step = if cutoff.is_finite() {
            cutoff.clamp(0.0, (CUTOFF_STEPS - 1) as f32) as usize
        } else {
            0
        };
        let resonance_step = if resonance.is_finite() {
            resonance.clamp(0.0, RESONANCE_MAX as f32) as usize
        } else {
            0
        };
        cutoff_step * RESONANCE_STEPS + resonance_step
    }
}
