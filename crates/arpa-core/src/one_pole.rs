//! One-pole lowpass filter for damping and smoothing.
//!
//! A single-pole IIR lowpass with the difference equation:
//!
//! ```text
//! y[n] = x[n] + coeff * (y[n-1] - x[n])
//!      = (1 - coeff) * x[n] + coeff * y[n-1]
//! ```
//!
//! This is the simplest possible lowpass: 6 dB/octave rolloff, zero latency,
//! one multiply per sample. The reverb hangs one after each comb to absorb
//! high frequencies over the tail.
//!
//! # Reference
//!
//! Julius O. Smith III, "Introduction to Digital Filters with Audio Applications",
//! Section: One-Pole Filter.

use crate::flush_denormal;
use libm::expf;

/// One-pole (6 dB/oct) lowpass filter, parameterized by its coefficient.
///
/// The coefficient is the pole position in [0, 1): 0 passes the input
/// unfiltered, values approaching 1 filter heavily. Callers that think in
/// Hz can use [`OnePole::from_cutoff`].
///
/// # Invariants
///
/// - `coeff` is always in [0, 1) for stable operation
/// - `state` is flushed to zero when below 1e-20 (denormal protection)
#[derive(Debug, Clone)]
pub struct OnePole {
    state: f32,
    coeff: f32,
}

impl OnePole {
    /// Create a one-pole lowpass with the given coefficient.
    ///
    /// The coefficient is clamped to [0, 0.9999].
    pub fn new(coeff: f32) -> Self {
        Self {
            state: 0.0,
            coeff: coeff.clamp(0.0, 0.9999),
        }
    }

    /// Create a one-pole lowpass from a cutoff frequency.
    ///
    /// `coeff = exp(-2π * freq / sample_rate)`. Higher freq → lower coeff →
    /// less filtering. At freq = 0, coeff ≈ 1 (full filter). At Nyquist,
    /// coeff ≈ 0 (no filter).
    pub fn from_cutoff(sample_rate: f32, freq_hz: f32) -> Self {
        Self::new(expf(-core::f32::consts::TAU * freq_hz / sample_rate))
    }

    /// Set the coefficient directly (clamped to [0, 0.9999]).
    #[inline]
    pub fn set_coeff(&mut self, coeff: f32) {
        self.coeff = coeff.clamp(0.0, 0.9999);
    }

    /// Get the current coefficient.
    #[inline]
    pub fn coeff(&self) -> f32 {
        self.coeff
    }

    /// Process one sample through the lowpass filter.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        // y[n] = x[n] + coeff * (y[n-1] - x[n])
        self.state = flush_denormal(input + self.coeff * (self.state - input));
        self.state
    }

    /// Reset filter state to zero.
    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}
