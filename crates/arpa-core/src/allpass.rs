//! Allpass filter for reverb diffusion.
//!
//! A Schroeder allpass filter that adds diffusion without coloring the
//! frequency response. The reverb runs two of these in series after the
//! comb bank to smear echoes into a dense tail.

use crate::RingBuffer;
use crate::flush_denormal;

/// Schroeder allpass on a fixed-length delay line.
///
/// The canonical lattice form:
/// ```text
/// w[n] = x[n] + gain * w[n-N]
/// y[n] = w[n-N] - gain * w[n]
/// ```
/// which realizes `H(z) = (-gain + z^-N) / (1 - gain * z^-N)`: unity
/// magnitude at every frequency, phase smeared around the delay length.
///
/// # Example
///
/// ```rust
/// use arpa_core::SeriesAllpass;
///
/// let mut allpass = SeriesAllpass::new(500);
/// allpass.set_gain(0.5);
///
/// let output = allpass.process(1.0);
/// ```
#[derive(Debug, Clone)]
pub struct SeriesAllpass {
    delay: RingBuffer,
    gain: f32,
}

impl SeriesAllpass {
    /// Create an allpass with the given delay length in samples.
    pub fn new(delay_samples: usize) -> Self {
        Self {
            delay: RingBuffer::new(delay_samples),
            gain: 0.5,
        }
    }

    /// Set the allpass gain.
    ///
    /// Typical values are around 0.5 for reverb diffusion. The filter is
    /// stable for |gain| < 1.0; values are clamped to ±0.99.
    #[inline]
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain.clamp(-0.99, 0.99);
    }

    /// Get the current gain.
    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Process a single sample through the allpass.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let delayed = self.delay.read();
        let w = flush_denormal(input + self.gain * delayed);
        self.delay.write(w);
        delayed - self.gain * w
    }

    /// Clear the allpass filter state.
    pub fn clear(&mut self) {
        self.delay.clear();
    }

    /// Delay length in samples.
    pub fn len(&self) -> usize {
        self.delay.len()
    }

    /// Always false; the delay length is fixed and nonzero.
    pub fn is_empty(&self) -> bool {
        false
    }
}
