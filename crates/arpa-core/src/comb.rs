//! Damped comb filter for the reverb network.
//!
//! A feedback comb with a one-pole lowpass on its output. The lowpass sits
//! after the tap, outside the feedback loop, so the recirculating signal
//! keeps its spectrum while each echo the listener hears is progressively
//! darkened by the damping stage.

use crate::OnePole;
use crate::RingBuffer;
use crate::flush_denormal;

/// Feedback comb followed by a one-pole damping lowpass.
///
/// ```text
/// input ─→ (+) ─→ [delay line] ─┬→ [OnePole LP] ─→ output
///            ↑                  │
///            └──── feedback ←───┘
/// ```
///
/// # Example
///
/// ```rust
/// use arpa_core::DampedComb;
///
/// let mut comb = DampedComb::new(1000);
/// comb.set_feedback(0.8);
/// comb.set_damp(0.3);
///
/// let output = comb.process(1.0);
/// ```
#[derive(Debug, Clone)]
pub struct DampedComb {
    delay: RingBuffer,
    damping: OnePole,
    feedback: f32,
}

impl DampedComb {
    /// Create a damped comb with the given delay length in samples.
    pub fn new(delay_samples: usize) -> Self {
        Self {
            delay: RingBuffer::new(delay_samples),
            damping: OnePole::new(0.5),
            feedback: 0.5,
        }
    }

    /// Set the feedback amount (clamped to 0.0..=0.99).
    ///
    /// Higher values create longer decay times.
    #[inline]
    pub fn set_feedback(&mut self, feedback: f32) {
        self.feedback = feedback.clamp(0.0, 0.99);
    }

    /// Get the current feedback value.
    #[inline]
    pub fn feedback(&self) -> f32 {
        self.feedback
    }

    /// Set the damping lowpass coefficient (0.0 = bright, →1.0 = dark).
    #[inline]
    pub fn set_damp(&mut self, damp: f32) {
        self.damping.set_coeff(damp);
    }

    /// Get the current damping coefficient.
    #[inline]
    pub fn damp(&self) -> f32 {
        self.damping.coeff()
    }

    /// Process a single sample.
    ///
    /// The delayed tap feeds back undamped; the output path runs through
    /// the damping lowpass.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let delayed = self.delay.read();
        self.delay
            .write(flush_denormal(input + delayed * self.feedback));
        self.damping.process(delayed)
    }

    /// Clear the delay line and the damping filter state.
    pub fn clear(&mut self) {
        self.delay.clear();
        self.damping.reset();
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comb_echo_appears_after_delay() {
        let mut comb = DampedComb::new(100);
        comb.set_feedback(0.5);
        comb.set_damp(0.0);

        // Process impulse
        let first = comb.process(1.0);
        assert_eq!(first, 0.0, "First output is from the empty delay");

        // Process silence, wait for echo
        for _ in 0..99 {
            comb.process(0.0);
        }

        // Now we should see the delayed impulse
        let echo = comb.process(0.0);
        assert!(echo.abs() > 0.5, "Should have echo, got {}", echo);
    }

    #[test]
    fn test_comb_feedback_decay() {
        let mut comb = DampedComb::new(10);
        comb.set_feedback(0.8);
        comb.set_damp(0.0);

        // Impulse
        comb.process(1.0);

        // Each recirculation should be smaller than the last
        let mut last_peak = 0.0f32;
        for _ in 0..100 {
            let out = comb.process(0.0);
            if out.abs() > 0.01 {
                if last_peak > 0.0 {
                    assert!(out.abs() <= last_peak + 0.01, "Echo should decay");
                }
                last_peak = out.abs();
            }
        }
    }

    #[test]
    fn test_comb_damping_darkens_output() {
        // Compare bright vs damped
        let mut bright = DampedComb::new(20);
        bright.set_feedback(0.8);
        bright.set_damp(0.0);

        let mut dark = DampedComb::new(20);
        dark.set_feedback(0.8);
        dark.set_damp(0.8);

        // Impulse
        bright.process(1.0);
        dark.process(1.0);

        let mut bright_sum = 0.0f32;
        let mut dark_sum = 0.0f32;

        for _ in 0..200 {
            bright_sum += bright.process(0.0).abs();
            dark_sum += dark.process(0.0).abs();
        }

        assert!(dark_sum < bright_sum, "Damped should have less energy");
    }

    #[test]
    fn test_damping_outside_feedback_loop() {
        // With damping fully open vs heavily damped, the recirculating
        // energy must match: damping shapes only the output tap. Compare
        // the raw echo timing by checking the damped comb still rings at
        // the same period.
        let mut damped = DampedComb::new(8);
        damped.set_feedback(0.9);
        damped.set_damp(0.9);

        damped.process(1.0);
        let mut peaks = 0;
        let mut prev = 0.0f32;
        for i in 0..64 {
            let out = damped.process(0.0);
            // Count rising transitions at the comb period
            if i % 8 == 7 && out.abs() > prev.abs() {
                peaks += 1;
            }
            prev = out;
        }
        assert!(peaks > 0, "Echoes must keep recirculating under heavy damping");
    }

    #[test]
    fn test_comb_clear() {
        let mut comb = DampedComb::new(10);

        for _ in 0..20 {
            comb.process(1.0);
        }

        comb.clear();

        for _ in 0..20 {
            let out = comb.process(0.0);
            assert!(out.abs() < 1e-10, "Should be silent after clear");
        }
    }

    #[test]
    fn test_no_denormals_after_silence() {
        let mut comb = DampedComb::new(100);
        comb.set_feedback(0.9);
        comb.set_damp(0.3);

        // Feed signal for 1000 samples to fill delay line and build up feedback
        for _ in 0..1000 {
            comb.process(0.5);
        }

        // Feed silence for 100k samples -- signal should decay cleanly without
        // producing IEEE 754 subnormal values (which start below ~1.2e-38 and
        // cause severe CPU performance degradation on most architectures).
        for i in 0..100_000 {
            let out = comb.process(0.0);
            assert!(
                out == 0.0 || out.abs() > f32::MIN_POSITIVE,
                "Denormal detected at sample {}: {:.2e} (below f32::MIN_POSITIVE {:.2e})",
                i,
                out,
                f32::MIN_POSITIVE
            );
        }
    }
}
