//! Second-order section design for the resonant lowpass.
//!
//! The synth's voice filter is a 4-pole resonant lowpass built from two
//! second-order IIR sections in series. Coefficients come from a bilinear
//! transform of the analog prototype with frequency prewarping, so the
//! cutoff lands where it was asked for even near Nyquist.
//!
//! Only the coefficient shape lives here. Runtime state is owned by the
//! caller, which lets a precomputed coefficient table be shared across
//! many voices while each voice keeps its own delay history.

use libm::tanf;

/// Normalized coefficients for one second-order section.
///
/// `a0` is already divided out; the section computes
/// ```text
/// y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionCoefficients {
    /// Feedforward coefficients.
    pub b0: f32,
    /// Feedforward, one sample back.
    pub b1: f32,
    /// Feedforward, two samples back.
    pub b2: f32,
    /// Feedback, one sample back.
    pub a1: f32,
    /// Feedback, two samples back.
    pub a2: f32,
}

/// Design one lowpass section from the analog prototype
/// `H(s) = ω0² / (s² + (ω0/Q)·s + ω0²)` via the bilinear transform.
///
/// Prewarping folds the frequency axis so the digital cutoff matches the
/// requested one: `K = tan(π · fc / fs)`.
fn lowpass_section(cutoff_hz: f32, q: f32, sample_rate: f32) -> SectionCoefficients {
    let k = tanf(core::f32::consts::PI * cutoff_hz / sample_rate);
    let k2 = k * k;
    let norm = 1.0 / (1.0 + k / q + k2);

    let b0 = k2 * norm;
    SectionCoefficients {
        b0,
        b1: 2.0 * b0,
        b2: b0,
        a1: 2.0 * (k2 - 1.0) * norm,
        a2: (1.0 - k / q + k2) * norm,
    }
}

/// Q of the non-resonant section. With the resonant section at Q = 1/√2 the
/// pair approximates a 4-pole Butterworth; raising the resonant Q peaks the
/// response at the cutoff.
const BASE_SECTION_Q: f32 = core::f32::consts::FRAC_1_SQRT_2;

/// Design the 4-pole resonant lowpass as two cascaded sections.
///
/// `resonance_q` is the Q of the second section and carries all of the
/// resonance; it is clamped below at 1/√2 so zero-resonance settings stay
/// maximally flat. The cutoff is clamped into (0, 0.497·fs) to keep the
/// prewarp tangent finite.
pub fn resonant_lowpass_sections(
    cutoff_hz: f32,
    resonance_q: f32,
    sample_rate: f32,
) -> [SectionCoefficients; 2] {
    let cutoff = cutoff_hz.clamp(1.0, sample_rate * 0.497);
    let q = resonance_q.max(BASE_SECTION_Q);
    [
        lowpass_section(cutoff, BASE_SECTION_Q, sample_rate),
        lowpass_section(cutoff, q, sample_rate),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Direct Form I runner for one designed pair, test use only.
    #[derive(Default)]
    struct Runner {
        state: [[f32; 4]; 2],
    }

    impl Runner {
        fn process(&mut self, coeffs: &[SectionCoefficients; 2], input: f32) -> f32 {
            let mut sample = input;
            for (c, s) in coeffs.iter().zip(self.state.iter_mut()) {
                let y = c.b0 * sample + c.b1 * s[0] + c.b2 * s[1] - c.a1 * s[2] - c.a2 * s[3];
                s[1] = s[0];
                s[0] = sample;
                s[3] = s[2];
                s[2] = y;
                sample = y;
            }
            sample
        }
    }

    #[test]
    fn test_lowpass_coefficients_finite() {
        let coeffs = resonant_lowpass_sections(1000.0, 0.707, 32000.0);
        for c in &coeffs {
            assert!(c.b0.is_finite());
            assert!(c.b1.is_finite());
            assert!(c.b2.is_finite());
            assert!(c.a1.is_finite());
            assert!(c.a2.is_finite());
        }
    }

    #[test]
    fn test_cascade_dc_pass() {
        let coeffs = resonant_lowpass_sections(1000.0, 0.707, 32000.0);
        let mut runner = Runner::default();

        // Process DC signal (0 Hz)
        let mut output = 0.0;
        for _ in 0..2000 {
            output = runner.process(&coeffs, 1.0);
        }

        // DC should pass through a lowpass with near-unity gain
        assert!(
            (output - 1.0).abs() < 0.05,
            "DC gain should be ~1.0, got {output}"
        );
    }

    #[test]
    fn test_cascade_attenuates_nyquist() {
        let coeffs = resonant_lowpass_sections(500.0, 0.707, 32000.0);
        let mut runner = Runner::default();

        // Alternating +1/-1 is the highest representable frequency
        let mut sum = 0.0f32;
        for i in 0..4000 {
            let input = if i % 2 == 0 { 1.0 } else { -1.0 };
            let out = runner.process(&coeffs, input);
            if i >= 2000 {
                sum += out.abs();
            }
        }
        let avg = sum / 2000.0;
        assert!(
            avg < 0.01,
            "Nyquist should be strongly attenuated by a 4-pole lowpass, avg = {avg}"
        );
    }

    #[test]
    fn test_resonance_peaks_at_cutoff() {
        // Drive both a flat and a resonant filter with a sine at the cutoff.
        // The resonant one should come out louder.
        let sample_rate = 32000.0;
        let cutoff = 2000.0;

        let flat_coeffs = resonant_lowpass_sections(cutoff, 0.707, sample_rate);
        let peaked_coeffs = resonant_lowpass_sections(cutoff, 4.0, sample_rate);
        let mut flat = Runner::default();
        let mut peaked = Runner::default();

        let mut flat_energy = 0.0f32;
        let mut peaked_energy = 0.0f32;
        for i in 0..8000 {
            let input = libm::sinf(i as f32 * core::f32::consts::TAU * cutoff / sample_rate);
            let f = flat.process(&flat_coeffs, input);
            let p = peaked.process(&peaked_coeffs, input);
            if i >= 4000 {
                flat_energy += f * f;
                peaked_energy += p * p;
            }
        }

        assert!(
            peaked_energy > flat_energy * 2.0,
            "Resonant filter should boost the cutoff band: flat={flat_energy}, peaked={peaked_energy}"
        );
    }

    #[test]
    fn test_zero_resonance_clamps_to_flat() {
        // Q below 1/√2 must design the same sections as 1/√2 exactly.
        assert_eq!(
            resonant_lowpass_sections(1000.0, 0.0, 32000.0),
            resonant_lowpass_sections(1000.0, core::f32::consts::FRAC_1_SQRT_2, 32000.0)
        );
    }

    #[test]
    fn test_extreme_cutoff_is_clamped() {
        // Cutoff above Nyquist must not blow up the prewarp tangent
        let coeffs = resonant_lowpass_sections(100_000.0, 1.0, 32000.0);
        let mut runner = Runner::default();
        for i in 0..1000 {
            let out = runner.process(&coeffs, if i % 2 == 0 { 1.0 } else { -1.0 });
            assert!(out.is_finite(), "Output must stay finite at clamped cutoff");
        }
    }
}
