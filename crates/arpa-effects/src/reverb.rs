//! The synth's output reverb.
//!
//! A fixed network of parallel damped combs and series allpasses. The
//! comb bank is fed the mono sum of the stereo bus; each comb's feedback
//! is derived from a decay-time model and its output lowpass from a
//! high-frequency damping figure, so the tail both shortens and darkens
//! the way a physical room does. Two series allpasses diffuse the comb
//! output, and their two tap points are cross-mixed into left and right
//! for stereo width.

use arpa_core::{DampedComb, SeriesAllpass};
use libm::powf;

/// Comb delay times in samples at the 32 kHz reference rate.
/// Prime lengths so the comb resonances never line up.
const COMB_TUNINGS_32K: [usize; 6] = [809, 877, 937, 1049, 1151, 1249];

/// Allpass delay times at the 32 kHz reference rate.
const ALLPASS_TUNINGS_32K: [usize; 2] = [347, 113];

/// Reference sample rate for tuning constants.
const REFERENCE_RATE: f32 = 32000.0;

/// Gain of the diffusion allpasses.
const ALLPASS_GAIN: f32 = 0.5;

/// Decay time in seconds for each device time setting (0..=7).
const DECAY_SECONDS: [f32; 8] = [0.3, 0.5, 0.8, 1.2, 1.7, 2.3, 3.0, 4.0];

/// Scale delay times from reference rate to target rate.
fn scale_to_rate(samples: usize, target_rate: f32) -> usize {
    ((samples as f32 * target_rate / REFERENCE_RATE).round() as usize).max(1)
}

/// Reverb character presets, one per device mode value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReverbMode {
    /// Small room: moderate size, noticeable damping.
    #[default]
    Room,
    /// Large hall: big, dark, wide.
    Hall,
    /// Plate: bright and dense.
    Plate,
    /// Tap delay: small, bright, narrow; reads as discrete echoes.
    TapDelay,
}

impl ReverbMode {
    /// Build a mode from the device's 0..=3 encoding (values above 3 clamp).
    pub fn from_device(value: u8) -> Self {
        match value {
            0 => ReverbMode::Room,
            1 => ReverbMode::Hall,
            2 => ReverbMode::Plate,
            _ => ReverbMode::TapDelay,
        }
    }

    /// Default parameters for this mode.
    ///
    /// Returns (room_size, damping, width)
    pub fn defaults(&self) -> (f32, f32, f32) {
        match self {
            ReverbMode::Room => (0.4, 0.5, 0.7),
            ReverbMode::Hall => (0.8, 0.3, 1.0),
            ReverbMode::Plate => (0.6, 0.15, 0.9),
            ReverbMode::TapDelay => (0.2, 0.05, 0.5),
        }
    }
}

/// Fixed-topology stereo reverb.
///
/// ```text
///            ┌→ [comb 0 → LP] ─┐
/// (L+R)/2 ──┼→ [comb ... ]    ├─(sum)→ [allpass 0] ─→ [allpass 1]
///            └→ [comb 5 → LP] ─┘            │ w2            │ w1
///                                           └── cross-mix ──┴──→ L/R
/// ```
///
/// The two allpass tap points carry the same tail with different phase
/// smear; `width` controls how much each channel leans on its own tap.
/// At `width = 0` both channels receive the identical mix (mono tail).
///
/// # Parameters
///
/// - `room_size`: 0.0-1.0, scales the effective decay time
/// - `decay_seconds`: tail length from the decay-time model
/// - `damping`: 0.0-1.0, high-frequency absorption (0=bright, 1=dark)
/// - `wet` / `dry`: output mix gains; `wet = 0.0` passes dry input untouched
/// - `width`: 0.0-1.0 stereo decorrelation of the tail
///
/// Parameter changes reconfigure coefficients only; delay-line history is
/// never rewritten, so a change is heard from the next sample onward.
#[derive(Debug, Clone)]
pub struct RoomReverb {
    combs: [DampedComb; 6],
    allpasses: [SeriesAllpass; 2],

    sample_rate: f32,
    mode: ReverbMode,

    room_size: f32,
    decay_seconds: f32,
    damping: f32,
    wet: f32,
    dry: f32,
    width: f32,

    // Cached values so coefficient recomputation runs only on change
    cached_room: f32,
    cached_decay: f32,
    cached_damp: f32,
}

impl RoomReverb {
    /// Create a reverb at the given sample rate with the Room preset,
    /// medium decay, and the wet path muted.
    pub fn new(sample_rate: f32) -> Self {
        let combs = core::array::from_fn(|i| {
            DampedComb::new(scale_to_rate(COMB_TUNINGS_32K[i], sample_rate))
        });
        let allpasses = core::array::from_fn(|i| {
            let mut ap = SeriesAllpass::new(scale_to_rate(ALLPASS_TUNINGS_32K[i], sample_rate));
            ap.set_gain(ALLPASS_GAIN);
            ap
        });

        let (room, damp, width) = ReverbMode::Room.defaults();

        let mut reverb = Self {
            combs,
            allpasses,
            sample_rate,
            mode: ReverbMode::Room,
            room_size: room,
            decay_seconds: DECAY_SECONDS[4],
            damping: damp,
            wet: 0.0,
            dry: 1.0,
            width,
            cached_room: -1.0,
            cached_decay: -1.0,
            cached_damp: -1.0,
        };
        reverb.update_network();
        reverb
    }

    /// Set the room size (0.0 to 1.0). Larger rooms decay longer.
    pub fn set_room_size(&mut self, size: f32) {
        self.room_size = size.clamp(0.0, 1.0);
        self.update_network();
    }

    /// Get the current room size.
    pub fn room_size(&self) -> f32 {
        self.room_size
    }

    /// Set the decay time in seconds (clamped to 0.05..=10.0).
    pub fn set_decay_seconds(&mut self, seconds: f32) {
        self.decay_seconds = seconds.clamp(0.05, 10.0);
        self.update_network();
    }

    /// Get the current decay time in seconds.
    pub fn decay_seconds(&self) -> f32 {
        self.decay_seconds
    }

    /// Set the damping amount (0.0 = bright, 1.0 = dark).
    pub fn set_damping(&mut self, damping: f32) {
        self.damping = damping.clamp(0.0, 1.0);
        self.update_network();
    }

    /// Get the current damping value.
    pub fn damping(&self) -> f32 {
        self.damping
    }

    /// Set the wet gain (0.0 to 1.0). At 0.0 the output is the dry input.
    pub fn set_wet(&mut self, wet: f32) {
        self.wet = wet.clamp(0.0, 1.0);
    }

    /// Get the current wet gain.
    pub fn wet(&self) -> f32 {
        self.wet
    }

    /// Set the dry gain (0.0 to 1.0).
    pub fn set_dry(&mut self, dry: f32) {
        self.dry = dry.clamp(0.0, 1.0);
    }

    /// Get the current dry gain.
    pub fn dry(&self) -> f32 {
        self.dry
    }

    /// Set the stereo width of the tail (0.0 = mono, 1.0 = full).
    pub fn set_width(&mut self, width: f32) {
        self.width = width.clamp(0.0, 1.0);
    }

    /// Get the current width.
    pub fn width(&self) -> f32 {
        self.width
    }

    /// Get the current mode preset.
    pub fn mode(&self) -> ReverbMode {
        self.mode
    }

    /// Apply a device reverb program: mode (0..=3 semantics via
    /// [`ReverbMode`]), time 0..=7, level 0..=7.
    ///
    /// Mode selects room size, damping, and width; time selects the decay
    /// length; level scales the wet gain, with 0 muting the wet path
    /// entirely.
    pub fn set_program(&mut self, mode: ReverbMode, time: u8, level: u8) {
        self.mode = mode;
        let (room, damp, width) = mode.defaults();
        self.room_size = room;
        self.damping = damp;
        self.width = width;
        self.decay_seconds = DECAY_SECONDS[usize::from(time.min(7))];
        self.wet = f32::from(level.min(7)) / 7.0;
        self.update_network();
    }

    /// Recompute comb feedback and damping from the decay-time model.
    ///
    /// Feedback follows the RT60 relation `g = 10^(-3·L / (T60·fs))` per
    /// comb length `L`, with the effective T60 scaled by room size.
    fn update_network(&mut self) {
        if (self.room_size - self.cached_room).abs() < 0.001
            && (self.decay_seconds - self.cached_decay).abs() < 0.001
            && (self.damping - self.cached_damp).abs() < 0.001
        {
            return;
        }
        self.cached_room = self.room_size;
        self.cached_decay = self.decay_seconds;
        self.cached_damp = self.damping;

        let t60 = self.decay_seconds * (0.25 + 0.75 * self.room_size);
        for comb in &mut self.combs {
            let len = comb.len() as f32;
            let feedback = powf(10.0, -3.0 * len / (t60 * self.sample_rate));
            comb.set_feedback(feedback);
            comb.set_damp(self.damping);
        }
    }

    /// Process one stereo sample pair.
    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let input = (left + right) * 0.5;

        let mut comb_sum = 0.0f32;
        for comb in &mut self.combs {
            comb_sum += comb.process(input);
        }
        comb_sum *= 1.0 / 6.0;

        // Two diffusion stages; both tap points feed the output
        let w2 = self.allpasses[0].process(comb_sum);
        let w1 = self.allpasses[1].process(w2);

        // width=0 collapses both channels onto the same mix
        let cross = 0.5 + self.width * 0.5;
        let wet_l = self.wet * (cross * w1 + (1.0 - cross) * w2);
        let wet_r = self.wet * (cross * w2 + (1.0 - cross) * w1);

        (self.dry * left + wet_l, self.dry * right + wet_r)
    }

    /// Clear all delay-line and filter state, keeping parameters.
    pub fn clear(&mut self) {
        for comb in &mut self.combs {
            comb.clear();
        }
        for allpass in &mut self.allpasses {
            allpass.clear();
        }
    }
}
