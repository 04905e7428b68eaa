//! Precomputed lookup tables shared by every partial.
//!
//! [`SynthTables`] is built once at engine initialization and never
//! mutated afterwards; the engine shares it behind an `Arc` so render
//! code can read tables without any locking. All raw parameter values
//! coming from device memory are clamped at the point of lookup, never
//! rejected.

use crate::rom::RomSet;
use libm::{powf, sinf};

/// Number of steps in the raw 0-100 parameter tables.
pub const PARAM_STEPS: usize = 101;

/// Length of one bandlimited wavetable cycle in samples.
pub const WAVE_TABLE_LEN: usize = 2048;

/// Number of octave bands with separately bandlimited wavetables.
pub const WAVE_BANDS: usize = 11;

/// Number of bias slope steps (bias level 0-12).
pub const BIAS_LEVELS: usize = 13;

/// Length of the fixed noise table used by partner-less ring modulation.
pub const NOISE_LEN: usize = 1024;

/// Per-semitone attenuation for each bias level, in decibels.
const BIAS_SLOPE_DB: [f32; BIAS_LEVELS] = [
    0.0, 0.125, 0.25, 0.5, 0.75, 1.0, 1.5, 2.0, 2.5, 3.0, 4.5, 6.0, 12.0,
];

/// Key-follow ratios indexed by the raw 0-16 parameter.
///
/// Index 3 pins the parameter to the reference note, index 11 tracks the
/// keyboard exactly. The two entries past 2.0 are stretched tunings.
const KEY_FOLLOW: [f32; 17] = [
    -1.0,
    -0.5,
    -0.25,
    0.0,
    0.125,
    0.25,
    0.375,
    0.5,
    0.625,
    0.75,
    0.875,
    1.0,
    1.25,
    1.5,
    2.0,
    1.0625,
    1.125,
];

/// One octave band of bandlimited wavetables.
#[derive(Debug, Clone)]
pub struct WaveBand {
    /// Full-cycle bandlimited sawtooth.
    pub full: Vec<f32>,
    /// The same sawtooth one octave up; read over a full period it
    /// completes two cycles. The waveform generator selects it for wide
    /// pulse-width settings.
    pub half: Vec<f32>,
}

/// Immutable table set derived from the sample rate and the wavetable
/// resource.
///
/// # Example
///
/// ```rust
/// use arpa_synth::{RomSet, SynthTables, PcmSampleDesc};
///
/// let rom = RomSet::builder()
///     .wavetable(vec![0; 0x4000])
///     .pcm(vec![0i16; 256])
///     .loop_table(vec![PcmSampleDesc { start: 0, len: 256, looped: true }])
///     .patch_streams(Vec::new(), Vec::new())
///     .drum_map(vec![None; 64])
///     .build()
///     .unwrap();
///
/// let tables = SynthTables::new(&rom);
/// assert!((tables.note_freq[69] - 440.0).abs() < 0.01);
/// ```
#[derive(Debug, Clone)]
pub struct SynthTables {
    sample_rate: f32,
    /// Envelope segment length in samples, indexed by raw time 0-100.
    pub env_time: [u32; PARAM_STEPS],
    /// Nonlinear level curve, indexed by raw level 0-100. Entry 0 is
    /// exactly zero so a completed amplitude decay is true silence.
    pub env_level: [f32; PARAM_STEPS],
    /// Velocity response curve, indexed by effective velocity 0-127.
    pub velocity_gain: [f32; 128],
    /// Key-follow ratios indexed by the raw 0-16 parameter.
    pub key_follow: [f32; 17],
    /// LFO rate in Hz, indexed by raw rate 0-100.
    pub lfo_rate_hz: [f32; PARAM_STEPS],
    /// LFO depth in cents, indexed by raw depth 0-100.
    pub lfo_depth_cents: [f32; PARAM_STEPS],
    /// Fine-tune ratio, indexed by raw tune 0-100 with 50 centered.
    pub fine_tune_ratio: [f32; PARAM_STEPS],
    /// Equal-tempered note frequencies, A440 at note 69.
    pub note_freq: [f32; 128],
    /// Bandlimited wavetables, one band per octave.
    pub wave_bands: Vec<WaveBand>,
    /// Fixed noise table derived from the wavetable resource. A ring
    /// modulator whose partner slot is inactive multiplies against this
    /// instead of a live signal.
    pub noise: [f32; NOISE_LEN],
}

impl SynthTables {
    /// Build the full table set for the resource set's sample rate.
    pub fn new(rom: &RomSet) -> Self {
        let sample_rate = rom.sample_rate();

        let mut env_time = [0u32; PARAM_STEPS];
        for (t, slot) in env_time.iter_mut().enumerate() {
            // 1 ms at 0 up to 10 s at 100, exponential in between.
            let seconds = powf(10.0, t as f32 * 0.04 - 3.0);
            *slot = (seconds * sample_rate) as u32;
        }

        let mut env_level = [0.0f32; PARAM_STEPS];
        for (l, slot) in env_level.iter_mut().enumerate().skip(1) {
            *slot = powf(10.0, (l as f32 - 100.0) / 40.0);
        }

        let mut velocity_gain = [0.0f32; 128];
        for (v, slot) in velocity_gain.iter_mut().enumerate() {
            *slot = powf(v as f32 / 127.0, 2.0);
        }

        let mut lfo_rate_hz = [0.0f32; PARAM_STEPS];
        let mut lfo_depth_cents = [0.0f32; PARAM_STEPS];
        let mut fine_tune_ratio = [0.0f32; PARAM_STEPS];
        for i in 0..PARAM_STEPS {
            let t = i as f32 / 100.0;
            lfo_rate_hz[i] = 0.1 * powf(200.0, t);
            lfo_depth_cents[i] = t * t * 150.0;
            fine_tune_ratio[i] = powf(2.0, (i as f32 - 50.0) / 1200.0);
        }

        let mut note_freq = [0.0f32; 128];
        for (n, slot) in note_freq.iter_mut().enumerate() {
            *slot = 440.0 * powf(2.0, (n as f32 - 69.0) / 12.0);
        }

        let wave_bands = (0..WAVE_BANDS)
            .map(|band| {
                let top_note = (band * 12 + 11).min(127);
                let fundamental = note_freq[top_note];
                WaveBand {
                    full: bandlimited_saw(fundamental, sample_rate),
                    half: bandlimited_saw(fundamental * 2.0, sample_rate),
                }
            })
            .collect();

        let wavetable = rom.wavetable();
        let mut noise = [0.0f32; NOISE_LEN];
        for (i, slot) in noise.iter_mut().enumerate() {
            *slot = (wavetable[i % wavetable.len()] as f32 - 127.5) / 127.5;
        }

        Self {
            sample_rate,
            env_time,
            env_level,
            velocity_gain,
            key_follow: KEY_FOLLOW,
            lfo_rate_hz,
            lfo_depth_cents,
            fine_tune_ratio,
            note_freq,
            wave_bands,
            noise,
        }
    }

    /// Output sample rate the tables were built for.
    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Octave band index for a note number.
    #[inline]
    pub fn band_for_note(note: u8) -> usize {
        ((note / 12) as usize).min(WAVE_BANDS - 1)
    }

    /// Map a continuous raw level (0-100) through the nonlinear level
    /// curve, interpolating between table steps. Envelope ramps are
    /// linear in raw space; this is where the curve comes back in.
    #[inline]
    pub fn level_gain(&self, raw: f32) -> f32 {
        let clamped = raw.clamp(0.0, (PARAM_STEPS - 1) as f32);
        let index = clamped as usize;
        let next = (index + 1).min(PARAM_STEPS - 1);
        let fraction = clamped - index as f32;
        self.env_level[index] + (self.env_level[next] - self.env_level[index]) * fraction
    }

    /// Bias attenuation in linear gain for a bias level and an absolute
    /// key distance from the pivot note. Out-of-range levels clamp.
    pub fn bias_gain(&self, level: u8, distance: u8) -> f32 {
        let slope = BIAS_SLOPE_DB[(level as usize).min(BIAS_LEVELS - 1)];
        powf(10.0, -slope * distance as f32 / 20.0)
    }
}

/// One cycle of a sawtooth with harmonics summed up to Nyquist for the
/// given fundamental.
fn bandlimited_saw(fundamental: f32, sample_rate: f32) -> Vec<f32> {
    let nyquist = sample_rate * 0.5;
    let harmonics = ((nyquist / fundamental) as usize).clamp(1, WAVE_TABLE_LEN / 4);
    let scale = 2.0 / core::f32::consts::PI;

    (0..WAVE_TABLE_LEN)
        .map(|i| {
            let phase = i as f32 / WAVE_TABLE_LEN as f32;
            let mut acc = 0.0;
            for k in 1..=harmonics {
                acc += sinf(2.0 * core::f32::consts::PI * k as f32 * phase) / k as f32;
            }
            acc * scale
        })
        .collect()
}
