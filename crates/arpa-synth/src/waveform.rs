//! Per-sample raw waveform production for one partial.
//!
//! Two source families share one generator: PCM playback out of the
//! resource bank (with loop, one-shot and aggregate policies) and
//! bandlimited wavetable synthesis (square and sawtooth). Output is a
//! raw pre-filter, pre-amplitude sample in roughly [-1, 1].
//!
//! PCM playback accumulates a fixed-point offset with 16 fractional
//! bits. Below a playback delta of 1.0 adjacent frames are linearly
//! interpolated; at or above 1.0 the skipped frames are averaged (box
//! filter) so downward transposition does not alias.

use crate::patch::{PartialCacheEntry, WaveSource, Waveform};
use crate::rom::{PcmSampleDesc, RomSet};
use crate::tables::{SynthTables, WAVE_TABLE_LEN};
use arpa_core::lerp;

/// Fractional bits of the PCM playback position.
const PCM_FRAC_BITS: u32 = 16;

const PCM_FRAC_ONE: u64 = 1 << PCM_FRAC_BITS;

/// Raw sample source for one playing partial.
#[derive(Debug, Clone)]
pub struct WaveformGenerator {
    kind: GeneratorKind,
    finished: bool,
}

#[derive(Debug, Clone)]
enum GeneratorKind {
    Pcm(PcmState),
    Synth(SynthState),
}

#[derive(Debug, Clone)]
struct PcmState {
    desc: PcmSampleDesc,
    /// Fixed-point frame offset relative to `desc.start`.
    position: u64,
    /// Aggregate voice: which list and where in it.
    aggregate: Option<AggregateState>,
}

#[derive(Debug, Clone, Copy)]
struct AggregateState {
    list: usize,
    sub: usize,
}

#[derive(Debug, Clone)]
struct SynthState {
    /// Phase in [0, 1).
    phase: f32,
    band: usize,
    waveform: Waveform,
    pulse_width: u8,
}

impl WaveformGenerator {
    /// Build the generator for a partial's cache entry and played note.
    ///
    /// Out-of-range PCM indexes clamp to the last entry; a resource set
    /// with no loop-table entries at all falls back to the synthesized
    /// square so a bad patch stays silent-safe instead of faulting.
    pub fn for_partial(entry: &PartialCacheEntry, note: u8, rom: &RomSet) -> Self {
        let param = &entry.param;
        let kind = match param.wave_source {
            WaveSource::Synth => GeneratorKind::Synth(SynthState {
                phase: 0.0,
                band: SynthTables::band_for_note(note),
                waveform: param.waveform,
                pulse_width: param.pulse_width.min(100),
            }),
            WaveSource::Pcm => match clamped_sample(rom, param.pcm_index as usize) {
                Some(desc) => GeneratorKind::Pcm(PcmState {
                    desc,
                    position: 0,
                    aggregate: None,
                }),
                None => fallback_synth(note),
            },
            WaveSource::PcmAggregate => match clamped_aggregate(rom, param.pcm_index as usize) {
                Some((list, desc)) => GeneratorKind::Pcm(PcmState {
                    desc,
                    position: 0,
                    aggregate: Some(AggregateState { list, sub: 0 }),
                }),
                None => fallback_synth(note),
            },
        };
        Self {
            kind,
            finished: false,
        }
    }

    /// A one-shot PCM sample ran off its end. The amplitude envelope is
    /// forced into decay when this reports true.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether this generator plays PCM frames. Decides how the caller
    /// converts a target frequency into a per-sample delta.
    #[inline]
    pub fn is_pcm(&self) -> bool {
        matches!(self.kind, GeneratorKind::Pcm(_))
    }

    /// Current integer PCM frame offset within the active sub-sample.
    /// Synthesized generators report zero.
    pub fn pcm_frame(&self) -> u64 {
        match &self.kind {
            GeneratorKind::Pcm(state) => state.position >> PCM_FRAC_BITS,
            GeneratorKind::Synth(_) => 0,
        }
    }

    /// Produce one raw sample and advance by `delta`.
    ///
    /// For PCM sources `delta` is the playback ratio; for synthesized
    /// sources it is the per-sample phase increment.
    pub fn next(&mut self, delta: f32, rom: &RomSet, tables: &SynthTables) -> f32 {
        if self.finished {
            return 0.0;
        }
        let delta = delta.clamp(0.0, 64.0);
        match &mut self.kind {
            GeneratorKind::Pcm(state) => pcm_next(state, delta, rom, &mut self.finished),
            GeneratorKind::Synth(state) => synth_next(state, delta, tables),
        }
    }
}

fn fallback_synth(note: u8) -> GeneratorKind {
    GeneratorKind::Synth(SynthState {
        phase: 0.0,
        band: SynthTables::band_for_note(note),
        waveform: Waveform::Square,
        pulse_width: 50,
    })
}

fn clamped_sample(rom: &RomSet, index: usize) -> Option<PcmSampleDesc> {
    let count = rom.sample_count();
    if count == 0 {
        return None;
    }
    rom.sample(index.min(count - 1))
}

fn clamped_aggregate(rom: &RomSet, index: usize) -> Option<(usize, PcmSampleDesc)> {
    let mut list = index;
    if rom.aggregate(list).is_none() {
        if index == 0 {
            return None;
        }
        list = 0;
        rom.aggregate(0)?;
    }
    let first = rom.aggregate(list)?[0];
    rom.sample(first as usize).map(|desc| (list, desc))
}

fn pcm_next(state: &mut PcmState, delta: f32, rom: &RomSet, finished: &mut bool) -> f32 {
    // Wrap or terminate before reading, so the offset visible to the
    // read below never reaches the sample length.
    loop {
        let len_fp = u64::from(state.desc.len) << PCM_FRAC_BITS;
        if state.position < len_fp {
            break;
        }
        if let Some(agg) = &mut state.aggregate {
            let Some(list) = rom.aggregate(agg.list) else {
                *finished = true;
                return 0.0;
            };
            agg.sub = (agg.sub + 1) % list.len();
            state.position -= len_fp;
            if let Some(next_desc) = rom.sample(list[agg.sub] as usize) {
                state.desc = next_desc;
            }
        } else if state.desc.looped {
            state.position -= len_fp;
        } else {
            *finished = true;
            return 0.0;
        }
    }

    let frames = rom.sample_frames(state.desc);
    let index = (state.position >> PCM_FRAC_BITS) as usize;
    let fraction = (state.position & (PCM_FRAC_ONE - 1)) as f32 / PCM_FRAC_ONE as f32;

    let out = if delta < 1.0 {
        let a = frames[index] as f32;
        let b = if index + 1 < frames.len() {
            frames[index + 1] as f32
        } else if state.desc.looped {
            frames[0] as f32
        } else {
            0.0
        };
        lerp(a, b, fraction)
    } else {
        // Box filter over the frames this step will skip.
        let span = (delta as usize).min(frames.len() - index);
        let mut acc = 0.0;
        for &frame in &frames[index..index + span] {
            acc += frame as f32;
        }
        acc / span as f32
    };

    state.position += (delta * PCM_FRAC_ONE as f32) as u64;
    out / 32768.0
}

fn synth_next(state: &mut SynthState, delta: f32, tables: &SynthTables) -> f32 {
    let band = &tables.wave_bands[state.band.min(tables.wave_bands.len() - 1)];
    let phase = state.phase;

    let out = match state.waveform {
        Waveform::Saw => {
            // Wide pulse widths swap in the octave-up table below a
            // phase threshold, narrowing the perceived duty cycle.
            let threshold = state.pulse_width as f32 / 200.0;
            if phase < threshold {
                read_cycle(&band.half, phase)
            } else {
                read_cycle(&band.full, phase)
            }
        }
        Waveform::Square => {
            // Difference of two phase-offset saw reads; the offset sets
            // the duty cycle.
            let offset = (state.pulse_width as f32 / 100.0).clamp(0.05, 0.95);
            let mut second = phase + offset;
            if second >= 1.0 {
                second -= 1.0;
            }
            (read_cycle(&band.full, phase) - read_cycle(&band.full, second)) * 0.5
        }
    };

    state.phase += delta;
    while state.phase >= 1.0 {
        state.phase -= 1.0;
    }
    out
}

/// Linearly interpolated read of one wavetable cycle at phase [0, 1).
#[inline]
fn read_cycle(table: &[f32], phase: f32) -> f32 {
    let exact = phase * WAVE_TABLE_LEN as f32;
    let index = exact as usize % WAVE_TABLE_LEN;
    let next = (index + 1) % WAVE_TABLE_LEN;
    lerp(table[index], table[next], exact - exact as usize as f32)
}
