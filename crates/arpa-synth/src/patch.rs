//! Patch and timbre parameter decoding, and the per-note snapshot cache.
//!
//! Device memory stores patches and timbres as raw byte blocks (see
//! [`crate::memory`]); this module gives them typed views and flattens a
//! patch + timbre combination into a [`PatchCache`]. The cache is built
//! once per patch change and shared behind an `Arc`: a playing partial
//! clones the `Arc`, so a later patch change on the channel builds a new
//! cache without ever invalidating what the partial is still reading.
//!
//! Raw values are stored as the device transmitted them. Out-of-range
//! values are clamped where they are used, at table lookup, not here.

use std::sync::Arc;

use crate::tables::SynthTables;

/// Size of one patch block in device memory.
pub const PATCH_PARAM_LEN: usize = 8;

/// Size of one partial parameter block inside a timbre.
pub const PARTIAL_PARAM_LEN: usize = 60;

/// Size of one timbre block: 14 common bytes plus four partials.
pub const TIMBRE_PARAM_LEN: usize = 14 + 4 * PARTIAL_PARAM_LEN;

/// How a pair of partials combines into the mono pre-pan signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixMode {
    /// Both partials contribute their own output.
    #[default]
    Sum,
    /// The dependent contributes its own output plus the ring product.
    RingSum,
    /// The dependent contributes only the ring product; the owner is
    /// silent on the bus.
    Ring,
    /// Owner hard left, dependent hard right.
    Split,
}

impl MixMode {
    /// Map a raw structure value (0-12) onto a mix mode.
    ///
    /// Values above 12 clamp into the split group.
    pub fn from_structure(structure: u8) -> Self {
        match structure {
            0..=2 => MixMode::Sum,
            3..=5 => MixMode::RingSum,
            6..=8 => MixMode::Ring,
            _ => MixMode::Split,
        }
    }
}

/// Where a partial's raw samples come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaveSource {
    /// Bandlimited wavetable synthesis.
    #[default]
    Synth,
    /// One entry of the PCM loop table.
    Pcm,
    /// An aggregate percussion voice.
    PcmAggregate,
}

impl WaveSource {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => WaveSource::Pcm,
            2 => WaveSource::PcmAggregate,
            _ => WaveSource::Synth,
        }
    }
}

/// Synthesized waveform shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Waveform {
    /// Two phase-offset sawtooth reads, subtracted.
    #[default]
    Square,
    /// Direct sawtooth read with pulse-width table select.
    Saw,
}

/// One bias attenuation curve: level falls off with key distance from a
/// pivot note, on one side of it only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BiasPoint {
    /// Pivot note number.
    pub pivot: u8,
    /// Attenuate notes above the pivot instead of below.
    pub above: bool,
    /// Slope selector, 0 (flat) to 12 (steepest).
    pub level: u8,
}

impl BiasPoint {
    /// Decode from the packed point byte (bit 7 = direction) and the
    /// level byte.
    pub fn from_bytes(point: u8, level: u8) -> Self {
        Self {
            pivot: point & 0x7F,
            above: point & 0x80 != 0,
            level,
        }
    }

    /// Linear gain this bias contributes for a played note.
    pub fn gain(&self, tables: &SynthTables, note: u8) -> f32 {
        let distance = if self.above {
            note.saturating_sub(self.pivot)
        } else {
            self.pivot.saturating_sub(note)
        };
        tables.bias_gain(self.level, distance)
    }
}

/// Raw envelope description as stored in a partial parameter block.
///
/// Times and levels are raw 0-100 table indexes. `segments` counts the
/// attack segments including the terminal sustain segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnvParam {
    /// Per-segment raw times. Only the first `segments` entries are used.
    pub times: [u8; 5],
    /// Per-segment raw target levels.
    pub levels: [u8; 5],
    /// Raw level before the first segment runs.
    pub start_level: u8,
    /// Raw level the release ramp aims for.
    pub release_level: u8,
    /// Number of segments, 4 or 5.
    pub segments: u8,
    /// Raw key-follow selector applied to segment times.
    pub time_keyfollow: u8,
}

/// One partial's full parameter block, decoded from 60 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartialParam {
    /// Coarse pitch in semitones, 0-96 with 24 centered on the note.
    pub pitch_coarse: u8,
    /// Fine pitch, 0-100 with 50 centered.
    pub pitch_fine: u8,
    /// Pitch key-follow selector, 0-16.
    pub pitch_keyfollow: u8,
    /// Whether the channel bender reaches this partial.
    pub bender_enabled: bool,

    /// Synthesized shape when `wave_source` is [`WaveSource::Synth`].
    pub waveform: Waveform,
    /// Sample source selector.
    pub wave_source: WaveSource,
    /// Loop-table or aggregate index, depending on `wave_source`.
    pub pcm_index: u8,
    /// Pulse width, 0-100.
    pub pulse_width: u8,

    /// Pitch envelope depth selector, 0-10.
    pub pitch_env_depth: u8,
    /// Pitch envelope velocity sensitivity, 0-100.
    pub pitch_env_velo: u8,
    /// Pitch envelope description.
    pub pitch_env: EnvParam,

    /// LFO rate, 0-100.
    pub lfo_rate: u8,
    /// LFO depth, 0-100.
    pub lfo_depth: u8,
    /// How strongly the modulation wheel adds LFO depth, 0-100.
    pub lfo_mod_sense: u8,

    /// Base cutoff, 0-100.
    pub cutoff: u8,
    /// Resonance, 0-30.
    pub resonance: u8,
    /// Cutoff key-follow selector, 0-16.
    pub filter_keyfollow: u8,
    /// Filter bias curves.
    pub filter_bias: [BiasPoint; 2],
    /// Filter envelope depth, 0-100.
    pub filter_env_depth: u8,
    /// Filter envelope velocity sensitivity, 0-100.
    pub filter_env_velo: u8,
    /// Key-follow applied to filter envelope depth, 0-4.
    pub filter_env_depth_keyfollow: u8,
    /// Filter envelope description.
    pub filter_env: EnvParam,

    /// Partial output level, 0-100.
    pub amp_level: u8,
    /// Velocity sensitivity, 0-100 with 50 neutral; below 50 the
    /// response direction reverses (soft strikes play louder).
    pub amp_velo_sense: u8,
    /// Amplitude bias curves.
    pub amp_bias: [BiasPoint; 2],
    /// Amplitude envelope description.
    pub amp_env: EnvParam,
}

impl PartialParam {
    /// Decode a 60-byte partial parameter block.
    pub fn from_bytes(bytes: &[u8; PARTIAL_PARAM_LEN]) -> Self {
        Self {
            pitch_coarse: bytes[0],
            pitch_fine: bytes[1],
            pitch_keyfollow: bytes[2],
            bender_enabled: bytes[3] != 0,

            waveform: if bytes[4] & 1 != 0 {
                Waveform::Saw
            } else {
                Waveform::Square
            },
            wave_source: WaveSource::from_raw(bytes[5]),
            pcm_index: bytes[6],
            pulse_width: bytes[7],

            pitch_env_depth: bytes[8],
            pitch_env_velo: bytes[9],
            pitch_env: EnvParam {
                time_keyfollow: bytes[10],
                times: [bytes[11], bytes[12], bytes[13], bytes[14], 0],
                start_level: bytes[15],
                levels: [bytes[16], bytes[17], bytes[18], bytes[19], 0],
                release_level: bytes[20],
                segments: 4,
            },

            lfo_rate: bytes[21],
            lfo_depth: bytes[22],
            lfo_mod_sense: bytes[23],

            cutoff: bytes[24],
            resonance: bytes[25],
            filter_keyfollow: bytes[26],
            filter_bias: [
                BiasPoint::from_bytes(bytes[27], bytes[28]),
                BiasPoint::from_bytes(bytes[29], bytes[30]),
            ],
            filter_env_depth: bytes[31],
            filter_env_velo: bytes[32],
            filter_env_depth_keyfollow: bytes[33],
            filter_env: EnvParam {
                time_keyfollow: bytes[34],
                times: [bytes[35], bytes[36], bytes[37], bytes[38], bytes[39]],
                levels: [bytes[40], bytes[41], bytes[42], bytes[43], bytes[44]],
                start_level: 0,
                release_level: 0,
                segments: 5,
            },

            amp_level: bytes[45],
            amp_velo_sense: bytes[46],
            amp_bias: [
                BiasPoint::from_bytes(bytes[47], bytes[48]),
                BiasPoint::from_bytes(bytes[49], bytes[50]),
            ],
            amp_env: EnvParam {
                time_keyfollow: bytes[51],
                times: [bytes[52], bytes[53], bytes[54], bytes[55], 0],
                levels: [bytes[56], bytes[57], bytes[58], bytes[59], 0],
                start_level: 0,
                release_level: 0,
                segments: 4,
            },
        }
    }
}

/// Patch block: which timbre a channel plays and how it is transposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatchParam {
    /// Timbre bank, 0-3.
    pub timbre_group: u8,
    /// Timbre number within the bank, 0-63.
    pub timbre_num: u8,
    /// Key shift, 0-48 with 24 centered.
    pub key_shift: u8,
    /// Fine tune, 0-100 with 50 centered.
    pub fine_tune: u8,
    /// Bender range in semitones, 0-24.
    pub bender_range: u8,
    /// Poly assignment mode, 0-3.
    pub assign_mode: u8,
    /// Route this patch through the reverb send.
    pub reverb_switch: bool,
}

impl PatchParam {
    /// Decode an 8-byte patch block.
    pub fn from_bytes(bytes: &[u8; PATCH_PARAM_LEN]) -> Self {
        Self {
            timbre_group: bytes[0],
            timbre_num: bytes[1],
            key_shift: bytes[2],
            fine_tune: bytes[3],
            bender_range: bytes[4],
            assign_mode: bytes[5],
            reverb_switch: bytes[6] != 0,
        }
    }

    /// Index into the flat 192-entry timbre bank.
    ///
    /// Groups 0 and 1 are the two factory banks, group 2 the memory
    /// bank. Group 3 (rhythm) aliases into group 2's range.
    pub fn timbre_index(&self) -> usize {
        let group = (self.timbre_group as usize).min(2);
        group * 64 + (self.timbre_num as usize).min(63)
    }
}

/// Timbre block: common section plus four partial parameter blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimbreParam {
    /// Display name, raw bytes.
    pub name: [u8; 10],
    /// Structure selector for the partial 1/2 pair.
    pub structure12: u8,
    /// Structure selector for the partial 3/4 pair.
    pub structure34: u8,
    /// Bit n set means partial n sounds.
    pub enable_mask: u8,
    /// The timbre decays on its own schedule and ignores note-off.
    pub non_sustain: bool,
    /// The four partial blocks.
    pub partials: [PartialParam; 4],
}

impl TimbreParam {
    /// Decode a 254-byte timbre block.
    pub fn from_bytes(bytes: &[u8; TIMBRE_PARAM_LEN]) -> Self {
        let mut name = [0u8; 10];
        name.copy_from_slice(&bytes[0..10]);

        let partial_at = |n: usize| {
            let start = 14 + n * PARTIAL_PARAM_LEN;
            let mut block = [0u8; PARTIAL_PARAM_LEN];
            block.copy_from_slice(&bytes[start..start + PARTIAL_PARAM_LEN]);
            PartialParam::from_bytes(&block)
        };

        Self {
            name,
            structure12: bytes[10],
            structure34: bytes[11],
            enable_mask: bytes[12] & 0x0F,
            non_sustain: bytes[13] & 1 != 0,
            partials: [partial_at(0), partial_at(1), partial_at(2), partial_at(3)],
        }
    }
}

/// One partial's slice of a [`PatchCache`].
#[derive(Debug, Clone, Copy)]
pub struct PartialCacheEntry {
    /// Whether this partial sounds at all.
    pub enabled: bool,
    /// Mix mode of the pair this partial belongs to.
    pub mix_mode: MixMode,
    /// Index of the partner partial within the poly, if it also sounds.
    pub pair: Option<u8>,
    /// The lower-indexed member of a pair renders first and feeds the
    /// ring modulator.
    pub is_pair_owner: bool,
    /// The decoded partial parameters.
    pub param: PartialParam,
}

/// Immutable flattening of one patch + timbre combination.
///
/// Built by the channel on patch or timbre changes, shared with playing
/// partials via `Arc` so in-flight notes keep sounding with the
/// parameters they started with.
#[derive(Debug, Clone)]
pub struct PatchCache {
    /// False when no partial is enabled; note-ons are no-ops.
    pub playable: bool,
    /// Number of partial slots a note on this patch consumes.
    pub partial_count: u8,
    /// Sustaining timbres hold at the terminal segment until note-off.
    pub sustain: bool,
    /// Reverb send enabled for this patch.
    pub reverb: bool,
    /// Patch-level key shift, 0-48 with 24 centered.
    pub key_shift: u8,
    /// Patch-level fine tune, 0-100 with 50 centered.
    pub fine_tune: u8,
    /// Bender range in semitones.
    pub bender_range: u8,
    /// Per-partial entries, indexed by partial-within-poly.
    pub partials: [PartialCacheEntry; 4],
}

impl PatchCache {
    /// Flatten a patch and its timbre into a cache snapshot.
    pub fn build(patch: &PatchParam, timbre: &TimbreParam) -> Arc<Self> {
        let mask = timbre.enable_mask;
        let enabled = |n: u8| mask & (1 << n) != 0;

        let entry = |n: u8| {
            let structure = if n < 2 {
                timbre.structure12
            } else {
                timbre.structure34
            };
            let partner = n ^ 1;
            PartialCacheEntry {
                enabled: enabled(n),
                mix_mode: MixMode::from_structure(structure),
                pair: (enabled(n) && enabled(partner)).then_some(partner),
                is_pair_owner: n & 1 == 0,
                param: timbre.partials[n as usize],
            }
        };

        Arc::new(Self {
            playable: mask != 0,
            partial_count: mask.count_ones() as u8,
            sustain: !timbre.non_sustain,
            reverb: patch.reverb_switch,
            key_shift: patch.key_shift,
            fine_tune: patch.fine_tune,
            bender_range: patch.bender_range,
            partials: [entry(0), entry(1), entry(2), entry(3)],
        })
    }
}
