//! One slot of the 32-voice partial pool.
//!
//! A [`Partial`] is a global resource: it either sits idle or carries
//! the full render state of one voice of one note. Everything a voice
//! needs per sample lives inline in [`Partial`] so the render loop
//! walks a flat array with no indirection. Activation flattens the
//! patch parameters into precomputed scalars; the per-sample path is
//! three envelope ticks, one waveform read and one filter pass.
//!
//! Pair mixing happens in a second pass. [`Partial::render`] produces
//! the mono pre-mix sample and parks it; [`Partial::mix`] then combines
//! it with the partner slot's parked sample according to the pair's
//! structure. Rendering all partials before mixing any guarantees a
//! ring modulator always sees its partner's current-sample output.

use std::sync::Arc;

use libm::{powf, sinf};

use crate::envelope::{EnvelopeGenerator, EnvelopeProgram, time_keyfollow_scale};
use crate::filter::{FilterEngine, FilterHistory};
use crate::patch::{MixMode, PatchCache};
use crate::rom::RomSet;
use crate::tables::{NOISE_LEN, SynthTables};
use crate::waveform::WaveformGenerator;

/// Number of partial slots shared by all channels.
pub const PARTIAL_COUNT: usize = 32;

/// Pitch envelope full-swing range in semitones, indexed by the raw
/// 0-10 depth selector.
const PITCH_ENV_RANGE_SEMIS: [f32; 11] =
    [0.0, 0.5, 1.0, 2.0, 3.0, 4.0, 6.0, 9.0, 12.0, 24.0, 48.0];

/// Reference note for pitch and cutoff key scaling.
const KEY_PIVOT: f32 = 60.0;

/// Everything needed to bring a partial slot to life for one note.
#[derive(Debug, Clone)]
pub struct PartialStart {
    /// Owning channel index.
    pub channel: u8,
    /// Poly slot within the channel.
    pub poly_slot: u8,
    /// Partial index within the poly, 0-3.
    pub partial_index: u8,
    /// MIDI note number.
    pub note: u8,
    /// Note-on velocity.
    pub velocity: u8,
    /// Parameter snapshot the voice plays with for its whole life.
    pub cache: Arc<PatchCache>,
    /// Global slot index of the structure partner, when it got a slot.
    pub pair_slot: Option<u8>,
    /// Channel bend ratio at note-on.
    pub bend_ratio: f32,
    /// Channel modulation wheel at note-on.
    pub modulation: u8,
    /// Channel volume as linear gain.
    pub channel_gain: f32,
    /// Left pan gain.
    pub pan_left: f32,
    /// Right pan gain.
    pub pan_right: f32,
    /// Fixed extra gain folded in at note-on; carries the per-drum
    /// output level on the rhythm channel. 1.0 elsewhere.
    pub extra_gain: f32,
    /// Master tune as a frequency ratio, sampled once at note-on.
    pub master_tune_ratio: f32,
}

/// Live render state; present only while the slot plays.
#[derive(Debug, Clone)]
struct VoiceState {
    channel: u8,
    poly_slot: u8,
    partial_index: u8,
    note: u8,

    mix_mode: MixMode,
    pair_slot: Option<u8>,
    is_pair_owner: bool,
    bender_enabled: bool,
    reverb: bool,

    pitch_env: EnvelopeGenerator,
    filter_env: EnvelopeGenerator,
    amp_env: EnvelopeGenerator,
    wave: WaveformGenerator,
    history: FilterHistory,

    /// Note frequency with key follow, transposition and tuning applied.
    base_freq: f32,
    /// Frequency at which PCM plays back at unit ratio.
    pcm_root_freq: f32,
    pitch_env_depth_semis: f32,

    lfo_phase: f32,
    lfo_rate_hz: f32,
    lfo_depth_cents: f32,
    lfo_mod_cents: f32,

    // Live channel state, pushed by the owning channel on controller
    // changes.
    modulation: u8,
    bend_ratio: f32,
    channel_gain: f32,
    pan_left: f32,
    pan_right: f32,

    /// Cutoff table position before the filter envelope contribution.
    cutoff_base: f32,
    /// Table steps added at full filter envelope swing.
    filter_env_depth_steps: f32,
    filter_bias: f32,
    resonance: f32,

    /// Static gain: output level, velocity response and amplitude bias.
    amp_scale: f32,

    noise_cursor: usize,
    last_mono: f32,
}

/// One global partial slot.
#[derive(Debug, Clone, Default)]
pub struct Partial {
    /// Render callbacks survived since activation. Stealing prefers the
    /// highest value.
    age: u64,
    state: Option<VoiceState>,
}

impl Partial {
    /// Whether the slot currently carries a voice.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    /// Owning channel, while active.
    #[inline]
    pub fn channel(&self) -> Option<u8> {
        self.state.as_ref().map(|s| s.channel)
    }

    /// Owning poly slot, while active.
    #[inline]
    pub fn poly_slot(&self) -> Option<u8> {
        self.state.as_ref().map(|s| s.poly_slot)
    }

    /// Index within the owning poly, while active.
    #[inline]
    pub fn partial_index(&self) -> Option<u8> {
        self.state.as_ref().map(|s| s.partial_index)
    }

    /// Render callbacks since activation.
    #[inline]
    pub fn age(&self) -> u64 {
        self.age
    }

    /// Global slot index of the structure partner, while active.
    #[inline]
    pub fn pair_slot(&self) -> Option<u8> {
        self.state.as_ref().and_then(|s| s.pair_slot)
    }

    /// Whether this partial renders before its partner and feeds the
    /// ring modulator.
    #[inline]
    pub fn is_pair_owner(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.is_pair_owner)
    }

    /// The amplitude envelope has fully decayed; the slot can be freed.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.state.as_ref().is_none_or(|s| s.amp_env.is_decayed())
    }

    /// Mono pre-mix sample from the last [`Partial::render`] call.
    #[inline]
    pub fn last_mono(&self) -> f32 {
        self.state.as_ref().map_or(0.0, |s| s.last_mono)
    }

    /// Whether this voice routes through the reverb send.
    #[inline]
    pub fn reverb_send(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.reverb)
    }

    /// Re-link or sever the structure partner. Severed ring stages fall
    /// back to the noise table.
    pub fn set_pair_slot(&mut self, pair: Option<u8>) {
        if let Some(state) = &mut self.state {
            state.pair_slot = pair;
        }
    }

    /// Start a voice in this slot, flattening the patch snapshot into
    /// per-sample scalars. Any previous voice is discarded without a
    /// release ramp.
    pub fn activate(&mut self, start: PartialStart, rom: &RomSet, tables: &SynthTables) {
        let cache = start.cache;
        let entry = &cache.partials[(start.partial_index as usize).min(3)];
        let param = &entry.param;
        let note = start.note;
        let velocity = start.velocity.min(127);

        let shifted =
            (i32::from(note) + i32::from(cache.key_shift) - 24).clamp(0, 127) as u8;

        let pitch_kf = tables.key_follow[(param.pitch_keyfollow as usize).min(16)];
        let followed = KEY_PIVOT + (f32::from(shifted) - KEY_PIVOT) * pitch_kf
            + (f32::from(param.pitch_coarse) - 24.0);
        let base_freq = 440.0
            * powf(2.0, (followed - 69.0) / 12.0)
            * tables.fine_tune_ratio[(param.pitch_fine as usize).min(100)]
            * tables.fine_tune_ratio[(cache.fine_tune as usize).min(100)]
            * start.master_tune_ratio;

        let pitch_range =
            PITCH_ENV_RANGE_SEMIS[(param.pitch_env_depth as usize).min(10)];
        let pitch_velo = velocity_lerp(velocity, param.pitch_env_velo, tables);
        let pitch_env_depth_semis = pitch_range * pitch_velo;

        let filter_kf = tables.key_follow[(param.filter_keyfollow as usize).min(16)];
        let cutoff_base = f32::from(param.cutoff) / 100.0 * 127.0
            + (f32::from(shifted) - KEY_PIVOT) * filter_kf * 127.0 / 84.0;
        let filter_velo = velocity_lerp(velocity, param.filter_env_velo, tables);
        let depth_kf =
            f32::from(time_keyfollow_scale(param.filter_env_depth_keyfollow, shifted)) / 256.0;
        let filter_env_depth_steps =
            f32::from(param.filter_env_depth) / 100.0 * 127.0 * filter_velo * depth_kf;
        let filter_bias = param.filter_bias[0].gain(tables, shifted)
            * param.filter_bias[1].gain(tables, shifted);

        let amp_scale = tables.level_gain(f32::from(param.amp_level))
            * amp_velocity_gain(velocity, param.amp_velo_sense, tables)
            * param.amp_bias[0].gain(tables, shifted)
            * param.amp_bias[1].gain(tables, shifted)
            * start.extra_gain;

        tracing::trace!(
            channel = start.channel,
            poly = start.poly_slot,
            partial = start.partial_index,
            note,
            "partial activated"
        );

        self.age = 0;
        self.state = Some(VoiceState {
            channel: start.channel,
            poly_slot: start.poly_slot,
            partial_index: start.partial_index,
            note,

            mix_mode: entry.mix_mode,
            pair_slot: start.pair_slot,
            is_pair_owner: entry.is_pair_owner,
            bender_enabled: param.bender_enabled,
            reverb: cache.reverb,

            pitch_env: EnvelopeGenerator::new(EnvelopeProgram::from_param(
                &param.pitch_env,
                cache.sustain,
                shifted,
            )),
            filter_env: EnvelopeGenerator::new(EnvelopeProgram::from_param(
                &param.filter_env,
                cache.sustain,
                shifted,
            )),
            amp_env: EnvelopeGenerator::new(EnvelopeProgram::from_param(
                &param.amp_env,
                cache.sustain,
                shifted,
            )),
            wave: WaveformGenerator::for_partial(entry, shifted, rom),
            history: FilterHistory::default(),

            base_freq,
            pcm_root_freq: tables.note_freq[KEY_PIVOT as usize],
            pitch_env_depth_semis,

            lfo_phase: 0.0,
            lfo_rate_hz: tables.lfo_rate_hz[(param.lfo_rate as usize).min(100)],
            lfo_depth_cents: tables.lfo_depth_cents[(param.lfo_depth as usize).min(100)],
            lfo_mod_cents: tables.lfo_depth_cents[(param.lfo_mod_sense as usize).min(100)],

            modulation: start.modulation,
            bend_ratio: start.bend_ratio,
            channel_gain: start.channel_gain,
            pan_left: start.pan_left,
            pan_right: start.pan_right,

            cutoff_base,
            filter_env_depth_steps,
            filter_bias,
            resonance: f32::from(param.resonance.min(30)),

            amp_scale,

            noise_cursor: 0,
            last_mono: 0.0,
        });
    }

    /// Free the slot immediately, without any release ramp. This is the
    /// hard cut used when the slot is stolen for a new note.
    pub fn deactivate(&mut self) {
        self.age = 0;
        self.state = None;
    }

    /// Push all three envelopes into their decay ramps.
    pub fn start_decay(&mut self, tables: &SynthTables) {
        if let Some(state) = &mut self.state {
            state.pitch_env.start_decay(tables);
            state.filter_env.start_decay(tables);
            state.amp_env.start_decay(tables);
        }
    }

    /// Update the bend ratio from a live pitch-bend change.
    pub fn set_bend(&mut self, ratio: f32) {
        if let Some(state) = &mut self.state {
            state.bend_ratio = ratio;
        }
    }

    /// Update the modulation wheel position.
    pub fn set_modulation(&mut self, modulation: u8) {
        if let Some(state) = &mut self.state {
            state.modulation = modulation;
        }
    }

    /// Update the channel volume gain.
    pub fn set_channel_gain(&mut self, gain: f32) {
        if let Some(state) = &mut self.state {
            state.channel_gain = gain;
        }
    }

    /// Update the pan gains.
    pub fn set_pan(&mut self, left: f32, right: f32) {
        if let Some(state) = &mut self.state {
            state.pan_left = left;
            state.pan_right = right;
        }
    }

    /// Produce this slot's mono pre-mix sample and park it for the mix
    /// pass. Idle and fully decayed slots produce silence.
    pub fn render(&mut self, rom: &RomSet, tables: &SynthTables, filter: &FilterEngine) -> f32 {
        let Some(state) = &mut self.state else {
            return 0.0;
        };
        if state.amp_env.is_decayed() {
            state.last_mono = 0.0;
            return 0.0;
        }

        let pitch_raw = state.pitch_env.tick(tables);
        let filter_raw = state.filter_env.tick(tables);
        let amp_raw = state.amp_env.tick(tables);

        // The LFO only runs once the pitch envelope has settled into
        // its terminal segment, so vibrato never fights the attack.
        if state.pitch_env.is_sustaining() {
            state.lfo_phase += state.lfo_rate_hz / tables.sample_rate();
            if state.lfo_phase >= 1.0 {
                state.lfo_phase -= 1.0;
            }
        }
        let lfo_depth = state.lfo_depth_cents
            + state.lfo_mod_cents * f32::from(state.modulation) / 127.0;
        let lfo_cents = sinf(state.lfo_phase * core::f32::consts::TAU) * lfo_depth;

        let env_semis = (pitch_raw - 50.0) / 50.0 * state.pitch_env_depth_semis;
        let mut freq = state.base_freq * powf(2.0, (env_semis * 100.0 + lfo_cents) / 1200.0);
        if state.bender_enabled {
            freq *= state.bend_ratio;
        }

        let delta = if state.wave.is_pcm() {
            freq / state.pcm_root_freq
        } else {
            freq / tables.sample_rate()
        };
        let raw = state.wave.next(delta, rom, tables);
        if state.wave.is_finished() {
            state.amp_env.start_decay(tables);
        }

        let cutoff = state.cutoff_base
            + filter_raw / 100.0 * state.filter_env_depth_steps * state.filter_bias;
        let filtered = filter.process(cutoff, state.resonance, &mut state.history, raw);

        state.noise_cursor = (state.noise_cursor + 1) % NOISE_LEN;

        let mono =
            filtered * tables.level_gain(amp_raw) * state.amp_scale * state.channel_gain;
        state.last_mono = mono;
        mono
    }

    /// Combine the parked mono sample with the partner's according to
    /// the pair structure and return the stereo contribution.
    ///
    /// `partner` is the partner slot's parked sample when that slot is
    /// active; a ring stage with no live partner multiplies against the
    /// fixed noise table instead.
    pub fn mix(&self, partner: Option<f32>, tables: &SynthTables) -> (f32, f32) {
        let Some(state) = &self.state else {
            return (0.0, 0.0);
        };
        let m = state.last_mono;
        let noise = tables.noise[state.noise_cursor];

        let mono = match state.mix_mode {
            MixMode::Sum | MixMode::Split => m,
            MixMode::RingSum => match partner {
                Some(p) => {
                    if state.is_pair_owner {
                        m
                    } else {
                        m + m * p
                    }
                }
                None => m + m * noise,
            },
            MixMode::Ring => match partner {
                Some(p) => {
                    if state.is_pair_owner {
                        0.0
                    } else {
                        m * p
                    }
                }
                None => m * noise,
            },
        };

        if state.mix_mode == MixMode::Split {
            // Split structures hard-route the pair across the field:
            // the owner to the left bus, the partner to the right.
            if state.is_pair_owner {
                (mono, 0.0)
            } else {
                (0.0, mono)
            }
        } else {
            (mono * state.pan_left, mono * state.pan_right)
        }
    }
}

/// Linear blend between full response and velocity-proportional
/// response, selected by a 0-100 sensitivity.
fn velocity_lerp(velocity: u8, sensitivity: u8, tables: &SynthTables) -> f32 {
    let t = f32::from(sensitivity.min(100)) / 100.0;
    let v = tables.velocity_gain[(velocity as usize).min(127)];
    1.0 - t + t * v
}

/// Amplitude velocity response. Sensitivity 50 is flat; above it louder
/// strikes play louder, below it the curve inverts.
fn amp_velocity_gain(velocity: u8, sensitivity: u8, tables: &SynthTables) -> f32 {
    let s = (f32::from(sensitivity.min(100)) - 50.0) / 50.0;
    let effective = if s >= 0.0 {
        velocity.min(127)
    } else {
        127 - velocity.min(127)
    };
    1.0 - s.abs() * (1.0 - tables.velocity_gain[effective as usize])
}

/// The 32 global partial slots.
#[derive(Debug)]
pub struct PartialPool {
    slots: [Partial; PARTIAL_COUNT],
}

impl Default for PartialPool {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialPool {
    /// All slots idle.
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Partial::default()),
        }
    }

    /// Borrow one slot.
    #[inline]
    pub fn slot(&self, index: usize) -> &Partial {
        &self.slots[index]
    }

    /// Mutably borrow one slot.
    #[inline]
    pub fn slot_mut(&mut self, index: usize) -> &mut Partial {
        &mut self.slots[index]
    }

    /// Iterate all slots.
    pub fn iter(&self) -> impl Iterator<Item = &Partial> {
        self.slots.iter()
    }

    /// Mutably iterate all slots.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Partial> {
        self.slots.iter_mut()
    }

    /// Number of idle slots.
    pub fn free_count(&self) -> usize {
        self.slots.iter().filter(|p| !p.is_active()).count()
    }

    /// Advance every active slot's age by one render callback.
    pub fn age_tick(&mut self) {
        for partial in &mut self.slots {
            if partial.is_active() {
                partial.age += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{EnvParam, PartialParam, PatchParam, TimbreParam, WaveSource, Waveform};
    use crate::rom::testing::small_rom;
    use crate::tables::testing::shared;

    fn test_partial_param() -> PartialParam {
        PartialParam {
            pitch_coarse: 24,
            pitch_fine: 50,
            pitch_keyfollow: 11, // ratio 1.0
            wave_source: WaveSource::Synth,
            waveform: Waveform::Saw,
            pulse_width: 0,
            cutoff: 100,
            amp_level: 100,
            amp_velo_sense: 50,
            amp_env: EnvParam {
                times: [0, 0, 0, 0, 0],
                levels: [100, 100, 100, 100, 0],
                start_level: 0,
                release_level: 0,
                segments: 4,
                time_keyfollow: 0,
            },
            ..PartialParam::default()
        }
    }

    fn test_cache(param: PartialParam, structure12: u8, enable_mask: u8) -> Arc<PatchCache> {
        let patch = PatchParam {
            key_shift: 24,
            fine_tune: 50,
            bender_range: 2,
            ..PatchParam::default()
        };
        let timbre = TimbreParam {
            name: *b"TEST TONE ",
            structure12,
            structure34: 0,
            enable_mask,
            non_sustain: false,
            partials: [param; 4],
        };
        PatchCache::build(&patch, &timbre)
    }

    fn start_for(cache: &Arc<PatchCache>, partial_index: u8, pair_slot: Option<u8>) -> PartialStart {
        PartialStart {
            channel: 0,
            poly_slot: 0,
            partial_index,
            note: 60,
            velocity: 100,
            cache: Arc::clone(cache),
            pair_slot,
            bend_ratio: 1.0,
            modulation: 0,
            channel_gain: 1.0,
            pan_left: 0.7,
            pan_right: 0.7,
            extra_gain: 1.0,
            master_tune_ratio: 1.0,
        }
    }

    fn zero_crossings(partial: &mut Partial, rom: &crate::rom::RomSet, ticks: usize) -> usize {
        let tables = shared();
        let filter = FilterEngine::new(tables.sample_rate());
        // Let the amplitude attack settle first.
        for _ in 0..200 {
            partial.render(rom, tables, &filter);
        }
        let mut crossings = 0;
        let mut last = partial.render(rom, tables, &filter);
        for _ in 0..ticks {
            let now = partial.render(rom, tables, &filter);
            if (last < 0.0) != (now < 0.0) {
                crossings += 1;
            }
            last = now;
        }
        crossings
    }

    #[test]
    fn test_idle_slot_is_silent() {
        let rom = small_rom();
        let tables = shared();
        let filter = FilterEngine::new(tables.sample_rate());
        let mut partial = Partial::default();

        assert!(!partial.is_active());
        assert!(partial.is_finished());
        assert_eq!(partial.render(&rom, tables, &filter), 0.0);
        assert_eq!(partial.mix(None, tables), (0.0, 0.0));
    }

    #[test]
    fn test_active_partial_produces_audio() {
        let rom = small_rom();
        let tables = shared();
        let filter = FilterEngine::new(tables.sample_rate());
        let cache = test_cache(test_partial_param(), 0, 0b0001);
        let mut partial = Partial::default();
        partial.activate(start_for(&cache, 0, None), &rom, tables);

        let mut peak = 0.0f32;
        for _ in 0..2000 {
            peak = peak.max(partial.render(&rom, tables, &filter).abs());
        }
        assert!(peak > 0.05, "sustained saw should be audible, got {peak}");
        assert!(!partial.is_finished());
    }

    #[test]
    fn test_decay_reaches_silence_and_finishes() {
        let rom = small_rom();
        let tables = shared();
        let filter = FilterEngine::new(tables.sample_rate());
        let cache = test_cache(test_partial_param(), 0, 0b0001);
        let mut partial = Partial::default();
        partial.activate(start_for(&cache, 0, None), &rom, tables);

        for _ in 0..500 {
            partial.render(&rom, tables, &filter);
        }
        partial.start_decay(tables);

        let mut ticks = 0u32;
        while !partial.is_finished() {
            partial.render(&rom, tables, &filter);
            ticks += 1;
            assert!(ticks < 10_000, "decay must terminate");
        }
        assert_eq!(partial.render(&rom, tables, &filter), 0.0);
    }

    #[test]
    fn test_one_shot_pcm_forces_finish() {
        let rom = small_rom();
        let tables = shared();
        let filter = FilterEngine::new(tables.sample_rate());
        let mut param = test_partial_param();
        param.wave_source = WaveSource::Pcm;
        param.pcm_index = 1; // one-shot, 2048 frames
        let cache = test_cache(param, 0, 0b0001);
        let mut partial = Partial::default();
        partial.activate(start_for(&cache, 0, None), &rom, tables);

        // Never released, yet the sample running out must end the note.
        for _ in 0..6000 {
            partial.render(&rom, tables, &filter);
        }
        assert!(partial.is_finished(), "one-shot end must force amp decay");
    }

    #[test]
    fn test_bend_doubles_frequency_when_enabled() {
        let rom = small_rom();
        let tables = shared();
        let mut param = test_partial_param();
        param.bender_enabled = true;
        let cache = test_cache(param, 0, 0b0001);

        let mut flat = Partial::default();
        flat.activate(start_for(&cache, 0, None), &rom, tables);
        let baseline = zero_crossings(&mut flat, &rom, 4000);

        let mut bent = Partial::default();
        bent.activate(start_for(&cache, 0, None), &rom, tables);
        bent.set_bend(2.0);
        let doubled = zero_crossings(&mut bent, &rom, 4000);

        let ratio = doubled as f32 / baseline as f32;
        assert!(
            (ratio - 2.0).abs() < 0.2,
            "octave bend should double crossings: {baseline} -> {doubled}"
        );
    }

    #[test]
    fn test_bend_ignored_when_disabled() {
        let rom = small_rom();
        let tables = shared();
        let cache = test_cache(test_partial_param(), 0, 0b0001);

        let mut flat = Partial::default();
        flat.activate(start_for(&cache, 0, None), &rom, tables);
        let baseline = zero_crossings(&mut flat, &rom, 4000);

        let mut bent = Partial::default();
        bent.activate(start_for(&cache, 0, None), &rom, tables);
        bent.set_bend(2.0);
        let unchanged = zero_crossings(&mut bent, &rom, 4000);

        let diff = (unchanged as i32 - baseline as i32).abs();
        assert!(
            diff <= baseline as i32 / 10,
            "bend must not move pitch: {baseline} -> {unchanged}"
        );
    }

    #[test]
    fn test_ring_without_partner_uses_noise() {
        let rom = small_rom();
        let tables = shared();
        let filter = FilterEngine::new(tables.sample_rate());
        let cache = test_cache(test_partial_param(), 7, 0b0001); // ring, partner disabled
        let mut partial = Partial::default();
        partial.activate(start_for(&cache, 0, None), &rom, tables);

        for _ in 0..500 {
            partial.render(&rom, tables, &filter);
        }
        let m = partial.last_mono();
        let (left, _) = partial.mix(None, tables);
        // The small test resource makes the noise table a constant, so
        // the ring product is exactly mono times that constant.
        let noise = tables.noise[0];
        assert!(
            (left - m * noise * 0.7).abs() < 1e-5,
            "lone ring stage must multiply against noise"
        );
    }

    #[test]
    fn test_ring_owner_is_silent_dependent_carries_product() {
        let rom = small_rom();
        let tables = shared();
        let filter = FilterEngine::new(tables.sample_rate());
        let cache = test_cache(test_partial_param(), 7, 0b0011); // ring pair
        let mut owner = Partial::default();
        let mut dependent = Partial::default();
        owner.activate(start_for(&cache, 0, Some(1)), &rom, tables);
        dependent.activate(start_for(&cache, 1, Some(0)), &rom, tables);

        for _ in 0..500 {
            owner.render(&rom, tables, &filter);
            dependent.render(&rom, tables, &filter);
        }

        assert_eq!(
            owner.mix(Some(dependent.last_mono()), tables),
            (0.0, 0.0),
            "ring owner contributes only through the product"
        );
        let expected = dependent.last_mono() * owner.last_mono() * 0.7;
        let (left, right) = dependent.mix(Some(owner.last_mono()), tables);
        assert!((left - expected).abs() < 1e-5);
        assert!((right - expected).abs() < 1e-5);
    }

    #[test]
    fn test_split_routes_pair_hard_left_and_right() {
        let rom = small_rom();
        let tables = shared();
        let filter = FilterEngine::new(tables.sample_rate());
        let cache = test_cache(test_partial_param(), 12, 0b0011); // split pair
        let mut owner = Partial::default();
        let mut dependent = Partial::default();
        owner.activate(start_for(&cache, 0, Some(1)), &rom, tables);
        dependent.activate(start_for(&cache, 1, Some(0)), &rom, tables);

        for _ in 0..500 {
            owner.render(&rom, tables, &filter);
            dependent.render(&rom, tables, &filter);
        }

        let (_, owner_right) = owner.mix(Some(dependent.last_mono()), tables);
        let (dependent_left, _) = dependent.mix(Some(owner.last_mono()), tables);
        assert_eq!(owner_right, 0.0, "split owner stays on the left bus");
        assert_eq!(dependent_left, 0.0, "split partner stays on the right bus");
    }

    #[test]
    fn test_channel_gain_scales_output() {
        let rom = small_rom();
        let tables = shared();
        let filter = FilterEngine::new(tables.sample_rate());
        let cache = test_cache(test_partial_param(), 0, 0b0001);

        let mut loud = Partial::default();
        let mut quiet = Partial::default();
        loud.activate(start_for(&cache, 0, None), &rom, tables);
        quiet.activate(start_for(&cache, 0, None), &rom, tables);
        quiet.set_channel_gain(0.5);

        for _ in 0..500 {
            let a = loud.render(&rom, tables, &filter);
            let b = quiet.render(&rom, tables, &filter);
            assert!((b - a * 0.5).abs() < 1e-6, "gain must scale linearly");
        }
    }

    #[test]
    fn test_pool_age_tick_only_touches_active() {
        let rom = small_rom();
        let tables = shared();
        let cache = test_cache(test_partial_param(), 0, 0b0001);
        let mut pool = PartialPool::new();
        pool.slot_mut(3).activate(start_for(&cache, 0, None), &rom, tables);

        pool.age_tick();
        pool.age_tick();

        assert_eq!(pool.slot(3).age(), 2);
        assert_eq!(pool.slot(0).age(), 0);
        assert_eq!(pool.free_count(), PARTIAL_COUNT - 1);

        pool.slot_mut(3).deactivate();
        assert_eq!(pool.free_count(), PARTIAL_COUNT);
        assert_eq!(pool.slot(3).age(), 0, "deactivation resets age");
    }
}
