//! Multi-segment envelope state machine.
//!
//! Each partial runs three of these, one per kind (amplitude, filter,
//! pitch). The machine ramps through a table of raw target levels, holds
//! at the terminal segment for sustaining timbres, and decays toward a
//! release target when told to (note-off) or on its own (one-shot
//! timbres).
//!
//! Levels here are raw table-space values (0-100), interpolated
//! linearly. The nonlinear response lives in the lookup tables consumers
//! apply afterwards, so a linear ramp here matches the device's curved
//! amplitude and cutoff trajectories.

use crate::patch::EnvParam;
use crate::tables::SynthTables;
use libm::powf;

/// Octaves of time shortening per octave of key distance, indexed by the
/// raw time key-follow selector.
const TIME_KEYFOLLOW: [f32; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

/// Reference note for time key-follow.
const TIME_KEYFOLLOW_PIVOT: f32 = 60.0;

/// Compute the 8.8 fixed-point segment-time scale for a note.
///
/// 256 means unscaled; higher notes shorten segments when the selector
/// is nonzero. Out-of-range selectors clamp to the steepest curve.
pub fn time_keyfollow_scale(selector: u8, note: u8) -> u16 {
    let octaves = TIME_KEYFOLLOW[(selector as usize).min(TIME_KEYFOLLOW.len() - 1)];
    let distance = (note as f32 - TIME_KEYFOLLOW_PIVOT) / 12.0;
    let scale = 256.0 * powf(2.0, -distance * octaves);
    scale.clamp(16.0, 4096.0) as u16
}

/// Immutable per-note envelope description, flattened from raw patch
/// parameters at note-on.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeProgram {
    /// Raw segment times; only the first `ramp_count` entries run.
    pub times: [u8; 5],
    /// Raw segment target levels.
    pub targets: [f32; 5],
    /// Level before the first segment runs.
    pub start_level: f32,
    /// Number of ramp segments, 4 or 5. The final ramp's target is also
    /// the sustain level.
    pub ramp_count: u8,
    /// Hold at the terminal level until an external decay; one-shot
    /// programs decay on their own once the last ramp completes.
    pub sustain: bool,
    /// Raw time of the decay ramp. The final segment's time entry does
    /// double duty here, matching how the device reuses its table.
    pub decay_time: u8,
    /// Raw level the decay ramp ends at. Zero for amplitude and filter,
    /// patch-configurable for pitch.
    pub release_target: f32,
    /// 8.8 fixed-point factor applied to every table time.
    pub time_scale_256: u16,
}

impl EnvelopeProgram {
    /// Flatten a raw envelope block for one played note.
    pub fn from_param(param: &EnvParam, sustain: bool, note: u8) -> Self {
        let ramp_count = param.segments.clamp(1, 5);
        let mut targets = [0.0f32; 5];
        for (slot, &raw) in targets.iter_mut().zip(param.levels.iter()) {
            *slot = raw as f32;
        }
        Self {
            times: param.times,
            targets,
            start_level: param.start_level as f32,
            ramp_count,
            sustain,
            decay_time: param.times[(ramp_count - 1) as usize],
            release_target: param.release_level as f32,
            time_scale_256: time_keyfollow_scale(param.time_keyfollow, note),
        }
    }
}

/// Envelope state machine for one partial and one kind.
///
/// Created at note-on with segment index -1; every call to
/// [`EnvelopeGenerator::tick`] advances one sample and returns the raw
/// level.
#[derive(Debug, Clone)]
pub struct EnvelopeGenerator {
    program: EnvelopeProgram,
    /// Current segment, -1 before the first tick.
    segment: i8,
    /// Ticks elapsed in the current segment.
    position: u32,
    /// Segment length in ticks.
    length: u32,
    /// Level the current segment started from.
    start: f32,
    /// Level the current segment ramps toward.
    end: f32,
    sustaining: bool,
    decaying: bool,
    decayed: bool,
    /// Most recent computed level; a decay starts from here.
    last_level: f32,
}

impl EnvelopeGenerator {
    /// Create a generator that has not started yet.
    pub fn new(program: EnvelopeProgram) -> Self {
        let start_level = program.start_level;
        Self {
            program,
            segment: -1,
            position: 0,
            length: 0,
            start: start_level,
            end: start_level,
            sustaining: false,
            decaying: false,
            decayed: false,
            last_level: start_level,
        }
    }

    /// Advance one sample and return the raw level.
    pub fn tick(&mut self, tables: &SynthTables) -> f32 {
        if self.decayed {
            return self.program.release_target;
        }
        if self.sustaining {
            return self.last_level;
        }
        if self.segment < 0 {
            self.enter_ramp(0, tables);
        }

        let level = if self.position >= self.length {
            self.end
        } else {
            self.start + (self.end - self.start) * self.position as f32 / self.length as f32
        };
        self.last_level = level;

        if self.position >= self.length {
            self.complete_segment(tables);
        } else {
            self.position += 1;
        }
        level
    }

    /// Begin the decay ramp from the current level.
    ///
    /// Idempotent; a second call while already decaying does nothing, so
    /// note-off on an already-releasing poly cannot restart the ramp.
    pub fn start_decay(&mut self, tables: &SynthTables) {
        if self.decaying || self.decayed {
            return;
        }
        self.decaying = true;
        self.sustaining = false;
        self.start = self.last_level;
        self.end = self.program.release_target;
        self.length = self.scaled_length(self.program.decay_time, tables);
        self.position = 0;
    }

    /// The envelope has fully decayed. For the amplitude kind this is
    /// the authoritative end-of-note signal.
    #[inline]
    pub fn is_decayed(&self) -> bool {
        self.decayed
    }

    /// The decay ramp is running or finished.
    #[inline]
    pub fn is_decaying(&self) -> bool {
        self.decaying
    }

    /// Holding at the terminal segment level.
    #[inline]
    pub fn is_sustaining(&self) -> bool {
        self.sustaining
    }

    /// Most recent computed raw level.
    #[inline]
    pub fn level(&self) -> f32 {
        self.last_level
    }

    fn enter_ramp(&mut self, index: i8, tables: &SynthTables) {
        self.segment = index;
        self.start = self.last_level;
        self.end = self.program.targets[index as usize];
        self.length = self.scaled_length(self.program.times[index as usize], tables);
        self.position = 0;
    }

    fn complete_segment(&mut self, tables: &SynthTables) {
        if self.decaying {
            self.decayed = true;
            return;
        }
        let next = self.segment + 1;
        if next as u8 >= self.program.ramp_count {
            if self.program.sustain {
                self.sustaining = true;
            } else {
                self.start_decay(tables);
            }
        } else {
            self.enter_ramp(next, tables);
        }
    }

    fn scaled_length(&self, raw_time: u8, tables: &SynthTables) -> u32 {
        let base = tables.env_time[(raw_time as usize).min(tables.env_time.len() - 1)];
        ((u64::from(base) * u64::from(self.program.time_scale_256)) >> 8) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::testing::shared;

    fn program(times: [u8; 5], targets: [u8; 5], sustain: bool) -> EnvelopeProgram {
        let mut t = [0.0f32; 5];
        for (slot, &raw) in t.iter_mut().zip(targets.iter()) {
            *slot = raw as f32;
        }
        EnvelopeProgram {
            times,
            targets: t,
            start_level: 0.0,
            ramp_count: 4,
            sustain,
            decay_time: times[3],
            release_target: 0.0,
            time_scale_256: 256,
        }
    }

    #[test]
    fn test_segment_completion_is_exact() {
        let tables = shared();
        // Raw time 0 is 32 samples at 32 kHz.
        let mut env = EnvelopeGenerator::new(program([0, 0, 0, 0, 0], [80, 60, 70, 50, 0], true));

        let mut reached = false;
        for _ in 0..40 {
            let level = env.tick(tables);
            if level == 80.0 {
                reached = true;
                break;
            }
        }
        assert!(reached, "first segment must land on its target exactly");
    }

    #[test]
    fn test_reaches_sustain_and_holds() {
        let tables = shared();
        let mut env = EnvelopeGenerator::new(program([0, 0, 0, 0, 0], [80, 60, 70, 50, 0], true));

        for _ in 0..200 {
            env.tick(tables);
        }
        assert!(env.is_sustaining());
        assert_eq!(env.level(), 50.0, "sustain holds the final ramp target");
        assert_eq!(env.tick(tables), 50.0);
    }

    #[test]
    fn test_decay_starts_from_current_level() {
        let tables = shared();
        // Long first segment so we interrupt mid-ramp.
        let mut env = EnvelopeGenerator::new(program([60, 0, 0, 10, 0], [100, 0, 0, 0, 0], true));

        let mut before = 0.0;
        for _ in 0..1000 {
            before = env.tick(tables);
        }
        assert!(before > 0.0 && before < 100.0, "should be mid-ramp");

        env.start_decay(tables);
        let first_decay_tick = env.tick(tables);
        assert_eq!(
            first_decay_tick, before,
            "decay must continue from the pre-decay level"
        );

        let second = env.tick(tables);
        assert!(second < first_decay_tick, "then it must fall");
    }

    #[test]
    fn test_decay_completes_and_flags() {
        let tables = shared();
        let mut env = EnvelopeGenerator::new(program([0, 0, 0, 0, 0], [80, 60, 70, 50, 0], true));
        for _ in 0..200 {
            env.tick(tables);
        }
        env.start_decay(tables);
        // decay_time raw 0 is 32 samples.
        for _ in 0..40 {
            env.tick(tables);
        }
        assert!(env.is_decayed());
        assert_eq!(env.tick(tables), 0.0, "decayed amplitude is silence");
    }

    #[test]
    fn test_one_shot_decays_without_note_off() {
        let tables = shared();
        let mut env = EnvelopeGenerator::new(program([0, 0, 0, 0, 0], [80, 60, 70, 50, 0], false));
        for _ in 0..400 {
            env.tick(tables);
        }
        assert!(env.is_decayed(), "non-sustaining program must self-decay");
    }

    #[test]
    fn test_pitch_release_target_is_respected() {
        let tables = shared();
        let mut prog = program([0, 0, 0, 0, 0], [80, 60, 70, 50, 0], true);
        prog.release_target = 50.0;
        let mut env = EnvelopeGenerator::new(prog);
        for _ in 0..200 {
            env.tick(tables);
        }
        env.start_decay(tables);
        for _ in 0..40 {
            env.tick(tables);
        }
        assert_eq!(env.tick(tables), 50.0, "pitch decays to its release level");
    }

    #[test]
    fn test_start_decay_is_idempotent() {
        let tables = shared();
        let mut env = EnvelopeGenerator::new(program([0, 0, 0, 30, 0], [80, 60, 70, 50, 0], true));
        for _ in 0..200 {
            env.tick(tables);
        }
        env.start_decay(tables);
        for _ in 0..10 {
            env.tick(tables);
        }
        let mid = env.level();
        env.start_decay(tables);
        let next = env.tick(tables);
        assert!(
            next <= mid,
            "restarting an active decay must not jump the level back up"
        );
    }

    #[test]
    fn test_time_scale_doubles_length() {
        let tables = shared();
        let mut prog = program([20, 0, 0, 0, 0], [100, 0, 0, 0, 0], true);
        let base_len = tables.env_time[20];

        let ticks_to_target = |p: EnvelopeProgram| {
            let mut env = EnvelopeGenerator::new(p);
            let mut n = 0u32;
            loop {
                if env.tick(tables) == 100.0 {
                    return n;
                }
                n += 1;
                assert!(n < base_len * 4, "never reached target");
            }
        };

        let normal = ticks_to_target(prog);
        prog.time_scale_256 = 512;
        let doubled = ticks_to_target(prog);
        assert!(
            doubled >= normal * 2 - 2,
            "scale 512 should roughly double the ramp ({normal} vs {doubled})"
        );
    }

    #[test]
    fn test_keyfollow_scale_landmarks() {
        assert_eq!(time_keyfollow_scale(0, 96), 256, "selector 0 never scales");
        assert_eq!(time_keyfollow_scale(4, 60), 256, "pivot note is unscaled");
        assert_eq!(
            time_keyfollow_scale(4, 72),
            128,
            "one octave up halves times at full follow"
        );
        assert_eq!(time_keyfollow_scale(4, 48), 512);
        // Out-of-range selector clamps instead of panicking.
        assert_eq!(time_keyfollow_scale(200, 72), 128);
    }
}
