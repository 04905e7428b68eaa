//! The engine core: owns every subsystem and drives the render loop.
//!
//! ```text
//!  play_msg / write_sysex          render
//!        |                           |
//!        v                           v
//!  +-----------+   decisions   +-----------+     +------------+
//!  | channels  | ------------> | partial   | --> | dry bus    |--+
//!  | allocator |               | pool (32) |     | reverb bus |--+--> i16
//!  | memory    |               +-----------+     +------------+
//!  +-----------+
//! ```
//!
//! The `Synth` is the only place partial slots are activated or cut.
//! Channels and the allocator answer questions; every slot mutation
//! happens here so pair links and poly bookkeeping cannot drift apart.
//!
//! Rendering is two passes per frame: first every active slot produces
//! its mono sample, then each slot mixes against its structure
//! partner's sample from the same frame. Partials route to the dry or
//! reverb bus per their patch, the buses are summed under master
//! volume and saturated to interleaved stereo i16.

use std::sync::Arc;

use arpa_core::{pan_gains, saturate_i16};
use arpa_effects::{ReverbMode, RoomReverb};

use crate::allocator::{CHANNEL_COUNT, Evicted, PartialAllocator};
use crate::filter::FilterEngine;
use crate::memory::{DeviceMemory, MEMORY_TIMBRES, WriteEffect, packed_address, roland_checksum};
use crate::part::Channel;
use crate::partial::{PARTIAL_COUNT, PartialPool, PartialStart};
use crate::patch::{PatchCache, PatchParam, TimbreParam};
use crate::poly::{PARTIALS_PER_POLY, POLYS_PER_CHANNEL};
use crate::rom::RomSet;
use crate::tables::SynthTables;

/// Logical channel that plays the drum map instead of its patch.
pub const RHYTHM_CHANNEL: usize = 8;

/// Pan positions on the drum map span 0-14 with 7 centered.
const DRUM_PAN_RANGE: f32 = 14.0;

/// The complete synthesis engine.
///
/// Single-threaded by design: the host owns it and calls
/// [`play_msg`](Synth::play_msg), [`write_sysex`](Synth::write_sysex)
/// and [`render`](Synth::render) from one thread. The render path
/// allocates nothing.
#[derive(Debug)]
pub struct Synth {
    rom: RomSet,
    tables: SynthTables,
    filter: FilterEngine,
    memory: DeviceMemory,
    pool: PartialPool,
    allocator: PartialAllocator,
    channels: [Channel; CHANNEL_COUNT],
    reverb: RoomReverb,
    master_volume: f32,
}

impl Synth {
    /// Build an engine from a validated resource set.
    ///
    /// Derives every lookup table, loads the power-on patches into the
    /// melodic channels and applies the system defaults.
    pub fn new(rom: RomSet) -> Self {
        let memory = DeviceMemory::default();
        let tables = SynthTables::new(&rom);
        let filter = FilterEngine::new(rom.sample_rate());
        let reverb = RoomReverb::new(rom.sample_rate());
        let channels = core::array::from_fn(|part| {
            let patch = memory.patch_temp(part);
            let timbre = memory.timbre_temp(part);
            Channel::new(part as u8, PatchCache::build(&patch, &timbre))
        });

        let mut synth = Self {
            rom,
            tables,
            filter,
            memory,
            pool: PartialPool::new(),
            allocator: PartialAllocator::new(),
            channels,
            reverb,
            master_volume: 1.0,
        };
        synth.apply_system();
        for part in 0..RHYTHM_CHANNEL {
            synth.refresh_channel(part);
        }
        tracing::info!(
            sample_rate = synth.rom.sample_rate(),
            samples = synth.rom.sample_count(),
            "engine initialized"
        );
        synth
    }

    /// Output sample rate, fixed by the resource set.
    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.rom.sample_rate()
    }

    /// Read access to the device memory image.
    pub fn memory(&self) -> &DeviceMemory {
        &self.memory
    }

    /// One logical channel's state.
    pub fn channel(&self, part: usize) -> &Channel {
        &self.channels[part]
    }

    /// Partial slots currently sounding.
    pub fn active_partials(&self) -> usize {
        PARTIAL_COUNT - self.pool.free_count()
    }

    /// Dispatch one channel-voice message.
    ///
    /// `status` carries the message kind and MIDI channel; two-byte
    /// messages (program change) ignore `data2`. Messages on MIDI
    /// channels no logical channel listens on are dropped.
    pub fn play_msg(&mut self, status: u8, data1: u8, data2: u8) {
        let midi_channel = status & 0x0F;
        let assign = self.memory.chan_assign();
        let Some(part) = assign.iter().position(|&a| a == midi_channel) else {
            tracing::trace!(midi_channel, "no channel assigned, message dropped");
            return;
        };

        match status & 0xF0 {
            0x80 => self.note_off(part, data1),
            0x90 if data2 == 0 => self.note_off(part, data1),
            0x90 => self.note_on(part, data1, data2),
            0xB0 => self.control_change(part, data1, data2),
            0xC0 => self.program_change(part, data1),
            0xE0 => self.pitch_bend(part, data1, data2),
            kind => tracing::trace!(kind, "unsupported message kind ignored"),
        }
    }

    /// Apply a Roland DT1 system-exclusive write.
    ///
    /// Expects the full frame, `F0 41 dev 16 12 addr×3 data… sum F7`.
    /// Malformed frames and checksum mismatches are logged and dropped;
    /// the return value reports whether the write was applied.
    pub fn write_sysex(&mut self, message: &[u8]) -> bool {
        let len = message.len();
        if len < 11
            || message[0] != 0xF0
            || message[1] != 0x41
            || message[3] != 0x16
            || message[4] != 0x12
            || message[len - 1] != 0xF7
        {
            tracing::warn!(len, "malformed sysex frame dropped");
            return false;
        }
        let body = &message[5..len - 2];
        let expected = roland_checksum(body);
        if message[len - 2] != expected {
            tracing::warn!(
                got = message[len - 2],
                expected,
                "sysex checksum mismatch, frame dropped"
            );
            return false;
        }

        let address = packed_address([body[0], body[1], body[2]]);
        let effect = self.memory.apply(address, &body[3..]);
        self.apply_write_effect(effect);
        true
    }

    /// Render interleaved stereo frames. A trailing unpaired sample is
    /// left untouched.
    pub fn render(&mut self, out: &mut [i16]) {
        self.pool.age_tick();
        for frame in out.chunks_exact_mut(2) {
            for slot in 0..PARTIAL_COUNT {
                self.pool
                    .slot_mut(slot)
                    .render(&self.rom, &self.tables, &self.filter);
            }

            let mut dry = (0.0f32, 0.0f32);
            let mut send = (0.0f32, 0.0f32);
            for slot in 0..PARTIAL_COUNT {
                let partial = self.pool.slot(slot);
                if !partial.is_active() {
                    continue;
                }
                let partner = partial.pair_slot().and_then(|p| {
                    let other = self.pool.slot(usize::from(p));
                    other.is_active().then(|| other.last_mono())
                });
                let (left, right) = partial.mix(partner, &self.tables);
                if partial.reverb_send() {
                    send.0 += left;
                    send.1 += right;
                } else {
                    dry.0 += left;
                    dry.1 += right;
                }
            }

            let (wet_left, wet_right) = self.reverb.process(send.0, send.1);
            let left = (dry.0 + wet_left) * self.master_volume;
            let right = (dry.1 + wet_right) * self.master_volume;
            frame[0] = saturate_i16((left * 32767.0) as i32);
            frame[1] = saturate_i16((right * 32767.0) as i32);

            self.reap_finished();
        }
    }

    fn note_on(&mut self, part: usize, note: u8, velocity: u8) {
        if part == RHYTHM_CHANNEL {
            return self.drum_note_on(note, velocity);
        }
        let cache = Arc::clone(self.channels[part].cache());
        if !cache.playable {
            tracing::trace!(channel = part, note, "patch has no enabled partials");
            return;
        }
        let pan = self.channels[part].pan_gains();
        self.start_note(part, note, velocity, cache, 1.0, pan);
    }

    fn drum_note_on(&mut self, note: u8, velocity: u8) {
        let Some(drum) = self.rom.drum_program(note) else {
            tracing::trace!(note, "unmapped drum note dropped");
            return;
        };
        let patch = PatchParam {
            timbre_group: 3,
            timbre_num: drum.timbre,
            key_shift: 24,
            fine_tune: 50,
            bender_range: 0,
            assign_mode: 0,
            reverb_switch: drum.reverb,
        };
        let bytes = self.memory.timbre_raw(usize::from(drum.timbre), &self.rom);
        let timbre = TimbreParam::from_bytes(&bytes);
        let cache = PatchCache::build(&patch, &timbre);
        if !cache.playable {
            tracing::trace!(note, "drum timbre has no enabled partials");
            return;
        }

        let extra_gain = self.tables.level_gain(f32::from(drum.output_level.min(100)));
        let pan = pan_gains(f32::from(drum.panpot.min(14)) / DRUM_PAN_RANGE);
        self.start_note(RHYTHM_CHANNEL, note, velocity, cache, extra_gain, pan);
    }

    /// Common note-on tail: retrigger, slot acquisition, activation and
    /// pair linking.
    fn start_note(
        &mut self,
        part: usize,
        note: u8,
        velocity: u8,
        cache: Arc<PatchCache>,
        extra_gain: f32,
        pan: (f32, f32),
    ) {
        if let Some(poly_index) = self.channels[part].playing_poly_with_note(note) {
            self.release_poly(part, poly_index);
        }

        let needed = usize::from(cache.partial_count);
        let Some(evictions) = self.allocator.request_free(&self.pool, part as u8, needed) else {
            tracing::debug!(channel = part, note, needed, "pool exhausted, note dropped");
            return;
        };
        for evicted in evictions {
            self.apply_eviction(evicted);
        }

        let poly_index = match self.channels[part].idle_poly() {
            Some(index) => index,
            None => {
                let Some(oldest) = self.channels[part].oldest_active_poly() else {
                    return;
                };
                self.abort_poly(part, oldest);
                oldest
            }
        };

        let bend_ratio = self.channels[part].bend_ratio();
        let modulation = self.channels[part].modulation();
        let channel_gain = self.channels[part].gain();
        let master_tune_ratio = self.memory.master_tune_ratio();

        let mut slots = [None; PARTIALS_PER_POLY];
        for partial_index in 0..PARTIALS_PER_POLY {
            if !cache.partials[partial_index].enabled {
                continue;
            }
            let Some(slot) = self.allocator.claim(&self.pool, part as u8) else {
                break;
            };
            slots[partial_index] = Some(slot as u8);
            let start = PartialStart {
                channel: part as u8,
                poly_slot: poly_index as u8,
                partial_index: partial_index as u8,
                note,
                velocity,
                cache: Arc::clone(&cache),
                pair_slot: None,
                bend_ratio,
                modulation,
                channel_gain,
                pan_left: pan.0,
                pan_right: pan.1,
                extra_gain,
                master_tune_ratio,
            };
            self.pool
                .slot_mut(slot)
                .activate(start, &self.rom, &self.tables);
        }

        // Partner slots are only known once every claim has landed.
        for partial_index in 0..PARTIALS_PER_POLY {
            let Some(slot) = slots[partial_index] else {
                continue;
            };
            let pair = cache.partials[partial_index]
                .pair
                .and_then(|partner| slots[usize::from(partner)]);
            self.pool.slot_mut(usize::from(slot)).set_pair_slot(pair);
        }

        self.channels[part].start_poly(poly_index, note, velocity, slots);
    }

    fn note_off(&mut self, part: usize, note: u8) {
        if part == RHYTHM_CHANNEL {
            return;
        }
        let Some(poly_index) = self.channels[part].playing_poly_with_note(note) else {
            return;
        };
        if !self.channels[part].poly(poly_index).sustain() {
            return;
        }
        if self.channels[part].pedal() {
            self.channels[part].poly_mut(poly_index).set_pedal_hold();
        } else {
            self.release_poly(part, poly_index);
        }
    }

    fn control_change(&mut self, part: usize, controller: u8, value: u8) {
        match controller {
            1 => {
                self.channels[part].set_modulation(value);
                self.push_to_channel(part, |partial| partial.set_modulation(value));
            }
            7 => {
                self.channels[part].set_volume(value);
                let gain = self.channels[part].gain();
                self.push_to_channel(part, |partial| partial.set_channel_gain(gain));
            }
            10 => {
                self.channels[part].set_pan(value);
                // Drum voices keep their per-instrument pan positions.
                if part != RHYTHM_CHANNEL {
                    let (left, right) = self.channels[part].pan_gains();
                    self.push_to_channel(part, |partial| partial.set_pan(left, right));
                }
            }
            64 => {
                let down = value >= 64;
                self.channels[part].set_pedal(down);
                if !down {
                    self.release_held_polys(part);
                }
            }
            121 => {
                self.channels[part].reset_controllers();
                self.push_to_channel(part, |partial| {
                    partial.set_bend(1.0);
                    partial.set_modulation(0);
                });
                self.release_held_polys(part);
            }
            123 => self.all_notes_off(part),
            other => tracing::trace!(channel = part, controller = other, "controller ignored"),
        }
    }

    fn program_change(&mut self, part: usize, program: u8) {
        if part == RHYTHM_CHANNEL {
            return;
        }
        self.memory.load_patch(part, usize::from(program));
        self.refresh_channel(part);
        self.release_playing_polys(part);
    }

    fn pitch_bend(&mut self, part: usize, lsb: u8, msb: u8) {
        if part == RHYTHM_CHANNEL {
            return;
        }
        let bend = u16::from(lsb & 0x7F) | (u16::from(msb & 0x7F) << 7);
        self.channels[part].set_bend(bend);
        let ratio = self.channels[part].bend_ratio();
        self.push_to_channel(part, |partial| partial.set_bend(ratio));
    }

    /// Note-off for the whole channel, honoring the hold pedal.
    fn all_notes_off(&mut self, part: usize) {
        let pedal = self.channels[part].pedal();
        for poly_index in 0..POLYS_PER_CHANNEL {
            if !self.channels[part].poly(poly_index).is_playing() {
                continue;
            }
            if pedal {
                self.channels[part].poly_mut(poly_index).set_pedal_hold();
            } else {
                self.release_poly(part, poly_index);
            }
        }
    }

    fn release_held_polys(&mut self, part: usize) {
        for poly_index in 0..POLYS_PER_CHANNEL {
            if self.channels[part].poly(poly_index).pedal_hold() {
                self.release_poly(part, poly_index);
            }
        }
    }

    fn release_playing_polys(&mut self, part: usize) {
        for poly_index in 0..POLYS_PER_CHANNEL {
            if self.channels[part].poly(poly_index).is_playing() {
                self.release_poly(part, poly_index);
            }
        }
    }

    /// Start the release decays on every partial the poly still holds.
    fn release_poly(&mut self, part: usize, poly_index: usize) {
        self.channels[part].poly_mut(poly_index).begin_release();
        let slots = self.channels[part].poly(poly_index).partial_slots();
        for slot in slots.into_iter().flatten() {
            self.pool.slot_mut(usize::from(slot)).start_decay(&self.tables);
        }
    }

    /// Hard-stop a poly, cutting its partials without release.
    fn abort_poly(&mut self, part: usize, poly_index: usize) {
        let slots = self.channels[part].poly_mut(poly_index).abort();
        for slot in slots.into_iter().flatten() {
            self.cut_slot(usize::from(slot));
        }
    }

    /// Cut one slot, severing the partner's ring link first so it falls
    /// back to the noise table instead of reading a stale sample.
    fn cut_slot(&mut self, slot: usize) {
        if let Some(partner) = self.pool.slot(slot).pair_slot() {
            self.pool.slot_mut(usize::from(partner)).set_pair_slot(None);
        }
        self.pool.slot_mut(slot).deactivate();
    }

    /// Apply an allocator eviction decision to the pool and the owning
    /// channel's bookkeeping.
    fn apply_eviction(&mut self, evicted: Evicted) {
        self.cut_slot(usize::from(evicted.slot));
        self.channels[usize::from(evicted.channel)]
            .poly_mut(usize::from(evicted.poly_slot))
            .clear_partial(evicted.partial_index);
    }

    /// Return fully decayed slots to the pool and update their polys.
    fn reap_finished(&mut self) {
        for slot in 0..PARTIAL_COUNT {
            let partial = self.pool.slot(slot);
            if !partial.is_active() || !partial.is_finished() {
                continue;
            }
            let owner = partial
                .channel()
                .zip(partial.poly_slot())
                .zip(partial.partial_index());
            self.cut_slot(slot);
            if let Some(((channel, poly_slot), partial_index)) = owner {
                self.channels[usize::from(channel)]
                    .poly_mut(usize::from(poly_slot))
                    .clear_partial(partial_index);
            }
        }
    }

    fn push_to_channel(&mut self, part: usize, mut apply: impl FnMut(&mut crate::partial::Partial)) {
        let part = part as u8;
        for partial in self.pool.iter_mut() {
            if partial.channel() == Some(part) {
                apply(partial);
            }
        }
    }

    /// Rebuild a channel's patch snapshot after its temp areas changed.
    /// Playing notes keep the snapshot they started with.
    fn rebuild_cache(&mut self, part: usize) {
        let patch = self.memory.patch_temp(part);
        let timbre = self.memory.timbre_temp(part);
        self.channels[part].set_cache(PatchCache::build(&patch, &timbre));
    }

    /// Load the timbre the channel's patch temp selects from the bank
    /// into timbre temp, then rebuild the snapshot.
    fn refresh_channel(&mut self, part: usize) {
        let patch = self.memory.patch_temp(part);
        let index = usize::from(patch.timbre_group.min(2)) * MEMORY_TIMBRES
            + usize::from(patch.timbre_num.min(63));
        let bytes = self.memory.timbre_raw(index, &self.rom);
        self.memory.load_timbre(part, bytes);
        self.rebuild_cache(part);
    }

    /// Pull reservations, the reverb program and master volume from the
    /// system area.
    fn apply_system(&mut self) {
        self.allocator.set_reservations(&self.memory.reserves());
        let (mode, time, level) = self.memory.reverb_program();
        self.reverb
            .set_program(ReverbMode::from_device(mode), time, level);
        self.master_volume = self.memory.master_volume_gain();
    }

    fn apply_write_effect(&mut self, effect: WriteEffect) {
        match effect {
            WriteEffect::None => {}
            WriteEffect::PatchTemp { first, last } => {
                for part in usize::from(first)..=usize::from(last).min(RHYTHM_CHANNEL) {
                    self.refresh_channel(part);
                    self.release_playing_polys(part);
                }
            }
            WriteEffect::TimbreTemp { first, last } => {
                for part in usize::from(first)..=usize::from(last).min(RHYTHM_CHANNEL) {
                    self.rebuild_cache(part);
                }
            }
            WriteEffect::System => self.apply_system(),
            WriteEffect::Reset => self.reset(),
        }
    }

    /// Power-on state: silence everything and reload the defaults the
    /// memory image just restored.
    fn reset(&mut self) {
        for slot in 0..PARTIAL_COUNT {
            self.pool.slot_mut(slot).deactivate();
        }
        self.channels = core::array::from_fn(|part| {
            let patch = self.memory.patch_temp(part);
            let timbre = self.memory.timbre_temp(part);
            Channel::new(part as u8, PatchCache::build(&patch, &timbre))
        });
        for part in 0..RHYTHM_CHANNEL {
            self.refresh_channel(part);
        }
        self.apply_system();
        self.reverb.clear();
        tracing::info!("device reset to power-on state");
    }
}
