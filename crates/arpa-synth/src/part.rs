//! MIDI-channel state: active patch snapshot, controllers and the poly
//! table.
//!
//! The channel never touches the partial pool itself. It answers
//! questions (which poly plays note 60, what is the current bend
//! ratio) and records decisions; the synth core applies them to the
//! pool so every slot mutation goes through one place.

use std::sync::Arc;

use arpa_core::pan_gains;
use libm::powf;

use crate::patch::PatchCache;
use crate::poly::{PARTIALS_PER_POLY, POLYS_PER_CHANNEL, Poly};

/// Center value of the 14-bit pitch-bend range.
const BEND_CENTER: i32 = 8192;

/// Per-channel MIDI and poly state.
#[derive(Debug, Clone)]
pub struct Channel {
    index: u8,
    cache: Arc<PatchCache>,
    polys: [Poly; POLYS_PER_CHANNEL],
    volume: u8,
    pan: u8,
    modulation: u8,
    /// Raw 14-bit bend, 0-16383.
    bend: u16,
    pedal: bool,
    next_serial: u64,
}

impl Channel {
    /// New channel playing the given patch snapshot with controllers at
    /// their power-on positions.
    pub fn new(index: u8, cache: Arc<PatchCache>) -> Self {
        Self {
            index,
            cache,
            polys: [Poly::default(); POLYS_PER_CHANNEL],
            volume: 100,
            pan: 64,
            modulation: 0,
            bend: BEND_CENTER as u16,
            pedal: false,
            next_serial: 0,
        }
    }

    #[inline]
    pub fn index(&self) -> u8 {
        self.index
    }

    /// The patch snapshot new notes will play with.
    #[inline]
    pub fn cache(&self) -> &Arc<PatchCache> {
        &self.cache
    }

    /// Swap in a new patch snapshot. Notes already playing keep their
    /// own `Arc` to the old one and finish unchanged.
    pub fn set_cache(&mut self, cache: Arc<PatchCache>) {
        self.cache = cache;
    }

    /// Linear channel gain from the volume controller.
    #[inline]
    pub fn gain(&self) -> f32 {
        let v = f32::from(self.volume.min(127)) / 127.0;
        v * v
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(127);
    }

    /// Left and right pan gains from the pan controller.
    #[inline]
    pub fn pan_gains(&self) -> (f32, f32) {
        pan_gains(f32::from(self.pan.min(127)) / 127.0)
    }

    pub fn set_pan(&mut self, pan: u8) {
        self.pan = pan.min(127);
    }

    #[inline]
    pub fn modulation(&self) -> u8 {
        self.modulation
    }

    pub fn set_modulation(&mut self, modulation: u8) {
        self.modulation = modulation.min(127);
    }

    /// Store a raw 14-bit pitch-bend value.
    pub fn set_bend(&mut self, bend: u16) {
        self.bend = bend.min(16383);
    }

    /// Current bend as a frequency ratio, scaled by the patch's bender
    /// range.
    pub fn bend_ratio(&self) -> f32 {
        let swing = f32::from(self.bend) - BEND_CENTER as f32;
        let semitones = swing / BEND_CENTER as f32 * f32::from(self.cache.bender_range.min(24));
        powf(2.0, semitones / 12.0)
    }

    #[inline]
    pub fn pedal(&self) -> bool {
        self.pedal
    }

    pub fn set_pedal(&mut self, down: bool) {
        self.pedal = down;
    }

    /// Put bend, modulation and pedal back to their power-on positions.
    /// Volume and pan survive, matching the device's controller reset.
    pub fn reset_controllers(&mut self) {
        self.bend = BEND_CENTER as u16;
        self.modulation = 0;
        self.pedal = false;
    }

    #[inline]
    pub fn poly(&self, index: usize) -> &Poly {
        &self.polys[index]
    }

    #[inline]
    pub fn poly_mut(&mut self, index: usize) -> &mut Poly {
        &mut self.polys[index]
    }

    pub fn polys(&self) -> impl Iterator<Item = &Poly> {
        self.polys.iter()
    }

    pub fn polys_mut(&mut self) -> impl Iterator<Item = &mut Poly> {
        self.polys.iter_mut()
    }

    /// First idle poly slot, if any.
    pub fn idle_poly(&self) -> Option<usize> {
        self.polys.iter().position(Poly::is_idle)
    }

    /// Playing poly holding the given note, for note-off and retrigger.
    /// Releasing polys are past reach.
    pub fn playing_poly_with_note(&self, note: u8) -> Option<usize> {
        self.polys
            .iter()
            .position(|p| p.is_playing() && p.note() == note)
    }

    /// Non-idle poly that started longest ago.
    pub fn oldest_active_poly(&self) -> Option<usize> {
        self.polys
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_idle())
            .min_by_key(|(_, p)| p.serial())
            .map(|(index, _)| index)
    }

    /// Start a note in the given poly slot, stamping the start order.
    /// The sustain flag is captured here so a later patch swap cannot
    /// change how a sounding note reacts to note-off.
    pub fn start_poly(
        &mut self,
        poly_index: usize,
        note: u8,
        velocity: u8,
        partial_slots: [Option<u8>; PARTIALS_PER_POLY],
    ) {
        let serial = self.next_serial;
        self.next_serial += 1;
        self.polys[poly_index].start(note, velocity, self.cache.sustain, serial, partial_slots);
    }
}
