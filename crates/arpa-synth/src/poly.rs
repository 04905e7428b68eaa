//! One logical playing note and its slice of the partial pool.
//!
//! A poly is pure bookkeeping: which note it plays, which global
//! partial slots it was granted, and where it sits in the
//! `Idle -> Playing -> Releasing -> Idle` lifecycle. The audio state
//! itself lives in the partial slots; the poly only remembers which
//! ones are its own so note-off and stealing can find them.

/// Poly slots per channel. The whole pool can land on one channel, so
/// every channel carries a full complement.
pub const POLYS_PER_CHANNEL: usize = 32;

/// Partials a single note can use.
pub const PARTIALS_PER_POLY: usize = 4;

/// Note lifecycle position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolyState {
    /// Free for the next note-on.
    #[default]
    Idle,
    /// Sounding, envelopes in attack or sustain.
    Playing,
    /// Note-off received, envelopes decaying toward silence.
    Releasing,
}

/// Bookkeeping for one playing note.
#[derive(Debug, Clone, Copy, Default)]
pub struct Poly {
    state: PolyState,
    note: u8,
    velocity: u8,
    /// Captured from the timbre at note-on. Non-sustaining notes ignore
    /// note-off and run their envelopes to the end.
    sustain: bool,
    /// Note-off arrived while the hold pedal was down; release when the
    /// pedal lifts.
    pedal_hold: bool,
    /// Start order across the channel; lower is older.
    serial: u64,
    partial_slots: [Option<u8>; PARTIALS_PER_POLY],
}

impl Poly {
    /// Begin playing a note with the granted partial slots.
    pub fn start(
        &mut self,
        note: u8,
        velocity: u8,
        sustain: bool,
        serial: u64,
        partial_slots: [Option<u8>; PARTIALS_PER_POLY],
    ) {
        self.state = PolyState::Playing;
        self.note = note;
        self.velocity = velocity;
        self.sustain = sustain;
        self.pedal_hold = false;
        self.serial = serial;
        self.partial_slots = partial_slots;
    }

    #[inline]
    pub fn state(&self) -> PolyState {
        self.state
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.state == PolyState::Idle
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.state == PolyState::Playing
    }

    #[inline]
    pub fn note(&self) -> u8 {
        self.note
    }

    #[inline]
    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    /// Whether this note reacts to note-off at all.
    #[inline]
    pub fn sustain(&self) -> bool {
        self.sustain
    }

    #[inline]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Global slot indexes this poly was granted, by partial index.
    #[inline]
    pub fn partial_slots(&self) -> [Option<u8>; PARTIALS_PER_POLY] {
        self.partial_slots
    }

    /// Defer the pending release until the hold pedal lifts.
    pub fn set_pedal_hold(&mut self) {
        if self.state == PolyState::Playing {
            self.pedal_hold = true;
        }
    }

    #[inline]
    pub fn pedal_hold(&self) -> bool {
        self.pedal_hold
    }

    /// Transition to releasing. The caller starts the envelope decays
    /// on the slots this poly reports.
    pub fn begin_release(&mut self) {
        if self.state == PolyState::Playing {
            self.state = PolyState::Releasing;
            self.pedal_hold = false;
        }
    }

    /// Drop one partial after eviction or full decay. Reports true when
    /// the last partial went away and the poly fell back to idle.
    pub fn clear_partial(&mut self, partial_index: u8) -> bool {
        if let Some(slot) = self.partial_slots.get_mut(partial_index as usize) {
            *slot = None;
        }
        if self.state != PolyState::Idle && self.partial_slots.iter().all(Option::is_none) {
            self.state = PolyState::Idle;
            self.pedal_hold = false;
            return true;
        }
        false
    }

    /// Hard-stop the poly, returning the slots the caller must cut.
    pub fn abort(&mut self) -> [Option<u8>; PARTIALS_PER_POLY] {
        let slots = core::mem::take(&mut self.partial_slots);
        self.state = PolyState::Idle;
        self.pedal_hold = false;
        slots
    }
}
