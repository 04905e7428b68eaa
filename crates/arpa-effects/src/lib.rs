//! Arpa Effects - the reverb network for the arpa synthesis engine
//!
//! A single effect lives here: [`RoomReverb`], the fixed-topology
//! comb/allpass network that sits on the synth's stereo output bus.
//!
//! ```rust
//! use arpa_effects::{ReverbMode, RoomReverb};
//!
//! let mut reverb = RoomReverb::new(32000.0);
//! reverb.set_program(ReverbMode::Hall, 5, 7);
//!
//! let (left, right) = reverb.process(0.25, 0.25);
//! assert!(left.is_finite() && right.is_finite());
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod reverb;

pub use reverb::{ReverbMode, RoomReverb};
