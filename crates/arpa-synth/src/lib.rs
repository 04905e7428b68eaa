//! Arpa Synth - the wavetable/subtractive synthesis engine
//!
//! A software rendition of a classic multi-timbral module: 32 partial
//! slots shared across 8 melodic channels and one rhythm channel, each
//! partial running three table-driven envelopes, a PCM or synthesized
//! oscillator and a 4-pole resonant lowpass, with pair mixing (sum,
//! ring modulation, stereo split) and a reverb send on the output bus.
//!
//! The host feeds the engine resources once, then drives it with MIDI
//! and pulls interleaved stereo frames:
//!
//! ```rust,no_run
//! use arpa_synth::{RomSet, Synth};
//!
//! # fn load() -> (Vec<u8>, Vec<i16>) { unimplemented!() }
//! let (wavetable, pcm) = load();
//! let rom = RomSet::builder()
//!     .wavetable(wavetable)
//!     .pcm(pcm)
//!     // .loop_table(..) .drum_map(..) .patch_streams(..)
//!     .build()?;
//!
//! let mut synth = Synth::new(rom);
//! synth.play_msg(0x91, 60, 100);
//!
//! let mut out = vec![0i16; 512];
//! synth.render(&mut out);
//! # Ok::<(), arpa_synth::SynthError>(())
//! ```
//!
//! # Architecture
//!
//! - [`rom`] - external resource seam; everything sample-data is
//!   validated here, once, before the engine exists
//! - [`tables`] - lookup tables derived from the resources at startup
//! - [`patch`] / [`memory`] - device parameter model and the flat
//!   SysEx-addressable memory image
//! - [`envelope`], [`waveform`], [`filter`] - the per-partial DSP units
//! - [`partial`], [`poly`], [`part`], [`allocator`] - voice management:
//!   slots, notes, channels, and the reservation/stealing policy
//! - [`synth`] - the engine core tying it all together
//!
//! The render path is allocation-free and panic-free; the engine is
//! single-threaded and owned by the host.

pub mod allocator;
pub mod envelope;
pub mod error;
pub mod filter;
pub mod memory;
pub mod part;
pub mod partial;
pub mod patch;
pub mod poly;
pub mod rom;
pub mod synth;
pub mod tables;
pub mod waveform;

// Re-export the host-facing surface at the crate root
pub use error::SynthError;
pub use memory::DeviceMemory;
pub use patch::PatchCache;
pub use rom::{DrumProgram, PcmSampleDesc, RomSet, RomSetBuilder};
pub use synth::{RHYTHM_CHANNEL, Synth};
pub use tables::SynthTables;
