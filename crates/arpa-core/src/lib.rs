//! Arpa Core - DSP primitives for the arpa synthesis engine
//!
//! This crate provides the foundational building blocks the synth and reverb
//! are assembled from, designed for real-time audio processing with zero
//! allocation in the audio path.
//!
//! # Filters
//!
//! - [`SectionCoefficients`] and [`resonant_lowpass_sections`] - Bilinear
//!   design for the 4-pole resonant lowpass, state left to the caller
//! - [`DampedComb`] - Feedback comb followed by a one-pole lowpass
//! - [`SeriesAllpass`] - Schroeder allpass for reverb diffusion
//! - [`OnePole`] - Single-pole lowpass for damping and smoothing
//!
//! # Delay Lines
//!
//! - [`RingBuffer`] - Fixed-length integer delay (no interpolation)
//!
//! # Utilities
//!
//! - Math functions: [`saturate_i16`], [`flush_denormal`], [`lerp`],
//!   [`pan_gains`]
//!
//! # no_std Support
//!
//! This crate is `no_std` compatible. Disable the default `std` feature:
//!
//! ```toml
//! [dependencies]
//! arpa-core = { version = "0.1", default-features = false }
//! ```
//!
//! # Design Principles
//!
//! - **Real-time safe**: No allocations in audio processing paths
//! - **No dependencies on std**: Pure `no_std` with `libm` for math
//! - **Fixed topologies**: Delay lengths are set at construction and never
//!   change, so reads are plain integer indexing

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod allpass;
pub mod biquad;
pub mod comb;
pub mod delay;
pub mod math;
pub mod one_pole;

// Re-export main types at crate root
pub use allpass::SeriesAllpass;
pub use biquad::{SectionCoefficients, resonant_lowpass_sections};
pub use comb::DampedComb;
pub use delay::RingBuffer;
pub use math::{flush_denormal, lerp, pan_gains, saturate_i16};
pub use one_pole::OnePole;
