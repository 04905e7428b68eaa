//! Error types for engine initialization and resource validation.

use thiserror::Error;

/// Errors that can occur while assembling or validating a [`RomSet`].
///
/// All of these are fatal: they are only produced before the first render
/// callback, and an engine whose resources failed validation must not be
/// used.
///
/// [`RomSet`]: crate::rom::RomSet
#[derive(Debug, Error)]
pub enum SynthError {
    /// A required resource was never supplied to the builder.
    #[error("missing required resource: {0}")]
    MissingResource(&'static str),

    /// The wavetable resource does not match either canonical size.
    #[error("wavetable resource is {0} bytes; expected {expected_a} or {expected_b}", expected_a = crate::rom::WAVETABLE_LEN_BASE, expected_b = crate::rom::WAVETABLE_LEN_EXTENDED)]
    UnsupportedWavetable(usize),

    /// The PCM sample bank is empty.
    #[error("pcm sample bank is empty")]
    EmptyPcmBank,

    /// A loop-table entry addresses frames outside the PCM bank.
    #[error("sample {index} spans frames {start}..{end} but the pcm bank holds {bank_len}")]
    SampleOutOfRange {
        /// Index of the offending loop-table entry.
        index: usize,
        /// First frame the entry addresses.
        start: u32,
        /// One past the last frame the entry addresses.
        end: u64,
        /// Total frames in the PCM bank.
        bank_len: usize,
    },

    /// A loop-table entry has zero length.
    #[error("sample {0} has zero length")]
    EmptySample(usize),

    /// An aggregate references a loop-table entry that does not exist.
    #[error("aggregate {index} references missing sample {sample}")]
    AggregateOutOfRange {
        /// Index of the offending aggregate.
        index: usize,
        /// The nonexistent sample index it references.
        sample: u16,
    },

    /// An aggregate has no sub-samples.
    #[error("aggregate {0} is empty")]
    EmptyAggregate(usize),

    /// The drum-patch resource has the wrong entry count.
    #[error("drum-patch resource has {0} entries; expected {expected}", expected = crate::rom::DRUM_MAP_LEN)]
    BadDrumMap(usize),
}
