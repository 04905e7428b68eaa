//! External resource set required before the first render callback.
//!
//! The engine does not read files or understand any on-disk layout; the
//! host decodes its resources and hands them over through
//! [`RomSetBuilder`]. Validation happens once at build time, so the render
//! path can index the PCM bank and loop table without bounds checks
//! beyond what the descriptors already guarantee.
//!
//! Five resources are required, and the absence of any one of them is a
//! fatal initialization error:
//!
//! - the wavetable resource, whose size selects the output sample rate
//! - the PCM sample bank (16-bit mono frames)
//! - the PCM loop-point table
//! - two factory timbre streams, backing the first two groups of the
//!   timbre bank
//! - the drum-patch resource mapping rhythm notes to timbres

use crate::error::SynthError;

/// Wavetable resource size for base hardware, implying 32000 Hz output.
pub const WAVETABLE_LEN_BASE: usize = 0x4000;

/// Wavetable resource size for extended hardware, implying 32768 Hz output.
pub const WAVETABLE_LEN_EXTENDED: usize = 0x8000;

/// Number of entries in the drum-patch resource.
///
/// Rhythm notes 24 through 87 map onto these entries in order.
pub const DRUM_MAP_LEN: usize = 64;

/// Lowest note number covered by the drum-patch resource.
pub const DRUM_MAP_FIRST_NOTE: u8 = 24;

/// One entry of the PCM loop-point table.
///
/// Describes a contiguous run of frames in the PCM bank and whether
/// playback loops at the end or stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmSampleDesc {
    /// First frame in the PCM bank.
    pub start: u32,
    /// Length in frames. Never zero after validation.
    pub len: u32,
    /// Loop at the end of the run instead of stopping.
    pub looped: bool,
}

/// One entry of the drum-patch resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrumProgram {
    /// Timbre number within the rhythm bank.
    pub timbre: u8,
    /// Output level, 0-100.
    pub output_level: u8,
    /// Fixed pan position, 0-14 with 7 centered.
    pub panpot: u8,
    /// Route this instrument through the reverb send.
    pub reverb: bool,
}

/// Validated, immutable resource set.
///
/// Built once through [`RomSetBuilder`] and then shared read-only for the
/// lifetime of the engine.
#[derive(Debug, Clone)]
pub struct RomSet {
    wavetable: Vec<u8>,
    pcm: Vec<i16>,
    samples: Vec<PcmSampleDesc>,
    aggregates: Vec<Vec<u16>>,
    drum_map: Vec<Option<DrumProgram>>,
    patch_stream_a: Vec<u8>,
    patch_stream_b: Vec<u8>,
}

impl RomSet {
    /// Start assembling a resource set.
    pub fn builder() -> RomSetBuilder {
        RomSetBuilder::default()
    }

    /// Output sample rate implied by the wavetable resource size.
    pub fn sample_rate(&self) -> f32 {
        if self.wavetable.len() == WAVETABLE_LEN_EXTENDED {
            32768.0
        } else {
            32000.0
        }
    }

    /// Raw wavetable resource bytes.
    pub fn wavetable(&self) -> &[u8] {
        &self.wavetable
    }

    /// The full PCM bank.
    pub fn pcm(&self) -> &[i16] {
        &self.pcm
    }

    /// Number of loop-table entries.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Loop-table entry by index.
    pub fn sample(&self, index: usize) -> Option<PcmSampleDesc> {
        self.samples.get(index).copied()
    }

    /// The PCM frames a loop-table entry describes.
    ///
    /// The range was validated at build time, so this never panics for a
    /// descriptor obtained from [`RomSet::sample`].
    pub fn sample_frames(&self, desc: PcmSampleDesc) -> &[i16] {
        let start = desc.start as usize;
        &self.pcm[start..start + desc.len as usize]
    }

    /// Ordered sub-sample list of an aggregate percussion voice.
    pub fn aggregate(&self, index: usize) -> Option<&[u16]> {
        self.aggregates.get(index).map(Vec::as_slice)
    }

    /// Drum program for a rhythm-channel note, if the note is mapped.
    pub fn drum_program(&self, note: u8) -> Option<DrumProgram> {
        let slot = note.checked_sub(DRUM_MAP_FIRST_NOTE)? as usize;
        self.drum_map.get(slot).copied().flatten()
    }

    /// The two factory timbre streams, in bank order.
    pub fn patch_streams(&self) -> (&[u8], &[u8]) {
        (&self.patch_stream_a, &self.patch_stream_b)
    }
}

/// Assembles and validates a [`RomSet`].
///
/// # Example
///
/// ```rust
/// use arpa_synth::{PcmSampleDesc, RomSet};
///
/// let rom = RomSet::builder()
///     .wavetable(vec![0; 0x4000])
///     .pcm(vec![0i16; 2048])
///     .loop_table(vec![PcmSampleDesc { start: 0, len: 2048, looped: true }])
///     .patch_streams(Vec::new(), Vec::new())
///     .drum_map(vec![None; 64])
///     .build()
///     .unwrap();
///
/// assert_eq!(rom.sample_rate(), 32000.0);
/// ```
#[derive(Debug, Default)]
pub struct RomSetBuilder {
    wavetable: Option<Vec<u8>>,
    pcm: Option<Vec<i16>>,
    samples: Option<Vec<PcmSampleDesc>>,
    aggregates: Vec<Vec<u16>>,
    drum_map: Option<Vec<Option<DrumProgram>>>,
    patch_streams: Option<(Vec<u8>, Vec<u8>)>,
}

impl RomSetBuilder {
    /// Supply the wavetable resource.
    #[must_use]
    pub fn wavetable(mut self, bytes: Vec<u8>) -> Self {
        self.wavetable = Some(bytes);
        self
    }

    /// Supply the PCM sample bank.
    #[must_use]
    pub fn pcm(mut self, frames: Vec<i16>) -> Self {
        self.pcm = Some(frames);
        self
    }

    /// Supply the PCM loop-point table.
    #[must_use]
    pub fn loop_table(mut self, samples: Vec<PcmSampleDesc>) -> Self {
        self.samples = Some(samples);
        self
    }

    /// Add an aggregate percussion voice (ordered loop-table indexes).
    ///
    /// Aggregates are optional; a set with none is valid.
    #[must_use]
    pub fn aggregate(mut self, sub_samples: Vec<u16>) -> Self {
        self.aggregates.push(sub_samples);
        self
    }

    /// Supply the drum-patch resource. Must hold exactly
    /// [`DRUM_MAP_LEN`] entries; unmapped notes are `None`.
    #[must_use]
    pub fn drum_map(mut self, map: Vec<Option<DrumProgram>>) -> Self {
        self.drum_map = Some(map);
        self
    }

    /// Supply the two factory timbre streams.
    #[must_use]
    pub fn patch_streams(mut self, first: Vec<u8>, second: Vec<u8>) -> Self {
        self.patch_streams = Some((first, second));
        self
    }

    /// Validate and build the resource set.
    ///
    /// # Errors
    ///
    /// Returns a [`SynthError`] if a resource is missing, the wavetable
    /// size matches neither canonical rate, or any loop-table or
    /// aggregate entry addresses data that is not there.
    pub fn build(self) -> Result<RomSet, SynthError> {
        let wavetable = self
            .wavetable
            .ok_or(SynthError::MissingResource("wavetable"))?;
        if wavetable.len() != WAVETABLE_LEN_BASE && wavetable.len() != WAVETABLE_LEN_EXTENDED {
            return Err(SynthError::UnsupportedWavetable(wavetable.len()));
        }

        let pcm = self.pcm.ok_or(SynthError::MissingResource("pcm bank"))?;
        if pcm.is_empty() {
            return Err(SynthError::EmptyPcmBank);
        }

        let samples = self
            .samples
            .ok_or(SynthError::MissingResource("loop table"))?;
        for (index, desc) in samples.iter().enumerate() {
            if desc.len == 0 {
                return Err(SynthError::EmptySample(index));
            }
            let end = u64::from(desc.start) + u64::from(desc.len);
            if end > pcm.len() as u64 {
                return Err(SynthError::SampleOutOfRange {
                    index,
                    start: desc.start,
                    end,
                    bank_len: pcm.len(),
                });
            }
        }

        for (index, agg) in self.aggregates.iter().enumerate() {
            if agg.is_empty() {
                return Err(SynthError::EmptyAggregate(index));
            }
            for &sample in agg {
                if sample as usize >= samples.len() {
                    return Err(SynthError::AggregateOutOfRange { index, sample });
                }
            }
        }

        let drum_map = self
            .drum_map
            .ok_or(SynthError::MissingResource("drum map"))?;
        if drum_map.len() != DRUM_MAP_LEN {
            return Err(SynthError::BadDrumMap(drum_map.len()));
        }

        let (patch_stream_a, patch_stream_b) = self
            .patch_streams
            .ok_or(SynthError::MissingResource("timbre streams"))?;

        Ok(RomSet {
            wavetable,
            pcm,
            samples,
            aggregates: self.aggregates,
            drum_map,
            patch_stream_a,
            patch_stream_b,
        })
    }
}
