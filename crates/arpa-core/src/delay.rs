//! Fixed-length delay line for the reverb network.
//!
//! The reverb topology uses delay lengths chosen at construction and never
//! modulated, so this is a plain circular buffer with integer reads. No
//! interpolation, no variable read position.

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std as alloc;

use alloc::vec;
use alloc::vec::Vec;

/// Fixed-length circular delay buffer.
///
/// [`read`](RingBuffer::read) returns the sample written `len` calls ago;
/// [`write`](RingBuffer::write) overwrites that slot and advances. The
/// buffer is heap-allocated once at construction and never reallocates.
///
/// # Example
///
/// ```rust
/// use arpa_core::RingBuffer;
///
/// let mut delay = RingBuffer::new(3);
/// delay.write(1.0);
/// delay.write(2.0);
/// delay.write(3.0);
/// assert_eq!(delay.read(), 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct RingBuffer {
    buffer: Vec<f32>,
    pos: usize,
}

impl RingBuffer {
    /// Create a delay line of `len` samples, zero-filled.
    ///
    /// # Panics
    ///
    /// Panics if `len` is 0.
    pub fn new(len: usize) -> Self {
        assert!(len > 0, "Delay length must be > 0");
        #[cfg(feature = "tracing")]
        tracing::debug!("delay_alloc: {len} samples");
        Self {
            buffer: vec![0.0; len],
            pos: 0,
        }
    }

    /// Read the oldest sample (written `len` calls ago).
    #[inline]
    pub fn read(&self) -> f32 {
        self.buffer[self.pos]
    }

    /// Overwrite the oldest slot with `sample` and advance.
    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.buffer[self.pos] = sample;
        self.pos += 1;
        if self.pos == self.buffer.len() {
            self.pos = 0;
        }
    }

    /// Clear the delay line (sets all samples to 0).
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }

    /// Delay length in samples.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Always false; the buffer length is fixed and nonzero.
    pub fn is_empty(&self) -> bool {
        false
    }
}
