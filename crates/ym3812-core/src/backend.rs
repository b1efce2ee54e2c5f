//! Pluggable chip backend for the high-level engine.

use crate::Result;

/// Anything that behaves like a YM3812 at the register level.
///
/// The engine drives a backend purely through register writes and sample
/// generation, so alternative implementations (test capture backends,
/// hardware pass-through) can slot in behind [`Opl2Engine`](crate::Opl2Engine).
pub trait Opl2Backend: Send {
    /// Build a backend rendering at `sample_rate` Hz.
    fn create(sample_rate: u32) -> Result<Self>
    where
        Self: Sized;

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Return the backend to its power-on state.
    fn reset(&mut self);

    /// Write one register, exactly as on the chip's address/data ports.
    fn write_register(&mut self, reg: u8, value: u8);

    /// Fill `out` with interleaved stereo samples.
    fn generate_into(&mut self, out: &mut [i16]);

    /// Render `frames` stereo frames into a fresh buffer.
    fn generate(&mut self, frames: usize) -> Vec<i16> {
        let mut out = vec![0i16; frames * 2];
        self.generate_into(&mut out);
        out
    }
}
