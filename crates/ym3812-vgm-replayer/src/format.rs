//! Parsed representation of VGM command logs.

/// The VGM time domain is fixed at 44100 samples per second regardless
/// of the playback rate.
pub const VGM_SAMPLE_RATE: u32 = 44_100;

/// One YM3812 register write, stamped with its absolute position in
/// VGM-domain samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWrite {
    pub at: u64,
    pub reg: u8,
    pub value: u8,
}

/// The English strings of a GD3 metadata tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Gd3Tag {
    pub track: String,
    pub game: String,
    pub author: String,
}

#[derive(Debug, Clone)]
pub struct VgmSong {
    /// BCD version from the header, e.g. 0x0151.
    pub version: u32,
    pub ym3812_clock: u32,
    /// Total length in VGM-domain samples as declared by the header.
    pub total_samples: u32,
    /// YM3812 writes in stream order with absolute sample positions.
    pub commands: Vec<RegisterWrite>,
    /// Command index the loop offset points at, if it landed on a
    /// command boundary.
    pub loop_index: Option<usize>,
    /// Sample position of the loop point.
    pub loop_sample: u64,
    /// Sample position of the end command (or of the stream end).
    pub end_sample: u64,
    /// Non-YM3812 commands dropped during the parse.
    pub skipped_commands: u32,
    pub gd3: Option<Gd3Tag>,
}

impl VgmSong {
    /// Playing length in seconds, favoring the header's declared total.
    pub fn duration_seconds(&self) -> f32 {
        let samples = u64::from(self.total_samples).max(self.end_sample);
        samples as f32 / VGM_SAMPLE_RATE as f32
    }
}
