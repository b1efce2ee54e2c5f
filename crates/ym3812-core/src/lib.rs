//! YM3812 (OPL2) sound chip emulation and the music engine built on it.
//!
//! The crate has two layers:
//!
//! - [`OplChip`]: a register-accurate software YM3812 with log-sin/exp
//!   table synthesis, the shared vibrato and tremolo LFOs, rhythm mode
//!   and resampling from the native 49716 Hz rate.
//! - [`Opl2Engine`]: the voice-oriented driver DOS music formats were
//!   written against, mapping instruments, volumes, pitch bends and
//!   percussion onto register writes through the [`Opl2Backend`] trait.
//!
//! With the `export-wav` feature the [`export`] module renders any
//! [`ym3812_common::SongPlayer`] to a WAV file offline.

use thiserror::Error;

pub mod backend;
pub mod chip;
pub mod engine;
#[cfg(feature = "export-wav")]
pub mod export;
mod timbre;

pub use backend::Opl2Backend;
pub use chip::{OplChip, NATIVE_RATE};
pub use engine::{
    Opl2Engine, BASS_DRUM_VOICE, CYMBAL_VOICE, FNUM_TABLE, HI_HAT_VOICE, SNARE_VOICE,
    TOM_TOM_VOICE,
};

/// Errors from chip construction and custom backends.
#[derive(Debug, Error)]
pub enum Ym3812Error {
    #[error("unsupported sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),
    #[error("{0}")]
    Message(String),
}

impl From<String> for Ym3812Error {
    fn from(message: String) -> Self {
        Ym3812Error::Message(message)
    }
}

impl From<&str> for Ym3812Error {
    fn from(message: &str) -> Self {
        Ym3812Error::Message(message.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Ym3812Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_format_for_display() {
        let err = Ym3812Error::UnsupportedSampleRate(1234);
        assert_eq!(err.to_string(), "unsupported sample rate: 1234 Hz");
        let err: Ym3812Error = "backend unavailable".into();
        assert_eq!(err.to_string(), "backend unavailable");
    }
}
