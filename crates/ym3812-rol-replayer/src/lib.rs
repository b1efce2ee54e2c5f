//! Replayer for AdLib Visual Composer ROL songs.
//!
//! A ROL file carries a tempo track and eleven per-voice event tables.
//! [`RolPlayer`] resolves the timbre tables' instrument names against an
//! [`ym3812_bnk::InstrumentBank`] and advances all tables one tick at a
//! time against the FM engine.
//!
//! ```no_run
//! use ym3812_bnk::InstrumentBank;
//! use ym3812_common::SongPlayer;
//! use ym3812_rol_replayer::{load_rol, RolPlayer};
//!
//! let song = load_rol("TUNE.ROL")?;
//! let bank = InstrumentBank::load("STANDARD.BNK")?;
//! let mut player = RolPlayer::new(song, &bank)?;
//! player.set_key_transpose(-2);
//! player.play();
//! let samples = player.generate_samples(1024);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod format;
mod parser;
mod player;

pub use error::RolError;
pub use format::{
    effective_tempo, NoteEvent, PitchEvent, RolSong, TempoEvent, TimbreEvent, VoiceTrack,
    VolumeEvent, NUM_TRACKS,
};
pub use parser::{load_rol, parse_rol};
pub use player::RolPlayer;

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, RolError>;
