//! Replayer for VGM logs carrying YM3812 register writes.
//!
//! Unlike the tick-based song formats, a VGM is a flat recording of
//! register writes separated by sample-exact waits. [`VgmPlayer`] feeds
//! the writes straight into the chip at their recorded positions; no
//! instrument bank is involved. Compressed `.vgz` files are not
//! handled, decompress them first.
//!
//! ```no_run
//! use ym3812_common::SongPlayer;
//! use ym3812_vgm_replayer::{load_vgm, VgmPlayer};
//!
//! let song = load_vgm("TUNE.VGM")?;
//! let mut player = VgmPlayer::new(song)?;
//! player.play();
//! let samples = player.generate_samples(1024);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod format;
mod parser;
mod player;

pub use error::VgmError;
pub use format::{Gd3Tag, RegisterWrite, VgmSong, VGM_SAMPLE_RATE};
pub use parser::{load_vgm, parse_vgm};
pub use player::VgmPlayer;

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, VgmError>;
