//! Replayer for IMS songs, the event-stream format produced by the
//! HSC/Ad Lib composer tools.
//!
//! An IMS file carries a tempo, a list of instrument names and a single
//! stream of channel events separated by tick deltas. [`ImsPlayer`]
//! resolves the instrument names against an [`ym3812_bnk::InstrumentBank`]
//! and sequences the stream onto the FM engine.
//!
//! ```no_run
//! use ym3812_bnk::InstrumentBank;
//! use ym3812_common::SongPlayer;
//! use ym3812_ims_replayer::{load_ims, ImsPlayer};
//!
//! let song = load_ims("TUNE.IMS")?;
//! let bank = InstrumentBank::load("STANDARD.BNK")?;
//! let mut player = ImsPlayer::new(song, &bank)?;
//! player.play();
//! let samples = player.generate_samples(1024);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod format;
mod parser;
mod player;

pub use error::ImsError;
pub use format::{ImsSong, TICKS_PER_BEAT};
pub use parser::{load_ims, parse_ims};
pub use player::ImsPlayer;

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ImsError>;
