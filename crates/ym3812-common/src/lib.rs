//! Shared types for the YM3812 (OPL2) replayer family.
//!
//! Every format-specific player crate (IMS, ROL, VGM) implements the
//! [`SongPlayer`] trait defined here, so front-ends can drive any of them
//! through one object-safe interface: transport control, pull-based sample
//! generation and a polling [`PlayerSnapshot`] for status displays.

pub mod metadata;
pub mod parse;
pub mod player;
pub mod state;

pub use metadata::SongMetadata;
pub use player::{PlaybackState, SongPlayer};
pub use state::{decay_volumes, ActiveNote, PlayerSnapshot};
