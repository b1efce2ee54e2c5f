//! Offline rendering of song players to audio files.

mod wav;

pub use wav::{export_to_wav, export_to_wav_with_config, ExportConfig, ExportError, ExportSummary};
