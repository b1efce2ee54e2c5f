//! Render a song player straight to a 16-bit stereo WAV file.

use std::path::Path;

use thiserror::Error;
use ym3812_common::SongPlayer;

/// Frames rendered per chunk while exporting.
const CHUNK_FRAMES: usize = 2048;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("WAV write failed: {0}")]
    Wav(#[from] hound::Error),
}

/// Knobs for an export run.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Hard cap on the rendered length, protecting against songs that
    /// loop forever.
    pub max_seconds: f32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            max_seconds: 600.0,
        }
    }
}

impl ExportConfig {
    pub fn with_max_seconds(mut self, max_seconds: f32) -> Self {
        self.max_seconds = max_seconds;
        self
    }
}

/// What an export run produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportSummary {
    pub frames: u64,
    pub seconds: f32,
}

/// Render `player` from the start to a WAV file with default settings.
pub fn export_to_wav(
    player: &mut dyn SongPlayer,
    path: impl AsRef<Path>,
) -> Result<ExportSummary, ExportError> {
    export_to_wav_with_config(player, path, &ExportConfig::default())
}

/// Render `player` from the start to a WAV file.
///
/// The player is rewound and started, then pulled in chunks until the
/// song ends naturally (rendering stops at the first fully silent chunk
/// after the end, so release tails survive) or the configured time cap
/// is hit.
pub fn export_to_wav_with_config(
    player: &mut dyn SongPlayer,
    path: impl AsRef<Path>,
    config: &ExportConfig,
) -> Result<ExportSummary, ExportError> {
    let sample_rate = player.sample_rate();
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;

    player.rewind();
    player.play();

    let frame_budget = (config.max_seconds.max(0.0) * sample_rate as f32) as u64;
    let mut buffer = [0i16; CHUNK_FRAMES * 2];
    let mut frames = 0u64;
    let mut ended = false;

    while frames < frame_budget {
        player.generate_samples_into(&mut buffer);
        if player.take_ended() || !player.is_playing() {
            ended = true;
        }
        if ended && buffer.iter().all(|&s| s == 0) {
            break;
        }
        for &sample in buffer.iter() {
            writer.write_sample(sample)?;
        }
        frames += CHUNK_FRAMES as u64;
    }

    player.stop();
    writer.finalize()?;
    Ok(ExportSummary {
        frames,
        seconds: frames as f32 / sample_rate as f32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use ym3812_common::{PlaybackState, PlayerSnapshot, SongMetadata};

    /// Emits a flat nonzero signal for a fixed number of frames, then
    /// reports its natural end.
    struct Blip {
        frames_left: u32,
        state: PlaybackState,
        ended: bool,
        looped: bool,
        metadata: SongMetadata,
    }

    impl Blip {
        fn new(frames: u32) -> Self {
            Blip {
                frames_left: frames,
                state: PlaybackState::Stopped,
                ended: false,
                looped: false,
                metadata: SongMetadata::default(),
            }
        }
    }

    impl SongPlayer for Blip {
        fn play(&mut self) {
            self.state = PlaybackState::Playing;
        }
        fn pause(&mut self) {
            self.state = PlaybackState::Paused;
        }
        fn stop(&mut self) {
            self.state = PlaybackState::Stopped;
        }
        fn rewind(&mut self) {}
        fn state(&self) -> PlaybackState {
            self.state
        }
        fn generate_samples_into(&mut self, buffer: &mut [i16]) {
            for frame in buffer.chunks_exact_mut(2) {
                let value = if self.state == PlaybackState::Playing && self.frames_left > 0 {
                    self.frames_left -= 1;
                    1000
                } else {
                    0
                };
                frame[0] = value;
                frame[1] = value;
                if self.frames_left == 0 && self.state == PlaybackState::Playing {
                    if self.looped {
                        self.frames_left = 1000;
                    } else {
                        self.state = PlaybackState::Stopped;
                        self.ended = true;
                    }
                }
            }
        }
        fn snapshot(&self) -> PlayerSnapshot {
            PlayerSnapshot::default()
        }
        fn control_volume(&mut self, _volume: u8) {}
        fn control_tempo(&mut self, _percent: u16) {}
        fn set_loop_enabled(&mut self, enabled: bool) {
            self.looped = enabled;
        }
        fn take_ended(&mut self) -> bool {
            std::mem::take(&mut self.ended)
        }
        fn metadata(&self) -> &SongMetadata {
            &self.metadata
        }
    }

    fn temp_wav(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ym3812-export-{}-{}.wav", tag, std::process::id()))
    }

    #[test]
    fn exports_until_the_song_ends() {
        let mut player = Blip::new(5000);
        let path = temp_wav("end");
        let summary = export_to_wav(&mut player, &path).unwrap();
        assert!(summary.frames >= 5000);

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 44100);
        assert_eq!(reader.len() as u64, summary.frames * 2);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn time_cap_stops_a_looping_song() {
        let mut player = Blip::new(1000);
        player.set_loop_enabled(true);
        let path = temp_wav("cap");
        let config = ExportConfig::default().with_max_seconds(0.25);
        let summary = export_to_wav_with_config(&mut player, &path, &config).unwrap();
        let cap = (0.25 * 44100.0) as u64 + CHUNK_FRAMES as u64;
        assert!(summary.frames <= cap);
        assert!(summary.frames > 0);
        std::fs::remove_file(&path).ok();
    }
}
