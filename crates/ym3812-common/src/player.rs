//! The uniform playback contract implemented by all song players.

use crate::metadata::SongMetadata;
use crate::state::PlayerSnapshot;

/// Playback state of a song player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Not playing, position at the start of the song.
    #[default]
    Stopped,
    /// Actively producing audio.
    Playing,
    /// Suspended, position retained.
    Paused,
}

/// Object-safe interface shared by the IMS, ROL and VGM players.
///
/// A player is constructed from parsed song data bound to one synth
/// instance and is then driven exclusively through this trait: an audio
/// front-end pulls interleaved stereo samples with
/// [`generate_samples_into`](SongPlayer::generate_samples_into) while a
/// status display polls [`snapshot`](SongPlayer::snapshot).
///
/// All implementations are `Send` so a producer thread can own the boxed
/// player while the UI thread keeps the handles it was given at load time.
pub trait SongPlayer: Send {
    /// Begin or resume playback.
    fn play(&mut self);

    /// Suspend playback, keeping the current position.
    fn pause(&mut self);

    /// Stop playback and rewind to the beginning of the song.
    fn stop(&mut self);

    /// Rewind to the beginning without leaving the current state; a playing
    /// player keeps playing from the start.
    fn rewind(&mut self);

    /// Current playback state.
    fn state(&self) -> PlaybackState;

    /// Whether the player is currently producing audio.
    fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    /// Fill `buffer` with interleaved stereo samples at
    /// [`sample_rate`](SongPlayer::sample_rate).
    ///
    /// The slice is always written in full; a stopped or paused player
    /// fills it with silence. `buffer.len()` is a sample count, so an even
    /// length keeps frames intact.
    fn generate_samples_into(&mut self, buffer: &mut [i16]);

    /// Generate `count` samples into a fresh buffer (allocating wrapper
    /// around [`generate_samples_into`](SongPlayer::generate_samples_into)).
    fn generate_samples(&mut self, count: usize) -> Vec<i16> {
        let mut buffer = vec![0; count];
        self.generate_samples_into(&mut buffer);
        buffer
    }

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32 {
        44100
    }

    /// Point-in-time view of the playback state for status displays.
    fn snapshot(&self) -> PlayerSnapshot;

    /// Set the master volume, 0-127.
    fn control_volume(&mut self, volume: u8);

    /// Scale the playback speed by a percentage; 100 plays the song as
    /// authored. Values are clamped to at least 1.
    fn control_tempo(&mut self, percent: u16);

    /// Enable or disable looping at the natural end of the song.
    fn set_loop_enabled(&mut self, enabled: bool);

    /// True exactly once after the song reached its natural end and the
    /// player stopped. Looping playback never sets the flag.
    fn take_ended(&mut self) -> bool;

    /// Mute or unmute one channel. Default is a no-op for formats without
    /// per-channel control.
    fn set_channel_mute(&mut self, _channel: usize, _mute: bool) {}

    /// Metadata extracted from the song file at load time.
    fn metadata(&self) -> &SongMetadata;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SilentPlayer {
        state: PlaybackState,
        metadata: SongMetadata,
    }

    impl SilentPlayer {
        fn new() -> Self {
            Self {
                state: PlaybackState::Stopped,
                metadata: SongMetadata::default(),
            }
        }
    }

    impl SongPlayer for SilentPlayer {
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
            buffer.fill(0);
        }
        fn snapshot(&self) -> PlayerSnapshot {
            PlayerSnapshot::default()
        }
        fn control_volume(&mut self, _volume: u8) {}
        fn control_tempo(&mut self, _percent: u16) {}
        fn set_loop_enabled(&mut self, _enabled: bool) {}
        fn take_ended(&mut self) -> bool {
            false
        }
        fn metadata(&self) -> &SongMetadata {
            &self.metadata
        }
    }

    #[test]
    fn default_state_is_stopped() {
        assert_eq!(PlaybackState::default(), PlaybackState::Stopped);
    }

    #[test]
    fn is_playing_follows_state() {
        let mut player = SilentPlayer::new();
        assert!(!player.is_playing());
        player.play();
        assert!(player.is_playing());
        player.pause();
        assert!(!player.is_playing());
    }

    #[test]
    fn generate_samples_wrapper_fills_requested_count() {
        let mut player = SilentPlayer::new();
        let samples = player.generate_samples(128);
        assert_eq!(samples.len(), 128);
        assert!(samples.iter().all(|&s| s == 0));
    }

    #[test]
    fn trait_is_object_safe() {
        let mut boxed: Box<dyn SongPlayer> = Box::new(SilentPlayer::new());
        boxed.play();
        assert_eq!(boxed.state(), PlaybackState::Playing);
    }
}
