//! Snapshot types polled by status displays.

/// One note currently keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveNote {
    /// Driver voice the note sounds on (0-8 melodic, 6-10 percussive).
    pub channel: u8,
    /// Semitone number as sent to the synth.
    pub note: u8,
}

/// Point-in-time view of a player's state.
///
/// Produced by [`SongPlayer::snapshot`](crate::SongPlayer::snapshot) on
/// every poll; cheap to clone, never holds references into the player.
#[derive(Debug, Clone, Default)]
pub struct PlayerSnapshot {
    /// Player is producing audio.
    pub is_playing: bool,
    /// Player is paused (position retained).
    pub is_paused: bool,
    /// Position in the format's own unit: event-stream bytes for IMS,
    /// ticks for ROL, samples for VGM.
    pub cursor: u64,
    /// Total song length in the same unit as `cursor`, 0 when unknown.
    pub total_size: u64,
    /// Current tempo in beats per minute, 0 for formats without one.
    pub tempo: u16,
    /// Last observed per-channel volume (0-127), decayed between events
    /// so displays fall back to quiet.
    pub channel_volumes: Vec<u8>,
    /// Display name of the instrument loaded on each channel; missing bank
    /// entries are marked with a leading `!`.
    pub channel_instruments: Vec<String>,
    /// Notes currently keyed on.
    pub active_notes: Vec<ActiveNote>,
}

/// Decay display volumes by `amount`, saturating at zero.
///
/// Players call this once per tick so channel meters drop off after the
/// triggering event instead of sticking at the last value.
pub fn decay_volumes(volumes: &mut [u8], amount: u8) {
    for volume in volumes.iter_mut() {
        *volume = volume.saturating_sub(amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decay_saturates_at_zero() {
        let mut volumes = [100, 3, 0];
        decay_volumes(&mut volumes, 4);
        assert_eq!(volumes, [96, 0, 0]);
        decay_volumes(&mut volumes, 255);
        assert_eq!(volumes, [0, 0, 0]);
    }

    #[test]
    fn snapshot_default_is_idle() {
        let snapshot = PlayerSnapshot::default();
        assert!(!snapshot.is_playing);
        assert!(!snapshot.is_paused);
        assert_eq!(snapshot.cursor, 0);
        assert!(snapshot.active_notes.is_empty());
    }
}
