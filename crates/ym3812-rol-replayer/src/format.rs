//! Parsed representation of AdLib Visual Composer ROL files.
//!
//! A ROL carries one tempo track plus eleven voice tracks, each voice
//! holding four independent time-ascending tables: notes, instrument
//! changes, volume changes and pitch changes. The float-encoded tempo,
//! volume and pitch values are rescaled to integers at parse time.

/// Number of voice tracks a ROL file always carries, in use or not.
pub const NUM_TRACKS: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoEvent {
    pub time: u16,
    pub multiplier: f32,
}

/// One run in a note table. A note number of zero is a rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub note: u8,
    pub duration: u16,
}

/// Instrument change, pointing into [`RolSong::instrument_names`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimbreEvent {
    pub time: u16,
    pub instrument: u16,
}

/// Volume change, already rescaled to the 0..=127 engine range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeEvent {
    pub time: u16,
    pub volume: u8,
}

/// Pitch change, already rescaled to a 14-bit bend with 0x2000 center.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitchEvent {
    pub time: u16,
    pub bend: u16,
}

#[derive(Debug, Clone, Default)]
pub struct VoiceTrack {
    /// Tick at which the last note run ends.
    pub total_ticks: u16,
    pub notes: Vec<NoteEvent>,
    pub timbres: Vec<TimbreEvent>,
    pub volumes: Vec<VolumeEvent>,
    pub pitches: Vec<PitchEvent>,
}

#[derive(Debug, Clone)]
pub struct RolSong {
    pub comment: String,
    pub ticks_per_beat: u16,
    pub beats_per_measure: u16,
    /// Melodic (9 voices) or percussive (6 + 5 drums) layout.
    pub percussive: bool,
    /// Base tempo in beats per minute; the tempo track multiplies it.
    pub basic_tempo: f32,
    pub tempo_events: Vec<TempoEvent>,
    pub tracks: Vec<VoiceTrack>,
    /// Deduplicated instrument names referenced by the timbre tables.
    pub instrument_names: Vec<String>,
}

impl RolSong {
    pub fn num_channels(&self) -> usize {
        if self.percussive {
            11
        } else {
            9
        }
    }

    /// Length of the longest voice track in ticks.
    pub fn total_ticks(&self) -> u32 {
        self.tracks
            .iter()
            .map(|track| u32::from(track.total_ticks))
            .max()
            .unwrap_or(0)
    }

    /// Wall-clock length in milliseconds at 100% speed, walking the
    /// tempo track.
    pub fn duration_ms(&self) -> f64 {
        let total = self.total_ticks();
        let ticks_per_beat = f64::from(self.ticks_per_beat.max(1));
        let mut ms = 0.0;
        let mut tempo = f64::from(effective_tempo(self.basic_tempo, 1.0));
        let mut last_tick = 0u32;
        for event in &self.tempo_events {
            let time = u32::from(event.time).min(total);
            if time > last_tick {
                ms += f64::from(time - last_tick) * 60_000.0 / (ticks_per_beat * tempo);
                last_tick = time;
            }
            tempo = f64::from(effective_tempo(self.basic_tempo, event.multiplier));
        }
        if total > last_tick {
            ms += f64::from(total - last_tick) * 60_000.0 / (ticks_per_beat * tempo);
        }
        ms
    }
}

/// Beats per minute after applying a tempo-track multiplier.
pub fn effective_tempo(basic: f32, multiplier: f32) -> u16 {
    (basic * multiplier).round().clamp(1.0, f32::from(u16::MAX)) as u16
}
