//! Sequencing of ROL voice tracks onto the FM engine.

use ym3812::Opl2Engine;
use ym3812_bnk::InstrumentBank;
use ym3812_common::{decay_volumes, PlaybackState, PlayerSnapshot, SongMetadata, SongPlayer};

use crate::error::RolError;
use crate::format::{effective_tempo, RolSong};

const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Per-tick decay applied to the displayed channel volumes.
const DISPLAY_DECAY: u8 = 2;

/// Read positions into one voice's four event tables.
#[derive(Debug, Clone, Default)]
struct TrackCursor {
    note: usize,
    /// Ticks left in the note run currently sounding.
    note_ticks: u32,
    timbre: usize,
    volume: usize,
    pitch: usize,
}

/// Plays a parsed [`RolSong`] through the OPL2 engine.
///
/// Every tick covers the same wall-clock slice (scaled by the tempo
/// track); per tick each channel's tables are checked independently for
/// events due at the current tick, in instrument, pitch, volume, note
/// order.
pub struct RolPlayer {
    engine: Opl2Engine,
    song: RolSong,
    instruments: Vec<Option<[u8; 28]>>,
    metadata: SongMetadata,

    current_tick: u32,
    tempo: u16,
    speed: u16,
    master_volume: u8,
    transpose: i8,

    tempo_cursor: usize,
    cursors: Vec<TrackCursor>,

    channel_volumes: Vec<u8>,
    volume_offsets: Vec<u8>,
    display_volumes: Vec<u8>,
    channel_instruments: Vec<String>,
    muted: Vec<bool>,

    state: PlaybackState,
    loop_enabled: bool,
    ended: bool,

    sample_cache: Vec<i16>,
    cache_pos: usize,
    frame_error: f64,
}

impl RolPlayer {
    /// Creates a player for `song`, resolving its instrument names
    /// against `bank`. Unlike the IMS player, channels that select a
    /// missing instrument keep playing with whatever timbre they had.
    pub fn new(song: RolSong, bank: &InstrumentBank) -> Result<Self, RolError> {
        let mut engine = Opl2Engine::new();
        engine.init(DEFAULT_SAMPLE_RATE)?;
        engine.set_mode(song.percussive);

        let instruments = song
            .instrument_names
            .iter()
            .map(|name| bank.find(name).map(|record| record.params))
            .collect();

        let channels = song.num_channels();
        let title = if song.comment.is_empty() || song.comment.chars().any(char::is_control) {
            String::new()
        } else {
            song.comment.clone()
        };
        let metadata = SongMetadata {
            title,
            author: String::new(),
            comment: String::new(),
            format: "ROL".to_string(),
            channels,
            duration_seconds: Some((song.duration_ms() / 1000.0) as f32),
        };

        let tempo = effective_tempo(song.basic_tempo, 1.0);
        Ok(RolPlayer {
            engine,
            instruments,
            metadata,
            current_tick: 0,
            tempo,
            speed: 100,
            master_volume: 127,
            transpose: 0,
            tempo_cursor: 0,
            cursors: vec![TrackCursor::default(); channels],
            channel_volumes: vec![127; channels],
            volume_offsets: vec![0; channels],
            display_volumes: vec![0; channels],
            channel_instruments: vec![String::new(); channels],
            muted: vec![false; channels],
            state: PlaybackState::Stopped,
            loop_enabled: false,
            ended: false,
            sample_cache: Vec::new(),
            cache_pos: 0,
            frame_error: 0.0,
            song,
        })
    }

    /// Instrument names the bank could not supply.
    pub fn missing_instruments(&self) -> Vec<&str> {
        self.song
            .instrument_names
            .iter()
            .zip(&self.instruments)
            .filter(|(_, params)| params.is_none())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Shifts every subsequent note by `transpose` semitones,
    /// clamped to [-13, 13].
    pub fn set_key_transpose(&mut self, transpose: i8) {
        self.transpose = transpose.clamp(-13, 13);
    }

    pub fn key_transpose(&self) -> i8 {
        self.transpose
    }

    /// Adds an extra 0..=15 percent to one channel's volume scale.
    pub fn set_channel_volume(&mut self, channel: usize, offset: u8) {
        if channel < self.volume_offsets.len() {
            self.volume_offsets[channel] = offset.min(15);
            self.apply_channel_volume(channel);
        }
    }

    /// Milliseconds covered by one tick at the current tempo and speed.
    pub fn tick_delay_ms(&self) -> f64 {
        60_000.0 / (f64::from(self.song.ticks_per_beat) * f64::from(self.tempo)) * 100.0
            / f64::from(self.speed)
    }

    /// Advances the global tick counter by one, applying every event due
    /// at the current tick. Returns the tick count to wait (always 1),
    /// or `None` once the song is over and looping is disabled.
    pub fn tick(&mut self) -> Option<u32> {
        if self.current_tick >= self.song.total_ticks() {
            return self.end_of_song();
        }

        loop {
            let event = self.song.tempo_events.get(self.tempo_cursor).copied();
            let Some(event) = event else { break };
            if u32::from(event.time) != self.current_tick {
                break;
            }
            self.tempo_cursor += 1;
            self.tempo = effective_tempo(self.song.basic_tempo, event.multiplier);
        }

        for channel in 0..self.cursors.len().min(self.song.tracks.len()) {
            self.update_channel(channel);
        }

        self.current_tick += 1;
        Some(1)
    }

    fn update_channel(&mut self, channel: usize) {
        let tick = self.current_tick;

        loop {
            let cursor = self.cursors[channel].timbre;
            let event = self.song.tracks[channel].timbres.get(cursor).copied();
            let Some(event) = event else { break };
            if u32::from(event.time) != tick {
                break;
            }
            self.cursors[channel].timbre = cursor + 1;
            self.apply_instrument(channel, event.instrument);
        }

        loop {
            let cursor = self.cursors[channel].pitch;
            let event = self.song.tracks[channel].pitches.get(cursor).copied();
            let Some(event) = event else { break };
            if u32::from(event.time) != tick {
                break;
            }
            self.cursors[channel].pitch = cursor + 1;
            self.engine.set_voice_pitch(channel as u8, event.bend);
        }

        loop {
            let cursor = self.cursors[channel].volume;
            let event = self.song.tracks[channel].volumes.get(cursor).copied();
            let Some(event) = event else { break };
            if u32::from(event.time) != tick {
                break;
            }
            self.cursors[channel].volume = cursor + 1;
            self.channel_volumes[channel] = event.volume;
            self.apply_channel_volume(channel);
        }

        if self.cursors[channel].note_ticks > 0 {
            self.cursors[channel].note_ticks -= 1;
        }
        if self.cursors[channel].note_ticks == 0 {
            let index = self.cursors[channel].note;
            let event = self.song.tracks[channel].notes.get(index).copied();
            if let Some(event) = event {
                self.cursors[channel].note = index + 1;
                self.cursors[channel].note_ticks = u32::from(event.duration);
                self.play_note(channel, event.note);
            }
        }
    }

    fn play_note(&mut self, channel: usize, note: u8) {
        if note == 0 {
            self.engine.note_off(channel as u8);
            return;
        }
        self.apply_channel_volume(channel);
        if self.muted.get(channel).copied().unwrap_or(false) {
            return;
        }
        let pitch = i32::from(note) + i32::from(self.transpose) + 12;
        self.engine.note_on(channel as u8, pitch.clamp(0, 127) as u8);
    }

    fn apply_instrument(&mut self, channel: usize, instrument: u16) {
        let index = usize::from(instrument);
        let name = self
            .song
            .instrument_names
            .get(index)
            .cloned()
            .unwrap_or_default();
        match self.instruments.get(index).copied().flatten() {
            Some(params) => {
                self.engine.set_voice_timbre(channel as u8, &params);
                self.channel_instruments[channel] = name;
            }
            None => {
                self.channel_instruments[channel] = format!("!{name}");
            }
        }
    }

    /// Applies `floor(stored * (global + offset) / 100)` to the engine,
    /// where global is the master volume as a percentage.
    fn apply_channel_volume(&mut self, channel: usize) {
        let stored = u32::from(self.channel_volumes[channel]);
        let global = u32::from(self.master_volume) * 100 / 127;
        let offset = u32::from(self.volume_offsets[channel]);
        let scaled = (stored * (global + offset) / 100).min(127) as u8;
        self.display_volumes[channel] = scaled;
        self.engine.set_voice_volume(channel as u8, scaled);
    }

    fn end_of_song(&mut self) -> Option<u32> {
        self.reset_cursors();
        if self.loop_enabled {
            Some(1)
        } else {
            self.state = PlaybackState::Stopped;
            self.ended = true;
            self.engine.all_notes_off();
            None
        }
    }

    fn reset_cursors(&mut self) {
        self.current_tick = 0;
        self.tempo_cursor = 0;
        self.tempo = effective_tempo(self.song.basic_tempo, 1.0);
        for cursor in &mut self.cursors {
            *cursor = TrackCursor::default();
        }
    }

    /// Runs the next tick and renders it into the sample cache.
    fn refill_cache(&mut self) {
        let Some(ticks) = self.tick() else {
            self.sample_cache.clear();
            self.cache_pos = 0;
            return;
        };
        decay_volumes(&mut self.display_volumes, DISPLAY_DECAY);

        let rate = f64::from(self.engine.sample_rate());
        let exact = self.frame_error + self.tick_delay_ms() * f64::from(ticks) * rate / 1000.0;
        let frames = exact as usize;
        self.frame_error = exact - frames as f64;

        self.sample_cache.clear();
        self.sample_cache.resize(frames * 2, 0);
        self.cache_pos = 0;
        if frames > 0 {
            self.engine.generate_into(&mut self.sample_cache);
        }
    }

    fn reset_stream(&mut self) {
        self.reset_cursors();
        self.frame_error = 0.0;
        self.sample_cache.clear();
        self.cache_pos = 0;
    }
}

impl SongPlayer for RolPlayer {
    fn play(&mut self) {
        self.state = PlaybackState::Playing;
    }

    fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        self.engine.all_notes_off();
        self.reset_stream();
    }

    fn rewind(&mut self) {
        self.engine.all_notes_off();
        self.reset_stream();
    }

    fn state(&self) -> PlaybackState {
        self.state
    }

    fn generate_samples_into(&mut self, buffer: &mut [i16]) {
        if self.state != PlaybackState::Playing {
            buffer.fill(0);
            return;
        }
        let mut written = 0;
        while written < buffer.len() {
            if self.cache_pos >= self.sample_cache.len() {
                self.refill_cache();
                if self.state != PlaybackState::Playing {
                    buffer[written..].fill(0);
                    return;
                }
                continue;
            }
            let available = self.sample_cache.len() - self.cache_pos;
            let take = available.min(buffer.len() - written);
            buffer[written..written + take]
                .copy_from_slice(&self.sample_cache[self.cache_pos..self.cache_pos + take]);
            self.cache_pos += take;
            written += take;
        }
    }

    fn sample_rate(&self) -> u32 {
        self.engine.sample_rate()
    }

    fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            is_playing: self.state == PlaybackState::Playing,
            is_paused: self.state == PlaybackState::Paused,
            cursor: u64::from(self.current_tick),
            total_size: u64::from(self.song.total_ticks()),
            tempo: self.tempo,
            channel_volumes: self.display_volumes.clone(),
            channel_instruments: self.channel_instruments.clone(),
            active_notes: self
                .engine
                .active_notes()
                .into_iter()
                .filter(|note| !self.muted.get(usize::from(note.channel)).copied().unwrap_or(false))
                .collect(),
        }
    }

    fn control_volume(&mut self, volume: u8) {
        self.master_volume = volume.min(127);
        for channel in 0..self.channel_volumes.len() {
            self.apply_channel_volume(channel);
        }
    }

    fn control_tempo(&mut self, percent: u16) {
        self.speed = percent.max(1);
    }

    fn set_loop_enabled(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
    }

    fn take_ended(&mut self) -> bool {
        std::mem::take(&mut self.ended)
    }

    fn set_channel_mute(&mut self, channel: usize, mute: bool) {
        if let Some(slot) = self.muted.get_mut(channel) {
            *slot = mute;
            if mute {
                self.engine.note_off(channel as u8);
            }
        }
    }

    fn metadata(&self) -> &SongMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tests::{build_rol, melodic_track, TrackSpec};
    use crate::parser::parse_rol;
    use approx::assert_relative_eq;

    fn bank_with(names: &[&str]) -> InstrumentBank {
        let count = names.len() as u16;
        let mut data = vec![1u8, 0];
        data.extend_from_slice(b"ADLIB-");
        data.extend_from_slice(&count.to_le_bytes());
        data.extend_from_slice(&count.to_le_bytes());
        let offset_names = 20u32;
        let offset_data = offset_names + u32::from(count) * 12;
        data.extend_from_slice(&offset_names.to_le_bytes());
        data.extend_from_slice(&offset_data.to_le_bytes());
        for (index, name) in names.iter().enumerate() {
            data.extend_from_slice(&(index as u16).to_le_bytes());
            data.push(1);
            let mut padded = [0u8; 9];
            padded[..name.len()].copy_from_slice(name.as_bytes());
            data.extend_from_slice(&padded);
        }
        for _ in names {
            data.push(0);
            data.push(0);
            data.extend_from_slice(&[0u8; 28]);
        }
        InstrumentBank::parse(&data).expect("test bank should parse")
    }

    fn player_from(tracks: &[TrackSpec]) -> RolPlayer {
        let data = build_rol(1, 120, 120.0, &[], tracks);
        let song = parse_rol(&data).expect("test song should parse");
        RolPlayer::new(song, &bank_with(&["PIANO"])).expect("player should build")
    }

    #[test]
    fn tick_delay_matches_the_formula() {
        let mut player = player_from(&[melodic_track(&[(48, 4)])]);
        assert_relative_eq!(player.tick_delay_ms(), 4.166666666666667, epsilon = 1e-9);
        player.control_tempo(50);
        assert_relative_eq!(player.tick_delay_ms(), 8.333333333333334, epsilon = 1e-9);
    }

    #[test]
    fn note_runs_key_at_their_ticks() {
        let mut player = player_from(&[melodic_track(&[(48, 4), (0, 4), (50, 2)])]);
        player.play();
        assert_eq!(player.tick(), Some(1));
        let notes = player.snapshot().active_notes;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].note, 60);
        for _ in 0..3 {
            player.tick();
        }
        assert_eq!(player.snapshot().active_notes.len(), 1);
        player.tick();
        assert!(player.snapshot().active_notes.is_empty());
        for _ in 0..4 {
            player.tick();
        }
        let notes = player.snapshot().active_notes;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].note, 62);
    }

    #[test]
    fn song_ends_after_the_longest_track() {
        let mut player = player_from(&[melodic_track(&[(48, 2)])]);
        player.play();
        assert_eq!(player.tick(), Some(1));
        assert_eq!(player.tick(), Some(1));
        assert_eq!(player.tick(), None);
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert!(player.take_ended());
        assert!(!player.take_ended());
    }

    #[test]
    fn loop_rewinds_without_ended() {
        let mut player = player_from(&[melodic_track(&[(48, 2)])]);
        player.set_loop_enabled(true);
        player.play();
        player.tick();
        player.tick();
        assert_eq!(player.tick(), Some(1));
        assert_eq!(player.current_tick, 0);
        assert_eq!(player.state(), PlaybackState::Playing);
        assert!(!player.take_ended());
    }

    #[test]
    fn transpose_is_clamped_and_applied() {
        let mut player = player_from(&[melodic_track(&[(48, 2)])]);
        player.set_key_transpose(2);
        player.play();
        player.tick();
        assert_eq!(player.snapshot().active_notes[0].note, 62);

        player.set_key_transpose(20);
        assert_eq!(player.key_transpose(), 13);
        player.set_key_transpose(-20);
        assert_eq!(player.key_transpose(), -13);
    }

    #[test]
    fn volume_formula_uses_global_and_offset() {
        let track = TrackSpec {
            notes: vec![(48, 4)],
            volumes: vec![(0, 0.5)],
            ..TrackSpec::default()
        };
        let mut player = player_from(&[track]);
        player.play();
        player.tick();
        // stored 64, master 127 -> global 100%
        assert_eq!(player.display_volumes[0], 64);

        player.set_channel_volume(0, 15);
        assert_eq!(player.display_volumes[0], 73);

        player.control_volume(64);
        // global drops to 50%, offset still 15
        assert_eq!(player.display_volumes[0], 41);
    }

    #[test]
    fn tempo_track_rescales_ticks() {
        let data = build_rol(
            1,
            120,
            120.0,
            &[(1, 2.0)],
            &[melodic_track(&[(48, 4)])],
        );
        let song = parse_rol(&data).expect("test song should parse");
        let mut player = RolPlayer::new(song, &bank_with(&[])).expect("player should build");
        player.play();
        player.tick();
        assert_eq!(player.snapshot().tempo, 120);
        player.tick();
        assert_eq!(player.snapshot().tempo, 240);
        assert_relative_eq!(player.tick_delay_ms(), 60_000.0 / (120.0 * 240.0), epsilon = 1e-9);
    }

    #[test]
    fn missing_instrument_keeps_the_channel_sounding() {
        let track = TrackSpec {
            notes: vec![(48, 4)],
            timbres: vec![(0, "NOSUCH".to_string())],
            ..TrackSpec::default()
        };
        let mut player = player_from(&[track]);
        player.play();
        player.tick();
        let snapshot = player.snapshot();
        assert_eq!(snapshot.channel_instruments[0], "!NOSUCH");
        assert_eq!(snapshot.active_notes.len(), 1);
        assert_eq!(player.missing_instruments(), vec!["NOSUCH"]);
    }

    #[test]
    fn known_instrument_updates_the_display_name() {
        let track = TrackSpec {
            notes: vec![(48, 4)],
            timbres: vec![(0, "PIANO".to_string())],
            ..TrackSpec::default()
        };
        let mut player = player_from(&[track]);
        player.play();
        player.tick();
        assert_eq!(player.snapshot().channel_instruments[0], "PIANO");
    }

    #[test]
    fn muted_channel_skips_note_on() {
        let mut player = player_from(&[melodic_track(&[(48, 4)])]);
        player.set_channel_mute(0, true);
        player.play();
        player.tick();
        assert!(player.snapshot().active_notes.is_empty());
    }

    #[test]
    fn generate_fills_the_buffer_while_looping() {
        let mut player = player_from(&[melodic_track(&[(48, 8)])]);
        player.set_loop_enabled(true);
        player.play();
        let mut buffer = [0i16; 2048];
        player.generate_samples_into(&mut buffer);
        assert_eq!(player.state(), PlaybackState::Playing);
        assert!(buffer.iter().any(|&sample| sample != 0));
    }

    #[test]
    fn stopped_player_outputs_silence() {
        let mut player = player_from(&[melodic_track(&[(48, 4)])]);
        let mut buffer = [7i16; 128];
        player.generate_samples_into(&mut buffer);
        assert!(buffer.iter().all(|&sample| sample == 0));
    }

    #[test]
    fn comment_becomes_the_title() {
        let player = player_from(&[]);
        assert_eq!(player.metadata().title, "test song");
        assert_eq!(player.metadata().format, "ROL");
        assert_eq!(player.metadata().channels, 9);
    }

    #[test]
    fn players_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<RolPlayer>();
    }
}
