//! Sequencing of IMS event streams onto the FM engine.

use ym3812::Opl2Engine;
use ym3812_bnk::InstrumentBank;
use ym3812_common::{decay_volumes, ActiveNote, PlaybackState, PlayerSnapshot, SongMetadata, SongPlayer};

use crate::error::ImsError;
use crate::format::{ImsSong, TICKS_PER_BEAT};

const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Upper bound on ticks a single delta sequence may accumulate before the
/// stream is treated as malformed.
const RUNAWAY_TICKS: u64 = 10_000;

/// Upper bound on zero-delay events chained into one tick.
const MAX_EVENTS_PER_TICK: usize = 10_000;

/// Per-tick decay applied to the displayed channel volumes.
const DISPLAY_DECAY: u8 = 2;

#[derive(Debug, Clone)]
struct LoadedInstrument {
    name: String,
    params: Option<[u8; 28]>,
}

/// Scales a channel volume by the 0..=127 master volume.
fn scale_volume(volume: u8, master: u8) -> u8 {
    (u16::from(volume) * u16::from(master) / 127) as u8
}

/// Plays a parsed [`ImsSong`] through the OPL2 engine.
///
/// Events are consumed one tick at a time; each tick is rendered into an
/// internal sample cache sized from the current tempo, and callers drain
/// that cache through [`SongPlayer::generate_samples_into`].
pub struct ImsPlayer {
    engine: Opl2Engine,
    song: ImsSong,
    instruments: Vec<LoadedInstrument>,
    metadata: SongMetadata,

    cursor: usize,
    status: u8,
    tempo: u16,
    speed: u16,
    master_volume: u8,
    channel_volumes: Vec<u8>,
    display_volumes: Vec<u8>,
    channel_instruments: Vec<String>,
    muted: Vec<bool>,

    state: PlaybackState,
    loop_enabled: bool,
    ended: bool,
    anomalies: u32,

    sample_cache: Vec<i16>,
    cache_pos: usize,
    frame_error: f64,
}

impl ImsPlayer {
    /// Creates a player for `song`, resolving its instrument names against
    /// `bank`. Names absent from the bank are kept but flagged; channels
    /// selecting them are silenced until another instrument event arrives.
    pub fn new(song: ImsSong, bank: &InstrumentBank) -> Result<Self, ImsError> {
        let mut engine = Opl2Engine::new();
        engine.init(DEFAULT_SAMPLE_RATE)?;
        engine.set_mode(song.percussive);

        let instruments: Vec<LoadedInstrument> = song
            .instrument_names
            .iter()
            .map(|name| LoadedInstrument {
                params: bank.find(name).map(|record| record.params),
                name: name.clone(),
            })
            .collect();

        let channels = song.num_channels();
        let metadata = SongMetadata {
            title: song.name.clone(),
            author: String::new(),
            comment: String::new(),
            format: "IMS".to_string(),
            channels,
            duration_seconds: Some((song.duration_ms() / 1000.0) as f32),
        };

        let tempo = song.basic_tempo;
        Ok(ImsPlayer {
            engine,
            song,
            instruments,
            metadata,
            cursor: 0,
            status: 0,
            tempo,
            speed: 100,
            master_volume: 127,
            channel_volumes: vec![127; channels],
            display_volumes: vec![0; channels],
            channel_instruments: vec![String::new(); channels],
            muted: vec![false; channels],
            state: PlaybackState::Stopped,
            loop_enabled: false,
            ended: false,
            anomalies: 0,
            sample_cache: Vec::new(),
            cache_pos: 0,
            frame_error: 0.0,
        })
    }

    /// Number of events with an unrecognized status byte seen so far.
    /// Such events consume their single data byte and are otherwise
    /// ignored, matching how the format has always been decoded.
    pub fn anomaly_count(&self) -> u32 {
        self.anomalies
    }

    /// Instrument names the bank could not supply.
    pub fn missing_instruments(&self) -> Vec<&str> {
        self.instruments
            .iter()
            .filter(|instrument| instrument.params.is_none())
            .map(|instrument| instrument.name.as_str())
            .collect()
    }

    /// Milliseconds covered by one tick at the current tempo and speed.
    pub fn tick_delay_ms(&self) -> f64 {
        60_000.0 / (f64::from(TICKS_PER_BEAT) * f64::from(self.tempo)) * 100.0
            / f64::from(self.speed)
    }

    fn read_byte(&mut self) -> Option<u8> {
        let byte = self.song.events.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(byte)
    }

    /// Consumes events up to and including the next non-zero delta and
    /// returns the tick count to wait, or `None` once the song is over
    /// and looping is disabled. [`SongPlayer::generate_samples_into`]
    /// drives this internally; it is public for callers that schedule
    /// ticks themselves.
    pub fn tick(&mut self) -> Option<u32> {
        let mut total: u64 = 0;
        let mut processed = 0usize;
        loop {
            processed += 1;
            if processed > MAX_EVENTS_PER_TICK {
                return self.stream_fault();
            }

            let Some(first) = self.read_byte() else {
                return self.end_of_song(total);
            };
            if first == 0xFC {
                return self.end_of_song(total);
            }
            let data = if first >= 0x80 {
                self.status = first;
                let Some(data) = self.read_byte() else {
                    return self.end_of_song(total);
                };
                data
            } else {
                first
            };

            let channel = usize::from(self.status & 0x0F);
            match self.status & 0xF0 {
                0x80 => {
                    let Some(volume) = self.read_byte() else {
                        return self.end_of_song(total);
                    };
                    self.handle_note(channel, data, volume, true);
                }
                0x90 => {
                    let Some(volume) = self.read_byte() else {
                        return self.end_of_song(total);
                    };
                    self.handle_note(channel, data, volume, false);
                }
                0xA0 => self.handle_volume(channel, data),
                0xC0 => self.handle_instrument(channel, data),
                0xE0 => {
                    let Some(msb) = self.read_byte() else {
                        return self.end_of_song(total);
                    };
                    let bend = u16::from(data) | u16::from(msb) << 8;
                    self.engine.set_voice_pitch(channel as u8, bend >> 1);
                }
                0xF0 => {
                    let skip = self.read_byte();
                    let d1 = self.read_byte();
                    let d2 = self.read_byte();
                    let term = self.read_byte();
                    let (Some(_), Some(d1), Some(d2), Some(_)) = (skip, d1, d2, term) else {
                        return self.end_of_song(total);
                    };
                    self.update_tempo(d1, d2);
                }
                _ => self.anomalies = self.anomalies.saturating_add(1),
            }

            loop {
                let Some(delay) = self.read_byte() else {
                    return self.end_of_song(total);
                };
                match delay {
                    0xF8 => {
                        total += 240;
                        if total >= RUNAWAY_TICKS {
                            return self.stream_fault();
                        }
                    }
                    0xFC => return self.end_of_song(total),
                    literal => {
                        total += u64::from(literal);
                        break;
                    }
                }
            }
            if total > 0 {
                return Some(total.min(u64::from(u32::MAX)) as u32);
            }
        }
    }

    /// Handles the end marker. Looping rewinds the stream and reports the
    /// ticks gathered so far; otherwise playback stops for good.
    fn end_of_song(&mut self, ticks: u64) -> Option<u32> {
        self.cursor = 0;
        self.status = 0;
        self.tempo = self.song.basic_tempo;
        if self.loop_enabled {
            Some(ticks.max(1).min(u64::from(u32::MAX)) as u32)
        } else {
            self.state = PlaybackState::Stopped;
            self.ended = true;
            self.engine.all_notes_off();
            None
        }
    }

    /// A runaway delta or an endless zero-delay chain means the stream is
    /// corrupt. Stop outright, looping included.
    fn stream_fault(&mut self) -> Option<u32> {
        self.cursor = 0;
        self.status = 0;
        self.tempo = self.song.basic_tempo;
        self.state = PlaybackState::Stopped;
        self.ended = true;
        self.engine.all_notes_off();
        None
    }

    fn handle_note(&mut self, channel: usize, pitch: u8, volume: u8, always_on: bool) {
        if !always_on && volume == 0 {
            self.engine.note_off(channel as u8);
            return;
        }
        self.set_channel_volume(channel, volume);
        if !self.muted.get(channel).copied().unwrap_or(false) {
            self.engine.note_on(channel as u8, pitch.saturating_add(12));
        }
    }

    fn handle_volume(&mut self, channel: usize, volume: u8) {
        self.set_channel_volume(channel, volume);
    }

    fn set_channel_volume(&mut self, channel: usize, volume: u8) {
        let scaled = scale_volume(volume, self.master_volume);
        if let Some(slot) = self.channel_volumes.get_mut(channel) {
            *slot = volume;
        }
        if let Some(slot) = self.display_volumes.get_mut(channel) {
            *slot = scaled;
        }
        self.engine.set_voice_volume(channel as u8, scaled);
    }

    fn handle_instrument(&mut self, channel: usize, index: u8) {
        let entry = self.instruments.get(usize::from(index)).cloned();
        let label = match entry {
            Some(LoadedInstrument {
                params: Some(params),
                name,
            }) => {
                self.engine.set_voice_timbre(channel as u8, &params);
                name
            }
            Some(LoadedInstrument { name, .. }) => {
                self.engine.note_off(channel as u8);
                self.engine.set_voice_volume(channel as u8, 0);
                if let Some(slot) = self.display_volumes.get_mut(channel) {
                    *slot = 0;
                }
                format!("!{name}")
            }
            None => {
                self.engine.note_off(channel as u8);
                self.engine.set_voice_volume(channel as u8, 0);
                if let Some(slot) = self.display_volumes.get_mut(channel) {
                    *slot = 0;
                }
                format!("!#{index}")
            }
        };
        if let Some(slot) = self.channel_instruments.get_mut(channel) {
            *slot = label;
        }
    }

    fn update_tempo(&mut self, d1: u8, d2: u8) {
        let base = u32::from(self.song.basic_tempo);
        let tempo = base * u32::from(d1) + base * u32::from(d2) / 128;
        self.tempo = tempo.clamp(1, u32::from(u16::MAX)) as u16;
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
        self.cursor = 0;
        self.status = 0;
        self.tempo = self.song.basic_tempo;
        self.frame_error = 0.0;
        self.sample_cache.clear();
        self.cache_pos = 0;
    }
}

impl SongPlayer for ImsPlayer {
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
            cursor: self.cursor as u64,
            total_size: self.song.events.len() as u64,
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
            let scaled = scale_volume(self.channel_volumes[channel], self.master_volume);
            self.display_volumes[channel] = scaled;
            self.engine.set_voice_volume(channel as u8, scaled);
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
