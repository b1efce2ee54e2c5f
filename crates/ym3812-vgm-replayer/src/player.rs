//! Sample-accurate replay of VGM command logs.

use ym3812::{OplChip, FNUM_TABLE};
use ym3812_common::{ActiveNote, PlaybackState, PlayerSnapshot, SongMetadata, SongPlayer};

use crate::error::VgmError;
use crate::format::{VgmSong, VGM_SAMPLE_RATE};

const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Upper bound on frames generated between command checks. Keeps every
/// register write within one run of the command stream's position.
const MAX_RUN_FRAMES: usize = 512;

/// Carrier total-level register offset per melodic channel.
const CARRIER_LEVEL_OFFSET: [u8; 9] = [0x03, 0x04, 0x05, 0x0B, 0x0C, 0x0D, 0x13, 0x14, 0x15];

/// Mirror of the chip registers, decoded for display only. Audio never
/// reads from this.
#[derive(Debug, Clone)]
struct RegisterShadow {
    regs: [u8; 256],
}

impl RegisterShadow {
    fn new() -> Self {
        RegisterShadow { regs: [0; 256] }
    }

    fn observe(&mut self, reg: u8, value: u8) {
        self.regs[usize::from(reg)] = value;
    }

    fn reset(&mut self) {
        self.regs = [0; 256];
    }

    fn active_notes(&self) -> Vec<ActiveNote> {
        (0..9u8)
            .filter(|&channel| self.regs[usize::from(0xB0 + channel)] & 0x20 != 0)
            .map(|channel| {
                let b = self.regs[usize::from(0xB0 + channel)];
                let fnum =
                    u16::from(b & 0x03) << 8 | u16::from(self.regs[usize::from(0xA0 + channel)]);
                let block = (b >> 2) & 0x07;
                ActiveNote {
                    channel,
                    note: note_for(fnum, block),
                }
            })
            .collect()
    }

    fn channel_volumes(&self) -> Vec<u8> {
        CARRIER_LEVEL_OFFSET
            .iter()
            .map(|&offset| {
                let level = self.regs[usize::from(0x40 + offset)] & 0x3F;
                (u16::from(63 - level) * 127 / 63) as u8
            })
            .collect()
    }
}

/// Nearest note for an observed F-number and block pair.
fn note_for(fnum: u16, block: u8) -> u8 {
    let semitone = FNUM_TABLE
        .iter()
        .enumerate()
        .min_by_key(|(_, &entry)| entry.abs_diff(fnum))
        .map(|(index, _)| index)
        .unwrap_or(0);
    (u16::from(block) * 12 + semitone as u16 + 12).min(127) as u8
}

/// Plays a parsed [`VgmSong`] by feeding its register writes straight
/// into an [`OplChip`] at their recorded sample positions.
///
/// There is no tick concept: the player tracks a fractional position in
/// the VGM 44100 Hz time domain, applies every command due at or before
/// it, then generates a bounded run of chip audio, repeating until the
/// caller's buffer is full.
pub struct VgmPlayer {
    chip: OplChip,
    song: VgmSong,
    metadata: SongMetadata,
    shadow: RegisterShadow,

    command_index: usize,
    /// Current position in VGM-domain samples.
    position: f64,
    speed: u16,
    master_volume: u8,

    state: PlaybackState,
    loop_enabled: bool,
    ended: bool,
}

impl VgmPlayer {
    pub fn new(song: VgmSong) -> Result<Self, VgmError> {
        let chip = OplChip::new(DEFAULT_SAMPLE_RATE)?;
        let gd3 = song.gd3.clone().unwrap_or_default();
        let metadata = SongMetadata {
            title: gd3.track,
            author: gd3.author,
            comment: gd3.game,
            format: "VGM".to_string(),
            channels: 9,
            duration_seconds: Some(song.duration_seconds()),
        };
        Ok(VgmPlayer {
            chip,
            metadata,
            shadow: RegisterShadow::new(),
            command_index: 0,
            position: 0.0,
            speed: 100,
            master_volume: 127,
            state: PlaybackState::Stopped,
            loop_enabled: false,
            ended: false,
            song,
        })
    }

    /// Non-YM3812 commands the parser dropped from this log.
    pub fn skipped_commands(&self) -> u32 {
        self.song.skipped_commands
    }

    /// VGM-domain samples advanced per generated frame.
    fn step_per_frame(&self) -> f64 {
        f64::from(VGM_SAMPLE_RATE) / f64::from(self.chip.sample_rate()) * f64::from(self.speed)
            / 100.0
    }

    /// Applies every command due at the current position. Returns false
    /// once the stream is over and looping is disabled.
    fn pump_commands(&mut self) -> bool {
        let mut wraps = 0;
        loop {
            match self.song.commands.get(self.command_index) {
                Some(&write) if write.at as f64 <= self.position => {
                    self.chip.write_register(write.reg, write.value);
                    self.shadow.observe(write.reg, write.value);
                    self.command_index += 1;
                }
                Some(_) => return true,
                None => {
                    if self.position < self.song.end_sample as f64 {
                        return true;
                    }
                    // a loop point with no wait before the end would
                    // spin here forever; treat that as a fault
                    if self.loop_enabled && wraps < 2 {
                        wraps += 1;
                        match self.song.loop_index {
                            Some(index) => {
                                self.command_index = index;
                                self.position = self.song.loop_sample as f64;
                            }
                            None => {
                                self.command_index = 0;
                                self.position = 0.0;
                            }
                        }
                        continue;
                    }
                    self.state = PlaybackState::Stopped;
                    self.ended = true;
                    return false;
                }
            }
        }
    }

    fn apply_gain(&self, chunk: &mut [i16]) {
        if self.master_volume >= 127 {
            return;
        }
        let gain = i32::from(self.master_volume);
        for sample in chunk.iter_mut() {
            *sample = (i32::from(*sample) * gain / 127) as i16;
        }
    }

    fn reset_stream(&mut self) {
        self.chip.reset();
        self.shadow.reset();
        self.command_index = 0;
        self.position = 0.0;
    }
}

impl SongPlayer for VgmPlayer {
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
        self.reset_stream();
    }

    fn rewind(&mut self) {
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
            if !self.pump_commands() {
                buffer[written..].fill(0);
                return;
            }
            let frames = ((buffer.len() - written) / 2).min(MAX_RUN_FRAMES);
            if frames == 0 {
                buffer[written..].fill(0);
                return;
            }
            let chunk = &mut buffer[written..written + frames * 2];
            self.chip.generate_into(chunk);
            self.apply_gain(chunk);
            self.position += frames as f64 * self.step_per_frame();
            written += frames * 2;
        }
    }

    fn sample_rate(&self) -> u32 {
        self.chip.sample_rate()
    }

    fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            is_playing: self.state == PlaybackState::Playing,
            is_paused: self.state == PlaybackState::Paused,
            cursor: self.command_index as u64,
            total_size: self.song.commands.len() as u64,
            tempo: 0,
            channel_volumes: self.shadow.channel_volumes(),
            channel_instruments: vec![String::new(); 9],
            active_notes: self.shadow.active_notes(),
        }
    }

    fn control_volume(&mut self, volume: u8) {
        self.master_volume = volume.min(127);
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

    fn metadata(&self) -> &SongMetadata {
        &self.metadata
    }
}
