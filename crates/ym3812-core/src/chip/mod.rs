//! Register-level YM3812 (OPL2) model.
//!
//! Nine two-operator channels, the shared vibrato/tremolo LFOs, the noise
//! generator and the rhythm-mode phase trickery, rendered at the chip's
//! native rate (14.318 MHz / 288 ≈ 49716 Hz) and linearly resampled to the
//! requested output rate.

mod channel;
mod operator;
pub(crate) mod tables;

use crate::backend::Opl2Backend;
use crate::{Result, Ym3812Error};
use channel::Channel;
use tables::{wave_output, SILENCE_CUTOFF};

/// Native sample rate of the YM3812 (master clock divided by 288).
pub const NATIVE_RATE: f64 = 14_318_180.0 / 288.0;

/// Key-on source for regular channel key bits.
pub(crate) const KEY_NORMAL: u8 = 0x01;
/// Key-on source for rhythm-mode trigger bits.
pub(crate) const KEY_RHYTHM: u8 = 0x02;

/// Map from register offset (reg & 0x1F) to operator number, or -1 for
/// the holes in the register file.
const OP_OFFSET: [i8; 22] = [
    0, 1, 2, 3, 4, 5, -1, -1, 6, 7, 8, 9, 10, 11, -1, -1, 12, 13, 14, 15, 16, 17,
];

/// Software YM3812.
///
/// Drive it through [`write_register`](OplChip::write_register) exactly as
/// a DOS driver would hit ports 0x388/0x389, then pull samples with
/// [`generate_into`](OplChip::generate_into).
pub struct OplChip {
    channels: [Channel; 9],
    note_select: bool,
    wave_enable: bool,
    regbd: u8,
    noise: u32,

    // shared LFOs
    vib_pos: u8,
    vib_counter: u16,
    trem_pos: u8,
    trem_counter: u16,
    trem_raw: i32,

    // output-rate conversion
    sample_rate: u32,
    step: u32,
    frac: u32,
    prev: i32,
    next: i32,
}

impl OplChip {
    /// Create a chip producing audio at `sample_rate` Hz.
    pub fn new(sample_rate: u32) -> Result<Self> {
        if !(8_000..=192_000).contains(&sample_rate) {
            return Err(Ym3812Error::UnsupportedSampleRate(sample_rate));
        }
        Ok(OplChip {
            channels: Default::default(),
            note_select: false,
            wave_enable: false,
            regbd: 0,
            noise: 1,
            vib_pos: 0,
            vib_counter: 0,
            trem_pos: 0,
            trem_counter: 0,
            trem_raw: 0,
            sample_rate,
            step: (NATIVE_RATE * 65536.0 / sample_rate as f64) as u32,
            frac: 0,
            prev: 0,
            next: 0,
        })
    }

    /// Output sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Clear all registers and internal phase/envelope/LFO state.
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
        self.note_select = false;
        self.wave_enable = false;
        self.regbd = 0;
        self.noise = 1;
        self.vib_pos = 0;
        self.vib_counter = 0;
        self.trem_pos = 0;
        self.trem_counter = 0;
        self.trem_raw = 0;
        self.frac = 0;
        self.prev = 0;
        self.next = 0;
    }

    /// Write a value to a chip register. Unmapped registers are ignored,
    /// as on hardware.
    pub fn write_register(&mut self, reg: u8, value: u8) {
        match reg {
            0x01 => {
                self.wave_enable = value & 0x20 != 0;
                for channel in &mut self.channels {
                    channel.op[0].set_wave_enable(self.wave_enable);
                    channel.op[1].set_wave_enable(self.wave_enable);
                }
            }
            0x08 => {
                self.note_select = value & 0x40 != 0;
                for channel in &mut self.channels {
                    channel.update_frequency(self.note_select);
                }
            }
            0x20..=0x35 => self.operator_write(reg, |op, _| op.write_20(value)),
            0x40..=0x55 => self.operator_write(reg, |op, _| op.write_40(value)),
            0x60..=0x75 => self.operator_write(reg, |op, _| op.write_60(value)),
            0x80..=0x95 => self.operator_write(reg, |op, _| op.write_80(value)),
            0xE0..=0xF5 => {
                self.operator_write(reg, |op, wave_enable| op.write_e0(value, wave_enable))
            }
            0xA0..=0xA8 => {
                self.channels[(reg - 0xA0) as usize].write_a0(value, self.note_select)
            }
            0xB0..=0xB8 => {
                self.channels[(reg - 0xB0) as usize].write_b0(value, self.note_select)
            }
            0xBD => self.write_bd(value),
            0xC0..=0xC8 => self.channels[(reg - 0xC0) as usize].write_c0(value),
            _ => {}
        }
    }

    fn operator_write(&mut self, reg: u8, write: impl FnOnce(&mut operator::Operator, bool)) {
        let offset = (reg & 0x1F) as usize;
        if offset >= OP_OFFSET.len() {
            return;
        }
        let index = OP_OFFSET[offset];
        if index < 0 {
            return;
        }
        let index = index as usize;
        let channel = (index / 6) * 3 + index % 3;
        let slot = (index % 6) / 3;
        write(&mut self.channels[channel].op[slot], self.wave_enable);
    }

    /// Rhythm-mode register: depth flags, rhythm enable and the five
    /// percussion trigger bits.
    fn write_bd(&mut self, value: u8) {
        let change = self.regbd ^ value;
        self.regbd = value;

        if value & 0x20 != 0 {
            // (trigger bit, channel, operator mask as (op0, op1))
            const TRIGGERS: [(u8, usize, bool, bool); 5] = [
                (0x10, 6, true, true),  // bass drum
                (0x08, 7, false, true), // snare
                (0x04, 8, true, false), // tom-tom
                (0x02, 8, false, true), // cymbal
                (0x01, 7, true, false), // hi-hat
            ];
            for &(bit, channel, op0, op1) in &TRIGGERS {
                if change & bit == 0 {
                    continue;
                }
                let keyed = value & bit != 0;
                let ops = &mut self.channels[channel].op;
                for (slot, active) in [(0, op0), (1, op1)] {
                    if !active {
                        continue;
                    }
                    if keyed {
                        ops[slot].key_on(KEY_RHYTHM);
                    } else {
                        ops[slot].key_off(KEY_RHYTHM);
                    }
                }
            }
        } else if change & 0x20 != 0 {
            // leaving rhythm mode drops every rhythm key
            for channel in 6..9 {
                self.channels[channel].op[0].key_off(KEY_RHYTHM);
                self.channels[channel].op[1].key_off(KEY_RHYTHM);
            }
        }
    }

    /// Fill `out` with interleaved stereo samples at the output rate.
    pub fn generate_into(&mut self, out: &mut [i16]) {
        let mut frames = out.chunks_exact_mut(2);
        for frame in &mut frames {
            self.frac += self.step;
            while self.frac >= 1 << 16 {
                self.frac -= 1 << 16;
                self.prev = self.next;
                self.next = self.render_native();
            }
            let delta = (self.next - self.prev) as i64 * self.frac as i64;
            let mixed = self.prev + (delta >> 16) as i32;
            let sample = mixed.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            frame[0] = sample;
            frame[1] = sample;
        }
        for sample in frames.into_remainder() {
            *sample = 0;
        }
    }

    /// One sample at the chip's native rate, all channels mixed.
    fn render_native(&mut self) -> i32 {
        self.forward_lfo();
        self.noise = forward_noise(self.noise);

        let tremolo = self.trem_raw >> if self.regbd & 0x80 != 0 { 2 } else { 4 };
        let vib_pos = self.vib_pos;
        let vib_deep = self.regbd & 0x40 != 0;
        let rhythm = self.regbd & 0x20 != 0;

        let mut mix = 0i32;
        let melodic = if rhythm { 6 } else { 9 };
        for channel in self.channels[..melodic].iter_mut() {
            let vibrato = vibrato_offset(channel.fnum(), vib_pos, vib_deep);
            mix += channel.render(vibrato, tremolo);
        }
        if rhythm {
            mix += self.render_rhythm(tremolo, vib_pos, vib_deep);
        }
        mix
    }

    fn forward_lfo(&mut self) {
        self.vib_counter += 1;
        if self.vib_counter == 1024 {
            self.vib_counter = 0;
            self.vib_pos = (self.vib_pos + 1) & 7;
        }
        self.trem_counter += 1;
        if self.trem_counter == 64 {
            self.trem_counter = 0;
            self.trem_pos = (self.trem_pos + 1) % 210;
            self.trem_raw = if self.trem_pos < 105 {
                self.trem_pos as i32
            } else {
                210 - self.trem_pos as i32
            };
        }
    }

    /// Channels 6-8 in rhythm mode: bass drum stays a regular FM pair,
    /// the other four voices recombine operator phases with the noise
    /// generator.
    fn render_rhythm(&mut self, tremolo: i32, vib_pos: u8, vib_deep: bool) -> i32 {
        let noise_bit = (self.noise & 1) as u16;

        let vib6 = vibrato_offset(self.channels[6].fnum(), vib_pos, vib_deep);
        let mut total = self.channels[6].render(vib6, tremolo);

        let vib7 = vibrato_offset(self.channels[7].fnum(), vib_pos, vib_deep);
        let vib8 = vibrato_offset(self.channels[8].fnum(), vib_pos, vib_deep);
        let hh_phase = self.channels[7].op[0].forward_phase(vib7);
        self.channels[7].op[1].forward_phase(vib7);
        let tom_phase = self.channels[8].op[0].forward_phase(vib8);
        let cym_phase = self.channels[8].op[1].forward_phase(vib8);

        let rattle = ((hh_phase & 0x88) ^ ((hh_phase << 5) & 0x80))
            | ((cym_phase ^ (cym_phase << 2)) & 0x20);
        let phase_bit: u16 = if rattle != 0 { 2 } else { 0 };

        // hi-hat
        let op = &mut self.channels[7].op[0];
        let attenuation = op.forward_envelope(tremolo);
        if attenuation < SILENCE_CUTOFF {
            let index = (phase_bit << 8) | (0x34 << (phase_bit ^ (noise_bit << 1)));
            total += wave_output(op.waveform(), index, (attenuation as u32) << 3);
        }

        // snare
        let op = &mut self.channels[7].op[1];
        let attenuation = op.forward_envelope(tremolo);
        if attenuation < SILENCE_CUTOFF {
            let index = (0x100 + (hh_phase & 0x100)) ^ (noise_bit << 8);
            total += wave_output(op.waveform(), index, (attenuation as u32) << 3);
        }

        // tom-tom
        let op = &mut self.channels[8].op[0];
        let attenuation = op.forward_envelope(tremolo);
        if attenuation < SILENCE_CUTOFF {
            total += wave_output(op.waveform(), tom_phase, (attenuation as u32) << 3);
        }

        // top cymbal
        let op = &mut self.channels[8].op[1];
        let attenuation = op.forward_envelope(tremolo);
        if attenuation < SILENCE_CUTOFF {
            let index = (1 + phase_bit) << 8;
            total += wave_output(op.waveform(), index, (attenuation as u32) << 3);
        }

        total << 1
    }

    #[cfg(test)]
    fn resample_step(&self) -> u32 {
        self.step
    }
}

impl Opl2Backend for OplChip {
    fn create(sample_rate: u32) -> Result<Self> {
        OplChip::new(sample_rate)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn reset(&mut self) {
        OplChip::reset(self);
    }

    fn write_register(&mut self, reg: u8, value: u8) {
        OplChip::write_register(self, reg, value);
    }

    fn generate_into(&mut self, out: &mut [i16]) {
        OplChip::generate_into(self, out);
    }
}

/// Per-sample fnum offset of the shared vibrato LFO for a channel
/// frequency. Eight positions per cycle, depth halved in shallow mode.
fn vibrato_offset(fnum: u16, position: u8, deep: bool) -> i32 {
    let mut range = ((fnum >> 7) & 7) as i32;
    match position & 3 {
        0 => range = 0,
        1 | 3 => range >>= 1,
        _ => {}
    }
    if !deep {
        range >>= 1;
    }
    if position & 4 != 0 {
        -range
    } else {
        range
    }
}

/// 23-bit LFSR feeding the rhythm voices, stepped once per native sample.
fn forward_noise(value: u32) -> u32 {
    (value ^ (0x0080_0302 & 0u32.wrapping_sub(value & 1))) >> 1
}
