//! One FM operator: phase generator plus ADSR envelope.

use super::tables::{wave_output, ENV_INCREMENT, ENV_MAX, FREQ_MULT, KSL_SHIFT, SILENCE_CUTOFF};

/// Fixed-point bits of the envelope rate counter.
const RATE_SHIFT: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum EnvelopeStage {
    #[default]
    Off,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Envelope/phase state for a single operator slot.
///
/// Registers are latched as written; everything derived (rate increments,
/// key-scale offsets, frequency multiplier) is recomputed on the write
/// paths so the per-sample forward methods stay table-lookup cheap.
#[derive(Debug, Clone)]
pub(crate) struct Operator {
    reg20: u8,
    reg40: u8,
    reg60: u8,
    reg80: u8,
    rege0: u8,
    waveform: u8,

    // phase generator
    phase: u32,
    freq_mult: u32,
    fnum: u16,
    block: u8,

    // envelope generator
    stage: EnvelopeStage,
    env: i32,
    sustain_level: i32,
    rate_counter: u32,
    attack_add: u32,
    decay_add: u32,
    release_add: u32,

    key_state: u8,
    keycode: u8,
    ksl_base: u8,
    ksl_offset: i32,
    total_level: i32,
}

impl Default for Operator {
    fn default() -> Self {
        Operator {
            reg20: 0,
            reg40: 0,
            reg60: 0,
            reg80: 0,
            rege0: 0,
            waveform: 0,
            phase: 0,
            freq_mult: FREQ_MULT[0],
            fnum: 0,
            block: 0,
            stage: EnvelopeStage::Off,
            env: ENV_MAX,
            sustain_level: ENV_MAX,
            rate_counter: 0,
            attack_add: 0,
            decay_add: 0,
            release_add: 0,
            key_state: 0,
            keycode: 0,
            ksl_base: 0,
            ksl_offset: 0,
            total_level: 0,
        }
    }
}

/// Split an effective rate value (4*rate + key scaling, 0-75) into the
/// increment-table index and counter shift the chip uses.
fn envelope_select(value: u8) -> (usize, u32) {
    if value < 52 {
        ((value & 3) as usize, 12 - (value >> 2) as u32)
    } else if value < 60 {
        ((value - 48) as usize, 0)
    } else {
        (12, 0)
    }
}

impl Operator {
    pub(crate) fn reset(&mut self) {
        *self = Operator::default();
    }

    /// AM / vibrato / envelope-type / KSR / multiplier.
    pub(crate) fn write_20(&mut self, value: u8) {
        self.reg20 = value;
        self.freq_mult = FREQ_MULT[(value & 0x0F) as usize];
        self.update_rates();
    }

    /// Key scale level / total level.
    pub(crate) fn write_40(&mut self, value: u8) {
        self.reg40 = value;
        self.total_level = ((value & 0x3F) as i32) << 2;
        self.update_ksl();
    }

    /// Attack / decay rate.
    pub(crate) fn write_60(&mut self, value: u8) {
        self.reg60 = value;
        self.update_rates();
    }

    /// Sustain level / release rate.
    pub(crate) fn write_80(&mut self, value: u8) {
        self.reg80 = value;
        let sustain = (value >> 4) as i32;
        // Sustain code 15 means "all the way down", not 15/16.
        self.sustain_level = (sustain | ((sustain + 1) & 0x10)) << 4;
        self.update_rates();
    }

    /// Waveform select; reads as sine until register 1 enables waveforms.
    pub(crate) fn write_e0(&mut self, value: u8, wave_enable: bool) {
        self.rege0 = value;
        self.waveform = if wave_enable { value & 3 } else { 0 };
    }

    pub(crate) fn set_wave_enable(&mut self, wave_enable: bool) {
        self.waveform = if wave_enable { self.rege0 & 3 } else { 0 };
    }

    /// Pick up a channel frequency change: phase increment inputs, key
    /// scaling base and the rate key-code all depend on fnum/block.
    pub(crate) fn set_frequency(&mut self, fnum: u16, block: u8, ksl_base: u8, keycode: u8) {
        self.fnum = fnum & 0x3FF;
        self.block = block & 7;
        self.ksl_base = ksl_base;
        self.keycode = keycode;
        self.update_ksl();
        self.update_rates();
    }

    pub(crate) fn key_on(&mut self, mask: u8) {
        if self.key_state == 0 {
            self.phase = 0;
            self.rate_counter = 0;
            self.stage = EnvelopeStage::Attack;
        }
        self.key_state |= mask;
    }

    pub(crate) fn key_off(&mut self, mask: u8) {
        self.key_state &= !mask;
        if self.key_state == 0 && self.stage != EnvelopeStage::Off {
            self.stage = EnvelopeStage::Release;
        }
    }

    fn update_ksl(&mut self) {
        let shift = KSL_SHIFT[(self.reg40 >> 6) as usize] as u32;
        self.ksl_offset = (self.ksl_base as i32) >> shift.min(31);
    }

    fn update_rates(&mut self) {
        let ksr = if self.reg20 & 0x10 != 0 {
            self.keycode
        } else {
            self.keycode >> 2
        };
        self.attack_add = attack_rate_add(self.reg60 >> 4, ksr);
        self.decay_add = linear_rate_add(self.reg60 & 0x0F, ksr);
        self.release_add = linear_rate_add(self.reg80 & 0x0F, ksr);
    }

    fn rate_forward(&mut self, add: u32) -> i32 {
        self.rate_counter += add;
        let steps = self.rate_counter >> RATE_SHIFT;
        self.rate_counter &= (1 << RATE_SHIFT) - 1;
        steps as i32
    }

    /// Advance the phase generator one sample and return the 10-bit wave
    /// index. `vibrato` is the channel's fnum offset for this sample and
    /// only applies when the operator's vibrato flag is set.
    pub(crate) fn forward_phase(&mut self, vibrato: i32) -> u16 {
        let fnum = if self.reg20 & 0x40 != 0 {
            (self.fnum as i32 + vibrato).max(0) as u32
        } else {
            self.fnum as u32
        };
        let add = ((fnum << self.block) * self.freq_mult) >> 1;
        self.phase = self.phase.wrapping_add(add);
        ((self.phase >> 10) & 0x3FF) as u16
    }

    /// Advance the envelope one sample and return the operator's total
    /// attenuation in envelope units (envelope + level + key scaling +
    /// tremolo). Values at or above [`SILENCE_CUTOFF`] mean no output.
    pub(crate) fn forward_envelope(&mut self, tremolo: i32) -> i32 {
        match self.stage {
            EnvelopeStage::Attack => {
                let steps = self.rate_forward(self.attack_add);
                if steps > 0 {
                    self.env += ((!self.env) * steps) >> 3;
                    if self.env <= 0 {
                        self.env = 0;
                        self.stage = EnvelopeStage::Decay;
                    }
                }
            }
            EnvelopeStage::Decay => {
                self.env += self.rate_forward(self.decay_add);
                if self.env >= self.sustain_level {
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => {
                // Non-sustaining envelopes fall through at the release rate.
                if self.reg20 & 0x20 == 0 {
                    self.advance_release();
                }
            }
            EnvelopeStage::Release => self.advance_release(),
            EnvelopeStage::Off => {}
        }

        let mut total = self.env + self.total_level + self.ksl_offset;
        if self.reg20 & 0x80 != 0 {
            total += tremolo;
        }
        total
    }

    fn advance_release(&mut self) {
        self.env += self.rate_forward(self.release_add);
        if self.env >= ENV_MAX {
            self.env = ENV_MAX;
            self.stage = EnvelopeStage::Off;
        }
    }

    /// One full operator sample: phase, envelope, wave lookup.
    /// `modulation` is added to the wave index (FM input or feedback).
    pub(crate) fn sample(&mut self, vibrato: i32, tremolo: i32, modulation: i32) -> i32 {
        let index = self.forward_phase(vibrato) as i32 + modulation;
        let total = self.forward_envelope(tremolo);
        if total >= SILENCE_CUTOFF {
            return 0;
        }
        wave_output(self.waveform, (index & 0x3FF) as u16, (total as u32) << 3)
    }

    pub(crate) fn waveform(&self) -> u8 {
        self.waveform
    }

    #[cfg(test)]
    pub(crate) fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    #[cfg(test)]
    pub(crate) fn envelope(&self) -> i32 {
        self.env
    }
}

fn linear_rate_add(rate: u8, ksr: u8) -> u32 {
    if rate == 0 {
        return 0;
    }
    let value = (rate * 4 + ksr).min(75);
    let (index, shift) = envelope_select(value);
    ENV_INCREMENT[index] << (21 - shift)
}

fn attack_rate_add(rate: u8, ksr: u8) -> u32 {
    if rate == 0 {
        return 0;
    }
    let value = (rate * 4 + ksr).min(75);
    if value >= 62 {
        return 8 << RATE_SHIFT;
    }
    let (index, shift) = envelope_select(value);
    ENV_INCREMENT[index] << (RATE_SHIFT - shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed_operator(reg60: u8, reg80: u8) -> Operator {
        let mut op = Operator::default();
        op.write_20(0x01);
        op.write_40(0x00);
        op.write_60(reg60);
        op.write_80(reg80);
        op.key_on(0x01);
        op
    }

    #[test]
    fn envelope_select_breakpoints() {
        assert_eq!(envelope_select(0), (0, 12));
        assert_eq!(envelope_select(51), (3, 0));
        assert_eq!(envelope_select(52), (4, 0));
        assert_eq!(envelope_select(59), (11, 0));
        assert_eq!(envelope_select(60), (12, 0));
        assert_eq!(envelope_select(75), (12, 0));
    }

    #[test]
    fn fast_attack_reaches_full_level_immediately() {
        let mut op = keyed_operator(0xF0, 0x00);
        op.forward_envelope(0);
        assert_eq!(op.envelope(), 0);
        assert_eq!(op.stage(), EnvelopeStage::Decay);
    }

    #[test]
    fn decay_stops_at_sustain_level() {
        // Decay 15 moves 4 units per sample; sustain code 1 is 16 units.
        let mut op = keyed_operator(0xFF, 0x1F);
        op.forward_envelope(0);
        for _ in 0..4 {
            assert_eq!(op.stage(), EnvelopeStage::Decay);
            op.forward_envelope(0);
        }
        assert_eq!(op.stage(), EnvelopeStage::Sustain);
        assert_eq!(op.envelope(), 16);
    }

    #[test]
    fn release_runs_out_to_off() {
        let mut op = keyed_operator(0xF0, 0x0F);
        op.write_20(0x21); // sustaining
        op.forward_envelope(0);
        op.key_off(0x01);
        assert_eq!(op.stage(), EnvelopeStage::Release);
        for _ in 0..200 {
            op.forward_envelope(0);
        }
        assert_eq!(op.stage(), EnvelopeStage::Off);
        assert_eq!(op.envelope(), ENV_MAX);
    }

    #[test]
    fn key_masks_are_independent() {
        let mut op = keyed_operator(0xF0, 0x0F);
        op.key_on(0x02);
        op.key_off(0x01);
        assert_ne!(op.stage(), EnvelopeStage::Release);
        op.key_off(0x02);
        assert_eq!(op.stage(), EnvelopeStage::Release);
    }

    #[test]
    fn rekey_restarts_phase() {
        let mut op = keyed_operator(0xF0, 0xFF);
        op.set_frequency(512, 4, 0, 0);
        op.forward_phase(0);
        op.key_off(0x01);
        op.key_on(0x01);
        assert_eq!(op.forward_phase(0), 8);
    }

    #[test]
    fn phase_advances_linearly() {
        let mut op = Operator::default();
        op.write_20(0x01); // mult x1
        op.set_frequency(512, 4, 0, 0);
        // (512 << 4) * 2 / 2 = 8192 per sample = 8 index steps.
        assert_eq!(op.forward_phase(0), 8);
        assert_eq!(op.forward_phase(0), 16);
        assert_eq!(op.forward_phase(0), 24);
    }

    #[test]
    fn vibrato_only_applies_when_enabled() {
        let mut plain = Operator::default();
        plain.write_20(0x01);
        plain.set_frequency(512, 4, 0, 0);
        let mut wobbly = Operator::default();
        wobbly.write_20(0x41);
        wobbly.set_frequency(512, 4, 0, 0);
        let mut last = (0, 0);
        for _ in 0..8 {
            last = (plain.forward_phase(8), wobbly.forward_phase(8));
        }
        assert_eq!(last.0, 64);
        assert_eq!(last.1, 65);
    }

    #[test]
    fn total_level_feeds_attenuation() {
        let mut op = keyed_operator(0xF0, 0x00);
        op.forward_envelope(0);
        let loud = op.forward_envelope(0);
        op.write_40(0x3F);
        let quiet = op.forward_envelope(0);
        assert_eq!(quiet - loud, 63 << 2);
    }

    #[test]
    fn silent_operator_outputs_zero() {
        let mut op = Operator::default();
        assert_eq!(op.sample(0, 0, 0), 0);
    }
}
