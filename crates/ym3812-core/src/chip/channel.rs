//! One melodic channel: two operators plus shared frequency state.

use super::operator::Operator;
use super::tables::ksl_base;
use super::KEY_NORMAL;

#[derive(Debug, Clone, Default)]
pub(crate) struct Channel {
    pub(crate) op: [Operator; 2],
    fnum: u16,
    block: u8,
    feedback: u8,
    additive: bool,
    key_on: bool,
    old: [i32; 2],
}

impl Channel {
    pub(crate) fn reset(&mut self) {
        self.op[0].reset();
        self.op[1].reset();
        self.fnum = 0;
        self.block = 0;
        self.feedback = 0;
        self.additive = false;
        self.key_on = false;
        self.old = [0; 2];
    }

    pub(crate) fn fnum(&self) -> u16 {
        self.fnum
    }

    /// F-number low byte.
    pub(crate) fn write_a0(&mut self, value: u8, note_select: bool) {
        self.fnum = (self.fnum & 0x300) | value as u16;
        self.update_frequency(note_select);
    }

    /// Key-on, block, F-number high bits.
    pub(crate) fn write_b0(&mut self, value: u8, note_select: bool) {
        self.fnum = (self.fnum & 0xFF) | (((value & 3) as u16) << 8);
        self.block = (value >> 2) & 7;
        let key = value & 0x20 != 0;
        if key != self.key_on {
            self.key_on = key;
            if key {
                self.op[0].key_on(KEY_NORMAL);
                self.op[1].key_on(KEY_NORMAL);
            } else {
                self.op[0].key_off(KEY_NORMAL);
                self.op[1].key_off(KEY_NORMAL);
            }
        }
        self.update_frequency(note_select);
    }

    /// Feedback depth and connection mode.
    pub(crate) fn write_c0(&mut self, value: u8) {
        self.feedback = (value >> 1) & 7;
        self.additive = value & 1 != 0;
    }

    /// Push fnum/block derived state down to both operators.
    pub(crate) fn update_frequency(&mut self, note_select: bool) {
        let msb = if note_select {
            (self.fnum >> 8) & 1
        } else {
            (self.fnum >> 9) & 1
        };
        let keycode = (self.block << 1) | msb as u8;
        let ksl = ksl_base(self.block, self.fnum);
        self.op[0].set_frequency(self.fnum, self.block, ksl, keycode);
        self.op[1].set_frequency(self.fnum, self.block, ksl, keycode);
    }

    /// Render one sample through the regular two-operator path.
    pub(crate) fn render(&mut self, vibrato: i32, tremolo: i32) -> i32 {
        let feedback_in = if self.feedback == 0 {
            0
        } else {
            (self.old[0] + self.old[1]) >> (9 - self.feedback)
        };
        self.old[0] = self.old[1];
        self.old[1] = self.op[0].sample(vibrato, tremolo, feedback_in);

        // The carrier sees the modulator output one sample delayed.
        let modulation = self.old[0];
        if self.additive {
            modulation + self.op[1].sample(vibrato, tremolo, 0)
        } else {
            self.op[1].sample(vibrato, tremolo, modulation)
        }
    }
}
