//! The 28-byte instrument parameter block used by bank files and drivers.
//!
//! Layout: 13 parameters for operator 0, 13 for operator 1, then the two
//! waveform selects. Per operator the order is key scaling level, frequency
//! multiplier, feedback, attack, sustain, envelope type, decay, release,
//! output level, AM, vibrato, KSR and connection. Feedback and connection
//! are only honoured from operator 0.

/// Parameters of one operator as stored in instrument data.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct OpParams {
    pub ksl: u8,
    pub multi: u8,
    pub feedback: u8,
    pub attack: u8,
    pub sustain: u8,
    pub eg: u8,
    pub decay: u8,
    pub release: u8,
    pub level: u8,
    pub am: u8,
    pub vib: u8,
    pub ksr: u8,
    pub con: u8,
}

impl OpParams {
    fn from_slice(bytes: &[u8]) -> Self {
        OpParams {
            ksl: bytes[0],
            multi: bytes[1],
            feedback: bytes[2],
            attack: bytes[3],
            sustain: bytes[4],
            eg: bytes[5],
            decay: bytes[6],
            release: bytes[7],
            level: bytes[8],
            am: bytes[9],
            vib: bytes[10],
            ksr: bytes[11],
            con: bytes[12],
        }
    }

    pub fn reg_20(&self) -> u8 {
        (self.am & 1) << 7
            | (self.vib & 1) << 6
            | (self.eg & 1) << 5
            | (self.ksr & 1) << 4
            | (self.multi & 0x0F)
    }

    /// Level/KSL byte without any volume scaling applied.
    pub fn reg_40(&self) -> u8 {
        (self.ksl & 3) << 6 | (self.level & 0x3F)
    }

    pub fn reg_60(&self) -> u8 {
        (self.attack & 0x0F) << 4 | (self.decay & 0x0F)
    }

    pub fn reg_80(&self) -> u8 {
        (self.sustain & 0x0F) << 4 | (self.release & 0x0F)
    }

    /// Feedback/connection byte. A connection parameter of 1 means FM,
    /// which the chip encodes as a cleared bit.
    pub fn reg_c0(&self) -> u8 {
        (self.feedback & 7) << 1 | (!self.con & 1)
    }
}

/// A full two-operator instrument definition.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Timbre {
    pub op: [OpParams; 2],
    pub wave: [u8; 2],
}

impl Timbre {
    pub fn from_bytes(params: &[u8; 28]) -> Self {
        Timbre {
            op: [
                OpParams::from_slice(&params[0..13]),
                OpParams::from_slice(&params[13..26]),
            ],
            wave: [params[26], params[27]],
        }
    }

    /// FM (serial) connection, as opposed to additive.
    pub fn is_fm(&self) -> bool {
        self.op[0].con & 1 == 1
    }
}

/// Scale a carrier level parameter by a 0-127 channel volume and return
/// the attenuation to write into the register's level field.
pub(crate) fn carrier_level(level: u8, volume: u8) -> u8 {
    let loud = 63 - (level & 0x3F) as u32;
    let scale = ((volume as u32) * 64 + 32) >> 7;
    let scaled = ((loud * scale) >> 6).min(63);
    63 - scaled as u8
}

// Power-on instrument set, matching the stock AdLib driver defaults.
pub(crate) const PIANO: [u8; 28] = [
    1, 1, 3, 15, 5, 0, 1, 3, 15, 0, 0, 0, 1, //
    0, 1, 1, 15, 7, 0, 2, 4, 0, 0, 0, 1, 0, //
    0, 0,
];
pub(crate) const BASS_DRUM: [u8; 28] = [
    0, 0, 0, 10, 4, 0, 8, 12, 11, 0, 0, 0, 1, //
    0, 0, 0, 13, 4, 0, 6, 15, 0, 0, 0, 0, 1, //
    0, 0,
];
pub(crate) const SNARE: [u8; 28] = [
    0, 12, 0, 15, 11, 0, 8, 5, 0, 0, 0, 0, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    0, 0,
];
pub(crate) const TOM_TOM: [u8; 28] = [
    0, 4, 0, 15, 11, 0, 7, 5, 0, 0, 0, 0, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    0, 0,
];
pub(crate) const CYMBAL: [u8; 28] = [
    0, 1, 0, 15, 11, 0, 5, 5, 0, 0, 0, 0, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    0, 0,
];
pub(crate) const HI_HAT: [u8; 28] = [
    0, 1, 0, 15, 11, 0, 7, 5, 0, 0, 0, 0, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    0, 0,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn piano_registers_assemble() {
        let timbre = Timbre::from_bytes(&PIANO);
        let modulator = &timbre.op[0];
        assert_eq!(modulator.reg_20(), 0x01);
        assert_eq!(modulator.reg_40(), 0x4F);
        assert_eq!(modulator.reg_60(), 0xF1);
        assert_eq!(modulator.reg_80(), 0x53);
        assert_eq!(modulator.reg_c0(), 0x06);
        assert!(timbre.is_fm());
        let carrier = &timbre.op[1];
        assert_eq!(carrier.reg_20(), 0x11);
        assert_eq!(carrier.reg_40(), 0x00);
    }

    #[test]
    fn additive_connection_sets_bit() {
        let mut bytes = PIANO;
        bytes[12] = 0;
        let timbre = Timbre::from_bytes(&bytes);
        assert!(!timbre.is_fm());
        assert_eq!(timbre.op[0].reg_c0() & 1, 1);
    }

    #[test]
    fn carrier_level_scales_with_volume() {
        assert_eq!(carrier_level(0, 127), 1);
        assert_eq!(carrier_level(0, 0), 63);
        assert_eq!(carrier_level(15, 64), 39);
        assert_eq!(carrier_level(63, 127), 63);
    }
}
