//! Lookup tables for the OPL2 operator model.
//!
//! The YM3812 stores quarter-sine amplitudes and an exponential curve in
//! mask ROMs and works in the log domain throughout; attenuations add up
//! and a single exp lookup converts the sum back to a linear sample. The
//! tables here reproduce those ROM contents from their generator formulas
//! and are built once on first use.

use std::sync::OnceLock;

/// Envelope attenuation above which an operator is treated as silent.
/// 384 units at 8 levels each put the output below one LSB.
pub const SILENCE_CUTOFF: i32 = 384;

/// Full-scale envelope attenuation (9-bit envelope counter).
pub const ENV_MAX: i32 = 511;

/// Frequency multiplier table, doubled so the x0.5 entry stays integral.
/// Indexed by the MULT field of register 0x20.
pub const FREQ_MULT: [u32; 16] = [1, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 20, 24, 24, 30, 30];

/// Per-step envelope increments, indexed by the rate's fine index.
pub const ENV_INCREMENT: [u32; 13] = [4, 5, 6, 7, 8, 10, 12, 14, 16, 20, 24, 28, 32];

/// Right-shift applied to the key-scale-level base, per KSL register code.
/// Code 0 disables key scaling (shift 31 zeroes any base).
pub const KSL_SHIFT: [u8; 4] = [31, 1, 2, 0];

struct Tables {
    /// -log2(sin) of the first quarter wave, in 1/256 of an octave.
    logsin: [u16; 256],
    /// 2^(1 - i/256) in 1/1024 steps; exp_output() turns log levels back
    /// into linear amplitudes with this.
    exp: [u16; 256],
    /// Key-scale-level base per (octave, fnum >> 6), in quarter-dB units.
    ksl: [u8; 128],
}

static TABLES: OnceLock<Tables> = OnceLock::new();

fn tables() -> &'static Tables {
    TABLES.get_or_init(|| {
        let mut logsin = [0u16; 256];
        for (i, entry) in logsin.iter_mut().enumerate() {
            let sine = ((i as f64 + 0.5) * std::f64::consts::PI / 512.0).sin();
            *entry = (-sine.log2() * 256.0).round() as u16;
        }

        let mut exp = [0u16; 256];
        for (i, entry) in exp.iter_mut().enumerate() {
            *entry = ((2.0f64).powf(1.0 - i as f64 / 256.0) * 1024.0).round() as u16;
        }

        // dB drop per key above the breakpoint, coarsest at the low end.
        const KSL_CREATE: [i32; 16] = [64, 32, 24, 19, 16, 12, 11, 10, 8, 6, 5, 4, 3, 2, 1, 0];
        let mut ksl = [0u8; 128];
        for octave in 0..8i32 {
            for step in 0..16usize {
                let base = (octave * 8 - KSL_CREATE[step]).max(0);
                ksl[octave as usize * 16 + step] = (base * 4) as u8;
            }
        }

        Tables { logsin, exp, ksl }
    })
}

/// Key-scale-level base for a channel frequency, before the per-operator
/// KSL shift is applied.
pub fn ksl_base(block: u8, fnum: u16) -> u8 {
    tables().ksl[(block as usize & 7) * 16 + (fnum as usize >> 6 & 15)]
}

/// Linear operator output for a 10-bit phase index, waveform 0-3 and a
/// total attenuation in exp-domain levels (envelope units << 3).
///
/// Output range is -4096..=4096; the silenced halves of waveforms 1 and 3
/// return 0 outright.
pub fn wave_output(waveform: u8, index: u16, attenuation: u32) -> i32 {
    let index = index & 0x3FF;
    let negate;
    let quarter;
    match waveform & 3 {
        // Full sine: mirror the quarter wave, negative second half.
        0 => {
            negate = index & 0x200 != 0;
            quarter = mirrored_quarter(index);
        }
        // Half sine: silence instead of the negative half.
        1 => {
            if index & 0x200 != 0 {
                return 0;
            }
            negate = false;
            quarter = mirrored_quarter(index);
        }
        // Absolute sine.
        2 => {
            negate = false;
            quarter = mirrored_quarter(index);
        }
        // Quarter pulses: rising quarter repeated, gaps in between.
        _ => {
            if index & 0x100 != 0 {
                return 0;
            }
            negate = false;
            quarter = (index & 0xFF) as usize;
        }
    }

    let level = tables().logsin[quarter] as u32 + attenuation;
    let shift = level >> 8;
    if shift > 15 {
        return 0;
    }
    let amplitude = ((tables().exp[(level & 0xFF) as usize] as i32) << 1) >> shift;
    if negate {
        -amplitude
    } else {
        amplitude
    }
}

fn mirrored_quarter(index: u16) -> usize {
    let mut quarter = (index & 0xFF) as usize;
    if index & 0x100 != 0 {
        quarter ^= 0xFF;
    }
    quarter
}
