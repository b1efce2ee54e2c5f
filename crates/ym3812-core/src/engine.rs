//! High-level OPL2 music engine.
//!
//! Wraps a chip backend behind the voice/timbre/volume API that DOS-era
//! music drivers expose: nine melodic voices, or six melodic plus the five
//! rhythm-mode percussion voices, with per-voice instruments, volumes and
//! pitch bends translated into register writes.

use bitflags::bitflags;

use crate::backend::Opl2Backend;
use crate::chip::OplChip;
use crate::timbre::{self, carrier_level, OpParams, Timbre};
use crate::Result;
use ym3812_common::ActiveNote;

/// Bass drum voice number in percussive mode.
pub const BASS_DRUM_VOICE: u8 = 6;
/// Snare drum voice number in percussive mode.
pub const SNARE_VOICE: u8 = 7;
/// Tom-tom voice number in percussive mode.
pub const TOM_TOM_VOICE: u8 = 8;
/// Top cymbal voice number in percussive mode.
pub const CYMBAL_VOICE: u8 = 9;
/// Hi-hat voice number in percussive mode.
pub const HI_HAT_VOICE: u8 = 10;

/// Operator slot pair per two-operator voice.
const VOICE_SLOTS: [[usize; 2]; 9] = [
    [0, 3],
    [1, 4],
    [2, 5],
    [6, 9],
    [7, 10],
    [8, 11],
    [12, 15],
    [13, 16],
    [14, 17],
];

/// Register offset per operator slot number.
const SLOT_REG_OFFSET: [u8; 18] = [
    0, 1, 2, 3, 4, 5, 8, 9, 10, 11, 12, 13, 16, 17, 18, 19, 20, 21,
];

/// Single operator slot for snare, tom-tom, cymbal and hi-hat.
const PERC_SLOT: [usize; 4] = [16, 14, 17, 13];

/// F-number per semitone within one octave.
pub const FNUM_TABLE: [u16; 12] = [343, 363, 385, 408, 432, 458, 485, 514, 544, 577, 611, 647];

/// Default tom-tom pitch; the snare sits a fifth above it.
const TOM_PITCH: u8 = 24;
const SNARE_OFFSET: u8 = 7;

bitflags! {
    /// Shadow of register 0xBD.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct RhythmBits: u8 {
        const TREMOLO_DEEP = 0x80;
        const VIBRATO_DEEP = 0x40;
        const RHYTHM = 0x20;
        const BASS_DRUM = 0x10;
        const SNARE = 0x08;
        const TOM_TOM = 0x04;
        const CYMBAL = 0x02;
        const HI_HAT = 0x01;
    }
}

/// Voice-oriented driver over an OPL2 backend.
///
/// All operations are silent no-ops until [`init`](Opl2Engine::init) has
/// installed a backend, so players can be constructed cheaply and wired up
/// later. Out-of-range voice numbers are ignored the way the original
/// drivers ignored them.
pub struct Opl2Engine<B: Opl2Backend = OplChip> {
    backend: Option<B>,
    percussive: bool,
    timbres: [Timbre; 11],
    volumes: [u8; 11],
    notes: [u8; 11],
    bends: [u16; 11],
    pitch_range: u8,
    tom_pitch: u8,
    breg: [u8; 9],
    rhythm: RhythmBits,
}

impl<B: Opl2Backend> Opl2Engine<B> {
    pub fn new() -> Self {
        Opl2Engine {
            backend: None,
            percussive: false,
            timbres: default_timbres(),
            volumes: [127; 11],
            notes: [0; 11],
            bends: [0x2000; 11],
            pitch_range: 1,
            tom_pitch: TOM_PITCH,
            breg: [0; 9],
            rhythm: RhythmBits::empty(),
        }
    }

    /// Create the backend and run the warm-up sequence: clear the whole
    /// register file, reset the timer control bits, enable waveform
    /// select and load the default instrument on every melodic voice.
    pub fn init(&mut self, sample_rate: u32) -> Result<()> {
        let mut backend = B::create(sample_rate)?;
        for reg in 0x01..=0xF5 {
            backend.write_register(reg, 0);
        }
        backend.write_register(0x04, 0x60);
        backend.write_register(0x04, 0x80);
        backend.write_register(0x01, 0x20);
        self.backend = Some(backend);

        self.percussive = false;
        self.timbres = default_timbres();
        self.volumes = [127; 11];
        self.notes = [0; 11];
        self.bends = [0x2000; 11];
        self.pitch_range = 1;
        self.tom_pitch = TOM_PITCH;
        self.breg = [0; 9];
        self.rhythm = RhythmBits::empty();
        for voice in 0..9 {
            self.apply_timbre(voice);
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.is_some()
    }

    /// Output sample rate in Hz, 0 before initialization.
    pub fn sample_rate(&self) -> u32 {
        self.backend.as_ref().map_or(0, |b| b.sample_rate())
    }

    /// Number of addressable voices in the current mode.
    pub fn num_voices(&self) -> usize {
        if self.percussive {
            11
        } else {
            9
        }
    }

    pub fn is_percussive(&self) -> bool {
        self.percussive
    }

    /// Switch between melodic (9 voices) and percussive (6 melodic + 5
    /// rhythm voices) mode. All notes are released, and entering
    /// percussive mode loads the percussion instruments and tunes the
    /// tom-tom and snare channels.
    pub fn set_mode(&mut self, percussive: bool) {
        self.all_notes_off();
        self.percussive = percussive;
        if percussive {
            self.rhythm = RhythmBits::RHYTHM;
            self.write_rhythm();
            for voice in 6..11 {
                self.apply_timbre(voice);
            }
            self.apply_percussion_pitch();
        } else {
            self.rhythm = RhythmBits::empty();
            self.write_rhythm();
        }
    }

    /// Install a 28-byte instrument parameter block on a voice.
    pub fn set_voice_timbre(&mut self, voice: u8, params: &[u8; 28]) {
        let voice = voice as usize;
        if voice >= self.num_voices() {
            return;
        }
        self.timbres[voice] = Timbre::from_bytes(params);
        self.apply_timbre(voice);
    }

    /// Set a voice volume (0-127). Rescales the carrier level of the
    /// voice's instrument; modulator levels are left alone.
    pub fn set_voice_volume(&mut self, voice: u8, volume: u8) {
        let voice = voice as usize;
        if voice >= self.num_voices() {
            return;
        }
        self.volumes[voice] = volume.min(127);
        self.apply_volume(voice);
    }

    /// Pitch-bend a melodic voice. `bend` is 0-0x3FFF with 0x2000 center;
    /// the sounding frequency is updated immediately if a note is held.
    pub fn set_voice_pitch(&mut self, voice: u8, bend: u16) {
        let voice = voice as usize;
        if voice >= self.num_melodic() {
            return;
        }
        self.bends[voice] = bend.min(0x3FFF);
        if self.backend.is_none() || self.notes[voice] == 0 {
            return;
        }
        let pitch = pitch_of(self.notes[voice]);
        let key = self.breg[voice] & 0x20 != 0;
        let (fnum, octave) = frequency_for(pitch, self.bends[voice], self.pitch_range);
        self.write_frequency(voice, fnum, octave, key);
    }

    /// Semitone span of a full pitch bend, clamped to 1-12. Takes effect
    /// on the next pitch update.
    pub fn set_pitch_range(&mut self, range: u8) {
        self.pitch_range = range.clamp(1, 12);
    }

    /// Key a note on a voice. Melodic voices get a frequency write with
    /// the key bit set; percussion voices pulse their trigger bit, with
    /// the bass drum and tom-tom also retuning their channels (the snare
    /// always follows the tom a fifth up).
    pub fn note_on(&mut self, voice: u8, note: u8) {
        let index = voice as usize;
        if self.backend.is_none() || index >= self.num_voices() {
            return;
        }
        self.notes[index] = note;
        if index < self.num_melodic() {
            let (fnum, octave) =
                frequency_for(pitch_of(note), self.bends[index], self.pitch_range);
            self.write_frequency(index, fnum, octave, true);
            return;
        }
        match voice {
            BASS_DRUM_VOICE => {
                let (fnum, octave) = frequency_for(pitch_of(note), 0x2000, self.pitch_range);
                self.write_frequency(6, fnum, octave, false);
                self.trigger_percussion(RhythmBits::BASS_DRUM);
            }
            SNARE_VOICE => self.trigger_percussion(RhythmBits::SNARE),
            TOM_TOM_VOICE => {
                self.tom_pitch = pitch_of(note) as u8;
                self.apply_percussion_pitch();
                self.trigger_percussion(RhythmBits::TOM_TOM);
            }
            CYMBAL_VOICE => self.trigger_percussion(RhythmBits::CYMBAL),
            _ => self.trigger_percussion(RhythmBits::HI_HAT),
        }
    }

    /// Release a note: clear the key bit (melodic) or the trigger bit
    /// (percussion).
    pub fn note_off(&mut self, voice: u8) {
        let index = voice as usize;
        if self.backend.is_none() || index >= self.num_voices() {
            return;
        }
        self.notes[index] = 0;
        if index < self.num_melodic() {
            let breg = self.breg[index] & !0x20;
            self.breg[index] = breg;
            self.write(0xB0 + voice, breg);
        } else {
            self.rhythm.remove(percussion_bit(voice));
            self.write_rhythm();
        }
    }

    pub fn all_notes_off(&mut self) {
        for voice in 0..self.num_voices() as u8 {
            self.note_off(voice);
        }
    }

    /// Melodic voices currently sounding a note.
    pub fn active_notes(&self) -> Vec<ActiveNote> {
        (0..self.num_melodic())
            .filter(|&v| self.breg[v] & 0x20 != 0 && self.notes[v] != 0)
            .map(|v| ActiveNote {
                channel: v as u8,
                note: self.notes[v],
            })
            .collect()
    }

    /// Render interleaved stereo samples; silence before initialization.
    pub fn generate_into(&mut self, out: &mut [i16]) {
        match self.backend.as_mut() {
            Some(backend) => backend.generate_into(out),
            None => out.fill(0),
        }
    }

    pub fn generate(&mut self, frames: usize) -> Vec<i16> {
        let mut out = vec![0i16; frames * 2];
        self.generate_into(&mut out);
        out
    }

    fn num_melodic(&self) -> usize {
        if self.percussive {
            6
        } else {
            9
        }
    }

    fn write(&mut self, reg: u8, value: u8) {
        if let Some(backend) = self.backend.as_mut() {
            backend.write_register(reg, value);
        }
    }

    fn write_rhythm(&mut self) {
        let bits = self.rhythm.bits();
        self.write(0xBD, bits);
    }

    fn trigger_percussion(&mut self, bit: RhythmBits) {
        self.rhythm.remove(bit);
        self.write_rhythm();
        self.rhythm.insert(bit);
        self.write_rhythm();
    }

    fn write_frequency(&mut self, channel: usize, fnum: u16, octave: u8, key: bool) {
        let mut breg = (octave & 7) << 2 | ((fnum >> 8) as u8 & 3);
        if key {
            breg |= 0x20;
        }
        self.breg[channel] = breg;
        self.write(0xA0 + channel as u8, (fnum & 0xFF) as u8);
        self.write(0xB0 + channel as u8, breg);
    }

    /// Tune the tom-tom channel to the stored tom pitch and the snare
    /// channel a fifth above it.
    fn apply_percussion_pitch(&mut self) {
        let (fnum, octave) = frequency_for(self.tom_pitch as i32, 0x2000, self.pitch_range);
        self.write_frequency(8, fnum, octave, false);
        let snare = (self.tom_pitch + SNARE_OFFSET) as i32;
        let (fnum, octave) = frequency_for(snare, 0x2000, self.pitch_range);
        self.write_frequency(7, fnum, octave, false);
    }

    fn apply_timbre(&mut self, voice: usize) {
        if self.backend.is_none() {
            return;
        }
        let timbre = self.timbres[voice];
        if voice <= BASS_DRUM_VOICE as usize {
            for (i, &slot) in VOICE_SLOTS[voice].iter().enumerate() {
                self.write_operator(slot, &timbre.op[i], timbre.wave[i]);
            }
            self.write(0xC0 + voice as u8, timbre.op[0].reg_c0());
        } else {
            let slot = PERC_SLOT[voice - 7];
            self.write_operator(slot, &timbre.op[0], timbre.wave[0]);
        }
        self.apply_volume(voice);
    }

    fn write_operator(&mut self, slot: usize, op: &OpParams, wave: u8) {
        let off = SLOT_REG_OFFSET[slot];
        self.write(0x20 + off, op.reg_20());
        self.write(0x40 + off, op.reg_40());
        self.write(0x60 + off, op.reg_60());
        self.write(0x80 + off, op.reg_80());
        self.write(0xE0 + off, wave & 3);
    }

    /// Rewrite the level register of every sounding operator of a voice:
    /// the carrier for FM connections, both operators when additive, the
    /// lone operator for single-slot percussion.
    fn apply_volume(&mut self, voice: usize) {
        let timbre = self.timbres[voice];
        let volume = self.volumes[voice];
        if voice <= BASS_DRUM_VOICE as usize {
            let [s0, s1] = VOICE_SLOTS[voice];
            if !timbre.is_fm() {
                self.write_level(s0, &timbre.op[0], volume);
            }
            self.write_level(s1, &timbre.op[1], volume);
        } else {
            self.write_level(PERC_SLOT[voice - 7], &timbre.op[0], volume);
        }
    }

    fn write_level(&mut self, slot: usize, op: &OpParams, volume: u8) {
        let value = (op.ksl & 3) << 6 | carrier_level(op.level, volume);
        self.write(0x40 + SLOT_REG_OFFSET[slot], value);
    }
}

impl<B: Opl2Backend> Default for Opl2Engine<B> {
    fn default() -> Self {
        Self::new()
    }
}

fn default_timbres() -> [Timbre; 11] {
    let mut timbres = [Timbre::from_bytes(&timbre::PIANO); 11];
    timbres[BASS_DRUM_VOICE as usize] = Timbre::from_bytes(&timbre::BASS_DRUM);
    timbres[SNARE_VOICE as usize] = Timbre::from_bytes(&timbre::SNARE);
    timbres[TOM_TOM_VOICE as usize] = Timbre::from_bytes(&timbre::TOM_TOM);
    timbres[CYMBAL_VOICE as usize] = Timbre::from_bytes(&timbre::CYMBAL);
    timbres[HI_HAT_VOICE as usize] = Timbre::from_bytes(&timbre::HI_HAT);
    timbres
}

fn percussion_bit(voice: u8) -> RhythmBits {
    match voice {
        BASS_DRUM_VOICE => RhythmBits::BASS_DRUM,
        SNARE_VOICE => RhythmBits::SNARE,
        TOM_TOM_VOICE => RhythmBits::TOM_TOM,
        CYMBAL_VOICE => RhythmBits::CYMBAL,
        _ => RhythmBits::HI_HAT,
    }
}

/// Note number to pitch: MIDI-style notes sit an octave above the chip's
/// 0-95 pitch range.
fn pitch_of(note: u8) -> i32 {
    (note as i32 - 12).clamp(0, 95)
}

/// Translate a pitch (0-95 semitones) and bend wheel position into an
/// F-number/octave pair, interpolating toward the `range`-semitone
/// neighbour and renormalizing when the F-number leaves the table span.
fn frequency_for(pitch: i32, bend: u16, range: u8) -> (u16, u8) {
    let pitch = pitch.clamp(0, 95);
    let mut octave = pitch / 12;
    let tone = (pitch % 12) as usize;
    let base = FNUM_TABLE[tone] as i32;
    let range = range.clamp(1, 12) as usize;
    let bend = bend as i32;

    let mut fnum = base;
    if bend > 0x2000 {
        let target = if tone + range >= 12 {
            FNUM_TABLE[tone + range - 12] as i32 * 2
        } else {
            FNUM_TABLE[tone + range] as i32
        };
        fnum = base + (((target - base) * (bend - 0x2000)) >> 13);
    } else if bend < 0x2000 {
        let target = if tone < range {
            FNUM_TABLE[tone + 12 - range] as i32 / 2
        } else {
            FNUM_TABLE[tone - range] as i32
        };
        fnum = base - (((base - target) * (0x2000 - bend)) >> 13);
    }

    while fnum > 0x3FF {
        fnum >>= 1;
        octave += 1;
    }
    while fnum < FNUM_TABLE[0] as i32 && octave > 0 {
        fnum <<= 1;
        octave -= 1;
    }
    if octave > 7 {
        octave = 7;
        fnum = 0x3FF;
    }
    (fnum as u16, octave as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockBackend {
        writes: Vec<(u8, u8)>,
    }

    impl Opl2Backend for MockBackend {
        fn create(_sample_rate: u32) -> Result<Self> {
            Ok(MockBackend::default())
        }

        fn sample_rate(&self) -> u32 {
            44_100
        }

        fn reset(&mut self) {
            self.writes.clear();
        }

        fn write_register(&mut self, reg: u8, value: u8) {
            self.writes.push((reg, value));
        }

        fn generate_into(&mut self, out: &mut [i16]) {
            out.fill(0);
        }
    }

    fn engine() -> Opl2Engine<MockBackend> {
        let mut engine = Opl2Engine::new();
        engine.init(44_100).unwrap();
        engine
    }

    fn last_write(engine: &Opl2Engine<MockBackend>, reg: u8) -> Option<u8> {
        let backend = engine.backend.as_ref().unwrap();
        backend.writes.iter().rev().find(|w| w.0 == reg).map(|w| w.1)
    }

    fn write_count(engine: &Opl2Engine<MockBackend>) -> usize {
        engine.backend.as_ref().unwrap().writes.len()
    }

    #[test]
    fn uninitialized_engine_is_inert() {
        let mut engine: Opl2Engine<MockBackend> = Opl2Engine::new();
        engine.note_on(0, 60);
        engine.set_voice_volume(0, 64);
        assert!(engine.active_notes().is_empty());
        let mut out = [7i16; 64];
        engine.generate_into(&mut out);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn init_runs_warm_up_sequence() {
        let engine = engine();
        let writes = &engine.backend.as_ref().unwrap().writes;
        assert!(writes.contains(&(0x04, 0x60)));
        assert!(writes.contains(&(0x04, 0x80)));
        assert_eq!(last_write(&engine, 0x01), Some(0x20));
        assert_eq!(engine.num_voices(), 9);
    }

    #[test]
    fn note_on_writes_frequency_with_key() {
        let mut engine = engine();
        engine.note_on(0, 60);
        // middle C: pitch 48, octave 4, fnum 343
        assert_eq!(last_write(&engine, 0xA0), Some(0x57));
        assert_eq!(last_write(&engine, 0xB0), Some(0x31));
    }

    #[test]
    fn note_off_clears_only_the_key_bit() {
        let mut engine = engine();
        engine.note_on(0, 60);
        engine.note_off(0);
        assert_eq!(last_write(&engine, 0xB0), Some(0x11));
    }

    #[test]
    fn pitch_bend_retunes_a_held_note() {
        let mut engine = engine();
        engine.note_on(0, 60);
        engine.set_voice_pitch(0, 0x3FFF);
        assert_eq!(last_write(&engine, 0xA0), Some(0x6A));
        assert_eq!(last_write(&engine, 0xB0), Some(0x31));

        let before = write_count(&engine);
        engine.set_voice_pitch(1, 0x3FFF);
        assert_eq!(write_count(&engine), before);
    }

    #[test]
    fn volume_rescales_the_carrier_only() {
        let mut engine = engine();
        engine.set_voice_volume(0, 0);
        // voice 0 carrier is slot 3; its modulator keeps the timbre level
        assert_eq!(last_write(&engine, 0x43), Some(0x3F));
        assert_eq!(last_write(&engine, 0x40), Some(0x4F));
    }

    #[test]
    fn percussive_mode_keys_the_bass_drum() {
        let mut engine = engine();
        engine.set_mode(true);
        assert_eq!(engine.num_voices(), 11);
        assert!(last_write(&engine, 0xBD).unwrap() & 0x20 != 0);

        engine.note_on(BASS_DRUM_VOICE, 36);
        assert_eq!(last_write(&engine, 0xA6), Some(0x57));
        assert_eq!(last_write(&engine, 0xB6), Some(0x09));
        assert!(last_write(&engine, 0xBD).unwrap() & 0x10 != 0);

        engine.note_off(BASS_DRUM_VOICE);
        assert!(last_write(&engine, 0xBD).unwrap() & 0x10 == 0);
    }

    #[test]
    fn tom_note_retunes_the_snare() {
        let mut engine = engine();
        engine.set_mode(true);
        engine.note_on(TOM_TOM_VOICE, 48);
        assert_eq!(last_write(&engine, 0xA8), Some(0x57));
        assert_eq!(last_write(&engine, 0xB8), Some(0x0D));
        // snare follows at pitch 43: fnum 514, octave 3
        assert_eq!(last_write(&engine, 0xA7), Some(0x02));
        assert_eq!(last_write(&engine, 0xB7), Some(0x0E));
        assert!(last_write(&engine, 0xBD).unwrap() & 0x04 != 0);
    }

    #[test]
    fn percussion_retrigger_pulses_the_bit() {
        let mut engine = engine();
        engine.set_mode(true);
        engine.note_on(HI_HAT_VOICE, 60);
        engine.note_on(HI_HAT_VOICE, 60);
        let backend = engine.backend.as_ref().unwrap();
        let bd: Vec<u8> = backend
            .writes
            .iter()
            .filter(|w| w.0 == 0xBD)
            .map(|w| w.1)
            .collect();
        let tail = &bd[bd.len() - 2..];
        assert_eq!(tail[0] & 0x01, 0);
        assert_eq!(tail[1] & 0x01, 1);
    }

    #[test]
    fn active_notes_follow_key_state() {
        let mut engine = engine();
        engine.note_on(0, 60);
        engine.note_on(2, 64);
        let notes = engine.active_notes();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0], ActiveNote { channel: 0, note: 60 });
        engine.note_off(0);
        assert_eq!(engine.active_notes().len(), 1);
    }

    #[test]
    fn out_of_range_voices_are_ignored() {
        let mut engine = engine();
        let before = write_count(&engine);
        engine.note_on(9, 60);
        engine.set_voice_volume(12, 64);
        engine.set_voice_timbre(11, &[0; 28]);
        assert_eq!(write_count(&engine), before);
    }

    #[test]
    fn leaving_percussive_mode_clears_rhythm_bits() {
        let mut engine = engine();
        engine.set_mode(true);
        engine.note_on(CYMBAL_VOICE, 60);
        engine.set_mode(false);
        assert_eq!(last_write(&engine, 0xBD), Some(0x00));
        assert_eq!(engine.num_voices(), 9);
    }

    #[test]
    fn frequency_mapping_matches_the_note_table() {
        assert_eq!(frequency_for(48, 0x2000, 1), (343, 4));
        assert_eq!(frequency_for(48, 0x3FFF, 1), (362, 4));
        assert_eq!(frequency_for(48, 0, 1), (610, 3));
        assert_eq!(frequency_for(48, 0x3FFF, 12), (685, 4));
        assert_eq!(frequency_for(95, 0x2000, 1), (647, 7));
        assert_eq!(frequency_for(0, 0x2000, 1), (343, 0));
    }

    #[test]
    fn engine_with_real_chip_produces_audio() {
        let mut engine: Opl2Engine = Opl2Engine::new();
        engine.init(44_100).unwrap();
        engine.note_on(0, 60);
        let samples = engine.generate(2048);
        assert!(samples.iter().any(|&s| s != 0));
    }
}
