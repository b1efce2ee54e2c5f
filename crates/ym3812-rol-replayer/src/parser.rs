//! ROL file loading.
//!
//! Layout: a fixed header (version, comment, timing, mode, base tempo),
//! the tempo event table, then eleven voice blocks. Each voice block is
//! four sections (notes, timbres, volumes, pitches), every section
//! opened by a 15-byte label that carries no playback information.

use std::fs;
use std::path::Path;

use ym3812_common::parse::{fixed_name, Reader};

use crate::error::RolError;
use crate::format::{
    NoteEvent, PitchEvent, RolSong, TempoEvent, TimbreEvent, VoiceTrack, VolumeEvent, NUM_TRACKS,
};

const COMMENT_LEN: usize = 40;
const FILLER_LEN: usize = 90 + 38 + 15;
const SECTION_LABEL_LEN: usize = 15;
const INSTRUMENT_NAME_LEN: usize = 9;

/// Parses a complete ROL file image.
pub fn parse_rol(data: &[u8]) -> Result<RolSong, RolError> {
    let mut reader = Reader::new(data);
    let major = reader.read_u16()?;
    let minor = reader.read_u16()?;
    if major != 0 || minor != 4 {
        return Err(RolError::BadVersion { major, minor });
    }
    let comment = fixed_name(reader.read_bytes(COMMENT_LEN)?);
    let ticks_per_beat = reader.read_u16()?.max(1);
    let beats_per_measure = reader.read_u16()?;
    reader.skip(4)?; // edit-window scale
    reader.skip(1)?;
    let mode = reader.read_u8()?;
    reader.skip(FILLER_LEN)?;
    let basic_tempo = reader.read_f32()?;
    if !basic_tempo.is_finite() || basic_tempo <= 0.0 {
        return Err(RolError::Invalid(format!("bad base tempo {basic_tempo}")));
    }

    let tempo_events = read_tempo_events(&mut reader)?;

    let mut instrument_names = Vec::new();
    let mut tracks = Vec::with_capacity(NUM_TRACKS);
    for _ in 0..NUM_TRACKS {
        tracks.push(read_track(&mut reader, &mut instrument_names)?);
    }

    Ok(RolSong {
        comment,
        ticks_per_beat,
        beats_per_measure,
        percussive: mode == 0,
        basic_tempo,
        tempo_events,
        tracks,
        instrument_names,
    })
}

/// Reads a ROL file from disk.
pub fn load_rol<P: AsRef<Path>>(path: P) -> Result<RolSong, RolError> {
    let data = fs::read(path)?;
    parse_rol(&data)
}

fn read_tempo_events(reader: &mut Reader) -> Result<Vec<TempoEvent>, RolError> {
    let count = usize::from(reader.read_u16()?);
    let mut events = Vec::with_capacity(count);
    for _ in 0..count {
        let time = reader.read_u16()?;
        let multiplier = reader.read_f32()?;
        events.push(TempoEvent { time, multiplier });
    }
    Ok(events)
}

fn read_track(reader: &mut Reader, names: &mut Vec<String>) -> Result<VoiceTrack, RolError> {
    reader.skip(SECTION_LABEL_LEN)?;
    let total_ticks = reader.read_u16()?;
    let mut notes = Vec::new();
    let mut elapsed = 0u32;
    while elapsed < u32::from(total_ticks) {
        let note = reader.read_u16()?;
        let duration = reader.read_u16()?;
        if duration == 0 {
            return Err(RolError::Invalid(format!(
                "zero-length note event at offset {}",
                reader.position() - 2
            )));
        }
        elapsed += u32::from(duration);
        notes.push(NoteEvent {
            note: note.min(127) as u8,
            duration,
        });
    }

    reader.skip(SECTION_LABEL_LEN)?;
    let count = usize::from(reader.read_u16()?);
    let mut timbres = Vec::with_capacity(count);
    for _ in 0..count {
        let time = reader.read_u16()?;
        let name = fixed_name(reader.read_bytes(INSTRUMENT_NAME_LEN)?);
        reader.skip(3)?; // filler byte plus an unused word
        timbres.push(TimbreEvent {
            time,
            instrument: intern(names, &name),
        });
    }

    reader.skip(SECTION_LABEL_LEN)?;
    let count = usize::from(reader.read_u16()?);
    let mut volumes = Vec::with_capacity(count);
    for _ in 0..count {
        let time = reader.read_u16()?;
        let level = reader.read_f32()?;
        volumes.push(VolumeEvent {
            time,
            volume: scale_volume(level),
        });
    }

    reader.skip(SECTION_LABEL_LEN)?;
    let count = usize::from(reader.read_u16()?);
    let mut pitches = Vec::with_capacity(count);
    for _ in 0..count {
        let time = reader.read_u16()?;
        let variation = reader.read_f32()?;
        pitches.push(PitchEvent {
            time,
            bend: scale_pitch(variation),
        });
    }

    Ok(VoiceTrack {
        total_ticks,
        notes,
        timbres,
        volumes,
        pitches,
    })
}

fn intern(names: &mut Vec<String>, name: &str) -> u16 {
    if let Some(index) = names
        .iter()
        .position(|existing| existing.eq_ignore_ascii_case(name))
    {
        index as u16
    } else {
        names.push(name.to_string());
        (names.len() - 1) as u16
    }
}

/// Volume events store 0.0..=1.0; rescale to the 0..=127 engine range.
fn scale_volume(level: f32) -> u8 {
    (level.clamp(0.0, 1.0) * 127.0).round() as u8
}

/// Pitch events store a variation around 1.0; rescale to the 14-bit
/// bend value the engine takes, 0x2000 meaning no bend.
fn scale_pitch(variation: f32) -> u16 {
    let bend = (variation.clamp(0.0, 2.0) * 8192.0).round() as u32;
    bend.min(0x3FFF) as u16
}
