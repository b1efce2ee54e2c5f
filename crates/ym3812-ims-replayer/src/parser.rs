//! IMS file loading.
//!
//! Layout: a fixed header (version, base tempo, mode, event stream size),
//! the Pascal-string song name, the instrument name table (8 bytes per
//! name) and the event stream itself.

use std::path::Path;

use ym3812_common::parse::{fixed_name, Reader};

use crate::error::ImsError;
use crate::format::ImsSong;

const INSTRUMENT_NAME_LEN: usize = 8;

/// Parse an IMS song from a complete file image.
pub fn parse_ims(data: &[u8]) -> Result<ImsSong, ImsError> {
    let mut reader = Reader::new(data);
    let version = reader.read_u16()?;
    let basic_tempo = reader.read_u16()?.max(1);
    let mode = reader.read_u16()?;
    let event_size = reader.read_u32()? as usize;
    let name = reader.read_pascal_string()?;

    let count = reader.read_u16()? as usize;
    let mut instrument_names = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        instrument_names.push(fixed_name(reader.read_bytes(INSTRUMENT_NAME_LEN)?));
    }

    let events = reader.read_bytes(event_size)?.to_vec();

    Ok(ImsSong {
        version,
        basic_tempo,
        percussive: mode != 0,
        name,
        instrument_names,
        events,
    })
}

/// Read and parse an IMS file from disk.
pub fn load_ims(path: impl AsRef<Path>) -> Result<ImsSong, ImsError> {
    let data = std::fs::read(path)?;
    parse_ims(&data)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn build_ims(
        tempo: u16,
        mode: u16,
        name: &str,
        instruments: &[&str],
        events: &[u8],
    ) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&tempo.to_le_bytes());
        data.extend_from_slice(&mode.to_le_bytes());
        data.extend_from_slice(&(events.len() as u32).to_le_bytes());
        data.push(name.len() as u8);
        data.extend_from_slice(name.as_bytes());
        data.extend_from_slice(&(instruments.len() as u16).to_le_bytes());
        for instrument in instruments {
            let mut padded = [0u8; INSTRUMENT_NAME_LEN];
            padded[..instrument.len()].copy_from_slice(instrument.as_bytes());
            data.extend_from_slice(&padded);
        }
        data.extend_from_slice(events);
        data
    }

    #[test]
    fn parses_header_names_and_events() {
        let data = build_ims(140, 0, "MYSONG", &["PIANO", "BASS"], &[0x90, 48, 100, 0xFC]);
        let song = parse_ims(&data).unwrap();
        assert_eq!(song.basic_tempo, 140);
        assert!(!song.percussive);
        assert_eq!(song.name, "MYSONG");
        assert_eq!(song.instrument_names, vec!["PIANO", "BASS"]);
        assert_eq!(song.events, vec![0x90, 48, 100, 0xFC]);
        assert_eq!(song.num_channels(), 9);
    }

    #[test]
    fn nonzero_mode_selects_percussive() {
        let data = build_ims(120, 1, "", &[], &[0xFC]);
        let song = parse_ims(&data).unwrap();
        assert!(song.percussive);
        assert_eq!(song.num_channels(), 11);
    }

    #[test]
    fn truncated_event_stream_is_an_error() {
        let mut data = build_ims(120, 0, "S", &[], &[0x90, 48, 100, 5, 0xFC]);
        data.truncate(data.len() - 3);
        assert!(matches!(parse_ims(&data), Err(ImsError::Read(_))));
    }

    #[test]
    fn zero_tempo_is_clamped() {
        let data = build_ims(0, 0, "", &[], &[0xFC]);
        assert_eq!(parse_ims(&data).unwrap().basic_tempo, 1);
    }
}
