//! VGM file loading.
//!
//! Only the YM3812 command subset is decoded. Writes for every other
//! chip are skipped over using the fixed operand lengths the container
//! defines, so a multi-chip log still parses with its timing intact.

use std::fs;
use std::path::Path;

use ym3812_common::parse::Reader;

use crate::error::VgmError;
use crate::format::{Gd3Tag, RegisterWrite, VgmSong};

/// Parses a complete VGM file image.
pub fn parse_vgm(data: &[u8]) -> Result<VgmSong, VgmError> {
    if data.len() >= 2 && data[0] == 0x1F && data[1] == 0x8B {
        return Err(VgmError::Invalid(
            "compressed VGM (vgz) is not supported".to_string(),
        ));
    }

    let mut header = Reader::new(data);
    let magic = header.read_array::<4>()?;
    if &magic != b"Vgm " {
        return Err(VgmError::BadMagic { found: magic });
    }
    let eof_offset = header.read_u32()? as usize;
    let version = header.read_u32()?;

    let gd3_offset = read_u32_at(data, 0x14)? as usize;
    let total_samples = read_u32_at(data, 0x18)?;
    let loop_offset = read_u32_at(data, 0x1C)? as usize;

    let data_start = if version >= 0x150 {
        0x34 + read_u32_at(data, 0x34)? as usize
    } else {
        0x40
    };

    let ym3812_clock = if version >= 0x151 && data_start > 0x50 && data.len() >= 0x54 {
        read_u32_at(data, 0x50)?
    } else {
        0
    };
    if ym3812_clock & 0x3FFF_FFFF == 0 {
        return Err(VgmError::MissingYm3812);
    }

    let end = if eof_offset == 0 {
        data.len()
    } else {
        (0x04 + eof_offset).min(data.len())
    };
    let loop_target = if loop_offset != 0 {
        Some(0x1C + loop_offset)
    } else {
        None
    };

    let mut reader = Reader::new(data);
    reader.seek(data_start)?;

    let mut position: u64 = 0;
    let mut commands = Vec::new();
    let mut loop_index = None;
    let mut loop_sample = 0u64;
    let mut skipped = 0u32;
    let mut end_sample = None;

    while reader.position() < end {
        if loop_target == Some(reader.position()) {
            loop_index = Some(commands.len());
            loop_sample = position;
        }
        let op = reader.read_u8()?;
        match op {
            0x5A => {
                let reg = reader.read_u8()?;
                let value = reader.read_u8()?;
                commands.push(RegisterWrite {
                    at: position,
                    reg,
                    value,
                });
            }
            0x61 => position += u64::from(reader.read_u16()?),
            0x62 => position += 735,
            0x63 => position += 882,
            0x66 => {
                end_sample = Some(position);
                break;
            }
            0x70..=0x7F => position += u64::from(op & 0x0F) + 7,
            // Other chips and reserved ranges, skipped by operand length.
            0x30..=0x3F | 0x4F | 0x50 | 0x94 => {
                reader.skip(1)?;
                skipped += 1;
            }
            0x40..=0x4E | 0x51..=0x5F | 0xA0..=0xBF => {
                reader.skip(2)?;
                skipped += 1;
            }
            0xC0..=0xDF => {
                reader.skip(3)?;
                skipped += 1;
            }
            0x90 | 0x91 | 0x95 | 0xE0..=0xFF => {
                reader.skip(4)?;
                skipped += 1;
            }
            0x92 => {
                reader.skip(5)?;
                skipped += 1;
            }
            0x93 => {
                reader.skip(10)?;
                skipped += 1;
            }
            0x67 => {
                reader.skip(2)?; // compatibility byte, block type
                let size = reader.read_u32()? as usize;
                reader.skip(size)?;
                skipped += 1;
            }
            0x68 => {
                reader.skip(11)?;
                skipped += 1;
            }
            _ => skipped += 1,
        }
    }

    let gd3 = if gd3_offset != 0 {
        parse_gd3(data, 0x14 + gd3_offset)
    } else {
        None
    };

    Ok(VgmSong {
        version,
        ym3812_clock,
        total_samples,
        commands,
        loop_index,
        loop_sample,
        end_sample: end_sample.unwrap_or(position),
        skipped_commands: skipped,
        gd3,
    })
}

/// Reads a VGM file from disk.
pub fn load_vgm<P: AsRef<Path>>(path: P) -> Result<VgmSong, VgmError> {
    let data = fs::read(path)?;
    parse_vgm(&data)
}

fn read_u32_at(data: &[u8], offset: usize) -> Result<u32, VgmError> {
    let mut reader = Reader::new(data);
    reader.seek(offset)?;
    Ok(reader.read_u32()?)
}

/// GD3 tags are best-effort: anything malformed just drops the tag.
fn parse_gd3(data: &[u8], offset: usize) -> Option<Gd3Tag> {
    let mut reader = Reader::new(data);
    reader.seek(offset).ok()?;
    let magic = reader.read_array::<4>().ok()?;
    if &magic != b"Gd3 " {
        return None;
    }
    reader.skip(4).ok()?; // tag version
    let length = reader.read_u32().ok()? as usize;
    let payload = reader.read_bytes(length.min(reader.remaining())).ok()?;
    let strings = utf16_strings(payload);
    Some(Gd3Tag {
        track: strings.first().cloned().unwrap_or_default(),
        game: strings.get(2).cloned().unwrap_or_default(),
        author: strings.get(6).cloned().unwrap_or_default(),
    })
}

fn utf16_strings(payload: &[u8]) -> Vec<String> {
    let mut strings = Vec::new();
    let mut current = Vec::new();
    for pair in payload.chunks_exact(2) {
        let unit = u16::from_le_bytes([pair[0], pair[1]]);
        if unit == 0 {
            strings.push(String::from_utf16_lossy(&current));
            current.clear();
        } else {
            current.push(unit);
        }
    }
    strings
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const HEADER_LEN: usize = 0x100;

    /// Builds a version 1.51 file around `commands`, with the loop
    /// offset pointing `loop_to` bytes into the command stream.
    pub(crate) fn build_vgm(commands: &[u8], loop_to: Option<u32>) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_LEN];
        data[0..4].copy_from_slice(b"Vgm ");
        data[0x08..0x0C].copy_from_slice(&0x0000_0151u32.to_le_bytes());
        data[0x34..0x38].copy_from_slice(&((HEADER_LEN - 0x34) as u32).to_le_bytes());
        data[0x50..0x54].copy_from_slice(&3_579_545u32.to_le_bytes());
        data.extend_from_slice(commands);
        let eof = (data.len() - 4) as u32;
        data[0x04..0x08].copy_from_slice(&eof.to_le_bytes());
        if let Some(into_stream) = loop_to {
            let absolute = HEADER_LEN as u32 + into_stream;
            data[0x1C..0x20].copy_from_slice(&(absolute - 0x1C).to_le_bytes());
        }
        data
    }

    pub(crate) fn with_gd3(mut data: Vec<u8>, strings: &[&str]) -> Vec<u8> {
        let gd3_at = data.len();
        let mut payload = Vec::new();
        for entry in strings {
            for unit in entry.encode_utf16() {
                payload.extend_from_slice(&unit.to_le_bytes());
            }
            payload.extend_from_slice(&0u16.to_le_bytes());
        }
        data.extend_from_slice(b"Gd3 ");
        data.extend_from_slice(&0x0100u32.to_le_bytes());
        data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        data.extend_from_slice(&payload);
        data[0x14..0x18].copy_from_slice(&((gd3_at - 0x14) as u32).to_le_bytes());
        let eof = (data.len() - 4) as u32;
        data[0x04..0x08].copy_from_slice(&eof.to_le_bytes());
        data
    }

    #[test]
    fn short_waits_map_to_7_through_22() {
        let data = build_vgm(
            &[0x7F, 0x5A, 0x20, 0x01, 0x70, 0x5A, 0x40, 0x3F, 0x66],
            None,
        );
        let song = parse_vgm(&data).unwrap();
        assert_eq!(song.commands.len(), 2);
        assert_eq!(song.commands[0].at, 22);
        assert_eq!(song.commands[1].at, 29);
        assert_eq!(song.end_sample, 29);
    }

    #[test]
    fn explicit_and_fixed_waits_accumulate() {
        let data = build_vgm(&[0x61, 0x10, 0x00, 0x62, 0x63, 0x5A, 0xB0, 0x31, 0x66], None);
        let song = parse_vgm(&data).unwrap();
        assert_eq!(song.commands[0].at, 0x10 + 735 + 882);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = build_vgm(&[0x66], None);
        data[3] = b'!';
        assert!(matches!(parse_vgm(&data), Err(VgmError::BadMagic { .. })));
    }

    #[test]
    fn rejects_gzip_compressed_input() {
        let data = vec![0x1F, 0x8B, 0x08, 0x00];
        assert!(matches!(parse_vgm(&data), Err(VgmError::Invalid(_))));
    }

    #[test]
    fn rejects_files_without_a_ym3812_clock() {
        let mut data = build_vgm(&[0x66], None);
        data[0x50..0x54].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(parse_vgm(&data), Err(VgmError::MissingYm3812)));
    }

    #[test]
    fn loop_offset_resolves_to_a_command_index() {
        // loop lands on the second write, after one 735-sample wait
        let data = build_vgm(
            &[0x5A, 0x20, 0x01, 0x62, 0x5A, 0x40, 0x10, 0x62, 0x66],
            Some(4),
        );
        let song = parse_vgm(&data).unwrap();
        assert_eq!(song.loop_index, Some(1));
        assert_eq!(song.loop_sample, 735);
        assert_eq!(song.end_sample, 1470);
    }

    #[test]
    fn foreign_chip_commands_are_skipped_in_sync() {
        let data = build_vgm(
            &[
                0x50, 0x9F, // PSG write
                0x52, 0x28, 0xF0, // YM2612 write
                0xC0, 0x01, 0x02, 0x03, // Sega PCM
                0xE0, 0x01, 0x02, 0x03, 0x04, // seek
                0x5A, 0xBD, 0x20, // ours
                0x66,
            ],
            None,
        );
        let song = parse_vgm(&data).unwrap();
        assert_eq!(song.commands.len(), 1);
        assert_eq!(song.commands[0].reg, 0xBD);
        assert_eq!(song.skipped_commands, 4);
    }

    #[test]
    fn data_blocks_are_skipped_whole() {
        let data = build_vgm(
            &[
                0x67, 0x66, 0x00, 0x03, 0x00, 0x00, 0x00, 0xAA, 0xBB, 0xCC, // block
                0x5A, 0x01, 0x20, 0x66,
            ],
            None,
        );
        let song = parse_vgm(&data).unwrap();
        assert_eq!(song.commands.len(), 1);
        assert_eq!(song.commands[0].reg, 0x01);
    }

    #[test]
    fn gd3_strings_populate_the_tag() {
        let data = build_vgm(&[0x5A, 0x20, 0x01, 0x66], None);
        let data = with_gd3(
            data,
            &[
                "Title", "", "Game", "", "System", "", "Author", "", "2020", "rip", "",
            ],
        );
        let song = parse_vgm(&data).unwrap();
        let gd3 = song.gd3.expect("tag should parse");
        assert_eq!(gd3.track, "Title");
        assert_eq!(gd3.game, "Game");
        assert_eq!(gd3.author, "Author");
    }

    #[test]
    fn header_total_samples_drive_the_duration() {
        let mut data = build_vgm(&[0x66], None);
        data[0x18..0x1C].copy_from_slice(&88_200u32.to_le_bytes());
        let song = parse_vgm(&data).unwrap();
        assert_eq!(song.duration_seconds(), 2.0);
    }
}
