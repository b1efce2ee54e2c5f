//! Bank file layout and instrument lookup.
//!
//! A `.BNK` file is a 20-byte header, a name table of 12-byte entries and
//! a record table of 30-byte instrument definitions. Name entries point
//! into the record table by index, so the two tables are parsed
//! separately and joined on lookup.

use std::path::Path;

use crate::error::BnkError;
use ym3812_common::parse::{fixed_name, Reader};

const SIGNATURE: [u8; 6] = *b"ADLIB-";
const NAME_ENTRY_SIZE: usize = 12;
const RECORD_SIZE: usize = 30;

/// One slot in the bank's name table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankEntry {
    /// Index into the record table.
    pub index: u16,
    /// Unused slots keep their record but are skipped on lookup.
    pub used: bool,
    pub name: String,
}

/// One 30-byte instrument record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankRecord {
    /// Instrument is meant for a rhythm-mode percussion voice.
    pub percussive: bool,
    /// Which percussion voice, for percussive instruments.
    pub voice_num: u8,
    /// The 28 timbre parameter bytes.
    pub params: [u8; 28],
}

/// A parsed AdLib instrument bank.
#[derive(Debug, Clone)]
pub struct InstrumentBank {
    version: (u8, u8),
    num_used: u16,
    entries: Vec<BankEntry>,
    records: Vec<BankRecord>,
}

impl InstrumentBank {
    /// Parse a bank from a complete file image.
    pub fn parse(data: &[u8]) -> Result<Self, BnkError> {
        let mut reader = Reader::new(data);
        let ver_major = reader.read_u8()?;
        let ver_minor = reader.read_u8()?;
        let signature: [u8; 6] = reader.read_array()?;
        if signature != SIGNATURE {
            return Err(BnkError::BadSignature { found: signature });
        }
        let num_used = reader.read_u16()?;
        let num_entries = reader.read_u16()? as usize;
        let offset_names = reader.read_u32()? as usize;
        let offset_data = reader.read_u32()? as usize;

        reader.seek(offset_names)?;
        let mut entries = Vec::with_capacity(num_entries);
        for _ in 0..num_entries {
            let index = reader.read_u16()?;
            let used = reader.read_u8()? != 0;
            let name = fixed_name(reader.read_bytes(NAME_ENTRY_SIZE - 3)?);
            entries.push(BankEntry { index, used, name });
        }

        reader.seek(offset_data)?;
        let mut records = Vec::with_capacity(num_entries);
        for _ in 0..num_entries {
            let percussive = reader.read_u8()? != 0;
            let voice_num = reader.read_u8()?;
            let params: [u8; 28] = reader.read_array()?;
            records.push(BankRecord {
                percussive,
                voice_num,
                params,
            });
        }

        for entry in entries.iter().filter(|e| e.used) {
            if entry.index as usize >= records.len() {
                return Err(BnkError::BadIndex {
                    index: entry.index as usize,
                    count: records.len(),
                });
            }
        }

        Ok(InstrumentBank {
            version: (ver_major, ver_minor),
            num_used,
            entries,
            records,
        })
    }

    /// Read and parse a bank file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BnkError> {
        let data = std::fs::read(path)?;
        Self::parse(&data)
    }

    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Bank slots in use, per the header.
    pub fn num_used(&self) -> u16 {
        self.num_used
    }

    /// Total record count, including unused slots.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn entries(&self) -> &[BankEntry] {
        &self.entries
    }

    pub fn record(&self, index: usize) -> Option<&BankRecord> {
        self.records.get(index)
    }

    /// Look up an instrument by name. Bank names are matched
    /// case-insensitively, as drivers did.
    pub fn find(&self, name: &str) -> Option<&BankRecord> {
        self.entries
            .iter()
            .find(|e| e.used && e.name.eq_ignore_ascii_case(name))
            .and_then(|e| self.records.get(e.index as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_entry(data: &mut Vec<u8>, index: u16, used: bool, name: &str) {
        data.extend_from_slice(&index.to_le_bytes());
        data.push(used as u8);
        let mut padded = [0u8; 9];
        padded[..name.len()].copy_from_slice(name.as_bytes());
        data.extend_from_slice(&padded);
    }

    fn sample_bank() -> Vec<u8> {
        let mut data = vec![1u8, 0];
        data.extend_from_slice(b"ADLIB-");
        data.extend_from_slice(&2u16.to_le_bytes());
        data.extend_from_slice(&3u16.to_le_bytes());
        let offset_names = 20u32;
        let offset_data = offset_names + 3 * NAME_ENTRY_SIZE as u32;
        data.extend_from_slice(&offset_names.to_le_bytes());
        data.extend_from_slice(&offset_data.to_le_bytes());

        push_entry(&mut data, 0, true, "PIANO");
        push_entry(&mut data, 2, true, "DrumKit");
        push_entry(&mut data, 1, false, "SCRATCH");

        for i in 0..3u8 {
            data.push(u8::from(i == 2));
            data.push(i);
            data.extend((0..28u8).map(|p| i * 30 + p));
        }
        data
    }

    #[test]
    fn parses_header_and_tables() {
        let bank = InstrumentBank::parse(&sample_bank()).unwrap();
        assert_eq!(bank.version(), (1, 0));
        assert_eq!(bank.num_used(), 2);
        assert_eq!(bank.len(), 3);
        assert_eq!(bank.entries()[0].name, "PIANO");
        assert!(!bank.entries()[2].used);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let bank = InstrumentBank::parse(&sample_bank()).unwrap();
        let piano = bank.find("piano").unwrap();
        assert!(!piano.percussive);
        assert_eq!(piano.voice_num, 0);
        let drums = bank.find("DRUMKIT").unwrap();
        assert!(drums.percussive);
        assert_eq!(drums.voice_num, 2);
    }

    #[test]
    fn unused_entries_are_skipped() {
        let bank = InstrumentBank::parse(&sample_bank()).unwrap();
        assert!(bank.find("SCRATCH").is_none());
        assert!(bank.find("missing").is_none());
    }

    #[test]
    fn params_start_two_bytes_into_the_record() {
        let data = sample_bank();
        let bank = InstrumentBank::parse(&data).unwrap();
        let record = bank.find("DrumKit").unwrap();
        let offset_data = 20 + 3 * NAME_ENTRY_SIZE;
        assert_eq!(
            record.params.as_slice(),
            &data[offset_data + 2 * RECORD_SIZE + 2..offset_data + 3 * RECORD_SIZE]
        );
    }

    #[test]
    fn rejects_a_bad_signature() {
        let mut data = sample_bank();
        data[2] = b'X';
        assert!(matches!(
            InstrumentBank::parse(&data),
            Err(BnkError::BadSignature { .. })
        ));
    }

    #[test]
    fn truncation_reports_eof() {
        let data = sample_bank();
        assert!(matches!(
            InstrumentBank::parse(&data[..40]),
            Err(BnkError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn dangling_entry_index_is_rejected() {
        let mut data = sample_bank();
        // first name entry's record index
        data[20] = 9;
        assert!(matches!(
            InstrumentBank::parse(&data),
            Err(BnkError::BadIndex { index: 9, count: 3 })
        ));
    }
}
