//! Little-endian byte cursor shared by the song and bank file parsers.

use thiserror::Error;

/// A read ran past the end of the file image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unexpected end of file at offset {offset}: needed {needed} bytes, file is {len}")]
pub struct ReadError {
    pub offset: usize,
    pub needed: usize,
    pub len: usize,
}

/// Cursor over a complete file image. All multi-byte reads are
/// little-endian, matching every format this workspace parses.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Move to an absolute offset; one past the end is allowed so a
    /// fully-consumed file can be expressed.
    pub fn seek(&mut self, pos: usize) -> Result<(), ReadError> {
        if pos > self.data.len() {
            return Err(ReadError {
                offset: pos,
                needed: 0,
                len: self.data.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<(), ReadError> {
        self.read_bytes(count).map(|_| ())
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], ReadError> {
        if count > self.remaining() {
            return Err(ReadError {
                offset: self.pos,
                needed: count,
                len: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ReadError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ReadError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i16(&mut self) -> Result<i16, ReadError> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, ReadError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, ReadError> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    /// Length-prefixed (Pascal) string with a one-byte length.
    pub fn read_pascal_string(&mut self) -> Result<String, ReadError> {
        let len = self.read_u8()? as usize;
        Ok(String::from_utf8_lossy(self.read_bytes(len)?).into_owned())
    }
}

/// Decode a fixed-width NUL-padded name field.
pub fn fixed_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
