use thiserror::Error;
use ym3812_common::parse::ReadError;

#[derive(Debug, Error)]
pub enum BnkError {
    #[error("unexpected end of file at offset {offset}: needed {needed} bytes, file is {len}")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("not an instrument bank: bad signature {found:?}")]
    BadSignature { found: [u8; 6] },

    #[error("instrument index {index} out of range ({count} records)")]
    BadIndex { index: usize, count: usize },

    #[error("{0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ReadError> for BnkError {
    fn from(err: ReadError) -> Self {
        BnkError::UnexpectedEof {
            offset: err.offset,
            needed: err.needed,
            len: err.len,
        }
    }
}

impl From<String> for BnkError {
    fn from(message: String) -> Self {
        BnkError::Invalid(message)
    }
}

impl From<&str> for BnkError {
    fn from(message: &str) -> Self {
        BnkError::Invalid(message.to_string())
    }
}
