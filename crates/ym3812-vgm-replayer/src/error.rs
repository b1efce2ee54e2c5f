use thiserror::Error;
use ym3812_common::parse::ReadError;

#[derive(Debug, Error)]
pub enum VgmError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("not a VGM file (magic {found:02X?})")]
    BadMagic { found: [u8; 4] },

    #[error("file has no YM3812 command stream")]
    MissingYm3812,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("synth setup failed: {0}")]
    Synth(#[from] ym3812::Ym3812Error),

    #[error("{0}")]
    Invalid(String),
}

impl From<String> for VgmError {
    fn from(message: String) -> Self {
        VgmError::Invalid(message)
    }
}

impl From<&str> for VgmError {
    fn from(message: &str) -> Self {
        VgmError::Invalid(message.to_string())
    }
}
