use thiserror::Error;
use ym3812_common::parse::ReadError;

#[derive(Debug, Error)]
pub enum RolError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("unsupported ROL version {major}.{minor}, expected 0.4")]
    BadVersion { major: u16, minor: u16 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("synth setup failed: {0}")]
    Synth(#[from] ym3812::Ym3812Error),

    #[error("{0}")]
    Invalid(String),
}

impl From<String> for RolError {
    fn from(message: String) -> Self {
        RolError::Invalid(message)
    }
}

impl From<&str> for RolError {
    fn from(message: &str) -> Self {
        RolError::Invalid(message.to_string())
    }
}
