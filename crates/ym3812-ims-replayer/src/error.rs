use thiserror::Error;
use ym3812_common::parse::ReadError;

#[derive(Debug, Error)]
pub enum ImsError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("synth setup failed: {0}")]
    Synth(#[from] ym3812::Ym3812Error),

    #[error("{0}")]
    Invalid(String),
}

impl From<String> for ImsError {
    fn from(message: String) -> Self {
        ImsError::Invalid(message)
    }
}

impl From<&str> for ImsError {
    fn from(message: &str) -> Self {
        ImsError::Invalid(message.to_string())
    }
}
