//! Error types shared across the crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid model or window configuration. Fatal at construction time.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal geometry invariant broken. Indicates a defect in stage
    /// parameter derivation, not a recoverable runtime condition.
    #[error("range invariant violated: {0}")]
    RangeInvariant(String),

    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Error::RangeInvariant(msg.into())
    }

    /// True for the defect class that should abort with full chain state.
    pub fn is_defect(&self) -> bool {
        matches!(self, Error::RangeInvariant(_))
    }
}
