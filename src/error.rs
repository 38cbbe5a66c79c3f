use std::path::PathBuf;

use crate::protocol::ProtocolError;

/// Errors surfaced by the keyer session and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The serial port could not be opened or configured.
    #[error("failed to open {path}: {source}")]
    LinkOpen {
        path: String,
        source: serialport::Error,
    },

    /// A read or write on the open link failed.
    #[error("serial link I/O error: {0}")]
    Link(#[from] std::io::Error),

    /// An operand was rejected before any frame was built.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Raw mode could not be entered or left.
    #[error("terminal error: {0}")]
    Terminal(std::io::Error),

    /// The word list could not be read.
    #[error("could not read word list {path}: {source}")]
    WordList {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The selected category produced nothing to practice.
    #[error("no practice items: {0}")]
    EmptyPool(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
