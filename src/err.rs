use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Offset {offset}: an I/O error has occurred while trying to read {what}")]
    FailedToRead {
        offset: u64,
        what: &'static str,
        source: std::io::Error,
    },

    #[error("An I/O error has occurred")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Failed to open file {}", path.display())]
    FailedToOpenFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("Decode was cancelled")]
    Cancelled,

    #[error("Decoder `{name}` failed")]
    DecoderFailed {
        name: &'static str,
        source: std::io::Error,
    },

    #[error("Attribute `{name}` has no value in the current result context")]
    UnboundAttribute { name: String },

    #[error("Invalid slice [{start}, {end}) of input `{path}`")]
    InvalidSlice { start: u64, end: u64, path: String },
}
