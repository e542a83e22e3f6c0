use std::io;
use std::path::PathBuf;

use link_core::LinkError;
use thiserror::Error;

/// Failures surfaced by the monitor tools.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The debug link reported an error.
    #[error(transparent)]
    Link(#[from] LinkError),
    /// Terminal or file I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// The serial port could not be configured.
    #[error("serial port {path}: {message}")]
    Port {
        /// Device path.
        path: String,
        /// Description from the serial layer.
        message: String,
    },
    /// A memory image could not be read.
    #[error("{path}: {source}")]
    Image {
        /// Image file.
        path: PathBuf,
        /// What was wrong with it.
        source: ImageError,
    },
    /// JSON rendering failed.
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Problems found while parsing a memory image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    /// A text image token is not a 16-bit hex word.
    #[error("line {line}: `{token}` is not a 16-bit hex word")]
    BadWord {
        /// 1-based line number.
        line: usize,
        /// Offending token.
        token: String,
    },
    /// The image does not fit in memory from its load address.
    #[error("{words} words at {load_address:#07X} run past the end of memory")]
    TooLarge {
        /// Load address.
        load_address: u32,
        /// Image size in words.
        words: usize,
    },
    /// The file could not be read.
    #[error("{0}")]
    Read(String),
}
