//! Library-wide error and result types.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result alias used throughout p4gsave.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the library can produce.
///
/// [`Error::MissingInput`] is the only variant a directory conversion treats
/// as recoverable: the affected slot is skipped and the run continues. Every
/// other variant aborts the file (or run) it was raised for.
#[derive(Debug)]
pub enum Error {
    /// A companion file required for a slot does not exist.
    MissingInput(PathBuf),
    /// The input directory already holds saves in the target layout.
    AlreadyConverted(PathBuf),
    /// A magic/signature field did not match the expected value.
    BadMagic,
    /// A format version is present in the data but not supported.
    UnsupportedVersion(u8),
    /// The stream ended before all expected bytes could be read.
    UnexpectedEof,
    /// An offset or size field would read outside the valid region.
    InvalidRange,
    /// A field was about to be written somewhere other than its fixed offset.
    Misplaced(&'static str),
    /// A slot index outside `0..=16`.
    InvalidSlot(usize),
    /// A structural constraint was violated (message describes which one).
    Parse(&'static str),
    /// An underlying I/O operation failed.
    Io(io::Error),
}

impl Error {
    /// Whether this error only skips the current slot instead of aborting.
    pub fn is_skip(&self) -> bool {
        matches!(self, Error::MissingInput(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingInput(p) => write!(f, "missing input: {}", p.display()),
            Error::AlreadyConverted(p) => write!(f, "already converted: {}", p.display()),
            Error::BadMagic => write!(f, "bad magic value"),
            Error::UnsupportedVersion(v) => write!(f, "unsupported version: {v}"),
            Error::UnexpectedEof => write!(f, "unexpected end of file"),
            Error::InvalidRange => write!(f, "invalid offset or size"),
            Error::Misplaced(field) => write!(f, "field '{field}' written at the wrong offset"),
            Error::InvalidSlot(i) => write!(f, "invalid slot index: {i}"),
            Error::Parse(s) => write!(f, "parse error: {s}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Error::Io(e) = self {
            Some(e)
        } else {
            None
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        // A short read is a truncated archive, not an I/O fault.
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEof
        } else {
            Error::Io(e)
        }
    }
}
