//! Error taxonomy for the CFFS engine.

use snafu::prelude::*;

#[cfg(not(feature = "std"))]
use alloc::string::String;

/// Errors produced while decoding, scanning, or mutating a CFFS volume.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// The first word at `offset` did not match a known header magic.
    #[snafu(display("Unrecognized header magic 0x{word:08X} at offset {offset}"))]
    BadMagic { offset: u64, word: u32 },

    /// Fewer bytes remained than the header's fixed size required.
    #[snafu(display("Header at offset {offset} was truncated by the end of the device"))]
    Short { offset: u64 },

    /// The scanner could not make sense of what followed `offset`.
    #[snafu(display("Corrupt filesystem at offset {offset}: {reason}"))]
    Corrupt { offset: u64, reason: String },

    /// A payload's stored checksum did not match the one computed on read.
    #[snafu(display("Bad checksum for {name}"))]
    BadChecksum { name: String },

    /// A byte after the end-of-filesystem sentinel was not `0xFF`.
    #[snafu(display("Tail not blank: byte at offset {offset} is not 0xFF"))]
    TailCorrupt { offset: u64 },

    /// There was not enough free tail to append a new file.
    #[snafu(display("Not enough space: need {needed} bytes, have {available}"))]
    NoSpace { needed: u64, available: u64 },

    /// The backing store reported an I/O failure.
    #[snafu(display("Backing store I/O error: {source}"))]
    Io { source: IoError },

    /// A delete attempted to set a bit from 0 to 1, which the physical medium
    /// cannot do without a full erase.
    #[snafu(display("Illegal 0->1 bit transition requested at offset {offset}"))]
    IllegalBitTransition { offset: u64 },
}

/// The underlying I/O failure type wrapped by [`Error::Io`].
///
/// Kept as a newtype rather than naming [`std::io::Error`] directly in the
/// enum so the error type stays nameable if a non-`std` backing store is
/// ever added.
#[derive(Debug)]
#[cfg(feature = "std")]
pub struct IoError(pub std::io::Error);

#[cfg(feature = "std")]
impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

#[cfg(feature = "std")]
impl From<std::io::Error> for Error {
    #[inline]
    fn from(source: std::io::Error) -> Self {
        Self::Io { source: IoError(source) }
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
