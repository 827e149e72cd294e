// Undula
// Copyright (c) 2026 The Project Undula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error;
use std::fmt;
use std::io;
use std::result;

/// `Error` provides an enumeration of all possible errors reported by Undula.
#[derive(Debug)]
pub enum Error {
    /// A user-supplied parameter is out of its valid range.
    InvalidParam(&'static str),
    /// A declared buffer or stream size disagrees with the actual size.
    WrongSize(&'static str),
    /// Declared volume dimensions disagree with the data at hand.
    DimMismatch(&'static str),
    /// The stream was produced by an incompatible major version.
    VersionMismatch(u8),
    /// The stream is marked as ZSTD-compressed, but this reader was built without ZSTD support.
    ZstdMismatch,
    /// A non-empty stream was expected for this chunk.
    EmptyStream,
    /// An IO error occurred while reading or writing a stream.
    IoError(io::Error),
    /// The stream contained malformed data and could not be decoded.
    DecodeError(&'static str),
    /// An internal invariant was violated.
    Other(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::InvalidParam(msg) => {
                write!(f, "invalid parameter: {}", msg)
            }
            Error::WrongSize(msg) => {
                write!(f, "wrong size: {}", msg)
            }
            Error::DimMismatch(msg) => {
                write!(f, "dimension mismatch: {}", msg)
            }
            Error::VersionMismatch(ver) => {
                write!(f, "stream written by incompatible major version {}", ver)
            }
            Error::ZstdMismatch => {
                write!(f, "stream requires zstd support, which is not compiled in")
            }
            Error::EmptyStream => {
                write!(f, "unexpected empty stream")
            }
            Error::IoError(ref err) => {
                write!(f, "io error: {}", err)
            }
            Error::DecodeError(msg) => {
                write!(f, "malformed stream: {}", msg)
            }
            Error::Other(msg) => {
                write!(f, "error: {}", msg)
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create an invalid parameter error.
pub fn invalid_param_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::InvalidParam(msg))
}

/// Convenience function to create a wrong size error.
pub fn wrong_size_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::WrongSize(msg))
}

/// Convenience function to create a dimension mismatch error.
pub fn dim_mismatch_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::DimMismatch(msg))
}

/// Convenience function to create a decode error.
pub fn decode_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::DecodeError(msg))
}

/// Convenience function to create a generic internal error.
pub fn other_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::Other(msg))
}
