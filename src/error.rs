// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for MXL operations.
//!
//! This module defines the error types returned by the MXL API, each mapping
//! to a stable small-integer status code suitable for foreign callers.

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Stable status code associated with every [`Error`] variant.
///
/// These values form the crate's stable numeric error surface; they never
/// change between releases.
pub type Status = i32;

pub const STATUS_OK: Status = 0;
pub const STATUS_INVALID_ARG: Status = 1;
pub const STATUS_INVALID_DESCRIPTOR: Status = 2;
pub const STATUS_UNSUPPORTED_MEDIA_TYPE: Status = 3;
pub const STATUS_FLOW_NOT_FOUND: Status = 4;
pub const STATUS_FLOW_INVALID: Status = 5;
pub const STATUS_WRITER_BUSY: Status = 6;
pub const STATUS_OUT_OF_RANGE_TOO_EARLY: Status = 7;
pub const STATUS_OUT_OF_RANGE_TOO_LATE: Status = 8;
pub const STATUS_PERMISSION_DENIED: Status = 9;
pub const STATUS_IO_ERROR: Status = 10;

/// Errors that can occur when using the MXL API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An argument was invalid: malformed UUID, malformed options document,
    /// buffer too small, handle misuse.
    #[error("Invalid argument: {0}")]
    InvalidArg(String),

    /// The flow definition failed semantic validation (missing fields, empty
    /// label, malformed group hint, interlace/grain-rate mismatch, ...).
    #[error("Invalid flow definition: {0}")]
    InvalidDescriptor(String),

    /// The flow definition names a media type with no geometry rule.
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The requested flow ID does not exist in the domain.
    #[error("Flow not found")]
    FlowNotFound,

    /// The flow was destroyed or recreated while this handle was attached.
    #[error("Flow is no longer valid")]
    FlowInvalid,

    /// Another writer currently holds the flow.
    #[error("Flow already has an active writer")]
    WriterBusy,

    /// Attempted to read/write data that is not yet available in the ring
    /// buffer (index is ahead of the current head beyond the timeout).
    #[error("Out of range - too early")]
    OutOfRangeTooEarly,

    /// Attempted to read/write data that is no longer available in the ring
    /// buffer (has been overwritten by newer data).
    #[error("Out of range - too late")]
    OutOfRangeTooLate,

    /// The domain directory is not writable.
    #[error("Permission denied")]
    PermissionDenied,

    /// An unexpected filesystem or mapping failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A generic error for Rust-level API misuse not directly mapped to a
    /// status code (e.g. converting an audio flow to a grain reader).
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Returns the stable status code for this error.
    pub fn status(&self) -> Status {
        match self {
            Error::InvalidArg(_) => STATUS_INVALID_ARG,
            Error::InvalidDescriptor(_) => STATUS_INVALID_DESCRIPTOR,
            Error::UnsupportedMediaType(_) => STATUS_UNSUPPORTED_MEDIA_TYPE,
            Error::FlowNotFound => STATUS_FLOW_NOT_FOUND,
            Error::FlowInvalid => STATUS_FLOW_INVALID,
            Error::WriterBusy => STATUS_WRITER_BUSY,
            Error::OutOfRangeTooEarly => STATUS_OUT_OF_RANGE_TOO_EARLY,
            Error::OutOfRangeTooLate => STATUS_OUT_OF_RANGE_TOO_LATE,
            Error::PermissionDenied => STATUS_PERMISSION_DENIED,
            Error::Io(_) => STATUS_IO_ERROR,
            Error::Other(_) => STATUS_INVALID_ARG,
        }
    }

    /// Maps a filesystem error onto the MXL error surface.
    ///
    /// `NotFound` becomes [`Error::FlowNotFound`] and `PermissionDenied`
    /// becomes [`Error::PermissionDenied`]; everything else is surfaced as an
    /// I/O error.
    pub(crate) fn from_fs(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Error::FlowNotFound,
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied,
            _ => Error::Io(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_stable() {
        assert_eq!(Error::FlowNotFound.status(), STATUS_FLOW_NOT_FOUND);
        assert_eq!(Error::WriterBusy.status(), STATUS_WRITER_BUSY);
        assert_eq!(
            Error::OutOfRangeTooEarly.status(),
            STATUS_OUT_OF_RANGE_TOO_EARLY
        );
        assert_eq!(
            Error::OutOfRangeTooLate.status(),
            STATUS_OUT_OF_RANGE_TOO_LATE
        );
        assert_eq!(
            Error::from_fs(std::io::Error::from(std::io::ErrorKind::NotFound)).status(),
            STATUS_FLOW_NOT_FOUND
        );
        assert_eq!(
            Error::from_fs(std::io::Error::from(std::io::ErrorKind::PermissionDenied)).status(),
            STATUS_PERMISSION_DENIED
        );
    }
}
