//! Error taxonomy shared by the buffer, the I/O primitives and the session.
//!
//! Every failure the session engine can observe collapses into one of four
//! [`ErrorKind`]s.  Only [`ErrorKind::CapacityExceeded`] is handled locally
//! (it switches the session into discard mode); the others end the session and
//! travel to the supervisor inside a [`SessionError`].

use std::fmt;
use std::io;

use thiserror::Error;

/// The four kinds of failure the session distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A read, write or receive call failed outright.
    Io,
    /// A write call succeeded but moved fewer bytes than requested.
    ShortWrite,
    /// A buffer size request went past the configured ceiling.
    CapacityExceeded,
    /// The allocator refused to grow a buffer.
    OutOfMemory,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Io => "I/O error",
            ErrorKind::ShortWrite => "short write",
            ErrorKind::CapacityExceeded => "capacity exceeded",
            ErrorKind::OutOfMemory => "out of memory",
        };
        f.write_str(name)
    }
}

/// Failure of one of the reliable write primitives in [`crate::io`].
#[derive(Error, Debug)]
pub enum IoFailure {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("short write: {written} of {intended} bytes")]
    ShortWrite { written: usize, intended: usize },
}

impl IoFailure {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IoFailure::Io(_) => ErrorKind::Io,
            IoFailure::ShortWrite { .. } => ErrorKind::ShortWrite,
        }
    }

    /// OS error code captured from the failed call, if there was one.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            IoFailure::Io(e) => e.raw_os_error(),
            IoFailure::ShortWrite { .. } => None,
        }
    }
}

/// Failure of [`crate::buffer::GrowableBuffer::reserve`].
///
/// The buffer is left untouched whenever one of these is returned.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveError {
    #[error("requested {need} bytes, ceiling is {max}")]
    CapacityExceeded { need: usize, max: usize },
    #[error("allocation of {capacity} bytes failed")]
    OutOfMemory { capacity: usize },
}

impl ReserveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReserveError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            ReserveError::OutOfMemory { .. } => ErrorKind::OutOfMemory,
        }
    }
}

/// Which step of the session loop failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Receive,
    Append,
    Echo,
    BufferGrow,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Receive => "receive",
            Operation::Append => "append",
            Operation::Echo => "echo",
            Operation::BufferGrow => "buffer-grow",
        };
        f.write_str(name)
    }
}

/// A fatal session failure, with enough detail for the supervisor to log it.
#[derive(Error, Debug)]
#[error("{op} failed: {kind} (intended {intended} bytes)")]
pub struct SessionError {
    pub op: Operation,
    pub kind: ErrorKind,
    /// OS error code captured at the point of failure.
    pub os_error: Option<i32>,
    /// Number of bytes the failing operation was asked to move.
    pub intended: usize,
    #[source]
    pub source: Option<io::Error>,
}

impl SessionError {
    pub(crate) fn io(op: Operation, failure: IoFailure, intended: usize) -> Self {
        let kind = failure.kind();
        let os_error = failure.raw_os_error();
        let source = match failure {
            IoFailure::Io(e) => Some(e),
            IoFailure::ShortWrite { .. } => None,
        };
        Self {
            op,
            kind,
            os_error,
            intended,
            source,
        }
    }

    pub(crate) fn reserve(err: ReserveError, intended: usize) -> Self {
        Self {
            op: Operation::BufferGrow,
            kind: err.kind(),
            os_error: None,
            intended,
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_failure_keeps_os_error() {
        let failure = IoFailure::Io(io::Error::from_raw_os_error(28));
        assert_eq!(failure.kind(), ErrorKind::Io);
        assert_eq!(failure.raw_os_error(), Some(28));

        let err = SessionError::io(Operation::Append, failure, 12);
        assert_eq!(err.op, Operation::Append);
        assert_eq!(err.os_error, Some(28));
        assert_eq!(err.intended, 12);
        assert!(err.source.is_some());
    }

    #[test]
    fn short_write_has_no_os_error() {
        let failure = IoFailure::ShortWrite {
            written: 3,
            intended: 8,
        };
        let err = SessionError::io(Operation::Append, failure, 8);
        assert_eq!(err.kind, ErrorKind::ShortWrite);
        assert_eq!(err.os_error, None);
        assert!(err.source.is_none());
    }

    #[test]
    fn display_names_operation_and_kind() {
        let err = SessionError::reserve(ReserveError::OutOfMemory { capacity: 64 }, 64);
        assert_eq!(
            err.to_string(),
            "buffer-grow failed: out of memory (intended 64 bytes)"
        );
    }
}
