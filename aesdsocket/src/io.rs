//! Reliable write primitives.
//!
//! - [`write_exact`] is used for appends to the data file: every byte goes out
//!   in one call or the operation fails.
//! - [`send_exact`] is used for echoes to the peer: bytes go out in bounded
//!   chunks and a peer that has gone away stops the send without an error.
//!
//! Both retry transparently on [`io::ErrorKind::Interrupted`].

use std::io::{self, Write};

use crate::error::IoFailure;

/// Result of a [`send_exact`] call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Every byte was handed to the peer.
    Complete,
    /// The peer reset or closed the connection after `sent` bytes.
    PeerClosed { sent: usize },
}

/// Write all of `bytes` to `dest` in a single successful call.
///
/// A call that moves fewer bytes than requested is reported as
/// [`IoFailure::ShortWrite`] and the remainder is not retried.
pub fn write_exact<W: Write + ?Sized>(dest: &mut W, bytes: &[u8]) -> Result<(), IoFailure> {
    if bytes.is_empty() {
        return Ok(());
    }

    loop {
        match dest.write(bytes) {
            Ok(n) if n == bytes.len() => return Ok(()),
            Ok(n) => {
                return Err(IoFailure::ShortWrite {
                    written: n,
                    intended: bytes.len(),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(IoFailure::Io(e)),
        }
    }
}

/// Write all of `bytes` to a peer, at most `chunk_size` bytes per call.
///
/// A partially accepted chunk continues from where the peer stopped; a call
/// that accepts nothing is a short write.  Connection reset, broken pipe and
/// aborted connections end the send early with [`SendOutcome::PeerClosed`].
pub fn send_exact<W: Write + ?Sized>(
    dest: &mut W,
    bytes: &[u8],
    chunk_size: usize,
) -> Result<SendOutcome, IoFailure> {
    let chunk_size = chunk_size.max(1);
    let mut sent = 0;

    while sent < bytes.len() {
        let end = sent + chunk_size.min(bytes.len() - sent);
        match dest.write(&bytes[sent..end]) {
            Ok(0) => {
                return Err(IoFailure::ShortWrite {
                    written: sent,
                    intended: bytes.len(),
                })
            }
            Ok(n) => sent += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_peer_gone(&e) => return Ok(SendOutcome::PeerClosed { sent }),
            Err(e) => return Err(IoFailure::Io(e)),
        }
    }

    Ok(SendOutcome::Complete)
}

/// Returns true if the error means the peer can no longer receive anything.
pub(crate) fn is_peer_gone(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionAborted
    )
}
