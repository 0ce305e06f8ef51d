//! Per-connection session: packet assembly, append, and echo.
//!
//! A [`Session`] owns nothing that outlives the connection.  It borrows the
//! shared data file, the pending-packet buffer and the scratch buffer from the
//! supervisor, resets the pending buffer on entry, and returns a
//! [`SessionReport`] describing how the connection ended.  It never logs;
//! reporting is the supervisor's job.
//!
//! For every chunk received:
//! - [`Framer`] splits it into packet tails, fragments and dropped bytes.
//! - A packet tail is joined with the pending bytes in the scratch buffer and
//!   appended to the data file with a single [`write_exact`].
//! - After each append the whole data file is re-read and sent to the peer
//!   with [`send_exact`], so the peer always sees the full history including
//!   its own packet before the next packet is scanned.

use std::io::{self, Read, Write};

use crate::buffer::GrowableBuffer;
use crate::config::SessionLimits;
use crate::error::{IoFailure, Operation, ReserveError, SessionError};
use crate::framing::{Framer, Mode, Step};
use crate::io::{is_peer_gone, send_exact, write_exact, SendOutcome};
use crate::shutdown::Shutdown;
use crate::sink::AppendSink;

/// Read size used when streaming the data file back to the peer.
pub const ECHO_READ_CHUNK: usize = 8192;

/// Why a session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer ended its side of the stream.
    PeerClosed,
    /// Shutdown was requested while the session was running.
    Shutdown,
}

/// Terminal state of a session.
#[derive(Debug)]
pub enum Outcome {
    Closed(CloseReason),
    Error(SessionError),
}

/// Counters collected over one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub packets_appended: u64,
    pub packets_dropped: u64,
    pub bytes_echoed: u64,
}

/// What a session hands back to the supervisor.
#[derive(Debug)]
pub struct SessionReport {
    pub outcome: Outcome,
    pub stats: SessionStats,
}

impl SessionReport {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    pub fn error(&self) -> Option<&SessionError> {
        match &self.outcome {
            Outcome::Error(e) => Some(e),
            Outcome::Closed(_) => None,
        }
    }
}

enum Received {
    Data(usize),
    Closed(CloseReason),
}

/// One connection's worth of packet processing.
pub struct Session<'a, S, K: ?Sized> {
    stream: S,
    sink: &'a mut K,
    pending: &'a mut GrowableBuffer,
    scratch: &'a mut [u8],
    limits: SessionLimits,
    shutdown: &'a Shutdown,
    framer: Framer,
    stats: SessionStats,
    peer_gone: bool,
}

impl<'a, S, K> Session<'a, S, K>
where
    S: Read + Write,
    K: AppendSink + ?Sized,
{
    /// Prepare a session over `stream`.
    ///
    /// # Panics
    ///
    /// If `scratch` is shorter than `limits.max_packet`.
    pub fn new(
        stream: S,
        sink: &'a mut K,
        pending: &'a mut GrowableBuffer,
        scratch: &'a mut [u8],
        limits: SessionLimits,
        shutdown: &'a Shutdown,
    ) -> Self {
        assert!(
            scratch.len() >= limits.max_packet,
            "scratch buffer must hold a maximum-size packet"
        );
        pending.clear();

        Self {
            stream,
            sink,
            pending,
            scratch,
            limits,
            shutdown,
            framer: Framer::new(limits.max_packet),
            stats: SessionStats::default(),
            peer_gone: false,
        }
    }

    /// Process the connection until the peer closes, shutdown is requested, or
    /// an operation fails.
    pub fn run(mut self) -> SessionReport {
        let outcome = match self.drive() {
            Ok(reason) => Outcome::Closed(reason),
            Err(e) => Outcome::Error(e),
        };
        // Unterminated bytes are never flushed.
        self.pending.clear();

        SessionReport {
            outcome,
            stats: self.stats,
        }
    }

    fn drive(&mut self) -> Result<CloseReason, SessionError> {
        let mut chunk = vec![0u8; self.limits.recv_chunk.max(1)];
        loop {
            match self.receive(&mut chunk)? {
                Received::Data(n) => self.consume(&chunk[..n])?,
                Received::Closed(reason) => return Ok(reason),
            }
        }
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<Received, SessionError> {
        loop {
            if self.shutdown.is_requested() {
                return Ok(Received::Closed(CloseReason::Shutdown));
            }

            match self.stream.read(buf) {
                Ok(0) => return Ok(Received::Closed(CloseReason::PeerClosed)),
                Ok(_) if self.shutdown.is_requested() => {
                    return Ok(Received::Closed(CloseReason::Shutdown))
                }
                Ok(n) => return Ok(Received::Data(n)),
                // Read timeouts are how a blocked receive gets to re-check shutdown.
                Err(e) if is_retryable(&e) => continue,
                Err(e) if self.peer_gone && is_peer_gone(&e) => {
                    return Ok(Received::Closed(CloseReason::PeerClosed))
                }
                Err(e) => {
                    return Err(SessionError::io(
                        Operation::Receive,
                        IoFailure::Io(e),
                        buf.len(),
                    ))
                }
            }
        }
    }

    fn consume(&mut self, mut input: &[u8]) -> Result<(), SessionError> {
        while !input.is_empty() {
            let (step, rest) = self.framer.next_step(input, self.pending.len());
            input = rest;

            match step {
                Step::Packet(tail) => self.deliver(tail)?,
                Step::Fragment(fragment) => self.stash(fragment)?,
                Step::Rejected(_) => self.abandon_packet(),
                Step::Discarded(_) => {}
            }
            debug_assert!(self.framer.mode() == Mode::Normal || self.pending.is_empty());
        }
        Ok(())
    }

    /// Append the packet ending in `tail`, then echo the data file.
    fn deliver(&mut self, tail: &[u8]) -> Result<(), SessionError> {
        let held = self.pending.len();
        let packet_len = held + tail.len();

        let packet = &mut self.scratch[..packet_len];
        packet[..held].copy_from_slice(self.pending.as_slice());
        packet[held..].copy_from_slice(tail);

        write_exact(self.sink.writer(), packet)
            .map_err(|f| SessionError::io(Operation::Append, f, packet_len))?;
        self.pending.clear();
        self.stats.packets_appended += 1;

        self.echo()
    }

    /// Buffer an unterminated fragment, or drop the packet if it cannot grow.
    fn stash(&mut self, fragment: &[u8]) -> Result<(), SessionError> {
        let need = self.pending.len() + fragment.len();
        match self.pending.reserve(need, self.framer.fragment_limit()) {
            Ok(()) => {
                self.pending.extend_from_slice(fragment);
                Ok(())
            }
            Err(ReserveError::CapacityExceeded { .. }) => {
                self.framer.reject(false);
                self.abandon_packet();
                Ok(())
            }
            Err(e @ ReserveError::OutOfMemory { .. }) => Err(SessionError::reserve(e, need)),
        }
    }

    fn abandon_packet(&mut self) {
        self.pending.clear();
        self.stats.packets_dropped += 1;
    }

    /// Stream the whole data file to the peer.
    fn echo(&mut self) -> Result<(), SessionError> {
        let mut log = match self.sink.reader() {
            Ok(log) => log,
            Err(e) => {
                let intended = self.echo_intent(0);
                return Err(SessionError::io(Operation::Echo, IoFailure::Io(e), intended));
            }
        };
        let mut buf = [0u8; ECHO_READ_CHUNK];
        let mut read = 0;

        loop {
            let n = match log.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let intended = self.echo_intent(read);
                    return Err(SessionError::io(Operation::Echo, IoFailure::Io(e), intended));
                }
            };
            read += n;

            let outcome = send_exact(&mut self.stream, &buf[..n], self.limits.write_chunk)
                .map_err(|f| SessionError::io(Operation::Echo, f, n))?;
            match outcome {
                SendOutcome::Complete => self.stats.bytes_echoed += n as u64,
                SendOutcome::PeerClosed { sent } => {
                    self.stats.bytes_echoed += sent as u64;
                    self.peer_gone = true;
                    return Ok(());
                }
            }
        }
    }

    /// Byte count reported for a failed echo: the length of the log, or how
    /// much of it had been read when the length is unknown.
    fn echo_intent(&self, read: usize) -> usize {
        self.sink
            .size()
            .ok()
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or(read)
    }
}

fn is_retryable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
