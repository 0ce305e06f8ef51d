//! Newline framing state machine.
//!
//! [`Framer`] splits received chunks into steps without doing any I/O or
//! buffering itself; the session applies each step to its pending buffer and
//! the data file.
//!
//! ```text
//!            oversized, no newline yet
//!   Normal ─────────────────────────────▶ Discarding
//!     ▲  │                                    │
//!     │  └─ oversized, newline in segment ─┐  │ newline
//!     │      (dropped, stays Normal)       │  │
//!     └────────────────────────────────────┴──┘
//! ```
//!
//! Oversize checks for both terminated segments and unterminated fragments go
//! through [`admit`], and every rejection goes through [`Framer::reject`].

/// Scanner mode for the packet currently being received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Bytes belong to a packet that is still within the size limit.
    #[default]
    Normal,
    /// Bytes belong to an oversized packet and are dropped until its newline.
    Discarding,
}

/// Verdict of [`admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Fits,
    Oversized,
}

/// Whether `incoming` more bytes on top of `pending` stay within `limit`.
///
/// Computed by subtraction so that no sum can overflow.  The limit is
/// inclusive.
pub fn admit(pending: usize, incoming: usize, limit: usize) -> Admission {
    match limit.checked_sub(incoming) {
        Some(room) if pending <= room => Admission::Fits,
        _ => Admission::Oversized,
    }
}

/// One unit of work split off the front of a received chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<'a> {
    /// Tail of a packet, newline included.  Pending bytes plus this slice form
    /// the complete packet.
    Packet(&'a [u8]),
    /// Unterminated bytes that belong after the pending bytes.
    Fragment(&'a [u8]),
    /// Bytes of a packet that was just found to be oversized.  Pending bytes
    /// for that packet must be dropped too.
    Rejected(&'a [u8]),
    /// Bytes dropped while already discarding.
    Discarded(&'a [u8]),
}

/// Packet boundary scanner for one connection.
#[derive(Debug, Clone)]
pub struct Framer {
    mode: Mode,
    max_packet: usize,
}

impl Framer {
    pub fn new(max_packet: usize) -> Self {
        Self {
            mode: Mode::Normal,
            max_packet,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn max_packet(&self) -> usize {
        self.max_packet
    }

    /// Largest number of bytes that may be held without a newline.
    ///
    /// One byte of every packet is reserved for its terminator.
    pub fn fragment_limit(&self) -> usize {
        self.max_packet.saturating_sub(1)
    }

    /// Split the next step off `input` given `pending` buffered bytes.
    ///
    /// Returns the step and the unconsumed remainder of `input`.  `input` must
    /// not be empty.
    pub fn next_step<'a>(&mut self, input: &'a [u8], pending: usize) -> (Step<'a>, &'a [u8]) {
        debug_assert!(!input.is_empty());
        let newline = input.iter().position(|&b| b == b'\n');

        match (self.mode, newline) {
            (Mode::Discarding, None) => (Step::Discarded(input), &[][..]),
            (Mode::Discarding, Some(pos)) => {
                self.mode = Mode::Normal;
                let (dropped, rest) = input.split_at(pos + 1);
                (Step::Discarded(dropped), rest)
            }
            (Mode::Normal, Some(pos)) => {
                let (segment, rest) = input.split_at(pos + 1);
                match admit(pending, segment.len(), self.max_packet) {
                    Admission::Fits => (Step::Packet(segment), rest),
                    Admission::Oversized => {
                        self.reject(true);
                        (Step::Rejected(segment), rest)
                    }
                }
            }
            (Mode::Normal, None) => match admit(pending, input.len(), self.fragment_limit()) {
                Admission::Fits => (Step::Fragment(input), &[][..]),
                Admission::Oversized => {
                    self.reject(false);
                    (Step::Rejected(input), &[][..])
                }
            },
        }
    }

    /// Abandon the current packet.
    ///
    /// `terminated` says whether the packet's newline has already been
    /// consumed.  If it has, the next byte starts a fresh packet; otherwise
    /// everything up to the newline is dropped first.
    pub fn reject(&mut self, terminated: bool) {
        self.mode = if terminated {
            Mode::Normal
        } else {
            Mode::Discarding
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run a whole chunk through the framer, tracking pending length the way
    /// the session does.
    fn steps<'a>(framer: &mut Framer, mut input: &'a [u8], pending: &mut usize) -> Vec<Step<'a>> {
        let mut out = Vec::new();
        while !input.is_empty() {
            let (step, rest) = framer.next_step(input, *pending);
            match step {
                Step::Packet(_) | Step::Rejected(_) => *pending = 0,
                Step::Fragment(f) => *pending += f.len(),
                Step::Discarded(_) => {}
            }
            out.push(step);
            input = rest;
        }
        out
    }

    #[test]
    fn admit_is_inclusive() {
        assert_eq!(admit(0, 10, 10), Admission::Fits);
        assert_eq!(admit(4, 6, 10), Admission::Fits);
        assert_eq!(admit(5, 6, 10), Admission::Oversized);
    }

    #[test]
    fn admit_never_overflows() {
        assert_eq!(admit(usize::MAX, usize::MAX, usize::MAX), Admission::Oversized);
        assert_eq!(admit(1, usize::MAX, usize::MAX), Admission::Oversized);
        assert_eq!(admit(0, 11, 10), Admission::Oversized);
    }

    #[test]
    fn single_packet() {
        let mut framer = Framer::new(1024);
        let mut pending = 0;
        let out = steps(&mut framer, b"hello\n", &mut pending);
        assert_eq!(out, vec![Step::Packet(b"hello\n")]);
        assert_eq!(framer.mode(), Mode::Normal);
    }

    #[test]
    fn several_packets_and_a_tail() {
        let mut framer = Framer::new(1024);
        let mut pending = 0;
        let out = steps(&mut framer, b"a\nbb\ncc", &mut pending);
        assert_eq!(
            out,
            vec![
                Step::Packet(b"a\n"),
                Step::Packet(b"bb\n"),
                Step::Fragment(b"cc"),
            ]
        );
        assert_eq!(pending, 2);
    }

    #[test]
    fn packet_of_exactly_max_is_accepted() {
        let mut framer = Framer::new(10);
        let mut pending = 0;
        let out = steps(&mut framer, b"012345678\n", &mut pending);
        assert_eq!(out, vec![Step::Packet(b"012345678\n")]);
    }

    #[test]
    fn oversized_terminated_packet_is_rejected_and_stays_normal() {
        let mut framer = Framer::new(10);
        let mut pending = 0;
        let out = steps(&mut framer, b"0123456789\nok\n", &mut pending);
        assert_eq!(
            out,
            vec![Step::Rejected(b"0123456789\n"), Step::Packet(b"ok\n")]
        );
        assert_eq!(framer.mode(), Mode::Normal);
    }

    #[test]
    fn oversized_with_pending_counts_both() {
        let mut framer = Framer::new(10);
        let (step, _) = framer.next_step(b"45678\n", 5);
        assert_eq!(step, Step::Rejected(b"45678\n"));
        assert_eq!(framer.mode(), Mode::Normal);
    }

    #[test]
    fn fragment_filling_max_enters_discard() {
        // Ten unterminated bytes cannot fit a 10-byte packet plus newline.
        let mut framer = Framer::new(10);
        let mut pending = 0;
        let out = steps(&mut framer, b"0123456789", &mut pending);
        assert_eq!(out, vec![Step::Rejected(b"0123456789")]);
        assert_eq!(framer.mode(), Mode::Discarding);
    }

    #[test]
    fn fragment_up_to_limit_is_kept() {
        let mut framer = Framer::new(10);
        let mut pending = 0;
        let out = steps(&mut framer, b"012345678", &mut pending);
        assert_eq!(out, vec![Step::Fragment(b"012345678")]);
        assert_eq!(pending, 9);
    }

    #[test]
    fn discard_drops_through_newline_then_recovers() {
        let mut framer = Framer::new(4);
        let mut pending = 0;
        let out = steps(&mut framer, b"abcdef", &mut pending);
        assert_eq!(out, vec![Step::Rejected(b"abcdef")]);

        let out = steps(&mut framer, b"more", &mut pending);
        assert_eq!(out, vec![Step::Discarded(b"more")]);
        assert_eq!(framer.mode(), Mode::Discarding);

        let out = steps(&mut framer, b"xx\nhi\n", &mut pending);
        assert_eq!(out, vec![Step::Discarded(b"xx\n"), Step::Packet(b"hi\n")]);
        assert_eq!(framer.mode(), Mode::Normal);
    }

    #[test]
    fn discard_newline_at_end_of_chunk() {
        let mut framer = Framer::new(4);
        framer.reject(false);
        let mut pending = 0;
        let out = steps(&mut framer, b"zzz\n", &mut pending);
        assert_eq!(out, vec![Step::Discarded(b"zzz\n")]);
        assert_eq!(framer.mode(), Mode::Normal);
    }

    #[test]
    fn empty_line_is_a_packet() {
        let mut framer = Framer::new(4);
        let (step, rest) = framer.next_step(b"\n\n", 0);
        assert_eq!(step, Step::Packet(b"\n"));
        assert_eq!(rest, b"\n");
    }

    #[test]
    fn tiny_limits_do_not_underflow() {
        let mut framer = Framer::new(1);
        assert_eq!(framer.fragment_limit(), 0);
        let (step, _) = framer.next_step(b"a", 0);
        assert_eq!(step, Step::Rejected(b"a"));

        let mut framer = Framer::new(1);
        let (step, _) = framer.next_step(b"\n", 0);
        assert_eq!(step, Step::Packet(b"\n"));
    }
}
