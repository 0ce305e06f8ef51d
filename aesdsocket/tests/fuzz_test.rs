use rand::Rng;
use std::io::{self, Read, Write};

use aesdsocket::buffer::GrowableBuffer;
use aesdsocket::{Outcome, Session, SessionLimits, Shutdown};

/// ------------------------------------------------------------
/// Chunked in-memory peer
/// ------------------------------------------------------------

/// Delivers `stream` in the given chunk sizes and records every echo.
struct ChunkedPeer {
    stream: Vec<u8>,
    cuts: Vec<usize>,
    pos: usize,
    echoed: Vec<u8>,
}

impl Read for ChunkedPeer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(len) = self.cuts.pop() else {
            return Ok(0);
        };
        let len = len.min(buf.len());
        buf[..len].copy_from_slice(&self.stream[self.pos..self.pos + len]);
        self.pos += len;
        Ok(len)
    }
}

impl Write for ChunkedPeer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.echoed.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Split `total` bytes into random chunk sizes no larger than `max_chunk`,
/// stored in reverse so they can be popped.
fn random_cuts(rng: &mut impl Rng, total: usize, max_chunk: usize) -> Vec<usize> {
    let mut cuts = Vec::new();
    let mut left = total;
    while left > 0 {
        let n = rng.random_range(1..=left.min(max_chunk));
        cuts.push(n);
        left -= n;
    }
    cuts.reverse();
    cuts
}

fn random_packet(rng: &mut impl Rng, max_len: usize) -> Vec<u8> {
    let len = rng.random_range(0..max_len);
    let mut packet: Vec<u8> = (0..len).map(|_| rng.random_range(b' '..=b'~')).collect();
    packet.push(b'\n');
    packet
}

struct Run {
    log: Vec<u8>,
    echoed: Vec<u8>,
    appended: u64,
    dropped: u64,
}

fn run_session(stream: Vec<u8>, cuts: Vec<usize>, limits: SessionLimits) -> Run {
    let mut pending =
        GrowableBuffer::with_capacity(limits.initial_capacity, limits.max_packet).unwrap();
    let mut scratch = vec![0u8; limits.max_packet];
    let shutdown = Shutdown::new();
    let mut log = Vec::new();
    let mut peer = ChunkedPeer {
        stream,
        cuts,
        pos: 0,
        echoed: Vec::new(),
    };

    let report =
        Session::new(&mut peer, &mut log, &mut pending, &mut scratch, limits, &shutdown).run();
    assert!(matches!(report.outcome, Outcome::Closed(_)));

    Run {
        log,
        echoed: peer.echoed,
        appended: report.stats.packets_appended,
        dropped: report.stats.packets_dropped,
    }
}

/// ------------------------------------------------------------
/// Tests
/// ------------------------------------------------------------

#[test]
fn fuzz_chunk_splits_do_not_change_the_log() {
    let mut rng = rand::rng();
    let limits = SessionLimits {
        max_packet: 64,
        recv_chunk: 32,
        write_chunk: 7,
        initial_capacity: 4,
    };

    for _ in 0..200 {
        let count = rng.random_range(1..=20);
        let packets: Vec<Vec<u8>> = (0..count).map(|_| random_packet(&mut rng, 100)).collect();
        let stream: Vec<u8> = packets.concat();

        let kept: Vec<&Vec<u8>> = packets
            .iter()
            .filter(|p| p.len() <= limits.max_packet)
            .collect();
        let expected_log: Vec<u8> = kept.iter().flat_map(|p| p.iter().copied()).collect();

        // Every append is followed by an echo of the log so far.
        let mut expected_echo = Vec::new();
        let mut so_far = Vec::new();
        for p in &kept {
            so_far.extend_from_slice(p);
            expected_echo.extend_from_slice(&so_far);
        }

        let cuts = random_cuts(&mut rng, stream.len(), limits.recv_chunk);
        let run = run_session(stream, cuts, limits);

        assert_eq!(run.log, expected_log);
        assert_eq!(run.echoed, expected_echo);
        assert_eq!(run.appended, kept.len() as u64);
        assert_eq!(run.dropped, (packets.len() - kept.len()) as u64);
    }
}

#[test]
fn fuzz_trailing_fragment_is_never_flushed() {
    let mut rng = rand::rng();
    let limits = SessionLimits {
        max_packet: 32,
        recv_chunk: 16,
        write_chunk: 16,
        initial_capacity: 0,
    };

    for _ in 0..100 {
        let mut stream = random_packet(&mut rng, 20);
        let tail_len = rng.random_range(1..=40);
        stream.extend((0..tail_len).map(|_| rng.random_range(b'a'..=b'z')));
        let first_len = stream.iter().position(|&b| b == b'\n').unwrap() + 1;

        let cuts = random_cuts(&mut rng, stream.len(), limits.recv_chunk);
        let expected = stream[..first_len].to_vec();
        let run = run_session(stream, cuts, limits);

        assert_eq!(run.log, expected);
        assert_eq!(run.appended, 1);
    }
}

#[test]
fn fuzz_single_byte_chunks_match_whole_stream() {
    let mut rng = rand::rng();
    let limits = SessionLimits {
        max_packet: 16,
        recv_chunk: 4096,
        write_chunk: 1024,
        initial_capacity: 1,
    };

    for _ in 0..50 {
        let count = rng.random_range(1..=10);
        let stream: Vec<u8> = (0..count).flat_map(|_| random_packet(&mut rng, 24)).collect();

        let whole = run_session(stream.clone(), vec![stream.len()], limits);
        let bytewise = run_session(stream.clone(), vec![1; stream.len()], limits);

        assert_eq!(whole.log, bytewise.log);
        assert_eq!(whole.echoed, bytewise.echoed);
        assert_eq!(whole.dropped, bytewise.dropped);
    }
}
