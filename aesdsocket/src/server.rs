//! Connection supervisor.
//!
//! ```text
//!   Server::bind ──▶ Server::run ──▶ accept ──▶ spawn_blocking(Session::run)
//!                        ▲                              │
//!                        └──────── SessionReport ◀──────┘
//! ```
//!
//! Connections are served strictly one at a time: the accept loop awaits each
//! session before accepting the next, and the data file plus both session
//! buffers are moved into the blocking task and handed back when it finishes.

use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener as StdTcpListener, TcpStream as StdTcpStream};
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinError;

use crate::buffer::GrowableBuffer;
use crate::config::{ServerConfig, SessionLimits};
use crate::error::{ErrorKind, Operation, ReserveError, SessionError};
use crate::session::{Outcome, Session, SessionReport, SessionStats};
use crate::shutdown::Shutdown;
use crate::sink::FileSink;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("invalid configuration: {}", .0.join("; "))]
    Config(Vec<String>),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to open data file {}: {source}", .path.display())]
    DataFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to allocate session buffers: {0}")]
    Allocation(#[from] ReserveError),

    #[error("failed to listen: {0}")]
    Listen(#[source] io::Error),

    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    #[error("session task failed: {0}")]
    Session(#[from] JoinError),

    #[error("failed to remove data file {}: {source}", .path.display())]
    RemoveDataFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Totals over every session served by one [`Server::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub connections: u64,
    pub packets_appended: u64,
    pub packets_dropped: u64,
}

impl RunSummary {
    fn record(&mut self, stats: &SessionStats) {
        self.packets_appended += stats.packets_appended;
        self.packets_dropped += stats.packets_dropped;
    }
}

/// State that outlives a single session.
struct Resources {
    sink: FileSink,
    pending: GrowableBuffer,
    scratch: Box<[u8]>,
}

impl Resources {
    fn allocate(sink: FileSink, limits: &SessionLimits) -> Result<Self, ReserveError> {
        let pending = GrowableBuffer::with_capacity(limits.initial_capacity, limits.max_packet)?;

        let mut scratch = Vec::new();
        scratch
            .try_reserve_exact(limits.max_packet)
            .map_err(|_| ReserveError::OutOfMemory {
                capacity: limits.max_packet,
            })?;
        scratch.resize(limits.max_packet, 0);

        Ok(Self {
            sink,
            pending,
            scratch: scratch.into_boxed_slice(),
        })
    }

    fn serve(
        &mut self,
        stream: StdTcpStream,
        limits: SessionLimits,
        shutdown: &Shutdown,
    ) -> SessionReport {
        Session::new(
            stream,
            &mut self.sink,
            &mut self.pending,
            &mut self.scratch,
            limits,
            shutdown,
        )
        .run()
    }
}

/// A listening server that has not started accepting yet.
///
/// Binding needs no async runtime, so a daemon can bind and listen (and fail
/// loudly) before it forks.  Connections that arrive in between wait in the
/// backlog.
pub struct Server {
    config: ServerConfig,
    listener: StdTcpListener,
    local_addr: SocketAddr,
    resources: Resources,
}

impl Server {
    /// Validate `config`, bind and listen on the configured address, open the
    /// data file and allocate the session buffers.
    pub fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate().map_err(ServerError::Config)?;

        let addr = config.bind_addr();
        let bind_err = |source| ServerError::Bind { addr, source };
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(bind_err)?;
        socket.set_reuseaddr(true).map_err(bind_err)?;
        socket.bind(addr).map_err(bind_err)?;
        let local_addr = socket.local_addr().map_err(bind_err)?;
        let listener = listen(socket, config.backlog).map_err(ServerError::Listen)?;

        let sink = FileSink::open(&config.data_path).map_err(|source| ServerError::DataFile {
            path: config.data_path.clone(),
            source,
        })?;
        let resources = Resources::allocate(sink, &config.limits)?;

        Ok(Self {
            config,
            listener,
            local_addr,
            resources,
        })
    }

    /// Address actually bound; useful when the configured port is 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn data_path(&self) -> &Path {
        self.resources.sink.path()
    }

    /// Accept and serve connections until `shutdown` is requested.
    ///
    /// On a requested shutdown the data file is deleted and the totals are
    /// returned.  A failed accept ends the run with an error and leaves the
    /// data file in place.
    pub async fn run(self, shutdown: Shutdown) -> Result<RunSummary, ServerError> {
        let Server {
            config,
            listener,
            local_addr,
            mut resources,
        } = self;

        listener.set_nonblocking(true).map_err(ServerError::Listen)?;
        let listener = TcpListener::from_std(listener).map_err(ServerError::Listen)?;
        log::info!("Accepting connections on {local_addr}");

        let mut summary = RunSummary::default();
        loop {
            let (stream, peer) = tokio::select! {
                biased;
                _ = shutdown.requested() => break,
                accepted = listener.accept() => accepted.map_err(ServerError::Accept)?,
            };
            let ip = peer.ip();
            log::info!("Accepted connection from {ip}");
            summary.connections += 1;

            let stream = match into_blocking(stream, config.poll_interval) {
                Ok(stream) => stream,
                Err(e) => {
                    log::error!("failed to prepare connection from {ip}: {e}");
                    log::info!("Closed connection from {ip}");
                    continue;
                }
            };

            let limits = config.limits;
            let token = shutdown.clone();
            let (returned, report) = tokio::task::spawn_blocking(move || {
                let report = resources.serve(stream, limits, &token);
                (resources, report)
            })
            .await?;
            resources = returned;

            summary.record(&report.stats);
            log_report(ip, &report);
            log::info!("Closed connection from {ip}");
        }

        let path = resources.sink.path().to_path_buf();
        resources
            .sink
            .remove()
            .map_err(|source| ServerError::RemoveDataFile { path, source })?;
        log::debug!(
            "served {} connection(s), {} packet(s) appended, {} dropped",
            summary.connections,
            summary.packets_appended,
            summary.packets_dropped
        );

        Ok(summary)
    }
}

/// Put a bound socket into the listening state.
///
/// `TcpSocket::listen` registers with the tokio reactor, so it cannot run
/// before the runtime exists; this goes through `listen(2)` directly instead.
fn listen(socket: TcpSocket, backlog: u32) -> io::Result<StdTcpListener> {
    let backlog = libc::c_int::try_from(backlog).unwrap_or(libc::c_int::MAX);
    // Owning the descriptor as a listener first closes it on the error path.
    let listener = unsafe { StdTcpListener::from_raw_fd(socket.into_raw_fd()) };
    if unsafe { libc::listen(listener.as_raw_fd(), backlog) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(listener)
}

/// Turn an accepted tokio stream into a blocking std stream whose reads time
/// out every `poll_interval`.
fn into_blocking(stream: TcpStream, poll_interval: Duration) -> io::Result<StdTcpStream> {
    let stream = stream.into_std()?;
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(poll_interval))?;
    Ok(stream)
}

fn log_report(ip: IpAddr, report: &SessionReport) {
    let stats = &report.stats;
    log::debug!(
        "session with {ip}: {} appended, {} dropped, {} bytes echoed",
        stats.packets_appended,
        stats.packets_dropped,
        stats.bytes_echoed
    );

    if let Outcome::Error(e) = &report.outcome {
        log::error!("{}", describe(e));
    }
}

/// One message per failing operation.
fn describe(e: &SessionError) -> String {
    let cause = match &e.source {
        Some(source) => source.to_string(),
        None => e.kind.to_string(),
    };

    match (e.op, e.kind) {
        (Operation::Receive, _) => format!("recv failed: {cause}"),
        (Operation::Append, ErrorKind::ShortWrite) => {
            format!("short write appending {} bytes to data file", e.intended)
        }
        (Operation::Append, _) => format!("append of {} bytes failed: {cause}", e.intended),
        (Operation::Echo, ErrorKind::ShortWrite) => {
            format!("short send echoing {} bytes", e.intended)
        }
        (Operation::Echo, _) => format!("send failed: {cause}"),
        (Operation::BufferGrow, _) => {
            format!("buffer growth to {} bytes failed: {cause}", e.intended)
        }
    }
}
