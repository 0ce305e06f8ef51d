//! `aesdsocket` — a line-oriented TCP service that appends every
//! newline-terminated packet to a data file and echoes the whole file back.
//!
//! # Architecture
//!
//! ```text
//!   TCP peer
//!      │ bytes                                ▲ full data file
//!  ┌───▼──────────────────────────────────────┴───┐
//!  │                   Session                    │
//!  │  Framer ─▶ GrowableBuffer ─▶ scratch packet  │
//!  └───────────────┬───────────────────▲──────────┘
//!                  │ write_exact       │ re-read
//!             ┌────▼───────────────────┴────┐
//!             │      AppendSink (file)      │
//!             └─────────────────────────────┘
//!
//!  Server: accept loop, one session at a time, Shutdown token
//! ```
//!
//! Each module has a single responsibility:
//! - [`buffer`]   — bounded growable buffer for the in-progress packet
//! - [`config`]   — server configuration, session limits and validation
//! - [`daemon`]   — detaching from the terminal
//! - [`error`]    — error kinds and the per-session error record
//! - [`framing`]  — newline framing and the oversize discard state machine
//! - [`io`]       — write-everything helpers with partial-write handling
//! - [`logging`]  — syslog backend for daemon mode
//! - [`server`]   — listener, accept loop and per-session reporting
//! - [`session`]  — per-connection receive, append and echo loop
//! - [`shutdown`] — cooperative shutdown token and signal listener
//! - [`sink`]     — the append-only data file

pub mod buffer;
pub mod config;
pub mod daemon;
pub mod error;
pub mod framing;
pub mod io;
pub mod logging;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod sink;

pub use config::{ServerConfig, SessionLimits};
pub use error::{ErrorKind, Operation, SessionError};
pub use server::{RunSummary, Server, ServerError};
pub use session::{CloseReason, Outcome, Session, SessionReport, SessionStats};
pub use shutdown::Shutdown;
pub use sink::{AppendSink, FileSink};
