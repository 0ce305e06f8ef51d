//! Entry point for `aesdsocket`.
//!
//! Parses CLI arguments, binds the listener and opens the data file, optionally
//! daemonizes, and then runs the accept loop until SIGINT or SIGTERM.  All
//! protocol work lives in the library; `main.rs` owns only process setup.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use aesdsocket::config::{self, ServerConfig, SessionLimits};
use aesdsocket::{daemon, logging, shutdown, Server, Shutdown};

/// Append newline-terminated packets to a data file and echo it back.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Detach from the terminal once the port is bound.
    #[arg(short, long, env = "AESD_DAEMON")]
    daemon: bool,

    /// TCP port to listen on.
    #[arg(short, long, env = "AESD_PORT", default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// Local address to bind.
    #[arg(long, env = "AESD_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// File that accepted packets are appended to.
    #[arg(long, env = "AESD_DATA_PATH", default_value = config::DEFAULT_DATA_PATH)]
    data_path: PathBuf,

    /// Largest packet, newline included, that is kept.
    #[arg(long, env = "AESD_MAX_PACKET", default_value_t = config::DEFAULT_MAX_PACKET)]
    max_packet: usize,

    /// Bytes requested per receive.
    #[arg(long, env = "AESD_RECV_CHUNK", default_value_t = config::DEFAULT_RECV_CHUNK)]
    recv_chunk: usize,

    /// Bytes per send when echoing the data file.
    #[arg(long, env = "AESD_WRITE_CHUNK", default_value_t = config::DEFAULT_WRITE_CHUNK)]
    write_chunk: usize,

    /// How often an idle connection checks for shutdown, in milliseconds.
    #[arg(long, env = "AESD_POLL_INTERVAL_MS", default_value_t = 250)]
    poll_interval_ms: u64,
}

impl Cli {
    fn into_config(self) -> ServerConfig {
        let limits = SessionLimits {
            max_packet: self.max_packet,
            recv_chunk: self.recv_chunk,
            write_chunk: self.write_chunk,
            initial_capacity: config::DEFAULT_INITIAL_CAPACITY.min(self.max_packet),
        };

        ServerConfig {
            bind: self.bind,
            port: self.port,
            data_path: self.data_path,
            daemonize: self.daemon,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            limits,
            ..ServerConfig::default()
        }
    }
}

fn main() -> Result<()> {
    let config = Cli::parse().into_config();
    let daemonize = config.daemonize;

    // RUST_LOG controls verbosity; a daemon has no stderr, so it logs to syslog.
    if daemonize {
        logging::SyslogLogger::init().context("failed to install syslog logger")?;
    } else {
        env_logger::init();
    }

    let server = Server::bind(config).context("failed to start server")?;
    log::info!(
        "Bound {} with data file {}",
        server.local_addr(),
        server.data_path().display()
    );

    if daemonize {
        daemon::daemonize().context("failed to daemonize")?;
    }

    // The runtime is built only after any fork.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        let token = Shutdown::new();
        shutdown::listen_for_signals(token.clone()).context("failed to install signal handlers")?;

        let summary = server.run(token).await?;
        log::info!(
            "Served {} connection(s); {} packet(s) appended, {} dropped",
            summary.connections,
            summary.packets_appended,
            summary.packets_dropped
        );
        Ok::<_, anyhow::Error>(())
    })
}
