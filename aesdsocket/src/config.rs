//! Server and session configuration.
//!
//! Defaults match the values the service has always shipped with; every field
//! can be overridden from the command line (see `main.rs`).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 9000;

/// Default location of the data file.
pub const DEFAULT_DATA_PATH: &str = "/var/tmp/aesdsocketdata";

/// Pending-connection queue length for the listening socket.
pub const DEFAULT_BACKLOG: u32 = 20;

/// Largest packet, newline included, that is appended to the data file.
pub const DEFAULT_MAX_PACKET: usize = 1 << 20;

/// Bytes requested per receive call.
pub const DEFAULT_RECV_CHUNK: usize = 4096;

/// Bytes per write when echoing the data file back to a peer.
pub const DEFAULT_WRITE_CHUNK: usize = 1024;

/// Starting capacity of the pending-packet buffer.
pub const DEFAULT_INITIAL_CAPACITY: usize = 4096;

/// How often a blocked receive wakes up to check for shutdown.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Sizes the session engine works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub max_packet: usize,
    pub recv_chunk: usize,
    pub write_chunk: usize,
    pub initial_capacity: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_packet: DEFAULT_MAX_PACKET,
            recv_chunk: DEFAULT_RECV_CHUNK,
            write_chunk: DEFAULT_WRITE_CHUNK,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
        }
    }
}

impl SessionLimits {
    /// Collect every problem with these limits.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // A packet needs at least one payload byte plus its newline.
        if self.max_packet < 2 {
            errors.push(format!("max_packet ({}) must be at least 2", self.max_packet));
        }
        if self.recv_chunk == 0 {
            errors.push("recv_chunk must be greater than 0".to_string());
        }
        if self.write_chunk == 0 {
            errors.push("write_chunk must be greater than 0".to_string());
        }
        if self.initial_capacity > self.max_packet {
            errors.push(format!(
                "initial_capacity ({}) must not exceed max_packet ({})",
                self.initial_capacity, self.max_packet
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Everything the supervisor needs to run.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub data_path: PathBuf,
    pub daemonize: bool,
    pub backlog: u32,
    pub poll_interval: Duration,
    pub limits: SessionLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            daemonize: false,
            backlog: DEFAULT_BACKLOG,
            poll_interval: DEFAULT_POLL_INTERVAL,
            limits: SessionLimits::default(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Collect every problem with this configuration, limits included.
    ///
    /// Port 0 is accepted and asks the OS for an ephemeral port.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = match self.limits.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => errors,
        };

        if self.data_path.as_os_str().is_empty() {
            errors.push("data_path must not be empty".to_string());
        }
        if self.backlog == 0 {
            errors.push("backlog must be greater than 0".to_string());
        }
        if self.poll_interval.is_zero() {
            errors.push("poll_interval must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 9000);
        assert_eq!(config.data_path, PathBuf::from("/var/tmp/aesdsocketdata"));
        assert_eq!(config.limits.max_packet, 1 << 20);
        assert_eq!(config.limits.recv_chunk, 4096);
        assert_eq!(config.limits.write_chunk, 1024);
    }

    #[test]
    fn bind_addr_combines_ip_and_port() {
        let config = ServerConfig {
            port: 1234,
            ..ServerConfig::default()
        };
        assert_eq!(config.bind_addr().to_string(), "0.0.0.0:1234");
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let limits = SessionLimits {
            max_packet: 1,
            recv_chunk: 0,
            write_chunk: 0,
            initial_capacity: 0,
        };
        let errors = limits.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("max_packet"));
    }

    #[test]
    fn initial_capacity_above_max_packet_is_rejected() {
        let limits = SessionLimits {
            max_packet: 10,
            initial_capacity: 11,
            ..SessionLimits::default()
        };
        let errors = limits.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("initial_capacity"));
    }

    #[test]
    fn server_validation_includes_limit_errors() {
        let config = ServerConfig {
            backlog: 0,
            data_path: PathBuf::new(),
            limits: SessionLimits {
                write_chunk: 0,
                ..SessionLimits::default()
            },
            ..ServerConfig::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
