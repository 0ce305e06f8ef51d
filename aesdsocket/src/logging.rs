//! Logging for a detached daemon.
//!
//! Once the process has daemonized its stderr points at `/dev/null`, so
//! records are sent to syslog instead.  Filtering still follows `RUST_LOG`
//! through env_logger, defaulting to `info`.

use std::ffi::{CStr, CString};

use log::{Level, Log, Metadata, Record, SetLoggerError};

const IDENT: &CStr = c"aesdsocket";

/// A `log` backend that writes through `syslog(3)` under the `LOG_USER`
/// facility.
pub struct SyslogLogger {
    filter: env_logger::Logger,
}

impl SyslogLogger {
    /// Open the syslog connection and install the logger globally.
    pub fn init() -> Result<(), SetLoggerError> {
        let env = env_logger::Env::default().default_filter_or("info");
        let filter = env_logger::Builder::from_env(env).build();
        let max_level = filter.filter();

        unsafe { libc::openlog(IDENT.as_ptr(), libc::LOG_PID, libc::LOG_USER) };
        log::set_boxed_logger(Box::new(SyslogLogger { filter }))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for SyslogLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.filter.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.filter.matches(record) {
            return;
        }
        let msg = message(record);
        unsafe { libc::syslog(priority(record.level()), c"%s".as_ptr(), msg.as_ptr()) };
    }

    fn flush(&self) {}
}

fn priority(level: Level) -> libc::c_int {
    match level {
        Level::Error => libc::LOG_ERR,
        Level::Warn => libc::LOG_WARNING,
        Level::Info => libc::LOG_INFO,
        Level::Debug | Level::Trace => libc::LOG_DEBUG,
    }
}

/// Render a record for syslog, dropping interior NULs.
fn message(record: &Record) -> CString {
    let mut text = record.args().to_string().into_bytes();
    text.retain(|&b| b != 0);
    // No NUL bytes remain.
    CString::new(text).unwrap_or_default()
}
