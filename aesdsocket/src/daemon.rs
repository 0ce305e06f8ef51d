//! Detaching from the controlling terminal.

use std::ffi::CStr;
use std::io;

const DEV_NULL: &CStr = c"/dev/null";
const ROOT: &CStr = c"/";

/// Turn the calling process into a daemon.
///
/// Forks twice around `setsid` so the surviving grandchild can never reacquire
/// a controlling terminal, clears the umask, moves to `/` and points the
/// standard descriptors at `/dev/null`.  The calling process and the
/// intermediate child exit with status 0.
///
/// Must be called before any threads are started; in particular before the
/// tokio runtime is built.
pub fn daemonize() -> io::Result<()> {
    fork_and_exit_parent()?;

    if unsafe { libc::setsid() } < 0 {
        return Err(io::Error::last_os_error());
    }

    fork_and_exit_parent()?;

    unsafe { libc::umask(0) };
    if unsafe { libc::chdir(ROOT.as_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }

    redirect_stdio()
}

fn fork_and_exit_parent() -> io::Result<()> {
    match unsafe { libc::fork() } {
        -1 => Err(io::Error::last_os_error()),
        0 => Ok(()),
        // Leave without running exit handlers or flushing stdio the child shares.
        _ => unsafe { libc::_exit(0) },
    }
}

fn redirect_stdio() -> io::Result<()> {
    let null = unsafe { libc::open(DEV_NULL.as_ptr(), libc::O_RDWR) };
    if null < 0 {
        return Err(io::Error::last_os_error());
    }

    for fd in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        if unsafe { libc::dup2(null, fd) } < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    if null > libc::STDERR_FILENO {
        unsafe { libc::close(null) };
    }
    Ok(())
}
