//! Console setup collaborators.
//!
//! The create path finishes by handing the container's console to whoever
//! asked for it. Two strategies exist:
//!
//! - [`NoConsole`]: the caller passed a console device path (or none) and
//!   nothing more needs to happen.
//! - [`SocketConsole`]: the caller passed `--console-socket`. A
//!   pseudoterminal was allocated up front ([`open_pty`]), its slave path went
//!   into the container config, and the master is sent over the socket with
//!   `SCM_RIGHTS` once the container exists.

use crate::error::{Error, Result};
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Final step of a successful create.
pub trait ConsoleSetup: Send + Sync {
    /// Sets up the console for `container_id`. `console` is the device path
    /// recorded in the container config, empty when there is none.
    fn setup_console(&self, container_id: &str, console: &str) -> Result<()>;
}

/// Console strategy that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConsole;

impl ConsoleSetup for NoConsole {
    fn setup_console(&self, container_id: &str, console: &str) -> Result<()> {
        debug!(container_id, console, "no console hand-off requested");
        Ok(())
    }
}

// =============================================================================
// Pseudoterminal
// =============================================================================

/// An allocated pseudoterminal pair.
#[derive(Debug)]
pub struct Pty {
    pub master: OwnedFd,
    pub slave: PathBuf,
}

/// Allocates a pseudoterminal and returns its master with the slave path.
#[cfg(target_os = "linux")]
pub fn open_pty() -> io::Result<Pty> {
    use std::ffi::{CStr, OsStr};
    use std::os::fd::FromRawFd;
    use std::os::unix::ffi::OsStrExt;

    // SAFETY: posix_openpt has no memory-safety preconditions.
    let fd = unsafe { libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY | libc::O_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: fd was just returned by posix_openpt and is owned by nobody else.
    let master = unsafe { OwnedFd::from_raw_fd(fd) };

    // SAFETY: fd is a valid pty master for the duration of these calls.
    if unsafe { libc::grantpt(fd) } != 0 || unsafe { libc::unlockpt(fd) } != 0 {
        return Err(io::Error::last_os_error());
    }

    let mut buf = [0 as libc::c_char; 128];
    // SAFETY: buf is writable for buf.len() bytes; ptsname_r NUL-terminates.
    let rc = unsafe { libc::ptsname_r(fd, buf.as_mut_ptr(), buf.len()) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }
    // SAFETY: ptsname_r succeeded, so buf holds a NUL-terminated string.
    let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
    let slave = PathBuf::from(OsStr::from_bytes(name.to_bytes()));

    debug!(slave = %slave.display(), "allocated pseudoterminal");
    Ok(Pty { master, slave })
}

#[cfg(not(target_os = "linux"))]
pub fn open_pty() -> io::Result<Pty> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "console sockets are only supported on Linux",
    ))
}

// =============================================================================
// Console Socket
// =============================================================================

/// Sends a pseudoterminal master to a console socket.
#[derive(Debug)]
pub struct SocketConsole {
    socket: PathBuf,
    pty: Pty,
}

impl SocketConsole {
    pub fn new(socket: impl Into<PathBuf>, pty: Pty) -> Self {
        Self {
            socket: socket.into(),
            pty,
        }
    }

    /// Slave path to record as the container's console.
    pub fn slave(&self) -> &Path {
        &self.pty.slave
    }
}

impl ConsoleSetup for SocketConsole {
    fn setup_console(&self, container_id: &str, _console: &str) -> Result<()> {
        let stream = UnixStream::connect(&self.socket).map_err(|e| {
            Error::ConsoleSetupFailed(format!(
                "connect to console socket {}: {}",
                self.socket.display(),
                e
            ))
        })?;

        let name = self.pty.slave.to_string_lossy();
        send_fd(&stream, self.pty.master.as_raw_fd(), name.as_bytes()).map_err(|e| {
            Error::ConsoleSetupFailed(format!(
                "send console to {}: {}",
                self.socket.display(),
                e
            ))
        })?;

        info!(
            container_id,
            socket = %self.socket.display(),
            "sent console master to socket"
        );
        Ok(())
    }
}

/// Sends `fd` as `SCM_RIGHTS` ancillary data along with `payload`.
#[cfg(target_os = "linux")]
fn send_fd(stream: &UnixStream, fd: std::os::fd::RawFd, payload: &[u8]) -> io::Result<()> {
    use std::mem::size_of;
    use std::os::fd::RawFd;

    if payload.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "payload must not be empty",
        ));
    }

    let mut iov = libc::iovec {
        iov_base: payload.as_ptr() as *mut libc::c_void,
        iov_len: payload.len(),
    };

    // SAFETY: CMSG_SPACE is a pure size computation.
    let space = unsafe { libc::CMSG_SPACE(size_of::<RawFd>() as u32) } as usize;
    // u64 storage keeps the control buffer aligned for cmsghdr.
    let mut control = vec![0u64; space.div_ceil(size_of::<u64>())];

    // SAFETY: msghdr is plain data; zeroed is a valid empty header.
    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.as_mut_ptr().cast();
    msg.msg_controllen = space as _;

    // SAFETY: msg points at a control buffer of `space` bytes, enough for one
    // cmsghdr carrying a single descriptor.
    unsafe {
        let cmsg = libc::CMSG_FIRSTHDR(&msg);
        if cmsg.is_null() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "control buffer too small",
            ));
        }
        (*cmsg).cmsg_level = libc::SOL_SOCKET;
        (*cmsg).cmsg_type = libc::SCM_RIGHTS;
        (*cmsg).cmsg_len = libc::CMSG_LEN(size_of::<RawFd>() as u32) as _;
        std::ptr::copy_nonoverlapping(
            (&fd as *const RawFd).cast::<u8>(),
            libc::CMSG_DATA(cmsg),
            size_of::<RawFd>(),
        );
    }

    // SAFETY: msg and everything it points to outlive the call.
    let sent = unsafe { libc::sendmsg(stream.as_raw_fd(), &msg, 0) };
    if sent < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn send_fd(_stream: &UnixStream, _fd: std::os::fd::RawFd, _payload: &[u8]) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "console sockets are only supported on Linux",
    ))
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    #[test]
    fn test_open_pty_returns_slave_path() {
        let Ok(pty) = open_pty() else {
            // No /dev/ptmx in this environment.
            return;
        };
        assert!(pty.slave.starts_with("/dev/pts"));
    }

    #[test]
    fn test_socket_console_sends_master() {
        let Ok(pty) = open_pty() else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("console.sock");
        let listener = UnixListener::bind(&socket).unwrap();

        let console = SocketConsole::new(&socket, pty);
        let slave = console.slave().to_path_buf();
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            std::io::Read::read_to_end(&mut stream, &mut buf).unwrap();
            buf
        });

        console.setup_console("ctr", "").unwrap();
        let received = handle.join().unwrap();
        assert_eq!(received, slave.to_string_lossy().as_bytes());
    }

    #[test]
    fn test_unreachable_socket_fails() {
        let Ok(pty) = open_pty() else {
            return;
        };
        let console = SocketConsole::new("/nonexistent/console.sock", pty);
        let err = console.setup_console("ctr", "").unwrap_err();
        assert!(matches!(err, Error::ConsoleSetupFailed(_)));
    }
}
