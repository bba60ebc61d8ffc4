use std::io::{self, Read, Write};
use std::mem;
use std::net::Shutdown;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

/// Human monitor command that asks the guest to power off via ACPI.
pub const POWERDOWN_COMMAND: &str = "system_powerdown";

/// The two per-instance control sockets. The hypervisor creates and owns them;
/// the driver only picks their names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPaths {
    pub monitor: PathBuf,
    pub serial: PathBuf,
}

impl ControlPaths {
    pub fn new(ctrl_dir: &Path, instance: &str) -> Self {
        Self {
            monitor: ctrl_dir.join(format!("{instance}.monitor")),
            serial: ctrl_dir.join(format!("{instance}.serial")),
        }
    }

    /// `-monitor` argument: listen on the socket without blocking guest startup.
    pub fn monitor_arg(&self) -> String {
        listen_arg(&self.monitor)
    }

    /// `-serial` argument, same listening mode as the monitor.
    pub fn serial_arg(&self) -> String {
        listen_arg(&self.serial)
    }
}

fn listen_arg(path: &Path) -> String {
    format!("unix:{},server,nowait", path.display())
}

/// Open a short-lived connection to a monitor socket and send one command line.
///
/// `timeout` bounds the connect as well as each read and write. The monitor prints a banner on connect; it is drained when it arrives within
/// `timeout` so the command is not written into a full socket buffer, but its
/// absence is not an error.
pub fn send_monitor_command(socket: &Path, command: &str, timeout: Duration) -> io::Result<()> {
    let mut stream = connect_with_timeout(socket, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;

    let mut banner = [0u8; 512];
    match stream.read(&mut banner) {
        Ok(read) => debug!(bytes = read, "monitor banner received"),
        Err(err) if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
        Err(err) => return Err(err),
    }

    let mut line = String::with_capacity(command.len() + 1);
    line.push_str(command);
    line.push('\n');
    stream.write_all(line.as_bytes())?;
    stream.flush()?;
    stream.shutdown(Shutdown::Write)
}

/// Poll interval while a busy monitor's listen queue is full.
const CONNECT_RETRY: Duration = Duration::from_millis(10);

/// Connect to a unix socket without blocking past `timeout`.
///
/// A unix-domain connect does not complete asynchronously: on a non-blocking
/// socket a full listen queue fails with `EAGAIN`, so the attempt is retried
/// until the deadline.
fn connect_with_timeout(socket: &Path, timeout: Duration) -> io::Result<UnixStream> {
    let (addr, len) = socket_addr(socket)?;
    let raw = unsafe {
        libc::socket(
            libc::AF_UNIX,
            libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            0,
        )
    };
    if raw < 0 {
        return Err(io::Error::last_os_error());
    }
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    let deadline = Instant::now() + timeout;
    loop {
        let res = unsafe {
            libc::connect(
                fd.as_raw_fd(),
                &addr as *const libc::sockaddr_un as *const libc::sockaddr,
                len,
            )
        };
        if res == 0 {
            break;
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(libc::EAGAIN) | Some(libc::EINPROGRESS) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("monitor did not accept a connection within {timeout:?}"),
                    ));
                }
                thread::sleep(CONNECT_RETRY.min(deadline - now));
            }
            Some(libc::EISCONN) => break,
            _ => return Err(err),
        }
    }

    let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, flags & !libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(UnixStream::from(fd))
}

fn socket_addr(socket: &Path) -> io::Result<(libc::sockaddr_un, libc::socklen_t)> {
    let mut addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;

    let bytes = socket.as_os_str().as_bytes();
    // Room for the trailing NUL.
    if bytes.is_empty() || bytes.len() >= addr.sun_path.len() || bytes.contains(&0) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unusable socket path {}", socket.display()),
        ));
    }
    for (dst, src) in addr.sun_path.iter_mut().zip(bytes) {
        *dst = *src as libc::c_char;
    }
    Ok((addr, mem::size_of::<libc::sockaddr_un>() as libc::socklen_t))
}
