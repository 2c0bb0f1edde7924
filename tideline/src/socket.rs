//! Raw non-blocking TCP sockets.
//!
//! Thin layer over libc: create + non-blocking connect, a two-step liveness
//! proof (`SO_ERROR` then writability), and zero-timeout readiness polls in
//! front of every send/recv. Nothing here ever blocks.

use std::io;
use std::net::IpAddr;
use std::os::unix::io::RawFd;

use thiserror::Error;

use crate::metrics;

/// Forward progress of a single non-blocking transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// `n` bytes were moved. A `recv` of 0 bytes means peer close or a
    /// transient timeout; callers treat it as "no progress this round".
    Bytes(usize),
    /// The socket was not ready; retry on a later round. Not an error.
    NotReady,
}

/// Fatal socket conditions. Transient ones are [`Progress::NotReady`].
#[derive(Debug, Error)]
pub enum SocketError {
    /// Socket creation or option setup failed.
    #[error("socket creation failed: {0}")]
    Create(#[source] io::Error),
    /// The non-blocking connect could not be started.
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),
    /// The socket is not (or no longer) connected.
    #[error("socket is not connected")]
    NotConnected,
    /// The OS rejected a send.
    #[error("send failed: {0}")]
    Send(#[source] io::Error),
    /// The OS rejected a recv.
    #[error("recv failed: {0}")]
    Recv(#[source] io::Error),
}

/// Write an address into a `sockaddr_storage`, returning the populated length.
fn ip_to_sockaddr(addr: IpAddr, port: u16, storage: &mut libc::sockaddr_storage) -> libc::socklen_t {
    // Zero the storage to avoid uninitialised padding bytes.
    unsafe {
        std::ptr::write_bytes(
            storage as *mut _ as *mut u8,
            0,
            std::mem::size_of::<libc::sockaddr_storage>(),
        );
    }
    match addr {
        IpAddr::V4(v4) => {
            let sa = storage as *mut _ as *mut libc::sockaddr_in;
            unsafe {
                (*sa).sin_family = libc::AF_INET as libc::sa_family_t;
                (*sa).sin_port = port.to_be();
                (*sa).sin_addr.s_addr = u32::from_ne_bytes(v4.octets());
            }
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t
        }
        IpAddr::V6(v6) => {
            let sa = storage as *mut _ as *mut libc::sockaddr_in6;
            unsafe {
                (*sa).sin6_family = libc::AF_INET6 as libc::sa_family_t;
                (*sa).sin6_port = port.to_be();
                (*sa).sin6_addr.s6_addr = v6.octets();
            }
            std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t
        }
    }
}

fn set_opt(fd: RawFd, level: libc::c_int, name: libc::c_int) -> io::Result<()> {
    let optval: libc::c_int = 1;
    let rc = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &optval as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// One non-blocking TCP socket. The fd is owned and closed on drop.
#[derive(Debug)]
pub struct TcpSocket {
    fd: RawFd,
}

impl TcpSocket {
    /// Create a non-blocking socket and start connecting to `addr:port`.
    ///
    /// Returns as soon as the connect is in flight (`EINPROGRESS`); callers
    /// poll [`is_connected`](Self::is_connected) for completion.
    pub fn connect(addr: IpAddr, port: u16) -> Result<Self, SocketError> {
        let domain = if addr.is_ipv4() {
            libc::AF_INET
        } else {
            libc::AF_INET6
        };
        let fd = unsafe {
            libc::socket(
                domain,
                libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                0,
            )
        };
        if fd < 0 {
            return Err(SocketError::Create(io::Error::last_os_error()));
        }
        // Paired with the close counter in Drop, which runs on every exit
        // path past this point including a failed option setup.
        let socket = TcpSocket { fd };
        metrics::CONNECTIONS_OPENED.increment();

        set_opt(fd, libc::IPPROTO_TCP, libc::TCP_NODELAY).map_err(SocketError::Create)?;
        set_opt(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR).map_err(SocketError::Create)?;

        let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        let len = ip_to_sockaddr(addr, port, &mut storage);

        let rc = unsafe { libc::connect(fd, &storage as *const _ as *const libc::sockaddr, len) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EINPROGRESS) {
                return Err(SocketError::Connect(err));
            }
        }

        Ok(socket)
    }

    /// Zero-timeout readiness poll for the given event mask.
    fn ready(&self, events: libc::c_short) -> bool {
        let mut fds = libc::pollfd {
            fd: self.fd,
            events,
            revents: 0,
        };
        let rc = unsafe { libc::poll(&mut fds, 1, 0) };
        rc > 0 && (fds.revents & events) != 0
    }

    fn pending_error(&self) -> Option<i32> {
        let mut err: libc::c_int = 0;
        let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
        let rc = unsafe {
            libc::getsockopt(
                self.fd,
                libc::SOL_SOCKET,
                libc::SO_ERROR,
                &mut err as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };
        if rc < 0 {
            return Some(io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO));
        }
        (err != 0).then_some(err)
    }

    /// The standard readiness proof of a completed non-blocking connect:
    /// no pending socket error, and the socket reports writable.
    ///
    /// Checked before every transfer as well, because a socket can carry an
    /// error condition while still appearing writable.
    pub fn is_connected(&self) -> bool {
        self.pending_error().is_none() && self.ready(libc::POLLOUT)
    }

    /// Attempt a single non-blocking write of as much of `buf` as the socket
    /// accepts. Never blocks.
    pub fn send(&self, buf: &[u8]) -> Result<Progress, SocketError> {
        if !self.is_connected() {
            return Err(SocketError::NotConnected);
        }
        if !self.ready(libc::POLLOUT) {
            return Ok(Progress::NotReady);
        }

        let n = unsafe {
            libc::send(
                self.fd,
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                libc::MSG_NOSIGNAL,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                // EWOULDBLOCK aliases EAGAIN on every libc target we build for.
                Some(libc::EAGAIN) => Ok(Progress::NotReady),
                _ => Err(SocketError::Send(err)),
            };
        }

        metrics::BYTES_SENT.add(n as u64);
        Ok(Progress::Bytes(n as usize))
    }

    /// Attempt a single non-blocking read into `buf`. Never blocks.
    pub fn recv(&self, buf: &mut [u8]) -> Result<Progress, SocketError> {
        if !self.is_connected() {
            return Err(SocketError::NotConnected);
        }
        if !self.ready(libc::POLLIN) {
            return Ok(Progress::NotReady);
        }

        let n = unsafe { libc::recv(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
        if n < 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::EAGAIN) => Ok(Progress::NotReady),
                _ => Err(SocketError::Recv(err)),
            };
        }

        metrics::BYTES_RECEIVED.add(n as u64);
        Ok(Progress::Bytes(n as usize))
    }
}

impl Drop for TcpSocket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
        metrics::CONNECTIONS_CLOSED.increment();
    }
}
