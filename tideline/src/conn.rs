//! TCP connection state machine.
//!
//! Maps raw non-blocking socket readiness into an explicit lifecycle:
//! Disconnected → Connecting → Connected → Disconnecting → Disconnected.
//! Driven by [`TcpConn::poll`] from a scheduler round; nothing blocks.

use std::net::IpAddr;

use crate::socket::{Progress, SocketError, TcpSocket};

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// One outbound TCP connection.
///
/// The socket handle is held exactly while the state is Connecting,
/// Connected or Disconnecting; entering Disconnected closes it first.
#[derive(Debug)]
pub struct TcpConn {
    state: ConnState,
    socket: Option<TcpSocket>,
}

impl Default for TcpConn {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpConn {
    pub fn new() -> Self {
        TcpConn {
            state: ConnState::Disconnected,
            socket: None,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Start a non-blocking connect. Only valid while Disconnected.
    ///
    /// On success the state is Connecting; on failure it stays Disconnected
    /// and the error is returned so the caller can try another candidate.
    pub fn connect(&mut self, addr: IpAddr, port: u16) -> Result<(), SocketError> {
        debug_assert_eq!(self.state, ConnState::Disconnected);

        let socket = TcpSocket::connect(addr, port)?;
        self.socket = Some(socket);
        self.state = ConnState::Connecting;
        log::debug!("connecting to {addr}:{port}");
        Ok(())
    }

    /// Begin caller-initiated teardown. The socket closes on a later
    /// [`poll`](Self::poll) round.
    pub fn disconnect(&mut self) {
        if matches!(self.state, ConnState::Connecting | ConnState::Connected) {
            self.state = ConnState::Disconnecting;
        }
    }

    /// Advance the state machine one step.
    pub fn poll(&mut self) {
        match self.state {
            ConnState::Disconnected => {}
            ConnState::Connecting => {
                if self.socket.as_ref().is_some_and(TcpSocket::is_connected) {
                    log::debug!("connection established");
                    self.state = ConnState::Connected;
                }
            }
            ConnState::Connected => {
                // Peer reset/close shows up as a failed liveness proof.
                if !self.socket.as_ref().is_some_and(TcpSocket::is_connected) {
                    log::debug!("peer no longer connected");
                    self.state = ConnState::Disconnecting;
                }
            }
            ConnState::Disconnecting => {
                self.socket = None; // Closes the fd.
                self.state = ConnState::Disconnected;
                log::debug!("connection closed");
            }
        }
    }

    /// Attempt a single non-blocking write. Valid only while Connecting or
    /// Connected; elsewhere this is a contract violation reported as
    /// [`SocketError::NotConnected`].
    pub fn send(&mut self, buf: &[u8]) -> Result<Progress, SocketError> {
        match (self.state, &self.socket) {
            (ConnState::Connecting | ConnState::Connected, Some(socket)) => socket.send(buf),
            _ => Err(SocketError::NotConnected),
        }
    }

    /// Attempt a single non-blocking read. Same contract as [`send`](Self::send).
    /// A successful read of 0 bytes means peer close or a transient timeout
    /// and must be treated as "no progress this round".
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<Progress, SocketError> {
        match (self.state, &self.socket) {
            (ConnState::Connecting | ConnState::Connected, Some(socket)) => socket.recv(buf),
            _ => Err(SocketError::NotConnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::{Ipv4Addr, TcpListener};
    use std::time::{Duration, Instant};

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn poll_until(conn: &mut TcpConn, state: ConnState) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while conn.state() != state {
            assert!(Instant::now() < deadline, "never reached {state:?}");
            conn.poll();
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn starts_disconnected_and_rejects_transfers() {
        let mut conn = TcpConn::new();
        assert_eq!(conn.state(), ConnState::Disconnected);
        assert!(matches!(conn.send(b"x"), Err(SocketError::NotConnected)));
        let mut buf = [0u8; 4];
        assert!(matches!(conn.recv(&mut buf), Err(SocketError::NotConnected)));
    }

    #[test]
    fn full_lifecycle_against_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut conn = TcpConn::new();
        conn.connect(LOCALHOST, port).unwrap();
        assert_eq!(conn.state(), ConnState::Connecting);

        poll_until(&mut conn, ConnState::Connected);
        let (mut peer, _) = listener.accept().unwrap();

        let mut sent = 0;
        while sent < 4 {
            match conn.send(&b"ping"[sent..]).unwrap() {
                Progress::Bytes(n) => sent += n,
                Progress::NotReady => std::thread::sleep(Duration::from_millis(1)),
            }
        }
        let mut got = [0u8; 4];
        peer.read_exact(&mut got).unwrap();
        assert_eq!(&got, b"ping");

        conn.disconnect();
        assert_eq!(conn.state(), ConnState::Disconnecting);
        conn.poll();
        assert_eq!(conn.state(), ConnState::Disconnected);
        assert!(matches!(conn.send(b"x"), Err(SocketError::NotConnected)));
    }

    #[test]
    fn failed_connect_leaves_state_disconnected() {
        let mut conn = TcpConn::new();
        // Port 0 connect is rejected by the kernel immediately.
        if conn.connect(LOCALHOST, 0).is_err() {
            assert_eq!(conn.state(), ConnState::Disconnected);
        } else {
            // Some kernels defer the failure to the handshake; then the
            // connection just never reaches Connected.
            assert_eq!(conn.state(), ConnState::Connecting);
        }
    }
}
