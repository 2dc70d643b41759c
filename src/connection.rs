use std::io;
use std::net::{Shutdown, SocketAddr};
use std::os::fd::{AsRawFd, RawFd};

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{Error, Result};

/// Lifecycle state of a pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnState {
    /// No descriptor; the next pool maintenance opens one.
    #[default]
    Idle,
    /// A connection attempt was issued and writability has not been observed yet.
    Connecting,
    /// The handshake completed; payload chunks are being dripped.
    Sending,
}

/// One slot of the connection pool.
///
/// A `Connection` lives as long as the pool and only cycles through
/// [`ConnState`]s. It owns at most one socket at a time.
#[derive(Debug, Default)]
pub struct Connection {
    handle: Option<Socket>,
    state: ConnState,
    cursor: usize,
    pub(crate) registered: bool,
}

impl Connection {
    /// Creates an idle slot.
    pub fn new() -> Connection {
        Connection::default()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Offset of the next payload byte to send.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The owned socket, if any.
    pub fn handle(&self) -> Option<&Socket> {
        self.handle.as_ref()
    }

    /// Raw descriptor of the owned socket, if any.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.handle.as_ref().map(|s| s.as_raw_fd())
    }

    /// Whether the slot holds a descriptor worth polling.
    pub fn is_active(&self) -> bool {
        self.handle.is_some() && self.state != ConnState::Idle
    }

    /// Opens a non-blocking socket and starts connecting it to `target`.
    ///
    /// An attempt that is still in progress counts as issued. Any other
    /// failure is returned and leaves the slot idle.
    pub(crate) fn open(&mut self, slot: usize, target: SocketAddr) -> Result<()> {
        debug_assert!(self.handle.is_none());
        let socket = Socket::new(Domain::for_address(target), Type::STREAM, Some(Protocol::TCP))
            .map_err(|source| Error::Socket { slot, source })?;
        socket
            .set_nonblocking(true)
            .map_err(|source| Error::Socket { slot, source })?;
        match socket.connect(&target.into()) {
            Ok(()) => {}
            Err(e) if in_progress(&e) => {}
            Err(source) => {
                return Err(Error::Connect {
                    slot,
                    target,
                    source,
                });
            }
        }
        log::debug!("slot {slot}: socket {} connecting to {target}", socket.as_raw_fd());
        self.handle = Some(socket);
        self.state = ConnState::Connecting;
        self.cursor = 0;
        Ok(())
    }

    /// Marks the handshake as complete. Returns `false` if the slot was not connecting.
    pub(crate) fn confirm(&mut self) -> bool {
        if self.state != ConnState::Connecting {
            return false;
        }
        if let Some(socket) = self.handle.as_ref() {
            if let Err(e) = socket.set_keepalive(true) {
                log::warn!("socket {}: cannot enable keepalive: {e}", socket.as_raw_fd());
            }
            if let Err(e) = socket.set_linger(None) {
                log::warn!("socket {}: cannot disable linger: {e}", socket.as_raw_fd());
            }
            log::debug!("socket {} connected", socket.as_raw_fd());
        }
        self.state = ConnState::Sending;
        true
    }

    /// Moves the cursor past `sent` freshly accepted bytes.
    pub(crate) fn advance(&mut self, sent: usize, payload_len: usize) {
        self.cursor = crate::drip::advance_cursor(self.cursor, sent, payload_len);
    }

    /// The error that made a pending connection attempt fail because the
    /// target cannot be reached, if that is what happened.
    pub(crate) fn connect_failure(&self) -> Option<io::Error> {
        if self.state != ConnState::Connecting {
            return None;
        }
        self.handle
            .as_ref()
            .and_then(|s| s.take_error().ok().flatten())
            .filter(target_unreachable)
    }

    /// Shuts the socket down, closes it and returns the slot to idle.
    ///
    /// The socket must already be removed from any poller.
    pub(crate) fn close(&mut self) {
        debug_assert!(!self.registered);
        if let Some(socket) = self.handle.take() {
            let _ = socket.shutdown(Shutdown::Both);
        }
        self.state = ConnState::Idle;
        self.cursor = 0;
    }
}

fn in_progress(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EINPROGRESS) || e.kind() == io::ErrorKind::WouldBlock
}

fn target_unreachable(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::ECONNREFUSED | libc::EHOSTUNREACH | libc::ENETUNREACH | libc::ETIMEDOUT)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn new_slot_is_idle() {
        let conn = Connection::new();
        assert_eq!(conn.state(), ConnState::Idle);
        assert_eq!(conn.cursor(), 0);
        assert!(conn.handle().is_none());
        assert!(!conn.is_active());
    }

    #[test]
    fn open_then_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut conn = Connection::new();
        conn.open(0, listener.local_addr().unwrap()).unwrap();
        assert_eq!(conn.state(), ConnState::Connecting);
        assert!(conn.is_active());
        assert!(conn.raw_fd().is_some());

        conn.close();
        assert_eq!(conn.state(), ConnState::Idle);
        assert!(conn.raw_fd().is_none());
    }

    #[test]
    fn confirm_only_from_connecting() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut conn = Connection::new();
        assert!(!conn.confirm());
        conn.open(0, listener.local_addr().unwrap()).unwrap();
        assert!(conn.confirm());
        assert_eq!(conn.state(), ConnState::Sending);
        assert!(!conn.confirm());
    }

    #[test]
    fn close_resets_cursor() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut conn = Connection::new();
        conn.open(0, listener.local_addr().unwrap()).unwrap();
        conn.confirm();
        conn.advance(3, 8);
        assert_eq!(conn.cursor(), 3);
        conn.close();
        assert_eq!(conn.cursor(), 0);
    }
}
