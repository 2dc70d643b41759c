use std::io;
use std::ops::Range;

use socket2::Socket;

use crate::connection::ConnState;
use crate::poller::Poller;
use crate::pool::ConnectionPool;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = 0;

/// A non-blocking byte sink.
pub trait Transmit {
    /// Hands `chunk` to the transport and returns how many bytes it accepted.
    fn transmit(&self, chunk: &[u8]) -> io::Result<usize>;
}

impl Transmit for Socket {
    fn transmit(&self, chunk: &[u8]) -> io::Result<usize> {
        self.send_with_flags(chunk, SEND_FLAGS)
    }
}

/// Payload range to send next from `cursor`, at most `chunk_size` bytes long.
pub fn next_chunk(payload_len: usize, cursor: usize, chunk_size: usize) -> Range<usize> {
    debug_assert!(cursor <= payload_len);
    let remaining = payload_len - cursor;
    cursor..cursor + remaining.min(chunk_size)
}

/// Cursor after `sent` more bytes, wrapping to the start at the end of the payload.
pub fn advance_cursor(cursor: usize, sent: usize, payload_len: usize) -> usize {
    let next = cursor + sent;
    debug_assert!(next <= payload_len);
    if next >= payload_len { 0 } else { next }
}

/// Sends the next chunk of `payload` starting at `cursor`.
///
/// A transport that would block accepts nothing, which is not an error.
pub fn send_chunk<T>(sink: &T, payload: &[u8], cursor: usize, chunk_size: usize) -> io::Result<usize>
where
    T: Transmit + ?Sized,
{
    let range = next_chunk(payload.len(), cursor, chunk_size);
    if range.is_empty() {
        return Ok(0);
    }
    match sink.transmit(&payload[range]) {
        Ok(n) => Ok(n),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => Ok(0),
        Err(e) => Err(e),
    }
}

/// What one drip pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DripReport {
    /// Payload bytes accepted by the transport.
    pub bytes_sent: usize,
    /// Connections released because a send failed.
    pub broken: usize,
}

/// Sends every established connection its next slice of the payload.
///
/// The payload is sent cyclically: once a connection reaches its end, the
/// next tick starts over from the first byte, so delivery never completes.
#[derive(Debug, Clone)]
pub struct DripEngine {
    payload: Vec<u8>,
    chunk_size: usize,
}

impl DripEngine {
    /// Creates an engine dripping `payload` in chunks of at most `chunk_size` bytes.
    pub fn new(payload: Vec<u8>, chunk_size: usize) -> DripEngine {
        DripEngine {
            payload,
            chunk_size,
        }
    }

    /// The dripped payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Maximum bytes sent per connection per pass.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Sends one chunk to every connection in [`ConnState::Sending`].
    ///
    /// A connection whose send fails for any reason but back-pressure is
    /// released through `poller` and left idle for the next tick.
    pub fn drip(&self, pool: &mut ConnectionPool, poller: &Poller) -> DripReport {
        let mut report = DripReport::default();
        if self.payload.is_empty() {
            return report;
        }
        for conn in pool.iter_mut() {
            if conn.state() != ConnState::Sending {
                continue;
            }
            let sent = match conn.handle() {
                Some(socket) => send_chunk(socket, &self.payload, conn.cursor(), self.chunk_size),
                None => continue,
            };
            match sent {
                Ok(n) => {
                    conn.advance(n, self.payload.len());
                    report.bytes_sent += n;
                }
                Err(e) => {
                    log::debug!("socket {:?}: send failed: {e}", conn.raw_fd());
                    poller.release(conn);
                    report.broken += 1;
                }
            }
        }
        report
    }
}
