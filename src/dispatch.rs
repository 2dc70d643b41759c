use std::io::{self, Read};

use crate::error::{Error, Result};
use crate::poller::Poller;
use crate::pool::ConnectionPool;

const DRAIN_BUFFER_SIZE: usize = 1024;

/// What one dispatch pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    /// Connections released after a hang-up or error.
    pub hangups: usize,
    /// Connections whose handshake was confirmed.
    pub confirmed: usize,
    /// Inbound bytes read and discarded.
    pub drained: usize,
}

/// Turns readiness into lifecycle transitions.
///
/// Each signaled socket is handled in a fixed order: hang-up or error first,
/// then draining inbound data, where an end of stream also counts as a
/// hang-up, then handshake confirmation on its first writability.
#[derive(Debug)]
pub struct EventDispatcher {
    scratch: Vec<u8>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        EventDispatcher::new()
    }
}

impl EventDispatcher {
    /// Creates a dispatcher.
    pub fn new() -> EventDispatcher {
        EventDispatcher {
            scratch: vec![0u8; DRAIN_BUFFER_SIZE],
        }
    }

    /// Processes everything the last wait of `poller` signaled.
    ///
    /// A connecting socket that fails because the target cannot be reached
    /// ends the run; any other hang-up only frees its slot.
    pub fn dispatch(&mut self, pool: &mut ConnectionPool, poller: &Poller) -> Result<DispatchReport> {
        let target = pool.target();
        let mut report = DispatchReport::default();
        for signaled in poller.signaled() {
            let slot = signaled.slot;
            let Some(conn) = pool.get_mut(slot) else {
                continue;
            };
            if conn.raw_fd() != Some(signaled.fd) {
                log::debug!("slot {slot}: stale readiness for fd {}", signaled.fd);
                continue;
            }
            let ready = signaled.readiness;

            let mut hung_up = ready.hangup || ready.error;
            if !hung_up && ready.readable {
                if let Some(socket) = conn.handle() {
                    let drained = drain(socket, &mut self.scratch);
                    report.drained += drained.bytes;
                    hung_up = drained.closed;
                }
            }

            if hung_up {
                if let Some(source) = conn.connect_failure() {
                    return Err(Error::Connect {
                        slot,
                        target,
                        source,
                    });
                }
                log::debug!("slot {slot}: socket {} disconnected", signaled.fd);
                poller.release(conn);
                report.hangups += 1;
                continue;
            }

            if ready.writable && conn.confirm() {
                report.confirmed += 1;
            }
        }
        Ok(report)
    }
}

/// Outcome of draining a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Drained {
    /// Bytes read and discarded.
    bytes: usize,
    /// The stream ended or failed; the connection is gone.
    closed: bool,
}

/// Reads and discards until the socket would block, ends or fails.
fn drain(mut source: impl Read, buf: &mut [u8]) -> Drained {
    let mut drained = Drained::default();
    loop {
        match source.read(buf) {
            Ok(0) => {
                drained.closed = true;
                break;
            }
            Ok(n) => drained.bytes += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(_) => {
                drained.closed = true;
                break;
            }
        }
    }
    drained
}
