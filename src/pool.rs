use std::fmt;
use std::net::SocketAddr;

use crate::connection::{ConnState, Connection};
use crate::error::{Error, Result};

/// Number of slots in each lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatus {
    /// Slots without a descriptor.
    pub idle: usize,
    /// Slots waiting for their handshake to complete.
    pub connecting: usize,
    /// Slots being dripped.
    pub sending: usize,
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "idle: {}, connecting: {}, sending: {}",
            self.idle, self.connecting, self.sending
        )
    }
}

/// A fixed-size set of connections to one target.
///
/// The pool is sized once. Slots are never added or removed; each one is
/// addressed by its index for the whole run, so a slot that drops its
/// connection gets reconnected in place.
#[derive(Debug)]
pub struct ConnectionPool {
    target: SocketAddr,
    connections: Vec<Connection>,
}

impl ConnectionPool {
    /// Allocates `count` idle slots for `target`.
    pub fn new(target: SocketAddr, count: usize) -> Result<ConnectionPool> {
        let mut connections = Vec::new();
        connections
            .try_reserve_exact(count)
            .map_err(|_| Error::Allocation { count })?;
        connections.resize_with(count, Connection::new);
        Ok(ConnectionPool {
            target,
            connections,
        })
    }

    /// Issues a connection attempt for every idle slot.
    ///
    /// Returns the number of attempts issued. An attempt that fails outright
    /// (anything but "in progress") aborts the whole run: the target is either
    /// reachable for every slot or for none.
    pub fn ensure_connected(&mut self) -> Result<usize> {
        let mut issued = 0;
        for (slot, conn) in self.connections.iter_mut().enumerate() {
            if conn.state() == ConnState::Idle {
                conn.open(slot, self.target)?;
                issued += 1;
            }
        }
        if issued > 0 {
            log::debug!("issued {issued} connection attempts to {}", self.target);
        }
        Ok(issued)
    }

    /// The address all slots connect to.
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the pool has no slots.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// The connection in `slot`.
    pub fn get(&self, slot: usize) -> Option<&Connection> {
        self.connections.get(slot)
    }

    pub(crate) fn get_mut(&mut self, slot: usize) -> Option<&mut Connection> {
        self.connections.get_mut(slot)
    }

    /// Iterates over the slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.connections.iter_mut()
    }

    /// Number of slots currently owning a descriptor.
    pub fn live_descriptors(&self) -> usize {
        self.connections
            .iter()
            .filter(|c| c.handle().is_some())
            .count()
    }

    /// Counts the slots per lifecycle state.
    pub fn status(&self) -> PoolStatus {
        self.connections
            .iter()
            .fold(PoolStatus::default(), |mut s, c| {
                match c.state() {
                    ConnState::Idle => s.idle += 1,
                    ConnState::Connecting => s.connecting += 1,
                    ConnState::Sending => s.sending += 1,
                }
                s
            })
    }
}
