use std::num::NonZeroUsize;
use std::os::fd::RawFd;
use std::time::Duration;

use polling::{Event, Events};

use crate::connection::{ConnState, Connection};
use crate::error::{Error, Result};
use crate::pool::ConnectionPool;

/// One socket in the per-tick poll set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollEntry {
    /// Index of the owning pool slot.
    pub slot: usize,
    /// Descriptor the slot held when the set was built.
    pub fd: RawFd,
    /// Whether writability is requested, i.e. the handshake is still pending.
    pub writable: bool,
}

/// The sockets polled during one tick.
///
/// The position of an entry is the key its readiness event comes back with,
/// which maps the event straight to its slot.
#[derive(Debug, Default)]
pub struct ActivePollSet {
    entries: Vec<PollEntry>,
}

impl ActivePollSet {
    /// Creates an empty set able to hold `capacity` entries without reallocating.
    pub fn with_capacity(capacity: usize) -> ActivePollSet {
        ActivePollSet {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Rebuilds the set from the slots that own a connecting or sending socket.
    pub fn rebuild(&mut self, pool: &ConnectionPool) {
        self.entries.clear();
        for (slot, conn) in pool.iter().enumerate() {
            if !conn.is_active() {
                continue;
            }
            if let Some(fd) = conn.raw_fd() {
                self.entries.push(PollEntry {
                    slot,
                    fd,
                    writable: conn.state() == ConnState::Connecting,
                });
            }
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no socket is polled.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry at `position`, which is also its poll key.
    pub fn get(&self, position: usize) -> Option<&PollEntry> {
        self.entries.get(position)
    }

    /// Iterates over the entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = &PollEntry> {
        self.entries.iter()
    }
}

/// Readiness reported for one socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    /// Data (or end of stream) can be read.
    pub readable: bool,
    /// Data can be written; for a pending connect, the handshake finished.
    pub writable: bool,
    /// The peer hung up.
    pub hangup: bool,
    /// The socket has a pending error.
    pub error: bool,
}

impl Readiness {
    fn from_event(event: &Event) -> Readiness {
        Readiness {
            readable: event.readable,
            writable: event.writable,
            hangup: event.is_interrupt(),
            error: event.is_err().unwrap_or(false),
        }
    }
}

/// A socket the last wait reported as ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signaled {
    /// Index of the owning pool slot.
    pub slot: usize,
    /// Descriptor the slot held when it was polled.
    pub fd: RawFd,
    /// What the socket is ready for.
    pub readiness: Readiness,
}

/// Multiplexes the pool sockets with one bounded wait per tick.
///
/// Registrations are oneshot: every tick re-arms each active socket with the
/// interest matching its current state.
pub struct Poller {
    poller: polling::Poller,
    events: Events,
    set: ActivePollSet,
    signaled: Vec<Signaled>,
}

impl Poller {
    /// Creates a poller sized for `capacity` sockets.
    pub fn new(capacity: usize) -> Result<Poller> {
        let poller = polling::Poller::new().map_err(Error::Poll)?;
        let events =
            Events::with_capacity(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN));
        Ok(Poller {
            poller,
            events,
            set: ActivePollSet::with_capacity(capacity),
            signaled: Vec::with_capacity(capacity),
        })
    }

    /// Arms every active socket of `pool` and waits up to `timeout` for readiness.
    ///
    /// Returns the number of signaled sockets, available through
    /// [`Poller::signaled`]. Zero means the wait timed out.
    pub fn wait(&mut self, pool: &mut ConnectionPool, timeout: Duration) -> Result<usize> {
        self.set.rebuild(pool);
        self.signaled.clear();
        self.arm(pool)?;

        self.events.clear();
        let n = self
            .poller
            .wait(&mut self.events, Some(timeout))
            .map_err(Error::Poll)?;
        if n == 0 {
            return Ok(0);
        }
        for event in self.events.iter() {
            let Some(entry) = self.set.get(event.key) else {
                log::warn!("readiness for unknown poll key {}", event.key);
                continue;
            };
            let readiness = Readiness::from_event(&event);
            log::trace!("slot {} fd {}: {readiness:?}", entry.slot, entry.fd);
            self.signaled.push(Signaled {
                slot: entry.slot,
                fd: entry.fd,
                readiness,
            });
        }
        Ok(self.signaled.len())
    }

    fn arm(&self, pool: &mut ConnectionPool) -> Result<()> {
        for (key, entry) in self.set.iter().enumerate() {
            let Some(conn) = pool.get_mut(entry.slot) else {
                continue;
            };
            let interest = Event::new(key, true, entry.writable).with_interrupt();
            let armed = match conn.handle() {
                Some(socket) if conn.registered => self.poller.modify(socket, interest),
                // SAFETY: the socket is deleted from the poller in `release`
                // before the connection drops it.
                Some(socket) => unsafe { self.poller.add(socket, interest) },
                None => continue,
            };
            armed.map_err(Error::Poll)?;
            conn.registered = true;
        }
        Ok(())
    }

    /// Sockets reported ready by the last [`Poller::wait`].
    pub fn signaled(&self) -> &[Signaled] {
        &self.signaled
    }

    /// The set polled by the last [`Poller::wait`].
    pub fn active(&self) -> &ActivePollSet {
        &self.set
    }

    /// Deregisters the socket of `conn`, closes it and returns the slot to idle.
    pub fn release(&self, conn: &mut Connection) {
        if conn.registered {
            if let Some(socket) = conn.handle() {
                if let Err(e) = self.poller.delete(socket) {
                    log::debug!("cannot deregister fd {:?}: {e}", conn.raw_fd());
                }
            }
            conn.registered = false;
        }
        conn.close();
    }
}
