use std::io;
use std::net::SocketAddr;

/// Errors that end a run.
///
/// Failures local to one connection (hang-ups, partial sends, short reads)
/// never show up here: they only move the owning slot back to idle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The target host name could not be resolved.
    #[error("cannot resolve target {target}: {source}")]
    Resolve {
        /// The `host:port` that was looked up.
        target: String,
        /// The resolver error.
        #[source]
        source: io::Error,
    },

    /// The target resolved to an empty address list.
    #[error("target {target} resolved to no address")]
    NoAddress {
        /// The `host:port` that was looked up.
        target: String,
    },

    /// The payload string is not valid hex.
    #[error("invalid hex payload at offset {offset}: {reason}")]
    InvalidPayload {
        /// Offset of the offending character in the input.
        offset: usize,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// The connection table could not be allocated.
    #[error("cannot allocate {count} connection slots")]
    Allocation {
        /// Number of slots requested.
        count: usize,
    },

    /// A socket could not be created or configured.
    #[error("socket error on slot {slot}: {source}")]
    Socket {
        /// Pool slot of the socket.
        slot: usize,
        /// The OS error.
        #[source]
        source: io::Error,
    },

    /// A connection attempt failed for a reason other than being in progress.
    #[error("cannot connect slot {slot} to {target}: {source}")]
    Connect {
        /// Pool slot of the attempt.
        slot: usize,
        /// The target address.
        target: SocketAddr,
        /// The OS error.
        #[source]
        source: io::Error,
    },

    /// The readiness poller failed.
    #[error("poll failed: {0}")]
    Poll(#[source] io::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
