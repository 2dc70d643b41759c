//! # Slow Drip - Connection Holding Stress Harness
//!
//! Slow Drip opens a fixed number of TCP connections to one server and keeps
//! them open for as long as it runs, sending each one a payload a few bytes at
//! a time. It is meant for testing how a server copes with many slow clients
//! that hold connections without ever finishing a request.
//!
//! ## Key Features
//!
//! - **Fixed Pool**: Every slot of the pool is always either connecting or
//!   connected; a slot that loses its connection is reconnected on the next tick
//! - **Cyclic Drip**: The payload is sent in chunks of a configurable size and
//!   starts over once fully sent, so delivery never completes
//! - **Single Thread**: All sockets are non-blocking and multiplexed with one
//!   bounded wait per tick
//! - **Defined Failure Policy**: Losing one connection only affects its slot;
//!   an unreachable target or a failing poller ends the run
//!
//! ## How It Works
//!
//! Each tick of the [`Harness`] runs four steps in order:
//!
//! 1. [`ConnectionPool::ensure_connected`] issues a non-blocking connect for
//!    every idle slot
//! 2. [`Poller::wait`] arms every open socket and waits for readiness, at most
//!    for the poll timeout
//! 3. [`EventDispatcher::dispatch`] releases sockets that hung up, discards
//!    unexpected inbound data and confirms completed handshakes
//! 4. [`DripEngine::drip`] sends the next chunk to every confirmed connection
//!
//! and then sleeps for the tick interval.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use slow_drip::{config, Config, Harness};
//!
//! let target = config::resolve_target("localhost", 8080)?;
//! let payload = config::decode_hex("474554202f20485454502f312e310d0a")?;
//! let config = Config::new(target, 500).with_payload(payload).with_chunk_size(2);
//!
//! let shutdown = slow_drip::signal::install_shutdown_handler().unwrap();
//! let mut harness = Harness::new(config)?;
//! harness.run(&shutdown)?;
//! # Ok::<(), slow_drip::Error>(())
//! ```
//!
//! ## Connection States
//!
//! A slot moves from [`ConnState::Idle`] to [`ConnState::Connecting`] when an
//! attempt is issued, to [`ConnState::Sending`] once the socket is seen
//! writable, and back to idle on hang-up or error. There is no final state.
//!
//! ## Shutdown and Crashes
//!
//! SIGINT and SIGTERM stop the loop at the next tick, after which every
//! descriptor is released. Panics are logged with a backtrace before the
//! harness is dropped and its sockets closed. Hardware faults (SIGSEGV,
//! SIGBUS, SIGFPE, SIGILL) and SIGABRT are not intercepted and terminate the
//! process with the default action.

#![warn(missing_docs)]

pub mod config;
mod connection;
mod dispatch;
mod drip;
mod error;
mod harness;
mod poller;
mod pool;
pub mod signal;

pub use config::Config;
pub use connection::{ConnState, Connection};
pub use dispatch::{DispatchReport, EventDispatcher};
pub use drip::{DripEngine, DripReport, Transmit, advance_cursor, next_chunk, send_chunk};
pub use error::{Error, Result};
pub use harness::{Harness, TickReport, Totals};
pub use poller::{ActivePollSet, PollEntry, Poller, Readiness, Signaled};
pub use pool::{ConnectionPool, PoolStatus};
