use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::config::Config;
use crate::dispatch::EventDispatcher;
use crate::drip::DripEngine;
use crate::error::Result;
use crate::poller::Poller;
use crate::pool::ConnectionPool;

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    /// Connection attempts issued for idle slots.
    pub attempts: usize,
    /// Sockets the wait reported as ready.
    pub signaled: usize,
    /// Handshakes confirmed.
    pub confirmed: usize,
    /// Connections released after a hang-up or error.
    pub hangups: usize,
    /// Inbound bytes discarded.
    pub drained: usize,
    /// Payload bytes accepted by the transport.
    pub bytes_sent: usize,
    /// Connections released because a send failed.
    pub broken: usize,
}

/// Counters accumulated over a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Totals {
    /// Ticks run.
    pub ticks: u64,
    /// Connection attempts issued.
    pub attempts: u64,
    /// Handshakes confirmed.
    pub confirmed: u64,
    /// Connections lost to hang-ups, errors or failed sends.
    pub dropped: u64,
    /// Payload bytes accepted by the transport.
    pub bytes_sent: u64,
}

impl Totals {
    fn add(&mut self, tick: &TickReport) {
        self.ticks += 1;
        self.attempts += tick.attempts as u64;
        self.confirmed += tick.confirmed as u64;
        self.dropped += (tick.hangups + tick.broken) as u64;
        self.bytes_sent += tick.bytes_sent as u64;
    }
}

/// The connection-holding loop.
///
/// A harness owns the pool and the poller and drives them one tick at a time:
/// reconnect idle slots, wait for readiness, dispatch it, drip the payload.
/// Dropping the harness releases every descriptor.
///
/// ```rust,no_run
/// use std::sync::atomic::AtomicBool;
/// use slow_drip::{Config, Harness};
///
/// let config = Config::new("127.0.0.1:8080".parse().unwrap(), 256)
///     .with_payload(b"GET / HTTP/1.1\r\nHost: localhost\r\n".to_vec())
///     .with_chunk_size(1);
/// let mut harness = Harness::new(config)?;
/// harness.run(&AtomicBool::new(false))?;
/// # Ok::<(), slow_drip::Error>(())
/// ```
pub struct Harness {
    config: Config,
    pool: ConnectionPool,
    poller: Poller,
    dispatcher: EventDispatcher,
    drip: DripEngine,
    totals: Totals,
    last_report: Instant,
}

impl Harness {
    /// Validates `config` and allocates the pool and the poller.
    pub fn new(config: Config) -> Result<Harness> {
        config.validate()?;
        let pool = ConnectionPool::new(config.target(), config.connections())?;
        let poller = Poller::new(config.connections())?;
        let drip = DripEngine::new(config.payload().to_vec(), config.chunk_size());
        log::info!(
            "holding {} connections to {}, dripping {} payload bytes {} at a time",
            config.connections(),
            config.target(),
            config.payload().len(),
            config.chunk_size()
        );
        Ok(Harness {
            config,
            pool,
            poller,
            dispatcher: EventDispatcher::new(),
            drip,
            totals: Totals::default(),
            last_report: Instant::now(),
        })
    }

    /// Runs one tick without the trailing sleep.
    ///
    /// A wait that times out skips dispatching but still drips.
    pub fn tick(&mut self) -> Result<TickReport> {
        let mut report = TickReport {
            attempts: self.pool.ensure_connected()?,
            ..TickReport::default()
        };

        report.signaled = self
            .poller
            .wait(&mut self.pool, self.config.poll_timeout())?;
        if report.signaled > 0 {
            let dispatched = self.dispatcher.dispatch(&mut self.pool, &self.poller)?;
            report.confirmed = dispatched.confirmed;
            report.hangups = dispatched.hangups;
            report.drained = dispatched.drained;
        }

        let dripped = self.drip.drip(&mut self.pool, &self.poller);
        report.bytes_sent = dripped.bytes_sent;
        report.broken = dripped.broken;

        self.totals.add(&report);
        Ok(report)
    }

    /// Ticks until `shutdown` is set or a fatal error occurs.
    ///
    /// The inter-tick sleep is skipped after a wait that timed out, since the
    /// wait already paced the loop.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        while !shutdown.load(Ordering::Relaxed) {
            let report = self.tick()?;
            self.report_status();
            if report.signaled > 0 {
                std::thread::sleep(self.config.tick_interval());
            }
        }
        log::info!("shutdown requested after {} ticks", self.totals.ticks);
        Ok(())
    }

    fn report_status(&mut self) {
        let Some(interval) = self.config.report_interval() else {
            return;
        };
        if self.last_report.elapsed() < interval {
            return;
        }
        self.last_report = Instant::now();
        log::info!(
            "{}, attempts: {}, dropped: {}, bytes sent: {}",
            self.pool.status(),
            self.totals.attempts,
            self.totals.dropped,
            self.totals.bytes_sent
        );
    }

    /// Releases every descriptor. The next tick reconnects all slots.
    pub fn teardown(&mut self) {
        let live = self.pool.live_descriptors();
        for conn in self.pool.iter_mut() {
            self.poller.release(conn);
        }
        if live > 0 {
            log::debug!("released {live} descriptors");
        }
    }

    /// The connection pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// The run configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Counters accumulated since the harness was built.
    pub fn totals(&self) -> Totals {
        self.totals
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.teardown();
    }
}
