use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use crate::error::{Error, Result};

/// Bytes sent per connection per tick unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 10;
/// Sleep between two ticks unless configured otherwise.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_micros(10_000);
/// Upper bound of the readiness wait unless configured otherwise.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(1_000);
/// Interval between two status lines unless configured otherwise.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Run parameters, fixed once the harness is built.
///
/// ```rust
/// use std::time::Duration;
/// use slow_drip::Config;
///
/// let config = Config::new("127.0.0.1:8080".parse().unwrap(), 100)
///     .with_payload(vec![0x47, 0x45, 0x54, 0x20])
///     .with_chunk_size(1)
///     .with_tick_interval(Duration::from_millis(500));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    target: SocketAddr,
    connections: usize,
    payload: Vec<u8>,
    chunk_size: usize,
    tick_interval: Duration,
    poll_timeout: Duration,
    report_interval: Option<Duration>,
}

impl Config {
    /// Creates a configuration holding `connections` connections to `target`
    /// with an empty payload and default timing.
    pub fn new(target: SocketAddr, connections: usize) -> Config {
        Config {
            target,
            connections,
            payload: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            tick_interval: DEFAULT_TICK_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            report_interval: Some(DEFAULT_REPORT_INTERVAL),
        }
    }

    /// Sets the bytes dripped to every connection, cyclically.
    pub fn with_payload(mut self, payload: Vec<u8>) -> Config {
        self.payload = payload;
        self
    }

    /// Sets the maximum number of payload bytes sent per connection per tick.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Config {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the sleep between two ticks.
    pub fn with_tick_interval(mut self, interval: Duration) -> Config {
        self.tick_interval = interval;
        self
    }

    /// Sets the upper bound of the readiness wait.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Config {
        self.poll_timeout = timeout;
        self
    }

    /// Sets the interval between status lines, `None` disables them.
    pub fn with_report_interval(mut self, interval: Option<Duration>) -> Config {
        self.report_interval = interval.filter(|d| !d.is_zero());
        self
    }

    /// Checks the values a harness cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.connections == 0 {
            return Err(Error::InvalidConfig("connection count must be at least 1"));
        }
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk size must be at least 1 byte"));
        }
        Ok(())
    }

    /// The address every connection is opened to.
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Number of connection slots.
    pub fn connections(&self) -> usize {
        self.connections
    }

    /// The dripped payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Maximum payload bytes per connection per tick.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Sleep between two ticks.
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Upper bound of the readiness wait.
    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    /// Interval between status lines, if enabled.
    pub fn report_interval(&self) -> Option<Duration> {
        self.report_interval
    }
}

/// Resolves `host:port`, preferring an IPv4 address when the name has both.
pub fn resolve_target(host: &str, port: u16) -> Result<SocketAddr> {
    let target = format!("{host}:{port}");
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| Error::Resolve {
            target: target.clone(),
            source,
        })?
        .collect();
    for a in addrs.iter() {
        log::debug!("{target} resolves to {a}");
    }
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or(Error::NoAddress { target })
}

/// Decodes a hex string such as `"AABBccdd"` into raw bytes.
pub fn decode_hex(input: &str) -> Result<Vec<u8>> {
    let digits = input.as_bytes();
    if digits.len() % 2 != 0 {
        return Err(Error::InvalidPayload {
            offset: digits.len(),
            reason: "odd number of hex digits",
        });
    }
    digits
        .chunks_exact(2)
        .enumerate()
        .map(|(i, pair)| -> Result<u8> {
            let hi = nibble(pair[0]).ok_or(Error::InvalidPayload {
                offset: 2 * i,
                reason: "not a hex digit",
            })?;
            let lo = nibble(pair[1]).ok_or(Error::InvalidPayload {
                offset: 2 * i + 1,
                reason: "not a hex digit",
            })?;
            Ok((hi << 4) | lo)
        })
        .collect()
}

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_mixed_case() {
        assert_eq!(decode_hex("AAbbCcdD").unwrap(), vec![0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(decode_hex("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn decode_rejects_odd_length() {
        match decode_hex("abc") {
            Err(Error::InvalidPayload { offset, .. }) => assert_eq!(offset, 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_reports_bad_digit_offset() {
        match decode_hex("00zz") {
            Err(Error::InvalidPayload { offset, .. }) => assert_eq!(offset, 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn defaults() {
        let config = Config::new("127.0.0.1:80".parse().unwrap(), 3);
        assert_eq!(config.chunk_size(), 10);
        assert_eq!(config.tick_interval(), Duration::from_micros(10_000));
        assert_eq!(config.poll_timeout(), Duration::from_millis(1_000));
        assert!(config.payload().is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_values() {
        let target = "127.0.0.1:80".parse().unwrap();
        assert!(matches!(
            Config::new(target, 0).validate(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Config::new(target, 1).with_chunk_size(0).validate(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn zero_report_interval_disables_reports() {
        let config = Config::new("127.0.0.1:80".parse().unwrap(), 1)
            .with_report_interval(Some(Duration::ZERO));
        assert_eq!(config.report_interval(), None);
    }

    #[test]
    fn resolve_loopback() {
        let addr = resolve_target("127.0.0.1", 9).unwrap();
        assert_eq!(addr, "127.0.0.1:9".parse().unwrap());
    }
}
