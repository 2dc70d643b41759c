//! End-to-end tests driving a harness against a loopback listener.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use slow_drip::{ConnState, Config, Error, Harness, TickReport};

const MAX_TICKS: usize = 200;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

fn quick(config: Config) -> Config {
    config
        .with_poll_timeout(Duration::from_millis(20))
        .with_tick_interval(Duration::ZERO)
        .with_report_interval(None)
}

/// Ticks until `slot` is sending and returns the report of that tick.
fn tick_until_sending(harness: &mut Harness, slot: usize) -> TickReport {
    for _ in 0..MAX_TICKS {
        let report = harness.tick().expect("tick");
        if harness.pool().get(slot).unwrap().state() == ConnState::Sending {
            return report;
        }
    }
    panic!("slot {slot} never reached Sending");
}

fn accept(listener: &TcpListener) -> TcpStream {
    let (stream, _) = listener.accept().expect("accept");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Four bytes in two-byte chunks: `AA BB`, `CC DD`, then `AA BB` again.
#[test]
fn drips_payload_two_bytes_per_tick() {
    let (listener, addr) = listener();
    let config = quick(Config::new(addr, 1))
        .with_payload(vec![0xAA, 0xBB, 0xCC, 0xDD])
        .with_chunk_size(2);
    let mut harness = Harness::new(config).unwrap();

    let first = tick_until_sending(&mut harness, 0);
    assert_eq!(first.bytes_sent, 2);
    assert_eq!(harness.pool().get(0).unwrap().cursor(), 2);

    let second = harness.tick().unwrap();
    assert_eq!(second.bytes_sent, 2);
    assert_eq!(harness.pool().get(0).unwrap().cursor(), 0);

    let third = harness.tick().unwrap();
    assert_eq!(third.bytes_sent, 2);
    assert_eq!(harness.pool().get(0).unwrap().cursor(), 2);

    let mut server = accept(&listener);
    let mut received = [0u8; 6];
    server.read_exact(&mut received).unwrap();
    assert_eq!(received, [0xAA, 0xBB, 0xCC, 0xDD, 0xAA, 0xBB]);
}

#[test]
fn server_sees_payload_repeated_without_gaps() {
    let (listener, addr) = listener();
    let payload: Vec<u8> = b"slow and steady".to_vec();
    let config = quick(Config::new(addr, 2))
        .with_payload(payload.clone())
        .with_chunk_size(4);
    let mut harness = Harness::new(config).unwrap();

    tick_until_sending(&mut harness, 0);
    tick_until_sending(&mut harness, 1);
    for _ in 0..20 {
        harness.tick().unwrap();
    }

    let expected: Vec<u8> = payload.iter().copied().cycle().take(3 * payload.len()).collect();
    for _ in 0..2 {
        let mut server = accept(&listener);
        let mut received = vec![0u8; expected.len()];
        server.read_exact(&mut received).unwrap();
        assert_eq!(received, expected);
    }
}

#[test]
fn peer_hangup_frees_slot_and_reconnects_it() {
    let (listener, addr) = listener();
    let config = quick(Config::new(addr, 1)).with_payload(b"x".to_vec());
    let mut harness = Harness::new(config).unwrap();

    tick_until_sending(&mut harness, 0);
    drop(accept(&listener));

    let mut released = false;
    for _ in 0..MAX_TICKS {
        let report = harness.tick().unwrap();
        if report.hangups + report.broken > 0 {
            assert_eq!(harness.pool().get(0).unwrap().state(), ConnState::Idle);
            assert_eq!(harness.pool().get(0).unwrap().cursor(), 0);
            released = true;
            break;
        }
    }
    assert!(released, "hang-up never observed");

    let report = harness.tick().unwrap();
    assert_eq!(report.attempts, 1);
    assert_ne!(harness.pool().get(0).unwrap().state(), ConnState::Idle);
    assert_eq!(harness.pool().len(), 1);
    assert!(harness.pool().live_descriptors() <= 1);
}

/// With nothing dripped, only the dispatcher can notice the peer leaving.
#[test]
fn quiet_peer_close_is_a_hangup_in_the_same_pass() {
    let (listener, addr) = listener();
    let mut harness = Harness::new(quick(Config::new(addr, 1))).unwrap();

    tick_until_sending(&mut harness, 0);
    drop(accept(&listener));

    let mut released = None;
    for _ in 0..MAX_TICKS {
        let report = harness.tick().unwrap();
        assert_eq!(report.broken, 0);
        if report.hangups > 0 {
            released = Some(report);
            break;
        }
    }
    let report = released.expect("hang-up never observed");
    assert_eq!(report.hangups, 1);
    assert_eq!(harness.pool().get(0).unwrap().state(), ConnState::Idle);
    assert_eq!(harness.pool().live_descriptors(), 0);

    let next = harness.tick().unwrap();
    assert_eq!(next.attempts, 1);
    assert_ne!(harness.pool().get(0).unwrap().state(), ConnState::Idle);
}

/// A server that answers and then closes leaves data ahead of the end of stream.
#[test]
fn peer_close_after_response_is_a_hangup() {
    let (listener, addr) = listener();
    let mut harness = Harness::new(quick(Config::new(addr, 1))).unwrap();

    tick_until_sending(&mut harness, 0);
    let response = b"HTTP/1.1 408 Request Timeout\r\nConnection: close\r\n\r\n";
    {
        let mut server = accept(&listener);
        server.write_all(response).unwrap();
    }

    let mut drained = 0;
    let mut hangups = 0;
    for _ in 0..MAX_TICKS {
        let report = harness.tick().unwrap();
        drained += report.drained;
        hangups += report.hangups;
        assert_eq!(report.broken, 0);
        if report.hangups > 0 {
            assert_eq!(harness.pool().get(0).unwrap().state(), ConnState::Idle);
            assert_eq!(harness.pool().get(0).unwrap().cursor(), 0);
            break;
        }
    }
    assert_eq!(hangups, 1);
    assert_eq!(drained, response.len());

    let next = harness.tick().unwrap();
    assert_eq!(next.attempts, 1);
}

#[test]
fn live_descriptors_never_exceed_pool_size() {
    let (listener, addr) = listener();
    listener.set_nonblocking(true).unwrap();
    let config = quick(Config::new(addr, 4)).with_payload(vec![0; 8]);
    let mut harness = Harness::new(config).unwrap();

    let mut accepted = Vec::new();
    for tick in 0..60 {
        harness.tick().unwrap();
        assert!(harness.pool().live_descriptors() <= 4);
        while let Ok((stream, _)) = listener.accept() {
            accepted.push(stream);
        }
        // Periodically kick the clients off to force reconnects.
        if tick % 15 == 14 {
            accepted.clear();
        }
    }
    assert_eq!(harness.pool().len(), 4);
}

#[test]
fn timed_out_wait_still_drips() {
    let (listener, addr) = listener();
    let timeout = Duration::from_millis(100);
    let config = Config::new(addr, 1)
        .with_payload(vec![1, 2, 3])
        .with_chunk_size(1)
        .with_poll_timeout(timeout)
        .with_report_interval(None);
    let mut harness = Harness::new(config).unwrap();
    let _server = {
        tick_until_sending(&mut harness, 0);
        accept(&listener)
    };

    let before = harness.pool().get(0).unwrap().cursor();
    let started = Instant::now();
    let report = harness.tick().unwrap();
    let elapsed = started.elapsed();

    assert_eq!(report.signaled, 0);
    assert_eq!(report.bytes_sent, 1);
    assert_eq!(harness.pool().get(0).unwrap().cursor(), (before + 1) % 3);
    assert!(elapsed < timeout + Duration::from_millis(500), "tick took {elapsed:?}");
}

#[test]
fn unreachable_target_ends_the_run() {
    let addr = {
        let (listener, addr) = listener();
        drop(listener);
        addr
    };
    let config = quick(Config::new(addr, 3)).with_payload(vec![0xFF]);
    let mut harness = Harness::new(config).unwrap();

    let mut outcome = None;
    for _ in 0..MAX_TICKS {
        match harness.tick() {
            Ok(report) => {
                assert_eq!(report.confirmed, 0);
                assert_eq!(harness.pool().status().sending, 0);
            }
            Err(e) => {
                outcome = Some(e);
                break;
            }
        }
    }
    assert!(matches!(outcome, Some(Error::Connect { .. })), "{outcome:?}");
    assert_eq!(harness.pool().status().sending, 0);
}

#[test]
fn run_returns_once_shutdown_is_set() {
    let (_listener, addr) = listener();
    let mut harness = Harness::new(quick(Config::new(addr, 2))).unwrap();
    let shutdown = Arc::new(AtomicBool::new(false));

    let flag = shutdown.clone();
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(200));
        flag.store(true, Ordering::Relaxed);
    });
    harness.run(&shutdown).unwrap();
    stopper.join().unwrap();

    assert!(harness.totals().ticks > 0);
    assert_eq!(harness.totals().attempts, 2);
    harness.teardown();
    assert_eq!(harness.pool().live_descriptors(), 0);
}

#[test]
fn invalid_config_is_rejected() {
    let (_listener, addr) = listener();
    assert!(matches!(
        Harness::new(Config::new(addr, 0)),
        Err(Error::InvalidConfig(_))
    ));
}
