//! Lease Tests
//!
//! Acquire, release, expiry and extension of channel leases.

use crate::*;
use relaydb::relay_concurrency::CoordinatorEvent;
use relaydb::relay_core::Clock;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

// =============================================================================
// MUTUAL EXCLUSION
// =============================================================================

#[test]
fn test_second_agent_locked_out_until_release() {
    let (relay, _) = create_relay();
    let coord = coordinator(&relay);

    coord.acquire_lock(&ch("ch"), &agent("agent-a"), None).unwrap();

    let err = coord
        .acquire_lock(&ch("ch"), &agent("agent-b"), None)
        .unwrap_err();
    assert_eq!(err.code(), "LOCKED");
    assert_eq!(err.holder, agent("agent-a"));

    assert!(coord.release_lock(&ch("ch"), &agent("agent-a")));
    let lock = coord.acquire_lock(&ch("ch"), &agent("agent-b"), None).unwrap();
    assert_eq!(lock.holder, agent("agent-b"));
}

#[test]
fn test_release_of_missing_lock_is_false() {
    let (relay, _) = create_relay();
    let coord = coordinator(&relay);
    assert!(!coord.release_lock(&ch("ch"), &agent("agent-a")));

    let lock = coord.acquire_lock(&ch("ch"), &agent("agent-a"), None).unwrap();
    assert!(!coord.release_lock(&ch("ch"), &agent("agent-b")));
    assert!(coord.release_lock(&ch("ch"), &lock.token));
    assert!(!coord.release_lock(&ch("ch"), &lock.token));
}

#[test]
fn test_reacquire_by_holder_refreshes() {
    let (relay, clock) = create_relay();
    let coord = coordinator(&relay);

    let first = coord.acquire_lock(&ch("ch"), &agent("agent-a"), Some(100)).unwrap();
    clock.advance(50);
    let second = coord.acquire_lock(&ch("ch"), &agent("agent-a"), Some(100)).unwrap();
    assert_eq!(second.expires_at, first.expires_at + 50);
    assert_eq!(second.token, first.token);
}

#[test]
fn test_channels_lock_independently() {
    let (relay, _) = create_relay();
    let coord = coordinator(&relay);
    coord.acquire_lock(&ch("a"), &agent("agent-a"), None).unwrap();
    assert!(coord.acquire_lock(&ch("b"), &agent("agent-b"), None).is_ok());
}

// =============================================================================
// EXPIRY
// =============================================================================

#[test]
fn test_manual_clock_expiry() {
    let (relay, clock) = create_relay();
    let coord = coordinator(&relay);

    coord.acquire_lock(&ch("ch"), &agent("agent-a"), Some(10)).unwrap();
    clock.advance(9);
    assert!(coord.acquire_lock(&ch("ch"), &agent("agent-b"), None).is_err());
    clock.advance(1);
    assert!(coord.get_lock(&ch("ch")).is_none());
    assert!(coord.acquire_lock(&ch("ch"), &agent("agent-b"), None).is_ok());
}

#[test]
fn test_real_time_ttl_expiry() {
    init_tracing();
    let relay = Relay::ephemeral().unwrap();
    let coord = coordinator(&relay);

    coord.acquire_lock(&ch("ch"), &agent("agent-a"), Some(10)).unwrap();
    assert!(coord.acquire_lock(&ch("ch"), &agent("agent-b"), None).is_err());

    thread::sleep(Duration::from_millis(25));
    let lock = coord.acquire_lock(&ch("ch"), &agent("agent-b"), None).unwrap();
    assert_eq!(lock.holder, agent("agent-b"));
}

#[test]
fn test_ttl_is_capped() {
    let (relay, _) = create_relay();
    let coord = coordinator(&relay);
    let lock = coord
        .acquire_lock(&ch("ch"), &agent("agent-a"), Some(u64::MAX / 2))
        .unwrap();
    let max = coord.config().max_lock_ttl_ms as i64;
    assert_eq!(lock.expires_at - lock.acquired_at, max);
}

#[test]
fn test_extend_by_token() {
    let (relay, clock) = create_relay();
    let coord = coordinator(&relay);
    let lock = coord.acquire_lock(&ch("ch"), &agent("agent-a"), Some(10)).unwrap();

    clock.advance(5);
    let extended = coord.extend_lock(&ch("ch"), &lock.token, Some(100)).unwrap();
    assert_eq!(extended.expires_at, clock.now_millis() + 100);

    clock.advance(50);
    assert!(coord.get_lock(&ch("ch")).is_some());
    assert!(coord
        .extend_lock(&ch("ch"), &LockToken::generate(), None)
        .is_none());
}

// =============================================================================
// CONTENTION
// =============================================================================

#[test]
fn test_exactly_one_concurrent_acquirer_wins() {
    let (relay, _) = create_relay();
    let coord = Arc::clone(coordinator(&relay));
    let contenders = 8;
    let barrier = Arc::new(Barrier::new(contenders));

    let handles: Vec<_> = (0..contenders)
        .map(|i| {
            let coord = Arc::clone(&coord);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                coord
                    .acquire_lock(&ch("ch"), &agent(&format!("agent-{}", i)), None)
                    .is_ok()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
}

#[test]
fn test_lock_events() {
    let (relay, _) = create_relay();
    let coord = coordinator(&relay);
    let events = relay.subscribe_events();

    coord.acquire_lock(&ch("ch"), &agent("agent-a"), None).unwrap();
    coord.release_lock(&ch("ch"), &agent("agent-a"));

    let kinds: Vec<&'static str> = events
        .drain()
        .into_iter()
        .map(|e| match e {
            CoordinatorEvent::LockAcquired { .. } => "acquired",
            CoordinatorEvent::LockReleased { .. } => "released",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["acquired", "released"]);
}
