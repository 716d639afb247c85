//! Commit Tests
//!
//! Versioned compare-and-swap through `commit_write`.

use crate::*;
use proptest::prelude::*;
use relaydb::relay_core::CommitError;
use std::sync::Barrier;
use std::thread;

fn conflict_of(err: CommitError) -> relaydb::relay_core::ConflictError {
    match err {
        CommitError::Conflict(c) => c,
        other => panic!("expected conflict, got {:?}", other),
    }
}

// =============================================================================
// SEQUENTIAL COMMITS
// =============================================================================

#[test]
fn test_stale_writer_gets_conflict() {
    let (relay, _) = create_relay();
    let coord = coordinator(&relay);

    coord
        .commit_write(CommitRequest::new("ch", "0x1", None, 0, "agent-a"))
        .unwrap();
    let err = coord
        .commit_write(CommitRequest::new("ch", "0x2", Some("0x1".into()), 0, "agent-b"))
        .unwrap_err();

    assert_eq!(err.code(), "CONFLICT");
    let c = conflict_of(err);
    assert_eq!(c.current_version, 1);
    assert_eq!(c.current_head, Some(Handle::from("0x1")));
    assert_eq!(c.your_version, 0);
    assert!(!c.fork);
}

#[test]
fn test_versions_step_by_one() {
    let (relay, clock) = create_relay();
    let coord = coordinator(&relay);

    let mut prev: Option<Handle> = None;
    for v in 0..10u64 {
        clock.advance(1);
        let handle = Handle::new(format!("0x{}", v + 1));
        let receipt = coord
            .commit_write(CommitRequest::new("ch", handle.clone(), prev.clone(), v, "agent-a"))
            .unwrap();
        assert_eq!(receipt.version, v + 1);
        assert_eq!(receipt.head_handle, handle);
        prev = Some(handle);
    }

    let head = coord.get_head(&ch("ch"));
    assert_eq!(head.version, 10);
    assert_eq!(head.head_handle, prev);
}

#[test]
fn test_head_updated_event_per_commit() {
    let (relay, _) = create_relay();
    let coord = coordinator(&relay);
    let events = relay.subscribe_events();

    coord
        .commit_write(CommitRequest::new("ch", "0x1", None, 0, "agent-a"))
        .unwrap();
    let _ = coord.commit_write(CommitRequest::new("ch", "0x2", None, 0, "agent-b"));

    let updates: Vec<u64> = events
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            CoordinatorEvent::HeadUpdated { version, writer, .. } => {
                assert_eq!(writer, Some(agent("agent-a")));
                Some(version)
            }
            _ => None,
        })
        .collect();
    assert_eq!(updates, vec![1]);
}

#[test]
fn test_holder_must_present_token() {
    let (relay, _) = create_relay();
    let coord = coordinator(&relay);
    let lock = coord.acquire_lock(&ch("ch"), &agent("agent-a"), None).unwrap();

    let err = coord
        .commit_write(CommitRequest::new("ch", "0x1", None, 0, "agent-a"))
        .unwrap_err();
    assert!(matches!(err, CommitError::Locked(_)));

    let stranger = coord
        .commit_write(
            CommitRequest::new("ch", "0x1", None, 0, "agent-b").with_token(LockToken::generate()),
        )
        .unwrap_err();
    assert!(matches!(stranger, CommitError::Locked(_)));

    coord
        .commit_write(CommitRequest::new("ch", "0x1", None, 0, "agent-a").with_token(lock.token))
        .unwrap();
    assert!(coord.get_lock(&ch("ch")).is_none());
}

// =============================================================================
// CONCURRENT COMMITS
// =============================================================================

#[test]
fn test_concurrent_commits_never_share_a_version() {
    let (relay, _) = create_relay();
    let coord = Arc::clone(coordinator(&relay));
    let writers = 8;
    let rounds = 50;
    let barrier = Arc::new(Barrier::new(writers));

    let handles: Vec<_> = (0..writers)
        .map(|w| {
            let coord = Arc::clone(&coord);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut accepted = Vec::new();
                for r in 0..rounds {
                    let head = coord.get_head(&ch("ch"));
                    let request = CommitRequest::new(
                        "ch",
                        Handle::new(format!("0x{}-{}", w, r)),
                        head.head_handle,
                        head.version,
                        format!("agent-{}", w),
                    );
                    if let Ok(receipt) = coord.commit_write(request) {
                        accepted.push(receipt.version);
                    }
                }
                accepted
            })
        })
        .collect();

    let mut versions: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    versions.sort_unstable();

    let head = coord.get_head(&ch("ch"));
    let expected: Vec<u64> = (1..=head.version).collect();
    assert_eq!(versions, expected, "accepted versions must be gapless and unique");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Whatever expected versions writers present, the accepted ones are
    /// exactly 0, 1, 2, ... in order.
    #[test]
    fn prop_accepted_versions_are_sequential(expected in proptest::collection::vec(0u64..6, 1..40)) {
        let (relay, _) = create_relay();
        let coord = coordinator(&relay);

        let mut accepted = Vec::new();
        for (i, v) in expected.iter().enumerate() {
            let head = coord.get_head(&ch("ch"));
            let claimed = if *v == head.version { head.head_handle.clone() } else { None };
            let request = CommitRequest::new("ch", Handle::new(format!("0x{}", i)), claimed, *v, "agent-a");
            match coord.commit_write(request) {
                Ok(receipt) => {
                    prop_assert_eq!(receipt.version, *v + 1);
                    accepted.push(*v);
                }
                Err(err) => prop_assert!(err.is_retryable()),
            }
        }

        let sequential: Vec<u64> = (0..accepted.len() as u64).collect();
        prop_assert_eq!(accepted, sequential);
        prop_assert!(coord.get_forks(None).is_empty());
    }
}
