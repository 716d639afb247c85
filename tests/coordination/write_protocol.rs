//! Write Protocol Tests
//!
//! `ChannelLog::write` under contention, store failures, forks and snapshots.

use crate::*;
use relaydb::relay_channels::ChannelError;
use relaydb::relay_storage::FaultyContentStore;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

// =============================================================================
// BASIC WRITES
// =============================================================================

#[test]
fn test_round_trip_through_chain() {
    let (relay, _) = create_relay();
    let log = relay.log_for("agent-a");
    let meta = json!({"label": "observation", "confidence": 0.5});

    let first = log.write(&ch("ch"), b"alpha", None).unwrap();
    let second = log
        .write(&ch("ch"), &[0u8, 159, 146, 150], Some(meta.clone()))
        .unwrap();

    let record = log.read_record(&second.payload_handle).unwrap();
    assert_eq!(record.payload, vec![0u8, 159, 146, 150]);
    assert_eq!(record.author_id, agent("agent-a"));
    assert_eq!(record.metadata, Some(meta));
    assert_eq!(record.prev_handle, Some(first.payload_handle.clone()));

    let root = log.read_record(&first.payload_handle).unwrap();
    assert_eq!(root.payload, b"alpha".to_vec());
    assert!(root.prev_handle.is_none());
}

#[test]
fn test_manifest_tracks_commits() {
    let (relay, _) = create_relay();
    let log = relay.log_for("agent-a");
    for i in 0..3 {
        log.write(&ch("ch"), format!("{}", i).as_bytes(), None).unwrap();
    }

    let manifest = relay.directory().get(&ch("ch")).unwrap();
    assert_eq!(manifest.entry_count, 3);
    assert_eq!(manifest.created_by, agent("agent-a"));
    assert_eq!(manifest.head, coordinator(&relay).get_head(&ch("ch")));
}

#[test]
fn test_subscribers_are_notified() {
    let (relay, _) = create_relay();
    relay.directory().ensure(&ch("ch"), &agent("agent-a"), 0);
    relay
        .directory()
        .subscribe(&ch("ch"), &agent("watcher"))
        .unwrap();
    let events = relay.subscribe_events();

    let entry = relay.log_for("agent-a").write(&ch("ch"), b"hi", None).unwrap();

    let appended = events
        .drain()
        .into_iter()
        .find_map(|e| match e {
            CoordinatorEvent::EntryAppended {
                entry_id,
                recipients,
                version,
                ..
            } => Some((entry_id, recipients, version)),
            _ => None,
        })
        .unwrap();
    assert_eq!(appended, (entry.id, vec![agent("watcher")], 1));
}

// =============================================================================
// CONTENTION AND RETRIES
// =============================================================================

#[test]
fn test_concurrent_agents_all_land() {
    init_tracing();
    let config = RelayConfig {
        log: test_log_config().max_write_retries(1_000).backoff_ms(0, 2),
        ..RelayConfig::default()
    };
    let relay = Relay::builder().config(config).build().unwrap();
    let agents = 8;
    let writes = 10;
    let barrier = Arc::new(Barrier::new(agents));

    let handles: Vec<_> = (0..agents)
        .map(|i| {
            let log = relay.log_for(format!("agent-{}", i));
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for n in 0..writes {
                    log.write(&ch("shared"), format!("{}:{}", i, n).as_bytes(), None)
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let total = (agents * writes) as u64;
    assert_eq!(coordinator(&relay).get_head(&ch("shared")).version, total);
    assert!(coordinator(&relay).get_forks(None).is_empty());

    // Walking the chain visits every write exactly once
    let log = relay.log_for("reader");
    let head = coordinator(&relay)
        .get_head(&ch("shared"))
        .head_handle
        .unwrap();
    let report = log.recover_channel(&ch("shared"), &head, 1_000).unwrap();
    let versions: Vec<u64> = report.entries.iter().map(|e| e.version).collect();
    assert_eq!(versions, (1..=total).collect::<Vec<_>>());
}

#[test]
fn test_write_waits_out_an_expiring_lease() {
    init_tracing();
    let config = RelayConfig {
        log: test_log_config().max_write_retries(50).backoff_ms(5, 10),
        ..RelayConfig::default()
    };
    let relay = Relay::builder().config(config).build().unwrap();
    coordinator(&relay)
        .acquire_lock(&ch("ch"), &agent("crashed"), Some(30))
        .unwrap();

    let entry = relay.log_for("agent-a").write(&ch("ch"), b"after", None).unwrap();
    assert_eq!(entry.version, 1);
}

#[test]
fn test_lease_held_past_budget_exhausts_retries() {
    let (relay, _) = create_relay();
    coordinator(&relay)
        .acquire_lock(&ch("ch"), &agent("agent-b"), None)
        .unwrap();

    let log = relay
        .log_for("agent-a")
        .with_config(test_log_config().max_write_retries(3));
    let err = log.write(&ch("ch"), b"x", None).unwrap_err();
    match &err {
        ChannelError::RetriesExhausted { attempts, last, .. } => {
            assert_eq!(*attempts, 3);
            assert!(last.is_retryable());
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }

    let unified: Error = err.into();
    assert_eq!(unified.code(), "RETRIES_EXHAUSTED");
}

#[test]
fn test_store_outage_is_absorbed() {
    let store = Arc::new(FaultyContentStore::new(MemoryContentStore::new()));
    let (relay, _) = create_relay_on(store.clone());

    store.fail_next_puts(3);
    let entry = relay.log_for("agent-a").write(&ch("ch"), b"x", None).unwrap();
    assert_eq!(entry.version, 1);
    assert_eq!(store.injected_failures(), 3);
    assert!(coordinator(&relay).get_lock(&ch("ch")).is_none());
}

#[test]
fn test_fork_is_terminal_for_the_forking_writer() {
    let (relay, _) = create_relay();
    let coord = coordinator(&relay);
    let log = relay.log_for("agent-a");
    log.write(&ch("ch"), b"v1", None).unwrap();

    // A writer that read version 1 from a different history than the live head
    let err = coord
        .commit_write(CommitRequest::new("ch", "0xother", Some("0xstale".into()), 1, "agent-b"))
        .unwrap_err();
    let unified: Error = err.into();
    assert!(unified.is_fork());
    assert!(!unified.is_retryable());

    // Ordinary writers keep extending the live head
    assert_eq!(log.write(&ch("ch"), b"v2", None).unwrap().version, 2);
}

// =============================================================================
// SNAPSHOTS
// =============================================================================

#[test]
fn test_threshold_triggers_background_snapshot() {
    init_tracing();
    let config = RelayConfig {
        log: test_log_config()
            .snapshot_threshold(3)
            .snapshot_mode(SnapshotMode::Background),
        ..RelayConfig::default()
    };
    let relay = Relay::builder().config(config).build().unwrap();
    let events = relay.subscribe_events();
    let log = relay.log_for("agent-a");
    for i in 0..3 {
        log.write(&ch("ch"), format!("{}", i).as_bytes(), None).unwrap();
    }

    let snapshot = loop {
        match events.recv_timeout(Duration::from_secs(5)).unwrap() {
            CoordinatorEvent::SnapshotTaken {
                handle,
                entry_count,
                ..
            } => break (handle, entry_count),
            _ => continue,
        }
    };
    assert_eq!(snapshot.1, 3);
    assert_eq!(
        relay.directory().get(&ch("ch")).unwrap().snapshot_handle,
        Some(snapshot.0)
    );
}
