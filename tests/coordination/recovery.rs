//! Recovery Tests
//!
//! Rebuilding channel state from the content store after a restart, by
//! chain walk and by snapshot.

use crate::*;
use relaydb::relay_channels::WalkStop;

/// Write `n` entries and return the relay's store and the final head
fn populate(n: usize) -> (Arc<MemoryContentStore>, Vec<LogEntry>) {
    let store = Arc::new(MemoryContentStore::new());
    let (relay, _) = create_relay_on(store.clone());
    let log = relay.log_for("agent-a");
    let entries = (0..n)
        .map(|i| {
            log.write(
                &ch("ch"),
                format!("payload-{}", i).as_bytes(),
                Some(json!({ "seq": i })),
            )
            .unwrap()
        })
        .collect();
    (store, entries)
}

#[test]
fn test_recovery_returns_oldest_first_bounded_by_depth() {
    let (store, written) = populate(8);
    let head = written.last().unwrap().payload_handle.clone();

    for depth in [1usize, 3, 8, 20] {
        let (relay, _) = create_relay_on(store.clone());
        let report = relay
            .log_for("restarted")
            .recover_channel(&ch("ch"), &head, depth)
            .unwrap();

        assert!(report.entries.len() <= depth);
        let expected = &written[written.len() - report.entries.len()..];
        assert_eq!(report.entries, expected.to_vec(), "depth {}", depth);
        assert_eq!(report.is_truncated(), depth < written.len());
    }
}

#[test]
fn test_recovered_payloads_are_byte_identical() {
    let (store, written) = populate(4);
    let (relay, _) = create_relay_on(store);
    let log = relay.log_for("restarted");
    let report = log
        .recover(&ch("ch"), &written[3].payload_handle)
        .unwrap();

    for (i, entry) in report.entries.iter().enumerate() {
        assert_eq!(
            log.read_payload(entry).unwrap(),
            format!("payload-{}", i).into_bytes()
        );
        assert_eq!(entry.author_id, agent("agent-a"));
        assert_eq!(entry.metadata, Some(json!({ "seq": i })));
    }
}

#[test]
fn test_recovery_rebuilds_manifest_and_head() {
    let (store, written) = populate(5);
    let head = written[4].payload_handle.clone();
    let (relay, _) = create_relay_on(store);

    let report = relay.log_for("restarted").recover(&ch("ch"), &head).unwrap();
    assert_eq!(report.stop, WalkStop::Root);
    assert_eq!(report.entry_count, 5);

    let manifest = relay.directory().get(&ch("ch")).unwrap();
    assert_eq!(manifest.entry_count, 5);
    assert_eq!(manifest.head.version, 5);
    assert_eq!(manifest.head.head_handle, Some(head.clone()));
    assert_eq!(manifest.created_by, agent("agent-a"));

    let coord_head = coordinator(&relay).get_head(&ch("ch"));
    assert_eq!(coord_head.version, 5);

    let next = relay.log_for("agent-b").write(&ch("ch"), b"resumed", None).unwrap();
    assert_eq!(next.version, 6);
    assert_eq!(next.prev_handle, Some(head));
}

#[test]
fn test_truncated_walk_keeps_what_it_found() {
    let (store, written) = populate(5);
    assert!(store.remove(&written[1].payload_handle));
    let (relay, _) = create_relay_on(store);

    let report = relay
        .log_for("restarted")
        .recover(&ch("ch"), &written[4].payload_handle)
        .unwrap();
    assert_eq!(report.stop, WalkStop::Failed);
    assert!(report.error.is_some());
    assert_eq!(report.entries, written[2..].to_vec());
    assert_eq!(report.resume_from, Some(written[1].payload_handle.clone()));
    assert_eq!(report.entry_count, 5);
}

#[test]
fn test_unknown_head_is_an_error() {
    let (relay, _) = create_relay();
    let err = relay
        .log_for("restarted")
        .recover(&ch("ch"), &Handle::from("0xdeadbeef"))
        .unwrap_err();
    assert!(Error::from(err).is_not_found());
}

#[test]
fn test_snapshot_restore_round_trip() {
    let store = Arc::new(MemoryContentStore::new());
    let (relay, _) = create_relay_on(store.clone());
    let log = relay.log_for("agent-a");
    for i in 0..4 {
        log.write(&ch("ch"), format!("{}", i).as_bytes(), None).unwrap();
    }
    relay.directory().subscribe(&ch("ch"), &agent("watcher")).unwrap();
    let snapshot = log.snapshot(&ch("ch")).unwrap();

    let (restarted, _) = create_relay_on(store);
    let manifest = restarted
        .log_for("agent-b")
        .restore_snapshot(&snapshot)
        .unwrap();
    assert_eq!(manifest.entry_count, 4);
    assert!(manifest.subscribers.contains(&agent("watcher")));
    assert_eq!(
        restarted.log_for("agent-b").read(&ch("ch"), ReadOptions::default()),
        log.read(&ch("ch"), ReadOptions::default())
    );
    assert_eq!(
        coordinator(&restarted).get_head(&ch("ch")),
        coordinator(&relay).get_head(&ch("ch"))
    );
}

#[test]
fn test_stale_snapshot_restore_does_not_regress() {
    let (relay, _) = create_relay();
    let log = relay.log_for("agent-a");
    for i in 0..3 {
        log.write(&ch("ch"), format!("{}", i).as_bytes(), None).unwrap();
    }
    let snapshot = log.snapshot(&ch("ch")).unwrap();
    for i in 3..5 {
        log.write(&ch("ch"), format!("{}", i).as_bytes(), None).unwrap();
    }

    let manifest = relay.log_for("agent-b").restore_snapshot(&snapshot).unwrap();
    assert_eq!(manifest.head.version, 5);
    assert_eq!(relay.directory().get(&ch("ch")).unwrap().entry_count, 5);
    assert_eq!(log.read(&ch("ch"), ReadOptions::default()).len(), 5);

    log.write(&ch("ch"), b"5", None).unwrap();
    let manifest = relay.directory().get(&ch("ch")).unwrap();
    assert_eq!(manifest.entry_count, 6);
    assert_eq!(manifest.head, coordinator(&relay).get_head(&ch("ch")));
}
