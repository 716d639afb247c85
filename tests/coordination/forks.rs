//! Fork Tests
//!
//! Detection, notification and resolution of divergent histories.

use crate::*;

/// Commit v1 = "0xa", then present version 1 again from a different predecessor
fn fork_channel(coord: &Coordinator) {
    coord
        .commit_write(CommitRequest::new("ch", "0xa", None, 0, "agent-a"))
        .unwrap();
    let err = coord
        .commit_write(CommitRequest::new(
            "ch",
            "0xb",
            Some("0xdiverged".into()),
            1,
            "agent-b",
        ))
        .unwrap_err();
    assert!(err.is_fork());
}

fn fork_events(events: &EventSubscription) -> (usize, usize) {
    events
        .drain()
        .into_iter()
        .fold((0, 0), |(detected, resolved), e| match e {
            CoordinatorEvent::ForkDetected(_) => (detected + 1, resolved),
            CoordinatorEvent::ForkResolved(_) => (detected, resolved + 1),
            _ => (detected, resolved),
        })
}

// =============================================================================
// DETECTION
// =============================================================================

#[test]
fn test_same_version_different_predecessor_records_one_fork() {
    let (relay, _) = create_relay();
    let coord = coordinator(&relay);
    let events = relay.subscribe_events();

    fork_channel(coord);

    let forks = coord.get_forks(Some(&ch("ch")));
    assert_eq!(forks.len(), 1);
    let fork = &forks[0];
    assert!(!fork.resolved);
    assert!(fork.resolution.is_none());
    assert_eq!(fork.branch_a.handle, Some(Handle::from("0xa")));
    assert_eq!(fork.branch_a.version, 1);
    assert_eq!(fork.branch_b.handle, Some(Handle::from("0xb")));
    assert_eq!(fork.detected_by, agent("agent-b"));

    assert_eq!(fork_events(&events), (1, 0));
}

#[test]
fn test_fork_does_not_block_later_writes() {
    let (relay, _) = create_relay();
    let coord = coordinator(&relay);
    fork_channel(coord);

    let receipt = coord
        .commit_write(CommitRequest::new("ch", "0xc", Some("0xa".into()), 1, "agent-c"))
        .unwrap();
    assert_eq!(receipt.version, 2);
    assert_eq!(coord.get_forks(None).len(), 1);
}

#[test]
fn test_different_versions_are_plain_conflicts() {
    let (relay, _) = create_relay();
    let coord = coordinator(&relay);
    coord
        .commit_write(CommitRequest::new("ch", "0xa", None, 0, "agent-a"))
        .unwrap();

    let err = coord
        .commit_write(CommitRequest::new("ch", "0xb", Some("0xa".into()), 5, "agent-b"))
        .unwrap_err();
    assert!(!err.is_fork());
    assert!(coord.get_forks(None).is_empty());
}

#[test]
fn test_list_channels_counts_open_forks() {
    let (relay, _) = create_relay();
    let coord = coordinator(&relay);
    fork_channel(coord);

    let status = relay.list_channels();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].open_forks, 1);
}

// =============================================================================
// RESOLUTION
// =============================================================================

#[test]
fn test_resolve_with_handle_installs_merge_commit() {
    let (relay, _) = create_relay();
    let coord = coordinator(&relay);
    let events = relay.subscribe_events();
    fork_channel(coord);
    let pre_fork = coord.get_head(&ch("ch")).version;

    assert!(coord.resolve_fork(&ch("ch"), Resolution::KeepB, Some("0xresolved".into())));

    let head = coord.get_head(&ch("ch"));
    assert_eq!(head.head_handle, Some(Handle::from("0xresolved")));
    assert_eq!(head.version, pre_fork + 1);

    let fork = &coord.get_forks(Some(&ch("ch")))[0];
    assert!(fork.resolved);
    assert_eq!(fork.resolution, Some(Resolution::KeepB));
    assert_eq!(fork.resolution.map(|r| r.as_str()), Some("keep_b"));
    assert_eq!(fork.resolved_handle, Some(Handle::from("0xresolved")));

    assert_eq!(fork_events(&events), (1, 1));
}

#[test]
fn test_resolve_without_open_fork_is_false() {
    let (relay, _) = create_relay();
    let coord = coordinator(&relay);
    assert!(!coord.resolve_fork(&ch("ch"), Resolution::Merge, None));

    fork_channel(coord);
    assert!(coord.resolve_fork(&ch("ch"), Resolution::KeepA, None));
    assert!(!coord.resolve_fork(&ch("ch"), Resolution::KeepA, None));
    assert_eq!(coord.get_head(&ch("ch")).version, 1);
}

#[test]
fn test_resolution_targets_most_recent_open_fork() {
    let (relay, _) = create_relay();
    let coord = coordinator(&relay);
    fork_channel(coord);
    coord
        .commit_write(CommitRequest::new("ch", "0xd", Some("0xelsewhere".into()), 1, "agent-d"))
        .unwrap_err();

    assert!(coord.resolve_fork(&ch("ch"), Resolution::Merge, None));
    let forks = coord.get_forks(Some(&ch("ch")));
    assert_eq!(forks.len(), 2);
    assert!(!forks[0].resolved);
    assert!(forks[1].resolved);
    assert_eq!(forks[1].resolution, Some(Resolution::Merge));
}

#[test]
fn test_resolution_parses_from_wire_names() {
    for (name, expected) in [
        ("keep_a", Resolution::KeepA),
        ("keep_b", Resolution::KeepB),
        ("merge", Resolution::Merge),
    ] {
        assert_eq!(name.parse::<Resolution>().unwrap(), expected);
    }
    assert!("keep_c".parse::<Resolution>().is_err());
}
