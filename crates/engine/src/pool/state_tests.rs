// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::os::fd::OwnedFd;
use std::time::Instant;

use crate::worker::{SocketEndpoint, Transport, MAIN_SOCKET_ROLE};
use pool_core::{ConnectPassword, DetachKey, Gupid};

fn make_worker(id: &str, group: &str) -> WorkerHandle {
    let mut sockets = HashMap::new();
    sockets.insert(
        MAIN_SOCKET_ROLE.to_string(),
        SocketEndpoint {
            address: "/tmp/w.sock".into(),
            transport: Transport::Unix,
        },
    );
    let (r, _w): (OwnedFd, OwnedFd) = nix::unistd::pipe().unwrap();
    WorkerHandle::new(
        WorkerId::new(id),
        GroupName::new(group),
        1,
        sockets,
        DetachKey("d".into()),
        ConnectPassword("c".into()),
        Gupid("g".into()),
        r,
        Vec::new(),
        Instant::now(),
    )
}

#[test]
fn remove_worker_updates_count_active_and_inactive_lru() {
    let mut state = PoolState::new(PoolLimits::default());
    let mut group = Group::new("/app".into(), GroupName::new("/app"), Default::default());
    let worker = make_worker("w1", "/app");
    group.push_back(worker.id.clone());
    state.groups.insert(GroupName::new("/app"), group);
    state.workers.insert(worker.id.clone(), worker);
    state.count = 1;
    state.inactive.push_back(WorkerId::new("w1"));

    let removed = state.remove_worker(&WorkerId::new("w1"));
    assert!(removed.is_some());
    assert_eq!(state.count, 0);
    assert!(state.inactive.is_empty());
    assert!(state.groups.get(&GroupName::new("/app")).unwrap().is_empty());
}

#[test]
fn lru_inactive_returns_the_oldest_entry() {
    let mut state = PoolState::new(PoolLimits::default());
    state.inactive.push_back(WorkerId::new("first"));
    state.inactive.push_back(WorkerId::new("second"));
    assert_eq!(state.lru_inactive(), Some(WorkerId::new("first")));
}

#[test]
fn mark_active_then_inactive_round_trips_active_counter() {
    let mut state = PoolState::new(PoolLimits::default());
    state.inactive.push_back(WorkerId::new("w1"));
    state.mark_active(&WorkerId::new("w1"));
    assert_eq!(state.active, 1);
    assert!(state.inactive.is_empty());
    state.mark_inactive(WorkerId::new("w1"));
    assert_eq!(state.active, 0);
    assert_eq!(state.inactive.len(), 1);
}
