// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::time::Instant;

use pool_core::{AccountsDatabase, ConnectPassword, DetachKey, FakeClock, Gupid};

use crate::group::{Group, GroupLimits};
use crate::spawn::{HelperConfig, SpawnManager};
use crate::worker::{SocketEndpoint, Transport, WorkerHandle, MAIN_SOCKET_ROLE};

use super::*;

fn make_pool(limits: PoolLimits) -> (Arc<Pool<FakeClock>>, FakeClock) {
    let clock = FakeClock::new();
    let spawn_manager = Arc::new(SpawnManager::new(HelperConfig {
        command: PathBuf::from("/nonexistent/spawn-helper"),
        args: Vec::new(),
        runtime_dir: std::env::temp_dir(),
    }));
    let accounts = Arc::new(AccountsDatabase::new());
    let pool = Pool::new(limits, spawn_manager, accounts, clock.clone());
    (pool, clock)
}

fn make_worker(id: &str, group: &str) -> WorkerHandle {
    let mut sockets = HashMap::new();
    sockets.insert(
        MAIN_SOCKET_ROLE.to_string(),
        SocketEndpoint {
            address: "/tmp/does-not-exist.sock".into(),
            transport: Transport::Unix,
        },
    );
    let (r, _w): (OwnedFd, OwnedFd) = nix::unistd::pipe().unwrap();
    WorkerHandle::new(
        WorkerId::new(id),
        GroupName::new(group),
        1,
        sockets,
        DetachKey(format!("detach-{id}")),
        ConnectPassword("pw".into()),
        Gupid(format!("gupid-{id}")),
        r,
        Vec::new(),
        Instant::now(),
    )
}

fn insert_worker(pool: &Pool<FakeClock>, id: &str, group_name: &str) {
    let mut state = pool.state_lock();
    state
        .groups
        .entry(GroupName::new(group_name))
        .or_insert_with(|| {
            Group::new(
                PathBuf::from(group_name),
                GroupName::new(group_name),
                GroupLimits::default(),
            )
        });
    let worker = make_worker(id, group_name);
    state
        .groups
        .get_mut(&GroupName::new(group_name))
        .unwrap()
        .push_back(worker.id.clone());
    state.workers.insert(worker.id.clone(), worker);
    state.count += 1;
    state.inactive.push_back(WorkerId::new(id));
}

#[tokio::test]
async fn detach_removes_the_worker_owning_the_key() {
    let (pool, _clock) = make_pool(PoolLimits::default());
    insert_worker(&pool, "w1", "/app");

    assert!(pool.detach(&DetachKey("detach-w1".into())));
    assert_eq!(pool.get_count(), 0);
    assert!(!pool.detach(&DetachKey("detach-w1".into())));
}

#[tokio::test]
async fn clear_removes_every_worker_and_group() {
    let (pool, _clock) = make_pool(PoolLimits::default());
    insert_worker(&pool, "w1", "/app-a");
    insert_worker(&pool, "w2", "/app-b");

    pool.clear();

    assert_eq!(pool.get_count(), 0);
    assert_eq!(pool.state_lock().groups.len(), 0);
}

#[tokio::test]
async fn set_max_updates_the_limit_visible_through_inspect() {
    let (pool, _clock) = make_pool(PoolLimits::default());
    pool.set_max(12);
    assert_eq!(pool.inspect().max, 12);
}

#[tokio::test]
async fn inspect_reports_worker_counts_per_group() {
    let (pool, _clock) = make_pool(PoolLimits::default());
    insert_worker(&pool, "w1", "/app-a");
    insert_worker(&pool, "w2", "/app-a");

    let snapshot = pool.inspect();
    assert_eq!(snapshot.count, 2);
    let group = snapshot
        .groups
        .iter()
        .find(|g| g.name == "/app-a")
        .expect("group present");
    assert_eq!(group.workers.len(), 2);
}

#[tokio::test]
async fn to_xml_omits_gupid_when_sensitive_fields_are_excluded() {
    let (pool, _clock) = make_pool(PoolLimits::default());
    insert_worker(&pool, "w1", "/app-a");

    let redacted = pool.to_xml(false);
    assert!(!redacted.contains("gupid-w1"));

    let full = pool.to_xml(true);
    assert!(full.contains("gupid-w1"));
}

#[tokio::test]
async fn get_waits_for_new_group_capacity_when_pool_is_at_max_active() {
    let (pool, _clock) = make_pool(PoolLimits {
        max: 1,
        ..PoolLimits::default()
    });
    insert_worker(&pool, "w1", "/app-a");
    pool.state_lock().mark_active(&WorkerId::new("w1"));

    let options = GetOptions::new("/app-b");
    let wait = tokio::time::timeout(Duration::from_millis(50), pool.get(options)).await;
    assert!(wait.is_err(), "get should block waiting for capacity");
}

/// §8 scenario: count is at `max` with an inactive worker from another
/// group sitting idle — it should be evicted to make room rather than
/// making the caller wait, even though the replacement spawn itself then
/// fails (no real spawn helper is available in this test).
#[tokio::test]
async fn dispatch_evicts_the_lru_inactive_worker_when_at_max_count() {
    let (pool, _clock) = make_pool(PoolLimits {
        max: 1,
        ..PoolLimits::default()
    });
    insert_worker(&pool, "w1", "/app-a");

    let result = pool
        .dispatch_once(&GroupName::new("/app-b"), &GetOptions::new("/app-b"), false)
        .await;

    assert!(result.is_err(), "the replacement spawn has no real helper to talk to");
    assert_eq!(pool.get_count(), 0, "the LRU victim should already have been evicted");
}

fn mark_busy(pool: &Pool<FakeClock>, id: &str) {
    let mut state = pool.state_lock();
    state.mark_active(&WorkerId::new(id));
    state.workers.get_mut(&WorkerId::new(id)).unwrap().sessions = 1;
}

/// §8 scenario: a full group with `useGlobalQueue` set queues the caller
/// instead of spawning past `max`.
#[tokio::test]
async fn existing_busy_group_with_global_queue_enqueues_the_caller() {
    let (pool, _clock) = make_pool(PoolLimits::default());
    insert_worker(&pool, "w1", "/app-a");
    mark_busy(&pool, "w1");

    let mut options = GetOptions::new("/app-a");
    options.use_global_queue = true;

    let dispatch = pool
        .dispatch_once(&GroupName::new("/app-a"), &options, false)
        .await
        .expect("queueing itself should not fail");
    assert!(matches!(dispatch, Dispatch::WaitGlobalQueue));
    assert_eq!(pool.get_global_queue_size(), 1);
}

/// §8 scenario: max=1, useGlobalQueue=true, maxRequestQueueSize=1 — a third
/// `get()` must fail immediately with a queue-full error rather than
/// queuing indefinitely.
#[tokio::test]
async fn global_queue_rejects_once_max_request_queue_size_is_reached() {
    let (pool, _clock) = make_pool(PoolLimits {
        max_request_queue_size: 1,
        ..PoolLimits::default()
    });
    insert_worker(&pool, "w1", "/app-a");
    mark_busy(&pool, "w1");

    let mut options = GetOptions::new("/app-a");
    options.use_global_queue = true;

    let first = pool
        .dispatch_once(&GroupName::new("/app-a"), &options, false)
        .await
        .expect("first caller should be queued");
    assert!(matches!(first, Dispatch::WaitGlobalQueue));

    let second = pool
        .dispatch_once(&GroupName::new("/app-a"), &options, false)
        .await;
    assert!(
        matches!(second, Err(EngineError::QueueFull)),
        "a second caller should be rejected once the queue is at its configured size"
    );
}

/// Regression test for the `global_queue_waiters` bookkeeping bug: a retry
/// that is resuming from a previous `WaitGlobalQueue` must decrement the
/// waiter count before re-evaluating, or the counter only ever grows and a
/// legitimately-retrying caller eventually gets rejected as "queue full"
/// even though nothing is actually still queued.
#[tokio::test]
async fn retrying_from_a_global_queue_wait_nets_out_the_waiter_count() {
    let (pool, _clock) = make_pool(PoolLimits::default());
    insert_worker(&pool, "w1", "/app-a");
    mark_busy(&pool, "w1");

    let mut options = GetOptions::new("/app-a");
    options.use_global_queue = true;

    let _ = pool
        .dispatch_once(&GroupName::new("/app-a"), &options, false)
        .await
        .unwrap();
    assert_eq!(pool.get_global_queue_size(), 1);

    // The worker is still busy, so this retry re-queues — but it must first
    // release its earlier slot, leaving the net count unchanged rather than
    // growing on every retry.
    let _ = pool
        .dispatch_once(&GroupName::new("/app-a"), &options, true)
        .await
        .unwrap();
    assert_eq!(pool.get_global_queue_size(), 1);
}
