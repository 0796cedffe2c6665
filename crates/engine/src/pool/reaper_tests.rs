// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pool_core::{AccountsDatabase, ConnectPassword, DetachKey, FakeClock, Gupid};

use crate::group::{Group, GroupLimits};
use crate::pool::{Pool, PoolLimits};
use crate::spawn::{HelperConfig, SpawnManager};
use crate::worker::{SocketEndpoint, Transport, WorkerHandle, MAIN_SOCKET_ROLE};

use super::*;

fn make_pool() -> (Arc<Pool<FakeClock>>, FakeClock) {
    let clock = FakeClock::new();
    let spawn_manager = Arc::new(SpawnManager::new(HelperConfig {
        command: PathBuf::from("/nonexistent/spawn-helper"),
        args: Vec::new(),
        runtime_dir: std::env::temp_dir(),
    }));
    let accounts = Arc::new(AccountsDatabase::new());
    let pool = Pool::new(PoolLimits::default(), spawn_manager, accounts, clock.clone());
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

fn insert_idle_worker(pool: &Pool<FakeClock>, id: &str, group_name: &str, min_processes: usize) {
    let mut state = pool.state_lock();
    state
        .groups
        .entry(GroupName::new(group_name))
        .or_insert_with(|| {
            Group::new(
                PathBuf::from(group_name),
                GroupName::new(group_name),
                GroupLimits {
                    min_processes,
                    ..GroupLimits::default()
                },
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

#[test]
fn sweep_removes_a_worker_idle_past_max_idle_time() {
    let (pool, clock) = make_pool();
    insert_idle_worker(&pool, "w1", "/app-a", 0);
    clock.advance(Duration::from_secs(400));

    sweep(&pool, Duration::from_secs(300));

    assert_eq!(pool.get_count(), 0);
}

#[test]
fn sweep_ignores_workers_not_yet_idle_long_enough() {
    let (pool, clock) = make_pool();
    insert_idle_worker(&pool, "w1", "/app-a", 0);
    clock.advance(Duration::from_secs(100));

    sweep(&pool, Duration::from_secs(300));

    assert_eq!(pool.get_count(), 1);
}

#[test]
fn sweep_respects_a_groups_minimum_process_count() {
    let (pool, clock) = make_pool();
    insert_idle_worker(&pool, "w1", "/app-a", 1);
    clock.advance(Duration::from_secs(400));

    sweep(&pool, Duration::from_secs(300));

    assert_eq!(
        pool.get_count(),
        1,
        "min_processes=1 should protect the group's only worker"
    );
}

#[test]
fn sweep_deletes_the_workers_minted_service_account() {
    let (pool, clock) = make_pool();
    insert_idle_worker(&pool, "w1", "/app-a", 0);
    let (username, _password) = pool.mint_service_account(&GroupName::new("/app-a"));
    pool.state_lock()
        .workers
        .get_mut(&WorkerId::new("w1"))
        .unwrap()
        .set_service_account(username.clone());
    clock.advance(Duration::from_secs(400));

    sweep(&pool, Duration::from_secs(300));

    assert!(
        pool.accounts().authenticate(username.as_str(), "").is_none(),
        "the service account should no longer authenticate once its worker is reaped"
    );
}
