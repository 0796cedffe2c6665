// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background task that detaches workers idle past `maxIdleTime` (§4.5).
//!
//! `maxIdleTime == 0` disables timed reaping entirely; the task still runs,
//! parked on the wake `Notify` until a `setMaxIdleTime` call gives it a
//! nonzero duration to sleep on.

use std::sync::Arc;
use std::time::Duration;

use pool_core::{Clock, GroupName, WorkerId};

use super::Pool;

pub fn wake<C: Clock>(pool: &Pool<C>) {
    pool.reap_notify().notify_waiters();
}

pub fn spawn<C: Clock>(pool: Arc<Pool<C>>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move { run(pool).await })
}

async fn run<C: Clock>(pool: Arc<Pool<C>>) {
    loop {
        let max_idle = pool.state_lock().limits.max_idle_time;
        if max_idle.is_zero() {
            pool.reap_notify().notified().await;
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(max_idle + Duration::from_secs(1)) => {}
            _ = pool.reap_notify().notified() => { continue; }
        }

        sweep(&pool, max_idle);
    }
}

fn sweep<C: Clock>(pool: &Pool<C>, max_idle: Duration) {
    let now = pool.clock().now();
    let mut state = pool.state_lock();

    let mut victims: Vec<(WorkerId, GroupName)> = Vec::new();
    for worker in state.workers.values() {
        if !worker.is_idle() {
            continue;
        }
        if now.duration_since(worker.last_used) < max_idle {
            continue;
        }
        let Some(group) = state.groups.get(&worker.group) else {
            continue;
        };
        if group.size() <= group.limits.min_processes {
            continue;
        }
        victims.push((worker.id.clone(), worker.group.clone()));
    }

    for (id, _group) in victims {
        pool.remove_worker_locked(&mut state, &id);
    }
}

#[cfg(test)]
#[path = "reaper_tests.rs"]
mod tests;
