// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pool's single shared-state struct, guarded by one `parking_lot::Mutex`
//! (§3, §5).

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use pool_core::{GroupName, WorkerId};

use crate::group::Group;
use crate::worker::WorkerHandle;

#[derive(Debug, Clone)]
pub struct PoolLimits {
    pub max: usize,
    pub max_per_app: usize,
    pub max_idle_time: Duration,
    pub max_request_queue_size: usize,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            max: 6,
            max_per_app: 0,
            max_idle_time: Duration::from_secs(300),
            max_request_queue_size: 0,
        }
    }
}

pub struct PoolState {
    pub groups: HashMap<GroupName, Group>,
    pub workers: HashMap<WorkerId, WorkerHandle>,
    pub count: usize,
    pub active: usize,
    pub limits: PoolLimits,
    /// LRU of zero-session workers, oldest at the front, across all groups.
    pub inactive: VecDeque<WorkerId>,
    pub global_queue_waiters: usize,
}

impl PoolState {
    pub fn new(limits: PoolLimits) -> Self {
        Self {
            groups: HashMap::new(),
            workers: HashMap::new(),
            count: 0,
            active: 0,
            limits,
            inactive: VecDeque::new(),
            global_queue_waiters: 0,
        }
    }

    pub fn mark_active(&mut self, id: &WorkerId) {
        if let Some(pos) = self.inactive.iter().position(|w| w == id) {
            self.inactive.remove(pos);
        }
        self.active += 1;
    }

    pub fn mark_inactive(&mut self, id: WorkerId) {
        self.inactive.push_back(id);
        self.active = self.active.saturating_sub(1);
    }

    pub fn remove_worker(&mut self, id: &WorkerId) -> Option<WorkerHandle> {
        if let Some(pos) = self.inactive.iter().position(|w| w == id) {
            self.inactive.remove(pos);
        }
        let handle = self.workers.remove(id)?;
        if handle.sessions > 0 {
            self.active = self.active.saturating_sub(1);
        }
        self.count = self.count.saturating_sub(1);
        if let Some(group) = self.groups.get_mut(&handle.group) {
            group.remove(id);
        }
        Some(handle)
    }

    /// The least-recently-used inactive worker across all groups, the
    /// victim selected when a new group must be created at `count == max`
    /// (§4.5).
    pub fn lru_inactive(&self) -> Option<WorkerId> {
        self.inactive.front().cloned()
    }

    #[cfg(debug_assertions)]
    pub fn check_invariants(&self) {
        let sum: usize = self.groups.values().map(Group::size).sum();
        debug_assert_eq!(sum, self.count, "sum(group.size) == count");
        debug_assert_eq!(
            self.inactive.len(),
            self.count - self.active,
            "inactive.size == count - active"
        );
        for group in self.groups.values() {
            debug_assert!(!group.is_empty() || group.detached);
            debug_assert!(!group.detached || group.is_empty());
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
