// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-application collection of workers, restart policy, and the
//! background spawner (§4.4).
//!
//! A `Group` stores its workers by id in a `VecDeque<WorkerId>`, not by
//! owning them directly: per §9's arena+index redesign, `WorkerHandle`
//! values live in the Pool's flat map, and a Group is just an ordering over
//! their ids. Operations here assume the caller already holds the Pool
//! mutex, matching §4.4's "invoked only while the Pool mutex is held".

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use pool_core::{GroupName, WorkerId};

/// How often `needs_restart` actually stats the restart files, rather than
/// trusting the last observation (§4.4).
pub const DEFAULT_STAT_THROTTLE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct GroupLimits {
    pub max_requests_per_worker: Option<u64>,
    pub min_processes: usize,
}

impl Default for GroupLimits {
    fn default() -> Self {
        Self {
            max_requests_per_worker: None,
            min_processes: 1,
        }
    }
}

/// Tracks the two restart trigger files under `{appRoot}/tmp` (§4.4).
#[derive(Debug, Clone, Default)]
struct RestartWatch {
    last_checked: Option<Instant>,
    last_restart_txt_mtime: Option<std::time::SystemTime>,
}

#[derive(Debug, Clone)]
pub struct Group {
    pub app_root: PathBuf,
    pub name: GroupName,
    /// Ordered so that zero-session handles precede positive-session ones
    /// (§3 invariant); dispatch moves the selected id to the back.
    processes: VecDeque<WorkerId>,
    pub detached: bool,
    pub limits: GroupLimits,
    pub spawning_in_progress: bool,
    pub environment: Option<String>,
    pub analytics_enabled: bool,
    pub analytics_key: Option<String>,
    restart_watch: RestartWatch,
}

impl Group {
    pub fn new(app_root: PathBuf, name: GroupName, limits: GroupLimits) -> Self {
        Self {
            app_root,
            name,
            processes: VecDeque::new(),
            detached: false,
            limits,
            spawning_in_progress: false,
            environment: None,
            analytics_enabled: false,
            analytics_key: None,
            restart_watch: RestartWatch::default(),
        }
    }

    pub fn size(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn process_ids(&self) -> impl Iterator<Item = &WorkerId> {
        self.processes.iter()
    }

    pub fn front(&self) -> Option<&WorkerId> {
        self.processes.front()
    }

    /// New workers from background spawning go at the front (§4.4: "so
    /// it's immediately picked as least-loaded").
    pub fn push_front(&mut self, id: WorkerId) {
        self.processes.push_front(id);
    }

    pub fn push_back(&mut self, id: WorkerId) {
        self.processes.push_back(id);
    }

    pub fn remove(&mut self, id: &WorkerId) -> bool {
        if let Some(pos) = self.processes.iter().position(|w| w == id) {
            self.processes.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn move_to_back(&mut self, id: &WorkerId) {
        if let Some(pos) = self.processes.iter().position(|w| w == id) {
            if let Some(removed) = self.processes.remove(pos) {
                self.processes.push_back(removed);
            }
        }
    }

    /// §4.4 `selectProcess`: smallest session count wins, ties broken by
    /// earliest position. `sessions_of` looks up a handle's current session
    /// count (kept out of `Group` itself since handles live in the Pool's
    /// arena).
    pub fn select_process(&mut self, sessions_of: impl Fn(&WorkerId) -> u32) -> Option<WorkerId> {
        let chosen = self
            .processes
            .iter()
            .enumerate()
            .min_by_key(|(idx, id)| (sessions_of(id), *idx))
            .map(|(_, id)| id.clone())?;
        self.move_to_back(&chosen);
        Some(chosen)
    }

    /// §4.4 `needsRestart`: throttled stat of `always_restart.txt` and
    /// `restart.txt` under the group's restart directory.
    pub fn needs_restart(&mut self, now: Instant, restart_dir: Option<&std::path::Path>) -> bool {
        if let Some(last) = self.restart_watch.last_checked {
            if now.duration_since(last) < DEFAULT_STAT_THROTTLE {
                return false;
            }
        }
        self.restart_watch.last_checked = Some(now);

        let dir = restart_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| self.app_root.join("tmp"));

        if dir.join("always_restart.txt").exists() {
            return true;
        }

        let restart_txt = dir.join("restart.txt");
        match std::fs::metadata(&restart_txt).and_then(|m| m.modified()) {
            Ok(mtime) => {
                let previously_seen = self.restart_watch.last_restart_txt_mtime.replace(mtime);
                matches!(previously_seen, Some(seen) if seen != mtime)
            }
            Err(_) => false,
        }
    }

    /// §4.4 max-requests retirement: called after a worker's processed
    /// count has already been bumped by the caller. Returns whether the
    /// worker should be retired.
    pub fn should_retire(&self, processed: u64) -> bool {
        matches!(self.limits.max_requests_per_worker, Some(max) if processed >= max)
    }

    pub fn under_minimum(&self) -> bool {
        self.size() < self.limits.min_processes
    }

    pub fn detach(&mut self) -> Vec<WorkerId> {
        self.detached = true;
        self.processes.drain(..).collect()
    }
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod tests;
