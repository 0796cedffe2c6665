// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The top-level scheduler: capacity enforcement, dispatch, the global
//! request queue, the idle reaper, and the metrics collector (§4.5).

mod inspect;
mod metrics;
mod reaper;
mod state;

pub use inspect::{GroupSnapshot, PoolSnapshot, WorkerSnapshot};
pub use metrics::{AnalyticsSink, GroupTransaction, MetricsCollector, ProcessSummary};
pub use reaper::wake as wake_reaper;
pub use state::{PoolLimits, PoolState};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::{mpsc, Notify};

use pool_core::{
    AccountUsername, AccountsDatabase, Clock, DetachKey, GroupName, Rights, Secret, SystemClock,
    WorkerId,
};

use crate::error::{EngineError, EngineResult};
use crate::group::{Group, GroupLimits};
use crate::session::{ReleaseNotice, Session, WorkerConnection};
use crate::spawn::{SpawnManager, SpawnOptions};
use crate::worker::Transport;

/// §4.5: connect-retry attempts before a `get()` call gives up.
pub const MAX_GET_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub app_root: String,
    pub group_name: Option<String>,
    pub use_global_queue: bool,
    pub extra: IndexMap<String, String>,
    pub restart_dir: Option<PathBuf>,
}

impl GetOptions {
    pub fn new(app_root: impl Into<String>) -> Self {
        Self {
            app_root: app_root.into(),
            ..Default::default()
        }
    }

    fn group_name(&self) -> GroupName {
        GroupName::new(
            self.group_name
                .clone()
                .unwrap_or_else(|| self.app_root.clone()),
        )
    }

    fn spawn_options(&self) -> SpawnOptions {
        let mut opts = SpawnOptions::new(self.app_root.clone());
        opts.extra = self.extra.clone();
        opts.use_global_queue = self.use_global_queue;
        opts
    }
}

enum Dispatch {
    Ready(WorkerId),
    WaitNewGroup,
    WaitGlobalQueue,
}

pub struct Pool<C: Clock = SystemClock> {
    state: Mutex<PoolState>,
    new_group_creatable: Notify,
    global_queue_position_available: Notify,
    reap_wake: Notify,
    spawn_manager: Arc<SpawnManager>,
    accounts: Arc<AccountsDatabase>,
    clock: C,
    release_tx: mpsc::UnboundedSender<ReleaseNotice>,
}

impl<C: Clock> Pool<C> {
    pub fn new(
        limits: PoolLimits,
        spawn_manager: Arc<SpawnManager>,
        accounts: Arc<AccountsDatabase>,
        clock: C,
    ) -> Arc<Self> {
        let (release_tx, release_rx) = mpsc::unbounded_channel();
        let pool = Arc::new(Self {
            state: Mutex::new(PoolState::new(limits)),
            new_group_creatable: Notify::new(),
            global_queue_position_available: Notify::new(),
            reap_wake: Notify::new(),
            spawn_manager,
            accounts,
            clock,
            release_tx,
        });
        tokio::spawn(run_release_loop(Arc::clone(&pool), release_rx));
        pool
    }

    pub fn spawn_idle_reaper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        reaper::spawn(Arc::clone(self))
    }

    pub fn spawn_metrics_collector(
        self: &Arc<Self>,
        collector: Arc<dyn MetricsCollector>,
    ) -> tokio::task::JoinHandle<()> {
        metrics::spawn(Arc::clone(self), collector)
    }

    /// Like [`Self::spawn_metrics_collector`], but also emits a
    /// [`GroupTransaction`] per analytics-enabled group each collection
    /// round (§4.5).
    pub fn spawn_metrics_collector_with_analytics(
        self: &Arc<Self>,
        collector: Arc<dyn MetricsCollector>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> tokio::task::JoinHandle<()> {
        metrics::spawn_with_analytics(Arc::clone(self), collector, analytics)
    }

    pub(crate) fn clock(&self) -> &C {
        &self.clock
    }

    pub(crate) fn accounts(&self) -> &AccountsDatabase {
        &self.accounts
    }

    pub(crate) fn state_lock(&self) -> parking_lot::MutexGuard<'_, PoolState> {
        self.state.lock()
    }

    pub(crate) fn reap_notify(&self) -> &Notify {
        &self.reap_wake
    }

    fn notify_capacity_freed(&self) {
        self.new_group_creatable.notify_waiters();
        self.global_queue_position_available.notify_waiters();
    }

    /// §3/§4.2: mint an ephemeral per-worker service account ahead of a real
    /// spawn attempt, returning its username and plaintext password so they
    /// can be handed to the spawn helper on the `spawn_application` wire
    /// message. Callers must remove the account again (via
    /// [`Self::remove_worker_locked`] or an explicit `self.accounts.remove`)
    /// on every path that doesn't end with the account attached to a live
    /// `WorkerHandle` — otherwise it leaks for the life of the daemon.
    fn mint_service_account(&self, group_name: &GroupName) -> (AccountUsername, String) {
        let password = pool_core::tokens::generate_helper_password();
        let username = self.accounts.add_service_account(
            group_name.as_str(),
            Secret::Cleartext(password.clone()),
            Rights::GET,
        );
        (username, password)
    }

    /// Remove a worker from `state` and, if it held a minted service
    /// account, delete that account too (§3: "deleted automatically when
    /// their associated worker is destroyed").
    pub(crate) fn remove_worker_locked(&self, state: &mut PoolState, id: &WorkerId) {
        if let Some(handle) = state.remove_worker(id) {
            if let Some(account) = &handle.service_account {
                self.accounts.remove(account.as_str());
            }
        }
    }

    fn release_worker_session(&self, notice: ReleaseNotice) {
        let mut state = self.state.lock();
        let mut retire = false;
        if let Some(worker) = state.workers.get_mut(&notice.worker) {
            worker.sessions = worker.sessions.saturating_sub(1);
            worker.processed += 1;
            worker.touch(self.clock.now());
            if worker.sessions == 0 {
                state.mark_inactive(notice.worker.clone());
            }
            if let Some(group) = state.groups.get(&notice.group) {
                retire = group.should_retire(worker.processed);
            }
        }
        if retire {
            self.remove_worker_locked(&mut state, &notice.worker);
            let empty_group = state
                .groups
                .get(&notice.group)
                .map(Group::is_empty)
                .unwrap_or(true);
            if empty_group {
                if let Some(group) = state.groups.get_mut(&notice.group) {
                    group.detach();
                }
                state.groups.remove(&notice.group);
            }
        }
        #[cfg(debug_assertions)]
        state.check_invariants();
        drop(state);
        self.notify_capacity_freed();
    }

    /// §4.5 `get(options) -> Session`.
    pub async fn get(self: &Arc<Self>, options: GetOptions) -> EngineResult<Session> {
        let group_name = options.group_name();
        let mut last_connect_err: Option<EngineError> = None;

        let mut queued_for_global = false;
        for attempt in 0..MAX_GET_ATTEMPTS {
            let dispatch = self
                .dispatch_once(&group_name, &options, queued_for_global)
                .await?;
            queued_for_global = false;
            let worker_id = match dispatch {
                Dispatch::Ready(id) => id,
                Dispatch::WaitNewGroup => {
                    self.new_group_creatable.notified().await;
                    continue;
                }
                Dispatch::WaitGlobalQueue => {
                    queued_for_global = true;
                    self.global_queue_position_available.notified().await;
                    continue;
                }
            };

            match self.materialize_session(&group_name, &worker_id).await {
                Ok(session) => return Ok(session),
                Err(err) => {
                    if is_emfile(&err) {
                        return Err(err);
                    }
                    self.remove_worker_locked(&mut self.state.lock(), &worker_id);
                    self.notify_capacity_freed();
                    last_connect_err = Some(err);
                    if attempt + 1 >= MAX_GET_ATTEMPTS {
                        break;
                    }
                    continue;
                }
            }
        }

        Err(last_connect_err.unwrap_or(EngineError::Timeout))
    }

    async fn dispatch_once(
        self: &Arc<Self>,
        group_name: &GroupName,
        options: &GetOptions,
        already_queued_for_global: bool,
    ) -> EngineResult<Dispatch> {
        self.maybe_reload(group_name, options).await;

        let mut state = self.state.lock();

        // This retry is waking up from a previous `WaitGlobalQueue`; it is
        // no longer sitting in the queue, whatever this attempt decides.
        if already_queued_for_global {
            state.global_queue_waiters = state.global_queue_waiters.saturating_sub(1);
        }

        if state.groups.contains_key(group_name) {
            let front_is_idle = state
                .groups
                .get(group_name)
                .and_then(Group::front)
                .and_then(|id| state.workers.get(id))
                .map(|w| w.is_idle())
                .unwrap_or(false);

            if front_is_idle {
                let front_id = state
                    .groups
                    .get(group_name)
                    .and_then(Group::front)
                    .cloned()
                    .ok_or_else(|| EngineError::NoSuchGroup(group_name.as_str().to_string()))?;
                if let Some(g) = state.groups.get_mut(group_name) {
                    g.move_to_back(&front_id);
                }
                state.mark_active(&front_id);
                return Ok(Dispatch::Ready(front_id));
            }

            let group_size = state.groups[group_name].size();
            let can_background_spawn = state.count < state.limits.max
                && (state.limits.max_per_app == 0 || group_size < state.limits.max_per_app);
            if can_background_spawn {
                let already_spawning = state
                    .groups
                    .get(group_name)
                    .map(|g| g.spawning_in_progress)
                    .unwrap_or(true);
                if !already_spawning {
                    if let Some(g) = state.groups.get_mut(group_name) {
                        g.spawning_in_progress = true;
                    }
                    self.launch_background_spawn(group_name.clone(), options.clone());
                }
            }

            if options.use_global_queue {
                if state.limits.max_request_queue_size > 0
                    && state.global_queue_waiters >= state.limits.max_request_queue_size
                {
                    return Err(EngineError::QueueFull);
                }
                state.global_queue_waiters += 1;
                return Ok(Dispatch::WaitGlobalQueue);
            }

            let sessions: HashMap<WorkerId, u32> = state
                .workers
                .iter()
                .map(|(id, w)| (id.clone(), w.sessions))
                .collect();
            if let Some(g) = state.groups.get_mut(group_name) {
                if let Some(chosen) = g.select_process(|id| sessions.get(id).copied().unwrap_or(0))
                {
                    state.mark_active(&chosen);
                    return Ok(Dispatch::Ready(chosen));
                }
            }
            return Ok(Dispatch::WaitNewGroup);
        }

        if state.active >= state.limits.max {
            return Ok(Dispatch::WaitNewGroup);
        }

        if state.count >= state.limits.max {
            match state.lru_inactive() {
                Some(victim) => {
                    self.remove_worker_locked(&mut state, &victim);
                }
                None => {
                    if state.limits.max_request_queue_size > 0
                        && state.global_queue_waiters >= state.limits.max_request_queue_size
                    {
                        return Err(EngineError::QueueFull);
                    }
                    return Ok(Dispatch::WaitNewGroup);
                }
            }
        }

        drop(state);
        let (account_username, account_password) = self.mint_service_account(group_name);
        let mut spawn_opts = options.spawn_options();
        spawn_opts.pool_account_username = Some(account_username.as_str().to_string());
        spawn_opts.pool_account_password_base64 = Some(account_password);
        let mut worker = match self.spawn_manager.spawn(group_name, &spawn_opts).await {
            Ok(worker) => worker,
            Err(e) => {
                self.accounts.remove(account_username.as_str());
                return Err(e);
            }
        };
        worker.set_service_account(account_username);
        worker.reset_clock(self.clock.now());

        let mut state = self.state.lock();
        let worker_id = worker.id.clone();
        state.groups.entry(group_name.clone()).or_insert_with(|| {
            Group::new(
                PathBuf::from(options.app_root.clone()),
                group_name.clone(),
                GroupLimits::default(),
            )
        });
        if let Some(group) = state.groups.get_mut(group_name) {
            group.push_back(worker_id.clone());
        }
        state.workers.insert(worker_id.clone(), worker);
        state.count += 1;
        state.mark_active(&worker_id);
        Ok(Dispatch::Ready(worker_id))
    }

    async fn maybe_reload(&self, group_name: &GroupName, options: &GetOptions) {
        let needs_reload = {
            let mut state = self.state.lock();
            let now = self.clock.now();
            state
                .groups
                .get_mut(group_name)
                .map(|g| g.needs_restart(now, options.restart_dir.as_deref()))
                .unwrap_or(false)
        };
        if !needs_reload {
            return;
        }
        let _ = self.spawn_manager.reload(group_name).await;
        let mut state = self.state.lock();
        if let Some(group) = state.groups.get_mut(group_name) {
            let drained = group.detach();
            for id in drained {
                self.remove_worker_locked(&mut state, &id);
            }
        }
        state.groups.remove(group_name);
    }

    /// §4.4: spawns one extra worker in the background while the group
    /// keeps serving requests from its existing workers.
    fn launch_background_spawn(self: &Arc<Self>, group_name: GroupName, options: GetOptions) {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let (account_username, account_password) = pool.mint_service_account(&group_name);
            let mut spawn_opts = options.spawn_options();
            spawn_opts.pool_account_username = Some(account_username.as_str().to_string());
            spawn_opts.pool_account_password_base64 = Some(account_password);
            let result = pool.spawn_manager.spawn(&group_name, &spawn_opts).await;

            let mut state = pool.state.lock();
            if state.groups.get_mut(&group_name).is_none() {
                // The group was detached/cleared while this spawn was in
                // flight; the result (if any) has nowhere to go.
                pool.accounts.remove(account_username.as_str());
                return;
            }
            if let Some(group) = state.groups.get_mut(&group_name) {
                group.spawning_in_progress = false;
            }
            match result {
                Ok(mut worker) => {
                    worker.set_service_account(account_username);
                    worker.reset_clock(pool.clock.now());
                    let worker_id = worker.id.clone();
                    if let Some(group) = state.groups.get_mut(&group_name) {
                        group.push_front(worker_id.clone());
                    }
                    state.workers.insert(worker_id.clone(), worker);
                    state.count += 1;
                    state.inactive.push_back(worker_id);
                }
                Err(_) => {
                    pool.accounts.remove(account_username.as_str());
                    // §4.4: a failed background spawn detaches the whole
                    // group rather than leaving it wedged serving only its
                    // existing, fully-loaded workers forever.
                    if let Some(group) = state.groups.get_mut(&group_name) {
                        let drained = group.detach();
                        for id in drained {
                            pool.remove_worker_locked(&mut state, &id);
                        }
                    }
                    state.groups.remove(&group_name);
                }
            }
            drop(state);
            pool.notify_capacity_freed();
        });
    }

    async fn materialize_session(
        &self,
        group_name: &GroupName,
        worker_id: &WorkerId,
    ) -> EngineResult<Session> {
        let (socket_role, address, transport, detach_key, connect_password) = {
            let state = self.state.lock();
            let worker = state
                .workers
                .get(worker_id)
                .ok_or_else(|| EngineError::NoSuchWorker(worker_id.as_str().to_string()))?;
            let socket = worker
                .main_socket()
                .ok_or_else(|| EngineError::Argument("worker has no main socket".into()))?;
            (
                crate::worker::MAIN_SOCKET_ROLE.to_string(),
                socket.address.clone(),
                socket.transport.clone(),
                worker.detach_key.clone(),
                worker.connect_password.clone(),
            )
        };

        let connection = match transport {
            Transport::Unix => WorkerConnection::Unix(
                UnixStream::connect(&address)
                    .await
                    .map_err(|e| EngineError::Wire(e.into()))?,
            ),
            Transport::Tcp => WorkerConnection::Tcp(
                TcpStream::connect(&address)
                    .await
                    .map_err(|e| EngineError::Wire(e.into()))?,
            ),
        };

        {
            let mut state = self.state.lock();
            if let Some(worker) = state.workers.get_mut(worker_id) {
                worker.sessions += 1;
                worker.touch(self.clock.now());
            }
        }

        Ok(Session::new(
            worker_id.clone(),
            group_name.clone(),
            socket_role,
            address,
            transport,
            detach_key,
            connect_password,
            connection,
            self.release_tx.clone(),
        ))
    }

    /// §4.5 `detach(detachKey) -> bool`.
    pub fn detach(&self, key: &DetachKey) -> bool {
        let mut state = self.state.lock();
        let found = state
            .workers
            .values()
            .find(|w| &w.detach_key == key)
            .map(|w| w.id.clone());
        match found {
            Some(id) => {
                self.remove_worker_locked(&mut state, &id);
                drop(state);
                self.notify_capacity_freed();
                true
            }
            None => false,
        }
    }

    /// §4.5 `clear()`.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let ids: Vec<WorkerId> = state.workers.keys().cloned().collect();
        for id in ids {
            self.remove_worker_locked(&mut state, &id);
        }
        state.groups.clear();
        drop(state);
        self.notify_capacity_freed();
    }

    pub fn set_max(&self, n: usize) {
        self.state.lock().limits.max = n;
        self.notify_capacity_freed();
    }

    pub fn set_max_per_app(&self, n: usize) {
        self.state.lock().limits.max_per_app = n;
    }

    pub fn set_max_idle_time(&self, secs: u64) {
        self.state.lock().limits.max_idle_time = Duration::from_secs(secs);
        self.reap_wake.notify_waiters();
    }

    pub fn get_active(&self) -> usize {
        self.state.lock().active
    }

    pub fn get_count(&self) -> usize {
        self.state.lock().count
    }

    pub fn get_global_queue_size(&self) -> usize {
        self.state.lock().global_queue_waiters
    }

    /// Looks up a worker's OS pid, for callers (e.g. the RPC server) that
    /// need to report it alongside a freshly materialized `Session`.
    pub fn worker_pid(&self, id: &WorkerId) -> Option<i32> {
        self.state.lock().workers.get(id).map(|w| w.pid)
    }

    pub fn inspect(&self) -> PoolSnapshot {
        inspect::snapshot(&self.state.lock())
    }

    pub fn to_xml(&self, include_sensitive: bool) -> String {
        inspect::to_xml(&self.state.lock(), include_sensitive)
    }
}

fn is_emfile(err: &EngineError) -> bool {
    matches!(err, EngineError::Wire(pool_wire::WireError::Io(msg)) if msg.contains("os error 24"))
}

async fn run_release_loop<C: Clock>(
    pool: Arc<Pool<C>>,
    mut rx: mpsc::UnboundedReceiver<ReleaseNotice>,
) {
    while let Some(notice) = rx.recv().await {
        pool.release_worker_session(notice);
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
