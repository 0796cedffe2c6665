// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic process-metrics collection, detached from the dispatch lock so a
//! slow `ps`/cgroup read never blocks `get()` (§4.5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use pool_core::Clock;

use crate::worker::ProcessMetrics;

use super::Pool;

const COLLECTION_INTERVAL: Duration = Duration::from_secs(4);

/// Supplies CPU/memory metrics for a set of pids. Implementations typically
/// shell out to `ps` or read `/proc`; kept behind a trait so tests can supply
/// canned data instead.
#[async_trait]
pub trait MetricsCollector: Send + Sync + 'static {
    async fn collect(&self, pids: &[i32]) -> HashMap<i32, ProcessMetrics>;
}

/// Per-process numbers folded into a [`GroupTransaction`].
#[derive(Debug, Clone)]
pub struct ProcessSummary {
    pub pid: i32,
    pub gupid: String,
    pub sessions: u32,
    pub processed: u64,
    pub metrics: ProcessMetrics,
}

/// One group's summarized totals and per-process numbers, emitted each
/// collection round for every group with `analytics_enabled` set (§4.5).
#[derive(Debug, Clone)]
pub struct GroupTransaction {
    pub group: String,
    pub analytics_key: Option<String>,
    pub process_count: usize,
    pub total_sessions: u32,
    pub total_processed: u64,
    pub processes: Vec<ProcessSummary>,
}

/// Receives one [`GroupTransaction`] per analytics-enabled group per
/// collection round. The wire format and destination (e.g. a Union
/// Station-style collector) are deliberately left to implementations — this
/// core only decides *when* and *what* to summarize.
#[async_trait]
pub trait AnalyticsSink: Send + Sync + 'static {
    async fn emit(&self, transaction: GroupTransaction);
}

pub fn spawn<C: Clock>(
    pool: Arc<Pool<C>>,
    collector: Arc<dyn MetricsCollector>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move { run(pool, collector, None).await })
}

pub fn spawn_with_analytics<C: Clock>(
    pool: Arc<Pool<C>>,
    collector: Arc<dyn MetricsCollector>,
    analytics: Arc<dyn AnalyticsSink>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move { run(pool, collector, Some(analytics)).await })
}

async fn run<C: Clock>(
    pool: Arc<Pool<C>>,
    collector: Arc<dyn MetricsCollector>,
    analytics: Option<Arc<dyn AnalyticsSink>>,
) {
    let mut ticker = tokio::time::interval(COLLECTION_INTERVAL);
    loop {
        ticker.tick().await;

        let pids: Vec<i32> = pool.state_lock().workers.values().map(|w| w.pid).collect();
        if pids.is_empty() {
            continue;
        }

        let measured = collector.collect(&pids).await;
        if measured.is_empty() {
            continue;
        }

        let transactions = {
            let mut state = pool.state_lock();
            for worker in state.workers.values_mut() {
                if let Some(metrics) = measured.get(&worker.pid) {
                    worker.metrics = Some(metrics.clone());
                }
            }

            if analytics.is_none() {
                Vec::new()
            } else {
                state
                    .groups
                    .values()
                    .filter(|group| group.analytics_enabled)
                    .map(|group| build_transaction(group, &state))
                    .collect::<Vec<_>>()
            }
        };

        if let Some(sink) = &analytics {
            for transaction in transactions {
                sink.emit(transaction).await;
            }
        }
    }
}

fn build_transaction(group: &crate::group::Group, state: &super::PoolState) -> GroupTransaction {
    let processes: Vec<ProcessSummary> = group
        .process_ids()
        .filter_map(|id| state.workers.get(id))
        .map(|w| ProcessSummary {
            pid: w.pid,
            gupid: w.gupid.to_string(),
            sessions: w.sessions,
            processed: w.processed,
            metrics: w.metrics.clone().unwrap_or_default(),
        })
        .collect();

    GroupTransaction {
        group: group.name.as_str().to_string(),
        analytics_key: group.analytics_key.clone(),
        process_count: processes.len(),
        total_sessions: processes.iter().map(|p| p.sessions).sum(),
        total_processed: processes.iter().map(|p| p.processed).sum(),
        processes,
    }
}
