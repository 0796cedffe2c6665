// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only snapshots of pool state for `inspect()` and `toXml()` (§4.5, §6).

use std::fmt::Write as _;

use super::state::PoolState;
use crate::worker::{ProcessMetrics, Transport};

#[derive(Debug, Clone)]
pub struct WorkerSnapshot {
    pub pid: i32,
    pub gupid: String,
    pub sessions: u32,
    pub processed: u64,
    pub metrics: ProcessMetrics,
    pub connect_password: String,
    /// `(role, address, transport)` for every socket the worker listens on.
    pub sockets: Vec<(String, String, Transport)>,
}

#[derive(Debug, Clone)]
pub struct GroupSnapshot {
    pub name: String,
    pub app_root: String,
    pub workers: Vec<WorkerSnapshot>,
}

#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub count: usize,
    pub active: usize,
    pub max: usize,
    pub global_queue_size: usize,
    pub groups: Vec<GroupSnapshot>,
}

pub fn snapshot(state: &PoolState) -> PoolSnapshot {
    let groups = state
        .groups
        .values()
        .map(|group| GroupSnapshot {
            name: group.name.as_str().to_string(),
            app_root: group.app_root.to_string_lossy().into_owned(),
            workers: group
                .process_ids()
                .filter_map(|id| state.workers.get(id))
                .map(|w| WorkerSnapshot {
                    pid: w.pid,
                    gupid: w.gupid.to_string(),
                    sessions: w.sessions,
                    processed: w.processed,
                    metrics: w.metrics.clone().unwrap_or_default(),
                    connect_password: w.connect_password.to_string(),
                    sockets: w
                        .sockets
                        .iter()
                        .map(|(role, ep)| (role.clone(), ep.address.clone(), ep.transport.clone()))
                        .collect(),
                })
                .collect(),
        })
        .collect();

    PoolSnapshot {
        count: state.count,
        active: state.active,
        max: state.limits.max,
        global_queue_size: state.global_queue_waiters,
        groups,
    }
}

/// A deliberately plain XML rendering of `inspect()`, matching the shape the
/// original CLI's `--show=xml` consumes. When `include_sensitive` is false,
/// worker gupids are omitted (§6: admin sockets may redact sensitive fields
/// for non-owner connections).
pub fn to_xml(state: &PoolState, include_sensitive: bool) -> String {
    let snap = snapshot(state);
    let mut out = String::new();
    let _ = writeln!(out, "<info>");
    let _ = writeln!(out, "  <count>{}</count>", snap.count);
    let _ = writeln!(out, "  <active>{}</active>", snap.active);
    let _ = writeln!(out, "  <max>{}</max>", snap.max);
    let _ = writeln!(
        out,
        "  <global_queue_size>{}</global_queue_size>",
        snap.global_queue_size
    );
    let _ = writeln!(out, "  <supergroups>");
    for group in &snap.groups {
        let _ = writeln!(out, "    <name>{}</name>", xml_escape(&group.name));
        let _ = writeln!(out, "    <app_root>{}</app_root>", xml_escape(&group.app_root));
        let _ = writeln!(out, "    <processes>");
        for worker in &group.workers {
            let _ = writeln!(out, "      <process>");
            let _ = writeln!(out, "        <pid>{}</pid>", worker.pid);
            if include_sensitive {
                let _ = writeln!(out, "        <gupid>{}</gupid>", xml_escape(&worker.gupid));
            }
            let _ = writeln!(out, "        <sessions>{}</sessions>", worker.sessions);
            let _ = writeln!(out, "        <processed>{}</processed>", worker.processed);
            let m = &worker.metrics;
            let _ = writeln!(out, "        <metrics>");
            let _ = writeln!(out, "          <cpu>{}</cpu>", m.cpu_percent);
            let _ = writeln!(out, "          <rss>{}</rss>", m.rss_kb);
            let _ = writeln!(out, "          <pss>{}</pss>", m.pss_kb);
            let _ = writeln!(out, "          <private_dirty>{}</private_dirty>", m.private_dirty_kb);
            let _ = writeln!(out, "          <swap>{}</swap>", m.swap_kb);
            let _ = writeln!(out, "          <vmsize>{}</vmsize>", m.vm_size_kb);
            let _ = writeln!(out, "          <process_group_id>{}</process_group_id>", m.process_group_id);
            let _ = writeln!(
                out,
                "          <command>{}</command>",
                xml_escape(&m.command_line)
            );
            let _ = writeln!(out, "        </metrics>");
            if include_sensitive {
                let _ = writeln!(
                    out,
                    "        <connect_password>{}</connect_password>",
                    xml_escape(&worker.connect_password)
                );
                let _ = writeln!(out, "        <sockets>");
                for (role, address, transport) in &worker.sockets {
                    let kind = match transport {
                        Transport::Unix => "unix",
                        Transport::Tcp => "tcp",
                    };
                    let _ = writeln!(out, "          <socket>");
                    let _ = writeln!(out, "            <name>{}</name>", xml_escape(role));
                    let _ = writeln!(out, "            <address>{}</address>", xml_escape(address));
                    let _ = writeln!(out, "            <type>{kind}</type>");
                    let _ = writeln!(out, "          </socket>");
                }
                let _ = writeln!(out, "        </sockets>");
            }
            let _ = writeln!(out, "      </process>");
        }
        let _ = writeln!(out, "    </processes>");
    }
    let _ = writeln!(out, "  </supergroups>");
    let _ = writeln!(out, "</info>");
    out
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
