// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time abstraction, so idle-reaping and restart-throttling logic can be
//! tested without sleeping real wall-clock seconds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// A source of monotonic and wall-clock time.
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn system_now(&self) -> SystemTime;
}

/// Real time, backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A controllable clock for deterministic tests of idle-reaping and
/// restart-throttling windows.
#[derive(Debug, Clone)]
pub struct FakeClock {
    epoch: Instant,
    system_epoch: SystemTime,
    offset_secs: Arc<AtomicU64>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            system_epoch: SystemTime::now(),
            offset_secs: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.offset_secs
            .fetch_add(duration.as_secs(), Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.epoch + Duration::from_secs(self.offset_secs.load(Ordering::SeqCst))
    }

    fn system_now(&self) -> SystemTime {
        self.system_epoch + Duration::from_secs(self.offset_secs.load(Ordering::SeqCst))
    }
}
